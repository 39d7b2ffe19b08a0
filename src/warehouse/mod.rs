//! The warehouse boundary.
//!
//! The dashboard core never talks to a warehouse directly. It describes what
//! it needs with a [`QueryDescriptor`] and hands that to a [`QueryExecutor`].
//! Two executors ship with the crate: [`MemoryWarehouse`] for embedding and
//! tests, and [`CsvWarehouse`] for serving exported tables from a directory.

mod csv;
mod memory;

pub use self::csv::CsvWarehouse;
pub use memory::MemoryWarehouse;

use std::fmt;
use std::time::Duration;

use arrow::record_batch::RecordBatch;

use crate::config::WarehouseTarget;
use crate::error::Result;
use crate::types::OrderField;

/// TTL of the raw order table: the primary live signal.
pub const ORDERS_TTL: Duration = Duration::from_secs(10);
/// TTL of the pre-aggregated preference views.
pub const VIEW_TTL: Duration = Duration::from_secs(30);
/// Row cap on the age×gender×category view.
pub const AGE_GENDER_CATEGORY_LIMIT: usize = 50;

/// Column holding the order count in every preference view.
pub const VIEW_ORDERS_COLUMN: &str = "orders";
/// Metric columns carried by the single-dimension preference views.
pub const VIEW_METRIC_COLUMNS: [&str; 3] = ["orders", "avg_spend", "avg_rating"];
/// Optional column naming the most purchased category of a view row.
pub const VIEW_TOP_CATEGORY_COLUMN: &str = "top_category";

/// Pre-aggregated summary views maintained upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceView {
    Age,
    Gender,
    Location,
    AgeGenderCategory,
}

impl PreferenceView {
    pub const ALL: [PreferenceView; 4] = [
        PreferenceView::Age,
        PreferenceView::Gender,
        PreferenceView::Location,
        PreferenceView::AgeGenderCategory,
    ];

    /// Warehouse view name.
    pub fn view_name(&self) -> &'static str {
        match self {
            PreferenceView::Age => "v_age_preferences",
            PreferenceView::Gender => "v_gender_preferences",
            PreferenceView::Location => "v_location_preferences",
            PreferenceView::AgeGenderCategory => "v_age_gender_category",
        }
    }

    /// Dimension key columns of the view.
    pub fn dimension_columns(&self) -> &'static [&'static str] {
        match self {
            PreferenceView::Age => &["age_bucket"],
            PreferenceView::Gender => &["gender"],
            PreferenceView::Location => &["location"],
            PreferenceView::AgeGenderCategory => &["age_bucket", "gender", "category"],
        }
    }

    /// Columns the view must carry to honor its contract.
    pub fn required_columns(&self) -> Vec<&'static str> {
        let mut columns = self.dimension_columns().to_vec();
        match self {
            PreferenceView::AgeGenderCategory => columns.push(VIEW_ORDERS_COLUMN),
            _ => columns.extend(VIEW_METRIC_COLUMNS),
        }
        columns
    }

    /// Fixed sort order applied upstream.
    pub fn ordering(&self) -> Option<SortSpec> {
        match self {
            PreferenceView::Age => Some(SortSpec::ascending("age_bucket")),
            PreferenceView::Gender => None,
            PreferenceView::Location | PreferenceView::AgeGenderCategory => {
                Some(SortSpec::descending(VIEW_ORDERS_COLUMN))
            }
        }
    }

    pub fn row_limit(&self) -> Option<usize> {
        match self {
            PreferenceView::AgeGenderCategory => Some(AGE_GENDER_CATEGORY_LIMIT),
            _ => None,
        }
    }

    /// Names of contract columns absent from `batch`.
    pub fn missing_columns(&self, batch: &RecordBatch) -> Vec<&'static str> {
        let schema = batch.schema();
        self.required_columns()
            .into_iter()
            .filter(|c| schema.index_of(c).is_err())
            .collect()
    }
}

impl fmt::Display for PreferenceView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.view_name())
    }
}

/// A single-column sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub descending: bool,
}

impl SortSpec {
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

/// What the dashboard asks the warehouse for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryDescriptor {
    /// The most recent orders, freshest first.
    LatestOrders { limit: usize },
    /// One of the preference views.
    View(PreferenceView),
}

impl QueryDescriptor {
    /// Stable identity used as the cache key.
    pub fn id(&self) -> String {
        match self {
            QueryDescriptor::LatestOrders { limit } => format!("orders:latest:{}", limit),
            QueryDescriptor::View(view) => format!("view:{}", view.view_name()),
        }
    }

    /// Fixed cache policy for this query.
    pub fn ttl(&self) -> Duration {
        match self {
            QueryDescriptor::LatestOrders { .. } => ORDERS_TTL,
            QueryDescriptor::View(_) => VIEW_TTL,
        }
    }

    /// Name of the table or view read by this query.
    pub fn source_name<'a>(&self, target: &'a WarehouseTarget) -> &'a str {
        match self {
            QueryDescriptor::LatestOrders { .. } => &target.table,
            QueryDescriptor::View(view) => view.view_name(),
        }
    }

    pub fn ordering(&self) -> Option<SortSpec> {
        match self {
            QueryDescriptor::LatestOrders { .. } => {
                Some(SortSpec::descending(OrderField::ProcessedTime.column_name()))
            }
            QueryDescriptor::View(view) => view.ordering(),
        }
    }

    pub fn row_limit(&self) -> Option<usize> {
        match self {
            QueryDescriptor::LatestOrders { limit } => Some(*limit),
            QueryDescriptor::View(view) => view.row_limit(),
        }
    }

    /// Render the warehouse SQL for this query.
    pub fn to_sql(&self, target: &WarehouseTarget) -> String {
        let projection = match self {
            QueryDescriptor::LatestOrders { .. } => OrderField::all()
                .map(|f| f.column_name())
                .collect::<Vec<_>>()
                .join(", "),
            QueryDescriptor::View(_) => "*".to_string(),
        };

        let mut sql = format!(
            "SELECT {} FROM `{}`",
            projection,
            target.qualified(self.source_name(target))
        );
        if let Some(sort) = self.ordering() {
            sql.push_str(&format!(
                " ORDER BY {}{}",
                sort.column,
                if sort.descending { " DESC" } else { "" }
            ));
        }
        if let Some(limit) = self.row_limit() {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        sql
    }
}

impl fmt::Display for QueryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// Executes dashboard queries against a warehouse.
///
/// Calls are synchronous: a slow upstream blocks the whole refresh cycle.
/// Implementations classify failures with [`DashboardError::auth`],
/// [`DashboardError::schema_unavailable`] and [`DashboardError::transient`].
///
/// [`DashboardError::auth`]: crate::error::DashboardError::auth
/// [`DashboardError::schema_unavailable`]: crate::error::DashboardError::schema_unavailable
/// [`DashboardError::transient`]: crate::error::DashboardError::transient
pub trait QueryExecutor {
    fn execute(&self, query: &QueryDescriptor, target: &WarehouseTarget) -> Result<RecordBatch>;
}

impl<T: QueryExecutor + ?Sized> QueryExecutor for &T {
    fn execute(&self, query: &QueryDescriptor, target: &WarehouseTarget) -> Result<RecordBatch> {
        (**self).execute(query, target)
    }
}

impl<T: QueryExecutor + ?Sized> QueryExecutor for Box<T> {
    fn execute(&self, query: &QueryDescriptor, target: &WarehouseTarget) -> Result<RecordBatch> {
        (**self).execute(query, target)
    }
}
