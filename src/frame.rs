//! The rendered state of one refresh cycle.

use std::fmt;

use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::cache::{CacheLookup, CacheOutcome};
use crate::config::DashboardConfig;
use crate::error::{DashboardError, Result};
use crate::filter::{
    filter_options, project, truncate, DisplayView, FilterOptions, FilterSelection,
    ANOMALY_DETAIL_COLUMNS, VIP_DETAIL_COLUMNS, VIP_DETAIL_ROWS,
};
use crate::metrics::{age_gender_pivot, headline, Derived, DerivedMetrics, HeadlineMetrics};
use crate::types::OrderTable;
use crate::warehouse::PreferenceView;

/// A degraded part of a frame and why.
#[derive(Debug, Clone)]
pub struct Warning {
    /// Query, view or derived table the warning is about
    pub source: String,
    pub error: DashboardError,
}

impl Warning {
    pub fn new(source: impl Into<String>, error: DashboardError) -> Self {
        Self {
            source: source.into(),
            error,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.error)
    }
}

/// One preference view as served to the frame.
#[derive(Debug, Clone)]
pub struct ViewTable {
    pub view: PreferenceView,
    pub table: RecordBatch,
    pub outcome: CacheOutcome,
}

/// Everything a presenter needs to draw the dashboard once.
#[derive(Debug, Clone)]
pub struct DashboardFrame {
    pub cycle: u64,
    pub generated_at: DateTime<Utc>,
    pub config: DashboardConfig,
    pub orders_outcome: CacheOutcome,
    pub headline: HeadlineMetrics,
    pub derived: DerivedMetrics,
    pub views: Vec<ViewTable>,
    pub age_gender_pivot: Derived<RecordBatch>,
    pub display: DisplayView,
    pub filter_options: FilterOptions,
    /// VIP-Premium rows projected for display
    pub vip_detail: Option<RecordBatch>,
    /// Anomalous rows projected for display
    pub anomaly_detail: Option<RecordBatch>,
    pub warnings: Vec<Warning>,
}

impl DashboardFrame {
    /// Assemble a frame from the fetched order table and preference views.
    ///
    /// `warnings` carries the fetch warnings collected so far; view contract
    /// violations and skipped derived tables are appended. A section that
    /// cannot be computed is left empty with a warning, so assembly never fails.
    pub fn assemble(
        cycle: u64,
        config: DashboardConfig,
        orders: OrderTable,
        orders_outcome: CacheOutcome,
        views: Vec<ViewTable>,
        mut warnings: Vec<Warning>,
    ) -> Self {
        for view in &views {
            if view.table.num_columns() == 0 {
                continue;
            }
            let missing = view.view.missing_columns(&view.table);
            if !missing.is_empty() {
                warnings.push(Warning::new(
                    view.view.view_name(),
                    DashboardError::schema_unavailable(format!(
                        "view is missing columns: {}",
                        missing.join(", ")
                    )),
                ));
            }
        }

        let headline = degrade(&mut warnings, "headline", headline(&orders)).unwrap_or_default();
        let derived = DerivedMetrics::compute(&orders);
        warnings.extend(
            derived
                .warnings()
                .into_iter()
                .map(|(name, err)| Warning::new(name, err)),
        );

        let age_gender_pivot = views
            .iter()
            .find(|v| v.view == PreferenceView::AgeGenderCategory)
            .map(|v| Derived::from_result(age_gender_pivot(&v.table).map(Derived::Available)))
            .unwrap_or(Derived::Unavailable { missing: Vec::new() });
        if let Derived::Failed(err) = &age_gender_pivot {
            warnings.push(Warning::new("age_gender_pivot", err.clone()));
        }

        let vip_detail = derived.vip.available().and_then(|vip| {
            let detail = truncate(&vip.rows, VIP_DETAIL_ROWS)
                .and_then(|rows| project(&rows, &VIP_DETAIL_COLUMNS));
            degrade(&mut warnings, "vip_detail", detail)
        });
        let anomaly_detail = derived.anomalies.available().and_then(|anomalies| {
            degrade(
                &mut warnings,
                "anomaly_detail",
                project(&anomalies.rows, &ANOMALY_DETAIL_COLUMNS),
            )
        });

        let selection = FilterSelection::from_settings(&config.display);
        let display = degrade(
            &mut warnings,
            "display",
            DisplayView::build(&orders, selection.clone(), config.display.row_limit),
        )
        .unwrap_or_else(|| DisplayView::empty(selection));
        let filter_options =
            degrade(&mut warnings, "filter_options", filter_options(&orders)).unwrap_or_default();

        Self {
            cycle,
            generated_at: Utc::now(),
            config,
            orders_outcome,
            headline,
            derived,
            views,
            age_gender_pivot,
            display,
            filter_options,
            vip_detail,
            anomaly_detail,
            warnings,
        }
    }

    pub fn view(&self, view: PreferenceView) -> Option<&RecordBatch> {
        self.views.iter().find(|v| v.view == view).map(|v| &v.table)
    }

    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Keep a section's value, or record why it is missing.
fn degrade<T>(warnings: &mut Vec<Warning>, source: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(section = source, error = %err, "frame section skipped");
            warnings.push(Warning::new(source, err));
            None
        }
    }
}

/// Fetch warning for a cache lookup, if the lookup carried a failure.
pub(crate) fn lookup_warning(source: &str, lookup: &CacheLookup) -> Option<Warning> {
    lookup
        .failure
        .as_ref()
        .map(|err| Warning::new(source, err.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderRecord;
    use arrow::array::{ArrayRef, ListArray, StringArray};
    use arrow::datatypes::{DataType, Field, Float64Type, Schema};
    use std::sync::Arc;

    fn orders() -> OrderTable {
        OrderTable::from_records(&[OrderRecord {
            category: "Clothing".into(),
            location: "Ohio".into(),
            purchase_amount_usd: 25.0,
            customer_segment: Some("VIP".into()),
            amount_category: Some("Premium".into()),
            ..Default::default()
        }])
        .unwrap()
    }

    #[test]
    fn test_assemble_collects_warnings() {
        let schema = Arc::new(Schema::new(vec![Field::new("gender", DataType::Utf8, false)]));
        let broken = RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(vec!["Male"]))])
            .unwrap();
        let views = vec![ViewTable {
            view: PreferenceView::Gender,
            table: broken,
            outcome: CacheOutcome::Fetched,
        }];
        let frame = DashboardFrame::assemble(
            1,
            DashboardConfig::default(),
            orders(),
            CacheOutcome::Fetched,
            views,
            Vec::new(),
        );

        let sources: Vec<&str> = frame.warnings.iter().map(|w| w.source.as_str()).collect();
        assert!(sources.contains(&"v_gender_preferences"));
        assert!(sources.contains(&"anomalies"));
        assert!(!sources.contains(&"vip_premium"));
        assert_eq!(frame.headline.total_orders, 1);
        assert_eq!(frame.vip_detail.as_ref().unwrap().num_rows(), 1);
        assert!(frame.anomaly_detail.is_none());
        assert_eq!(frame.display.shown_rows, 1);
        assert!(frame.is_degraded());
    }

    #[test]
    fn test_uncastable_amount_degrades_sections() {
        let batch = orders().into_batch();
        let schema = batch.schema();
        let index = schema.index_of("purchase_amount_usd").unwrap();
        let amounts: ArrayRef = Arc::new(ListArray::from_iter_primitive::<Float64Type, _, _>(
            vec![Some(vec![Some(25.0)])],
        ));

        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        fields[index] = Field::new("purchase_amount_usd", amounts.data_type().clone(), true);
        let mut columns = batch.columns().to_vec();
        columns[index] = amounts;
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).unwrap();

        let frame = DashboardFrame::assemble(
            1,
            DashboardConfig::default(),
            OrderTable::try_new(batch).unwrap(),
            CacheOutcome::Fetched,
            Vec::new(),
            Vec::new(),
        );

        let sources: Vec<&str> = frame.warnings.iter().map(|w| w.source.as_str()).collect();
        assert!(sources.contains(&"headline"));
        assert_eq!(frame.headline, HeadlineMetrics::default());
        assert!(frame.vip_detail.is_none());
        assert_eq!(frame.display.shown_rows, 1);
        assert_eq!(frame.filter_options.categories, vec!["Clothing"]);
    }
}
