//! Time series and category rankings for the overview page.

use arrow::record_batch::RecordBatch;

use super::group::{build_batch, counts_batch, sum_at, totals_by, value_counts, ColumnData, GroupBy};
use super::Derived;
use crate::error::{DashboardError, Result};
use crate::types::{OrderField, OrderTable};

/// Categories kept in each ranking.
pub const TOP_CATEGORY_LIMIT: usize = 10;

const SECONDS_PER_HOUR: i64 = 3600;

#[derive(Debug, Clone)]
pub struct Overview {
    /// `hour` (UTC, truncated), `orders`, `revenue`, oldest hour first
    pub hourly: RecordBatch,
    /// `category`, `count`
    pub top_categories_by_volume: RecordBatch,
    /// `category`, `revenue`
    pub top_categories_by_revenue: RecordBatch,
}

pub fn overview(table: &OrderTable) -> Result<Derived<Overview>> {
    let times = table
        .epoch_seconds(OrderField::ProcessedTime)?
        .ok_or_else(|| DashboardError::internal("processed_time column missing"))?;
    let amounts = table.required_numeric(OrderField::PurchaseAmount)?;
    let categories = table.required_text(OrderField::Category)?;

    let hours = GroupBy::build(
        times
            .iter()
            .map(|t| t.map(|secs| secs.div_euclid(SECONDS_PER_HOUR) * SECONDS_PER_HOUR)),
    );
    let mut hourly: Vec<(i64, i64, f64)> = hours
        .iter()
        .map(|(hour, rows)| (*hour, rows.len() as i64, sum_at(&amounts, rows)))
        .collect();
    hourly.sort_by_key(|h| h.0);
    let hourly = build_batch(vec![
        ("hour", ColumnData::Timestamp(hourly.iter().map(|h| h.0).collect())),
        ("orders", ColumnData::Int(hourly.iter().map(|h| h.1).collect())),
        ("revenue", ColumnData::Float(hourly.iter().map(|h| h.2).collect())),
    ])?;

    let mut volume = value_counts(&categories);
    volume.truncate(TOP_CATEGORY_LIMIT);
    let top_categories_by_volume = counts_batch("category", volume)?;

    let mut revenue = totals_by(&categories, &amounts, None);
    revenue.truncate(TOP_CATEGORY_LIMIT);
    let top_categories_by_revenue = build_batch(vec![
        (
            "category",
            ColumnData::Text(revenue.iter().map(|t| t.key.clone()).collect()),
        ),
        (
            "revenue",
            ColumnData::Float(revenue.iter().map(|t| t.total).collect()),
        ),
    ])?;

    Ok(Derived::Available(Overview {
        hourly,
        top_categories_by_volume,
        top_categories_by_revenue,
    }))
}
