//! Orders flagged as anomalous by the enrichment pipeline.

use arrow::array::{Array, BooleanArray};
use arrow::record_batch::RecordBatch;

use super::group::{build_batch, sum_all, totals_by, ColumnData, KeyTotal};
use super::headline::ratio;
use super::Derived;
use crate::error::Result;
use crate::types::{OrderField, OrderTable};

pub const REQUIRES: [OrderField; 1] = [OrderField::IsAnomaly];

/// Locations shown in the by-location breakdown.
pub const ANOMALY_LOCATION_LIMIT: usize = 15;

#[derive(Debug, Clone)]
pub struct AnomalySummary {
    pub count: usize,
    /// Share of the raw table, in `[0, 1]`
    pub rate: f64,
    pub total_amount: f64,
    /// `category`, `count`, `total_amount`, highest total first
    pub by_category: RecordBatch,
    /// `location`, `count`, `total_amount`, top locations only
    pub by_location: RecordBatch,
    pub rows: OrderTable,
}

pub fn anomaly_summary(table: &OrderTable) -> Result<Derived<AnomalySummary>> {
    let missing = table.missing(&REQUIRES);
    if !missing.is_empty() {
        return Ok(Derived::Unavailable { missing });
    }

    let flags = table
        .flag(OrderField::IsAnomaly)?
        .unwrap_or_else(|| BooleanArray::from(Vec::<bool>::new()));
    let keep: Vec<bool> = (0..table.num_rows())
        .map(|i| flags.is_valid(i) && flags.value(i))
        .collect();
    let rows = table.filter(&BooleanArray::from(keep.clone()))?;

    let count = rows.num_rows();
    let total_amount = sum_all(&rows.required_numeric(OrderField::PurchaseAmount)?);

    let amounts = table.required_numeric(OrderField::PurchaseAmount)?;
    let categories = table.required_text(OrderField::Category)?;
    let locations = table.required_text(OrderField::Location)?;

    let by_category = totals_batch("category", totals_by(&categories, &amounts, Some(&keep)))?;
    let mut location_totals = totals_by(&locations, &amounts, Some(&keep));
    location_totals.truncate(ANOMALY_LOCATION_LIMIT);
    let by_location = totals_batch("location", location_totals)?;

    Ok(Derived::Available(AnomalySummary {
        count,
        rate: ratio(count, table.num_rows()),
        total_amount,
        by_category,
        by_location,
        rows,
    }))
}

fn totals_batch(key_name: &str, totals: Vec<KeyTotal>) -> Result<RecordBatch> {
    build_batch(vec![
        (
            key_name,
            ColumnData::Text(totals.iter().map(|t| t.key.clone()).collect()),
        ),
        (
            "count",
            ColumnData::Int(totals.iter().map(|t| t.rows.len() as i64).collect()),
        ),
        (
            "total_amount",
            ColumnData::Float(totals.iter().map(|t| t.total).collect()),
        ),
    ])
}
