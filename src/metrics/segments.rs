//! Revenue by customer segment.

use arrow::array::Array;
use arrow::record_batch::RecordBatch;

use super::group::{build_batch, mean_at, sum_at, ColumnData, GroupBy};
use super::Derived;
use crate::error::Result;
use crate::types::{OrderField, OrderTable};

/// Optional fields the segment table cannot do without.
pub const REQUIRES: [OrderField; 1] = [OrderField::CustomerSegment];

/// Label for orders whose segment is null.
pub const SEGMENT_UNKNOWN: &str = "Unknown";

/// Group orders by customer segment. Null segments form their own
/// [`SEGMENT_UNKNOWN`] group, so the totals always add up to total revenue.
///
/// Columns: `segment`, `total_revenue`, `avg_revenue`, `count`,
/// `total_profit` (null when estimated profit is unavailable). Sorted by
/// total revenue, highest first.
pub fn segment_revenue(table: &OrderTable) -> Result<Derived<RecordBatch>> {
    let missing = table.missing(&REQUIRES);
    if !missing.is_empty() {
        return Ok(Derived::Unavailable { missing });
    }

    let segments = table.required_text(OrderField::CustomerSegment)?;
    let amounts = table.required_numeric(OrderField::PurchaseAmount)?;
    let profits = table.numeric(OrderField::EstimatedProfit)?;

    let groups = GroupBy::build((0..segments.len()).map(|i| {
        let segment = if segments.is_valid(i) {
            segments.value(i)
        } else {
            SEGMENT_UNKNOWN
        };
        Some(segment.to_string())
    }));
    let mut rows: Vec<(String, f64, f64, i64, Option<f64>)> = groups
        .iter()
        .map(|(segment, idx)| {
            (
                segment.clone(),
                sum_at(&amounts, idx),
                mean_at(&amounts, idx).unwrap_or(0.0),
                idx.len() as i64,
                profits.as_ref().map(|p| sum_at(p, idx)),
            )
        })
        .collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut segment = Vec::with_capacity(rows.len());
    let mut total = Vec::with_capacity(rows.len());
    let mut avg = Vec::with_capacity(rows.len());
    let mut count = Vec::with_capacity(rows.len());
    let mut profit = Vec::with_capacity(rows.len());
    for (s, t, a, c, p) in rows {
        segment.push(s);
        total.push(t);
        avg.push(a);
        count.push(c);
        profit.push(p);
    }

    build_batch(vec![
        ("segment", ColumnData::Text(segment)),
        ("total_revenue", ColumnData::Float(total)),
        ("avg_revenue", ColumnData::Float(avg)),
        ("count", ColumnData::Int(count)),
        ("total_profit", ColumnData::NullableFloat(profit)),
    ])
    .map(Derived::Available)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderRecord;
    use crate::metrics::headline;
    use arrow::array::{Float64Array, Int64Array, StringArray};

    fn order(amount: f64, segment: &str, profit: Option<f64>) -> OrderRecord {
        OrderRecord {
            purchase_amount_usd: amount,
            customer_segment: (!segment.is_empty()).then(|| segment.into()),
            estimated_profit_usd: profit,
            ..Default::default()
        }
    }

    #[test]
    fn test_sorted_by_total_revenue() {
        let table = OrderTable::from_records(&[
            order(10.0, "Regular", Some(1.0)),
            order(50.0, "VIP", Some(5.0)),
            order(30.0, "Regular", Some(3.0)),
        ])
        .unwrap();
        let batch = segment_revenue(&table).unwrap().into_option().unwrap();

        let segments = batch.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        let totals = batch.column(1).as_any().downcast_ref::<Float64Array>().unwrap();
        let avgs = batch.column(2).as_any().downcast_ref::<Float64Array>().unwrap();
        let profits = batch.column(4).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(segments.value(0), "VIP");
        assert_eq!(totals.value(0), 50.0);
        assert_eq!(segments.value(1), "Regular");
        assert_eq!(totals.value(1), 40.0);
        assert_eq!(avgs.value(1), 20.0);
        assert_eq!(profits.value(1), 4.0);
    }

    #[test]
    fn test_profit_column_null_when_unavailable() {
        let table = OrderTable::from_records(&[order(10.0, "VIP", None)]).unwrap();
        let batch = segment_revenue(&table).unwrap().into_option().unwrap();
        assert!(batch.column(4).is_null(0));
    }

    #[test]
    fn test_null_segments_grouped_as_unknown() {
        let table = OrderTable::from_records(&[
            order(10.0, "VIP", None),
            order(5.0, "", None),
            order(2.5, "", None),
        ])
        .unwrap();
        let batch = segment_revenue(&table).unwrap().into_option().unwrap();

        let segments = batch.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        let totals = batch.column(1).as_any().downcast_ref::<Float64Array>().unwrap();
        let counts = batch.column(3).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(segments.value(1), SEGMENT_UNKNOWN);
        assert_eq!(totals.value(1), 7.5);
        assert_eq!(counts.value(1), 2);

        let sum: f64 = totals.values().iter().sum();
        assert_eq!(sum, headline(&table).unwrap().total_revenue);
    }

    #[test]
    fn test_unavailable_without_segment_column() {
        let table = OrderTable::from_records(&[OrderRecord::default()]).unwrap();
        match segment_revenue(&table).unwrap() {
            Derived::Unavailable { missing } => {
                assert_eq!(missing, vec![OrderField::CustomerSegment])
            }
            other => panic!("expected unavailable, got {:?}", other),
        }
    }
}
