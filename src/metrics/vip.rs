//! The VIP customer / Premium order subset.

use arrow::array::{Array, BooleanArray};
use arrow::record_batch::RecordBatch;

use super::group::{
    build_batch, counts_batch, mean_all, mean_at, sum_all, totals_by, value_counts, ColumnData,
};
use super::{Derived, AMOUNT_PREMIUM, SEGMENT_VIP};
use crate::error::Result;
use crate::types::{OrderField, OrderTable};

pub const REQUIRES: [OrderField; 2] = [OrderField::CustomerSegment, OrderField::AmountCategory];

/// Summary of orders placed by VIP customers in the Premium amount category.
#[derive(Debug, Clone)]
pub struct VipPremiumSummary {
    pub count: usize,
    pub total_revenue: f64,
    pub average_order_value: f64,
    /// `None` when lifetime values are not available
    pub average_lifetime_value: Option<f64>,
    /// `category`, `count`, `total_revenue`, `avg_amount`, `avg_clv`
    pub by_category: RecordBatch,
    /// `loyalty_score`, `count`; empty when loyalty scores are not available
    pub loyalty_distribution: RecordBatch,
    pub rows: OrderTable,
}

pub fn vip_premium(table: &OrderTable) -> Result<Derived<VipPremiumSummary>> {
    let missing = table.missing(&REQUIRES);
    if !missing.is_empty() {
        return Ok(Derived::Unavailable { missing });
    }

    let segments = table.required_text(OrderField::CustomerSegment)?;
    let amount_categories = table.required_text(OrderField::AmountCategory)?;
    let keep: Vec<bool> = (0..table.num_rows())
        .map(|i| {
            segments.is_valid(i)
                && amount_categories.is_valid(i)
                && segments.value(i) == SEGMENT_VIP
                && amount_categories.value(i) == AMOUNT_PREMIUM
        })
        .collect();

    let rows = table.filter(&BooleanArray::from(keep.clone()))?;
    let subset_amounts = rows.required_numeric(OrderField::PurchaseAmount)?;
    let count = rows.num_rows();
    let total_revenue = sum_all(&subset_amounts);
    let average_order_value = if count == 0 {
        0.0
    } else {
        total_revenue / count as f64
    };
    let average_lifetime_value = match rows.numeric(OrderField::EstimatedClv)? {
        Some(clv) => mean_all(&clv),
        None => None,
    };

    let categories = table.required_text(OrderField::Category)?;
    let amounts = table.required_numeric(OrderField::PurchaseAmount)?;
    let clv = table.numeric(OrderField::EstimatedClv)?;
    let totals = totals_by(&categories, &amounts, Some(&keep));
    let by_category = build_batch(vec![
        (
            "category",
            ColumnData::Text(totals.iter().map(|t| t.key.clone()).collect()),
        ),
        (
            "count",
            ColumnData::Int(totals.iter().map(|t| t.rows.len() as i64).collect()),
        ),
        (
            "total_revenue",
            ColumnData::Float(totals.iter().map(|t| t.total).collect()),
        ),
        (
            "avg_amount",
            ColumnData::Float(
                totals
                    .iter()
                    .map(|t| mean_at(&amounts, &t.rows).unwrap_or(0.0))
                    .collect(),
            ),
        ),
        (
            "avg_clv",
            ColumnData::NullableFloat(
                totals
                    .iter()
                    .map(|t| clv.as_ref().and_then(|c| mean_at(c, &t.rows)))
                    .collect(),
            ),
        ),
    ])?;

    let loyalty = match rows.text(OrderField::LoyaltyScore)? {
        Some(scores) => value_counts(&scores),
        None => Vec::new(),
    };
    let loyalty_distribution = counts_batch(OrderField::LoyaltyScore.column_name(), loyalty)?;

    Ok(Derived::Available(VipPremiumSummary {
        count,
        total_revenue,
        average_order_value,
        average_lifetime_value,
        by_category,
        loyalty_distribution,
        rows,
    }))
}
