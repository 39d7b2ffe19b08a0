//! Headline metrics over the whole raw order table.

use super::group::{mean_all, sum_all};
use super::SEGMENT_VIP;
use crate::error::Result;
use crate::types::{OrderField, OrderTable};

/// Optional inputs of the headline metrics. When absent, the dependent
/// metric falls back to zero (final revenue falls back to total revenue) and
/// the field is listed in [`HeadlineMetrics::defaulted`].
pub const OPTIONAL_INPUTS: [OrderField; 4] = [
    OrderField::IsAnomaly,
    OrderField::EstimatedProfit,
    OrderField::CustomerSegment,
    OrderField::FinalAmount,
];

/// Top-line numbers of the dashboard.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeadlineMetrics {
    pub total_orders: usize,
    pub total_revenue: f64,
    pub average_order_value: f64,
    pub average_rating: f64,
    pub anomaly_count: usize,
    /// Anomalies over total orders; 0 for an empty table
    pub anomaly_rate: f64,
    pub total_profit: f64,
    pub vip_orders: usize,
    /// Sum of final amounts, or total revenue when final amounts are absent
    pub final_revenue: f64,
    /// Optional inputs that were absent and replaced by their defaults
    pub defaulted: Vec<OrderField>,
}

/// Compute the headline metrics.
pub fn headline(table: &OrderTable) -> Result<HeadlineMetrics> {
    let total_orders = table.num_rows();
    let amounts = table.required_numeric(OrderField::PurchaseAmount)?;
    let ratings = table.required_numeric(OrderField::ReviewRating)?;

    let total_revenue = sum_all(&amounts);
    let average_order_value = mean_all(&amounts).unwrap_or(0.0);
    let average_rating = mean_all(&ratings).unwrap_or(0.0);

    let anomaly_count = match table.flag(OrderField::IsAnomaly)? {
        Some(flags) => flags.true_count(),
        None => 0,
    };
    let anomaly_rate = ratio(anomaly_count, total_orders);

    let total_profit = table
        .numeric(OrderField::EstimatedProfit)?
        .map(|p| sum_all(&p))
        .unwrap_or(0.0);

    let vip_orders = match table.text(OrderField::CustomerSegment)? {
        Some(segments) => segments.iter().filter(|s| *s == Some(SEGMENT_VIP)).count(),
        None => 0,
    };

    let final_revenue = table
        .numeric(OrderField::FinalAmount)?
        .map(|f| sum_all(&f))
        .unwrap_or(total_revenue);

    Ok(HeadlineMetrics {
        total_orders,
        total_revenue,
        average_order_value,
        average_rating,
        anomaly_count,
        anomaly_rate,
        total_profit,
        vip_orders,
        final_revenue,
        defaulted: table.missing(&OPTIONAL_INPUTS),
    })
}

/// `part / whole`, 0 when `whole` is 0.
pub(crate) fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderRecord;

    fn order(amount: f64, rating: f64) -> OrderRecord {
        OrderRecord {
            purchase_amount_usd: amount,
            review_rating: rating,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_table() {
        let metrics = headline(&OrderTable::empty()).unwrap();
        assert_eq!(metrics.total_orders, 0);
        assert_eq!(metrics.total_revenue, 0.0);
        assert_eq!(metrics.average_order_value, 0.0);
        assert_eq!(metrics.anomaly_rate, 0.0);
        assert_eq!(metrics.defaulted, OPTIONAL_INPUTS.to_vec());
    }

    #[test]
    fn test_core_metrics_and_defaults() {
        let table = OrderTable::from_records(&[order(10.0, 4.0), order(30.0, 2.0)]).unwrap();
        let metrics = headline(&table).unwrap();
        assert_eq!(metrics.total_orders, 2);
        assert_eq!(metrics.total_revenue, 40.0);
        assert_eq!(metrics.average_order_value, 20.0);
        assert_eq!(metrics.average_rating, 3.0);
        assert_eq!(metrics.total_profit, 0.0);
        assert_eq!(metrics.final_revenue, 40.0);
        assert!(metrics.defaulted.contains(&OrderField::FinalAmount));
    }

    #[test]
    fn test_enriched_metrics() {
        let mut a = order(10.0, 5.0);
        a.is_anomaly = Some(true);
        a.customer_segment = Some("VIP".into());
        a.estimated_profit_usd = Some(2.5);
        a.final_amount_usd = Some(9.0);
        let mut b = order(20.0, 3.0);
        b.is_anomaly = Some(false);
        b.customer_segment = Some("Regular".into());
        b.estimated_profit_usd = Some(4.0);
        b.final_amount_usd = Some(18.0);

        let metrics = headline(&OrderTable::from_records(&[a, b]).unwrap()).unwrap();
        assert_eq!(metrics.anomaly_count, 1);
        assert_eq!(metrics.anomaly_rate, 0.5);
        assert_eq!(metrics.vip_orders, 1);
        assert_eq!(metrics.total_profit, 6.5);
        assert_eq!(metrics.final_revenue, 27.0);
        assert!(metrics.defaulted.is_empty());
    }
}
