//! Metric aggregation over the raw order table.
//!
//! Every function here is pure: it reads an [`OrderTable`] (or a preference
//! view) and produces numbers or small Arrow tables. Derived tables declare
//! the optional order fields they need and come back as
//! [`Derived::Unavailable`] when upstream has not produced them yet.

mod group;

pub mod anomaly;
pub mod distribution;
pub mod headline;
pub mod overview;
pub mod preferences;
pub mod satisfaction;
pub mod segments;
pub mod vip;

use arrow::record_batch::RecordBatch;
use tracing::warn;

use crate::error::{DashboardError, Result};
use crate::types::{OrderField, OrderTable};

pub use anomaly::{anomaly_summary, AnomalySummary, ANOMALY_LOCATION_LIMIT};
pub use distribution::{amount_distribution, frequency_distribution};
pub use headline::{headline, HeadlineMetrics};
pub use overview::{overview, Overview, TOP_CATEGORY_LIMIT};
pub use preferences::age_gender_pivot;
pub use satisfaction::{satisfaction_summary, SatisfactionSummary, SATISFACTION_ORDER};
pub use segments::{segment_revenue, SEGMENT_UNKNOWN};
pub use vip::{vip_premium, VipPremiumSummary};

/// Segment label of the highest-value customers.
pub const SEGMENT_VIP: &str = "VIP";
/// Amount category of the most expensive orders.
pub const AMOUNT_PREMIUM: &str = "Premium";

/// Result of a derived computation that may be skipped.
#[derive(Debug, Clone)]
pub enum Derived<T> {
    Available(T),
    /// Required optional fields are absent from the order table
    Unavailable { missing: Vec<OrderField> },
    /// The computation itself failed; other tables are unaffected
    Failed(DashboardError),
}

impl<T> Derived<T> {
    /// Flatten a fallible computation so one failure never spreads.
    pub fn from_result(result: Result<Derived<T>>) -> Self {
        result.unwrap_or_else(Derived::Failed)
    }

    pub fn available(&self) -> Option<&T> {
        match self {
            Derived::Available(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Derived::Available(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Derived::Available(_))
    }

    /// The warning to surface for a skipped or failed table.
    pub fn warning(&self) -> Option<DashboardError> {
        match self {
            Derived::Available(_) => None,
            Derived::Unavailable { missing } => {
                let names: Vec<&str> = missing.iter().map(|f| f.column_name()).collect();
                Some(DashboardError::schema_unavailable(format!(
                    "missing columns: {}",
                    names.join(", ")
                )))
            }
            Derived::Failed(err) => Some(err.clone()),
        }
    }
}

/// All derived tables of one refresh cycle.
#[derive(Debug, Clone)]
pub struct DerivedMetrics {
    pub segments: Derived<RecordBatch>,
    pub vip: Derived<VipPremiumSummary>,
    pub anomalies: Derived<AnomalySummary>,
    pub satisfaction: Derived<SatisfactionSummary>,
    pub amount_distribution: Derived<RecordBatch>,
    pub frequency_distribution: Derived<RecordBatch>,
    pub overview: Derived<Overview>,
}

impl DerivedMetrics {
    /// Compute every derived table. A failure is kept with its table.
    pub fn compute(table: &OrderTable) -> Self {
        let metrics = Self {
            segments: Derived::from_result(segment_revenue(table)),
            vip: Derived::from_result(vip_premium(table)),
            anomalies: Derived::from_result(anomaly_summary(table)),
            satisfaction: Derived::from_result(satisfaction_summary(table)),
            amount_distribution: Derived::from_result(amount_distribution(table)),
            frequency_distribution: Derived::from_result(frequency_distribution(table)),
            overview: Derived::from_result(overview(table)),
        };
        for (name, err) in metrics.warnings() {
            warn!(table = name, error = %err, "derived metric skipped");
        }
        metrics
    }

    /// Warnings for every table that is not available, by table name.
    pub fn warnings(&self) -> Vec<(&'static str, DashboardError)> {
        [
            ("segments", self.segments.warning()),
            ("vip_premium", self.vip.warning()),
            ("anomalies", self.anomalies.warning()),
            ("satisfaction", self.satisfaction.warning()),
            ("amount_distribution", self.amount_distribution.warning()),
            ("frequency_distribution", self.frequency_distribution.warning()),
            ("overview", self.overview.warning()),
        ]
        .into_iter()
        .filter_map(|(name, warning)| warning.map(|w| (name, w)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderRecord;

    #[test]
    fn test_unavailable_warning_names_columns() {
        let derived: Derived<()> = Derived::Unavailable {
            missing: vec![OrderField::CustomerSegment, OrderField::AmountCategory],
        };
        let warning = derived.warning().unwrap();
        assert!(matches!(warning, DashboardError::SchemaUnavailable { .. }));
        assert!(warning.to_string().contains("customer_segment, amount_category"));
    }

    #[test]
    fn test_from_result_keeps_failure() {
        let derived: Derived<u8> =
            Derived::from_result(Err(DashboardError::internal("kernel failed")));
        assert!(!derived.is_available());
        assert!(matches!(derived, Derived::Failed(_)));
    }

    #[test]
    fn test_core_only_table_skips_enriched_tables() {
        let table = OrderTable::from_records(&[OrderRecord {
            category: "Shoes".into(),
            purchase_amount_usd: 12.0,
            ..Default::default()
        }])
        .unwrap();
        let metrics = DerivedMetrics::compute(&table);

        assert!(metrics.overview.is_available());
        assert!(!metrics.segments.is_available());
        assert!(!metrics.vip.is_available());
        let names: Vec<&str> = metrics.warnings().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "segments",
                "vip_premium",
                "anomalies",
                "satisfaction",
                "amount_distribution",
                "frequency_distribution"
            ]
        );
    }
}
