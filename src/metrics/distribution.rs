//! Value-frequency distributions of categorical order fields.

use arrow::record_batch::RecordBatch;

use super::group::{counts_batch, value_counts};
use super::Derived;
use crate::error::Result;
use crate::types::{OrderField, OrderTable};

/// `amount_category`, `count`, most frequent first.
pub fn amount_distribution(table: &OrderTable) -> Result<Derived<RecordBatch>> {
    frequencies(table, OrderField::AmountCategory)
}

/// `frequency_category`, `count`, most frequent first.
pub fn frequency_distribution(table: &OrderTable) -> Result<Derived<RecordBatch>> {
    frequencies(table, OrderField::FrequencyCategory)
}

fn frequencies(table: &OrderTable, field: OrderField) -> Result<Derived<RecordBatch>> {
    let missing = table.missing(&[field]);
    if !missing.is_empty() {
        return Ok(Derived::Unavailable { missing });
    }
    let values = table.required_text(field)?;
    counts_batch(field.column_name(), value_counts(&values)).map(Derived::Available)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderRecord;
    use arrow::array::{Int64Array, StringArray};

    #[test]
    fn test_amount_distribution() {
        let records: Vec<OrderRecord> = ["Low", "Premium", "Low", "Medium"]
            .into_iter()
            .map(|c| OrderRecord {
                amount_category: Some(c.into()),
                ..Default::default()
            })
            .collect();
        let table = OrderTable::from_records(&records).unwrap();
        let batch = amount_distribution(&table).unwrap().into_option().unwrap();

        let keys = batch.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        let counts = batch.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(batch.schema().field(0).name(), "amount_category");
        assert_eq!(keys.value(0), "Low");
        assert_eq!(counts.value(0), 2);
        assert_eq!(keys.value(1), "Premium");
    }

    #[test]
    fn test_frequency_distribution_unavailable() {
        let table = OrderTable::from_records(&[OrderRecord::default()]).unwrap();
        assert!(matches!(
            frequency_distribution(&table).unwrap(),
            Derived::Unavailable { .. }
        ));
    }
}
