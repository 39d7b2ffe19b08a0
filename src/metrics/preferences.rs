//! Pivots over the precomputed preference views.

use arrow::array::{Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;

use super::group::{build_batch, ColumnData};
use crate::error::{DashboardError, Result};

const AGE_BUCKET: &str = "age_bucket";
const GENDER: &str = "gender";
const ORDERS: &str = "orders";

/// Age bucket × gender order counts from the age/gender/category view.
///
/// One row per age bucket and one `Int64` column per gender, both sorted;
/// combinations absent from the view are 0. A view without columns (a failed
/// fetch) yields an empty pivot.
pub fn age_gender_pivot(view: &RecordBatch) -> Result<RecordBatch> {
    if view.num_columns() == 0 {
        return build_batch(vec![(AGE_BUCKET, ColumnData::Text(Vec::new()))]);
    }

    let buckets = text_column(view, AGE_BUCKET)?;
    let genders = text_column(view, GENDER)?;
    let orders = view
        .column_by_name(ORDERS)
        .ok_or_else(|| missing(ORDERS))
        .and_then(|c| Ok(cast(c, &DataType::Int64)?))?;
    let orders = orders
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| DashboardError::internal("orders column did not cast to Int64"))?;

    let mut bucket_keys: Vec<String> = Vec::new();
    let mut gender_keys: Vec<String> = Vec::new();
    let mut cells: Vec<(usize, usize, i64)> = Vec::new();
    for i in 0..view.num_rows() {
        if buckets.is_null(i) || genders.is_null(i) {
            continue;
        }
        let b = slot(&mut bucket_keys, buckets.value(i));
        let g = slot(&mut gender_keys, genders.value(i));
        cells.push((b, g, if orders.is_valid(i) { orders.value(i) } else { 0 }));
    }

    let mut bucket_order: Vec<usize> = (0..bucket_keys.len()).collect();
    bucket_order.sort_by(|a, b| bucket_keys[*a].cmp(&bucket_keys[*b]));
    let mut gender_order: Vec<usize> = (0..gender_keys.len()).collect();
    gender_order.sort_by(|a, b| gender_keys[*a].cmp(&gender_keys[*b]));

    let mut grid = vec![vec![0i64; gender_keys.len()]; bucket_keys.len()];
    for (b, g, n) in cells {
        grid[b][g] += n;
    }

    let mut columns = vec![(
        AGE_BUCKET,
        ColumnData::Text(bucket_order.iter().map(|&b| bucket_keys[b].clone()).collect()),
    )];
    for &g in &gender_order {
        columns.push((
            gender_keys[g].as_str(),
            ColumnData::Int(bucket_order.iter().map(|&b| grid[b][g]).collect()),
        ));
    }
    build_batch(columns)
}

fn slot(keys: &mut Vec<String>, key: &str) -> usize {
    match keys.iter().position(|k| k == key) {
        Some(i) => i,
        None => {
            keys.push(key.to_string());
            keys.len() - 1
        }
    }
}

fn text_column(view: &RecordBatch, name: &str) -> Result<StringArray> {
    let column = view.column_by_name(name).ok_or_else(|| missing(name))?;
    let column = cast(column, &DataType::Utf8)?;
    column
        .as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or_else(|| DashboardError::internal(format!("{name} did not cast to Utf8")))
}

fn missing(name: &str) -> DashboardError {
    DashboardError::schema_unavailable(format!("preference view is missing column '{name}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, Schema};
    use std::sync::Arc;

    fn view(rows: &[(&str, &str, &str, i64)]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("age_bucket", DataType::Utf8, false),
            Field::new("gender", DataType::Utf8, false),
            Field::new("category", DataType::Utf8, false),
            Field::new("orders", DataType::Int64, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(rows.iter().map(|r| r.0).collect::<Vec<_>>())),
                Arc::new(StringArray::from(rows.iter().map(|r| r.1).collect::<Vec<_>>())),
                Arc::new(StringArray::from(rows.iter().map(|r| r.2).collect::<Vec<_>>())),
                Arc::new(Int64Array::from(rows.iter().map(|r| r.3).collect::<Vec<_>>())),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_pivot_sums_categories_and_fills_zero() {
        let batch = view(&[
            ("25-34", "Male", "Clothing", 12),
            ("18-24", "Female", "Clothing", 7),
            ("25-34", "Male", "Footwear", 3),
            ("25-34", "Female", "Outerwear", 4),
        ]);
        let pivot = age_gender_pivot(&batch).unwrap();

        let names: Vec<&str> = pivot
            .schema_ref()
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        assert_eq!(names, vec!["age_bucket", "Female", "Male"]);

        let male = pivot.column(2).as_any().downcast_ref::<Int64Array>().unwrap();
        let female = pivot.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(male.values().to_vec(), vec![0, 15]);
        assert_eq!(female.values().to_vec(), vec![7, 4]);
    }

    #[test]
    fn test_failed_view_gives_empty_pivot() {
        let pivot = age_gender_pivot(&crate::cache::empty_table()).unwrap();
        assert_eq!(pivot.num_rows(), 0);
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let schema = Arc::new(Schema::new(vec![Field::new("age_bucket", DataType::Utf8, false)]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(vec!["18-24"]))])
            .unwrap();
        let err = age_gender_pivot(&batch).unwrap_err();
        assert!(err.is_soft());
    }
}
