//! Hash grouping over key columns, shared by every aggregation.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Float64Array, Int64Array, StringArray, TimestampSecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;

use crate::error::Result;

/// Row indices grouped by key, in first-seen key order. Null keys are skipped.
#[derive(Debug)]
pub(crate) struct GroupBy<K> {
    keys: Vec<K>,
    rows: Vec<Vec<usize>>,
}

impl<K: Eq + Hash + Clone> GroupBy<K> {
    pub fn build(keys: impl IntoIterator<Item = Option<K>>) -> Self {
        let mut index: HashMap<K, usize> = HashMap::new();
        let mut groups = Self {
            keys: Vec::new(),
            rows: Vec::new(),
        };
        for (row, key) in keys.into_iter().enumerate() {
            let Some(key) = key else { continue };
            let slot = *index.entry(key.clone()).or_insert_with(|| {
                groups.keys.push(key);
                groups.rows.push(Vec::new());
                groups.keys.len() - 1
            });
            groups.rows[slot].push(row);
        }
        groups
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &[usize])> {
        self.keys.iter().zip(self.rows.iter().map(Vec::as_slice))
    }
}

impl GroupBy<String> {
    /// Group the rows of a text column, optionally restricted to rows where `keep` is true.
    pub fn by_text(column: &StringArray, keep: Option<&[bool]>) -> Self {
        Self::build((0..column.len()).map(|i| {
            let kept = keep.map_or(true, |k| k[i]);
            (kept && column.is_valid(i)).then(|| column.value(i).to_string())
        }))
    }
}

/// Sum of the non-null values at `rows`.
pub(crate) fn sum_at(values: &Float64Array, rows: &[usize]) -> f64 {
    rows.iter()
        .filter(|&&i| values.is_valid(i))
        .map(|&i| values.value(i))
        .sum()
}

/// Mean of the non-null values at `rows`, `None` when there are none.
pub(crate) fn mean_at(values: &Float64Array, rows: &[usize]) -> Option<f64> {
    let (sum, n) = rows
        .iter()
        .filter(|&&i| values.is_valid(i))
        .fold((0.0, 0usize), |(s, n), &i| (s + values.value(i), n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Sum of all non-null values.
pub(crate) fn sum_all(values: &Float64Array) -> f64 {
    values.iter().flatten().sum()
}

/// Mean of all non-null values, `None` when there are none.
pub(crate) fn mean_all(values: &Float64Array) -> Option<f64> {
    let (sum, n) = values
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Value-frequency counts, most frequent first; ties keep first-seen order.
pub(crate) fn value_counts(column: &StringArray) -> Vec<(String, i64)> {
    let groups = GroupBy::by_text(column, None);
    let mut counts: Vec<(String, i64)> = groups
        .iter()
        .map(|(k, rows)| (k.clone(), rows.len() as i64))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// One group with its amount total.
#[derive(Debug, Clone)]
pub(crate) struct KeyTotal {
    pub key: String,
    pub rows: Vec<usize>,
    pub total: f64,
}

/// Group kept rows by a text key and total `amounts` per group, highest
/// total first; ties keep first-seen order.
pub(crate) fn totals_by(
    keys: &StringArray,
    amounts: &Float64Array,
    keep: Option<&[bool]>,
) -> Vec<KeyTotal> {
    let groups = GroupBy::by_text(keys, keep);
    let mut totals: Vec<KeyTotal> = groups
        .iter()
        .map(|(key, rows)| KeyTotal {
            key: key.clone(),
            rows: rows.to_vec(),
            total: sum_at(amounts, rows),
        })
        .collect();
    totals.sort_by(|a, b| b.total.total_cmp(&a.total));
    totals
}

/// A column under construction for a derived table.
pub(crate) enum ColumnData {
    Text(Vec<String>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    NullableFloat(Vec<Option<f64>>),
    /// Seconds since the epoch, UTC
    Timestamp(Vec<i64>),
}

impl ColumnData {
    fn into_parts(self, name: &str) -> (Field, ArrayRef) {
        match self {
            ColumnData::Text(v) => (
                Field::new(name, DataType::Utf8, false),
                Arc::new(StringArray::from(v)),
            ),
            ColumnData::Int(v) => (
                Field::new(name, DataType::Int64, false),
                Arc::new(Int64Array::from(v)),
            ),
            ColumnData::Float(v) => (
                Field::new(name, DataType::Float64, false),
                Arc::new(Float64Array::from(v)),
            ),
            ColumnData::NullableFloat(v) => (
                Field::new(name, DataType::Float64, true),
                Arc::new(Float64Array::from(v)),
            ),
            ColumnData::Timestamp(v) => (
                Field::new(
                    name,
                    DataType::Timestamp(TimeUnit::Second, Some("UTC".into())),
                    false,
                ),
                Arc::new(TimestampSecondArray::from(v).with_timezone("UTC")),
            ),
        }
    }
}

/// Assemble a record batch from named columns of equal length.
pub(crate) fn build_batch(columns: Vec<(&str, ColumnData)>) -> Result<RecordBatch> {
    let (fields, arrays): (Vec<Field>, Vec<ArrayRef>) = columns
        .into_iter()
        .map(|(name, data)| data.into_parts(name))
        .unzip();
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// A two-column `(key, count)` table.
pub(crate) fn counts_batch(key_name: &str, counts: Vec<(String, i64)>) -> Result<RecordBatch> {
    let (keys, values): (Vec<String>, Vec<i64>) = counts.into_iter().unzip();
    build_batch(vec![
        (key_name, ColumnData::Text(keys)),
        ("count", ColumnData::Int(values)),
    ])
}
