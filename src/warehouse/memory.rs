//! In-memory warehouse backed by Arrow RecordBatches.

use std::collections::HashMap;

use arrow::compute::{sort_to_indices, take_record_batch, SortOptions};
use arrow::record_batch::RecordBatch;
use parking_lot::RwLock;

use super::{QueryDescriptor, QueryExecutor};
use crate::config::WarehouseTarget;
use crate::error::{DashboardError, Result};

/// A warehouse holding named tables in memory.
///
/// Queries are answered by applying the descriptor's sort order and row limit
/// to the registered batch. Failures can be injected per table to exercise
/// the degradation paths of the refresh loop.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    tables: RwLock<HashMap<String, RecordBatch>>,
    failures: RwLock<HashMap<String, DashboardError>>,
    calls: RwLock<HashMap<String, usize>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a table or view.
    pub fn register(&self, name: impl Into<String>, batch: RecordBatch) {
        self.tables.write().insert(name.into(), batch);
    }

    /// Remove a table or view, so later queries report it as unavailable.
    pub fn deregister(&self, name: &str) -> Option<RecordBatch> {
        self.tables.write().remove(name)
    }

    /// Make every query against `name` fail with `error` until [`recover`] is called.
    ///
    /// [`recover`]: MemoryWarehouse::recover
    pub fn fail_with(&self, name: impl Into<String>, error: DashboardError) {
        self.failures.write().insert(name.into(), error);
    }

    /// Clear an injected failure.
    pub fn recover(&self, name: &str) {
        self.failures.write().remove(name);
    }

    /// Number of queries executed against `name`, failed ones included.
    pub fn call_count(&self, name: &str) -> usize {
        self.calls.read().get(name).copied().unwrap_or(0)
    }

    /// Total number of queries executed.
    pub fn total_calls(&self) -> usize {
        self.calls.read().values().sum()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl QueryExecutor for MemoryWarehouse {
    fn execute(&self, query: &QueryDescriptor, target: &WarehouseTarget) -> Result<RecordBatch> {
        let name = query.source_name(target);
        *self.calls.write().entry(name.to_string()).or_insert(0) += 1;

        if let Some(error) = self.failures.read().get(name) {
            return Err(error.clone());
        }

        let batch = self.tables.read().get(name).cloned().ok_or_else(|| {
            DashboardError::schema_unavailable(format!(
                "'{}' not found in {}.{}",
                name, target.project, target.dataset
            ))
        })?;

        shape_result(batch, query)
    }
}

/// Apply a query's sort order and row limit to a full table.
pub(crate) fn shape_result(batch: RecordBatch, query: &QueryDescriptor) -> Result<RecordBatch> {
    let sorted = match query.ordering() {
        Some(sort) => {
            let column = batch.column_by_name(&sort.column).ok_or_else(|| {
                DashboardError::schema_unavailable(format!(
                    "sort column '{}' not found for {}",
                    sort.column, query
                ))
            })?;
            let options = SortOptions {
                descending: sort.descending,
                nulls_first: false,
            };
            let indices = sort_to_indices(column, Some(options), None)?;
            take_record_batch(&batch, &indices)?
        }
        None => batch,
    };

    Ok(match query.row_limit() {
        Some(limit) if limit < sorted.num_rows() => sorted.slice(0, limit),
        _ => sorted,
    })
}
