//! Warehouse backed by a directory of CSV exports.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::csv::ReaderBuilder;
use arrow::record_batch::RecordBatch;

use super::memory::shape_result;
use super::{QueryDescriptor, QueryExecutor};
use crate::config::WarehouseTarget;
use crate::error::{DashboardError, Result};

/// Options for reading CSV exports.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Delimiter character
    pub delimiter: u8,
    /// Batch size for reading
    pub batch_size: usize,
    /// Maximum number of records to infer schema from
    pub schema_infer_max_records: usize,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            batch_size: 8192,
            schema_infer_max_records: 1000,
        }
    }
}

/// Serves each table or view from `<dir>/<name>.csv`.
///
/// Files are re-read on every query; staleness is bounded by the result
/// cache in front of the executor, not here.
#[derive(Debug, Clone)]
pub struct CsvWarehouse {
    root: PathBuf,
    options: CsvOptions,
}

impl CsvWarehouse {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::with_options(root, CsvOptions::default())
    }

    pub fn with_options(root: impl AsRef<Path>, options: CsvOptions) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the export for `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.csv", name))
    }

    fn read_table(&self, name: &str) -> Result<RecordBatch> {
        let path = self.path_for(name);
        let file = File::open(&path).map_err(|e| classify_io(name, &path, e))?;
        let mut reader = BufReader::new(file);

        let (schema, _) = arrow::csv::reader::Format::default()
            .with_delimiter(self.options.delimiter)
            .with_header(true)
            .infer_schema(&mut reader, Some(self.options.schema_infer_max_records))?;
        reader.seek(SeekFrom::Start(0))?;

        let schema = Arc::new(schema);
        let csv_reader = ReaderBuilder::new(schema.clone())
            .with_delimiter(self.options.delimiter)
            .with_header(true)
            .with_batch_size(self.options.batch_size)
            .build(reader)?;

        let batches = csv_reader.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(concat_batches(&schema, &batches)?)
    }
}

impl QueryExecutor for CsvWarehouse {
    fn execute(&self, query: &QueryDescriptor, target: &WarehouseTarget) -> Result<RecordBatch> {
        let name = query.source_name(target);
        tracing::debug!(query = %query, path = %self.path_for(name).display(), "reading CSV export");
        shape_result(self.read_table(name)?, query)
    }
}

fn classify_io(name: &str, path: &Path, err: std::io::Error) -> DashboardError {
    match err.kind() {
        ErrorKind::NotFound => DashboardError::schema_unavailable(format!(
            "'{}' has not been exported yet ({})",
            name,
            path.display()
        )),
        ErrorKind::PermissionDenied => {
            DashboardError::auth(format!("permission denied reading {}", path.display()))
        }
        _ => DashboardError::transient(format!("failed to read {}: {}", path.display(), err)),
    }
}
