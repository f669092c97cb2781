// Bulk loading of staged JSON into the destination tables. Staged records
// are projected into typed per-table row batches (arrays flattened into join
// tables), then written through a TableSink with overwrite-by-key semantics
// so reloading a staged file is a no-op beyond write cost.

pub mod project;
pub mod sql;
pub mod trino;

pub use project::{project_batch, Row, TableBatch, TableSchema};
pub use trino::TrinoSink;

use crate::error::LoadError;
use crate::types::MovieRecord;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

/// Destination write surface. The loader only ever asks for one operation:
/// replace any rows sharing these keys, then insert these rows.
#[async_trait]
pub trait TableSink: Send + Sync {
    async fn overwrite(&self, batch: &TableBatch) -> Result<usize, LoadError>;
}

/// Result of a complete load run
#[derive(Debug, Default, Serialize)]
pub struct LoadReport {
    pub files_loaded: usize,
    /// Files that could not be read or parsed, with the reason; loading of
    /// the remaining files continued
    pub failed_files: Vec<(PathBuf, String)>,
    pub records_loaded: usize,
    pub records_malformed: usize,
    pub rows_per_table: BTreeMap<String, usize>,
}

pub struct BulkLoader {
    sink: Arc<dyn TableSink>,
    batch_size: usize,
}

impl BulkLoader {
    pub fn new(sink: Arc<dyn TableSink>, batch_size: usize) -> Self {
        Self {
            sink,
            batch_size: batch_size.max(1),
        }
    }

    /// Load staged files in caller-supplied order (last write wins across
    /// files). Unreadable files are recorded and skipped; a sink failure is
    /// infrastructural and aborts the run.
    pub async fn load(&self, files: &[PathBuf]) -> Result<LoadReport, LoadError> {
        let mut report = LoadReport::default();
        for path in files {
            match self.load_file(path, &mut report).await {
                Ok(()) => report.files_loaded += 1,
                Err(LoadError::FileUnreadable { path, reason }) => {
                    warn!(path = %path.display(), reason, "Skipping unreadable staged file");
                    report.failed_files.push((path, reason));
                }
                Err(e) => return Err(e),
            }
        }
        info!(
            "Load complete: {} files, {} records, {} malformed",
            report.files_loaded, report.records_loaded, report.records_malformed
        );
        Ok(report)
    }

    #[instrument(skip(self, report))]
    async fn load_file(&self, path: &Path, report: &mut LoadReport) -> Result<(), LoadError> {
        let content = fs::read_to_string(path).map_err(|e| LoadError::FileUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let values: Vec<serde_json::Value> =
            serde_json::from_str(&content).map_err(|e| LoadError::FileUnreadable {
                path: path.to_path_buf(),
                reason: format!("not a JSON array: {e}"),
            })?;

        let mut records: Vec<MovieRecord> = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            match parse_record(index, value) {
                Ok(record) => records.push(record),
                Err(e) => {
                    report.records_malformed += 1;
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Skipping malformed staged record"
                    );
                }
            }
        }

        for batch in project_batch(&records) {
            for chunk in batch.rows.chunks(self.batch_size) {
                let chunk_batch = TableBatch {
                    schema: batch.schema,
                    rows: chunk.to_vec(),
                };
                let written = self.sink.overwrite(&chunk_batch).await?;
                *report
                    .rows_per_table
                    .entry(batch.schema.name.to_string())
                    .or_default() += written;
            }
        }

        report.records_loaded += records.len();
        info!(
            path = %path.display(),
            records = records.len(),
            "Loaded staged file"
        );
        Ok(())
    }
}

fn parse_record(index: usize, value: serde_json::Value) -> Result<MovieRecord, LoadError> {
    serde_json::from_value(value).map_err(|e| LoadError::RecordMalformed {
        index,
        reason: e.to_string(),
    })
}

/// In-memory sink keyed exactly the way the destination tables are keyed.
/// Backs dry runs and the loader's tests; overwrite semantics match the
/// delete-then-insert the Trino sink performs.
#[derive(Default)]
pub struct MemorySink {
    tables: Mutex<HashMap<String, BTreeMap<Vec<String>, Vec<String>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map_or(0, |rows| rows.len())
    }

    /// Rendered rows for a table, in key order
    pub fn rows(&self, table: &str) -> Vec<Vec<String>> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map_or_else(Vec::new, |rows| rows.values().cloned().collect())
    }
}

#[async_trait]
impl TableSink for MemorySink {
    async fn overwrite(&self, batch: &TableBatch) -> Result<usize, LoadError> {
        let key_indices = batch.schema.key_indices();
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(batch.schema.name.to_string()).or_default();
        for row in &batch.rows {
            let key: Vec<String> = key_indices.iter().map(|i| row.0[*i].render()).collect();
            let rendered: Vec<String> = row.0.iter().map(|v| v.render()).collect();
            table.insert(key, rendered);
        }
        Ok(batch.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn malformed_record_yields_a_typed_error_carrying_its_index() {
        let err = parse_record(7, json!({"title": "no tmdb_id"})).unwrap_err();
        match err {
            LoadError::RecordMalformed { index: 7, .. } => {}
            other => panic!("expected RecordMalformed, got {other:?}"),
        }

        let value = serde_json::to_value(MovieRecord::new(603, "The Matrix")).unwrap();
        assert!(parse_record(0, value).is_ok());
    }
}
