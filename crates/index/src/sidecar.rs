//! Lightweight index sidecar: a second columnar file per snapshot holding
//! only identity/validity columns, small enough to load entirely into
//! memory for fast repeated in-memory scans. Not used by the aggregator.

use std::sync::Arc;

use arrow::array::{
    Array, BooleanArray, BooleanBuilder, RecordBatch, StringArray, StringBuilder,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use vstat_columnar::schema::{columns, index_schema};
use vstat_columnar::{ColumnarWriter, WriterConfig};
use vstat_core::{EngineError, Result};
use vstat_partition::PartitionLayout;

/// One row of the index sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Content-addressed record id (same value as the fact table's `id`).
    pub record_id: String,
    /// External identifier.
    pub identifier: String,
    /// Verdict for the whole record.
    pub record_is_valid: bool,
    /// Whether the record underwent a content transformation.
    pub is_transformed: bool,
    /// Optional hash of the published metadata payload.
    pub published_metadata_hash: Option<String>,
}

/// Filter applied by [`IndexSidecar::load_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    /// Every entry.
    All,
    /// Only records whose `record_is_valid` is true.
    ValidOnly,
    /// Only records whose `record_is_valid` is false.
    InvalidOnly,
}

impl StatusFilter {
    fn matches(self, entry: &IndexEntry) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::ValidOnly => entry.record_is_valid,
            StatusFilter::InvalidOnly => !entry.record_is_valid,
        }
    }
}

/// Accumulates index entries per snapshot in memory and rewrites the whole
/// sidecar file on each flush.
pub struct IndexSidecar {
    layout: Arc<PartitionLayout>,
    pending: DashMap<i64, Mutex<Vec<IndexEntry>>>,
}

impl IndexSidecar {
    /// Build an index sidecar manager rooted at `layout`'s base path.
    pub fn new(layout: Arc<PartitionLayout>) -> Self {
        IndexSidecar {
            layout,
            pending: DashMap::new(),
        }
    }

    /// Record one entry in memory, to be written on the next flush.
    pub fn record(&self, snapshot_id: i64, entry: IndexEntry) {
        self.pending
            .entry(snapshot_id)
            .or_insert_with(|| Mutex::new(Vec::new()))
            .lock()
            .push(entry);
    }

    /// Rewrite the sidecar file for `snapshot_id` wholesale from every
    /// entry recorded (across this process's lifetime) plus whatever was
    /// already on disk, deduplicated by `record_id` (last write wins).
    pub fn flush(&self, snapshot_id: i64) -> Result<()> {
        let mut all = self.load_index(snapshot_id, StatusFilter::All).unwrap_or_default();
        let new_entries = self
            .pending
            .get(&snapshot_id)
            .map(|p| std::mem::take(&mut *p.lock()))
            .unwrap_or_default();
        for entry in new_entries {
            if let Some(existing) = all.iter_mut().find(|e| e.record_id == entry.record_id) {
                *existing = entry;
            } else {
                all.push(entry);
            }
        }
        self.write_wholesale(snapshot_id, &all)
    }

    fn write_wholesale(&self, snapshot_id: i64, entries: &[IndexEntry]) -> Result<()> {
        let path = self.layout.index_path(snapshot_id);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| EngineError::io(&path, e))?;
        }

        let mut record_id = StringBuilder::new();
        let mut identifier = StringBuilder::new();
        let mut record_is_valid = BooleanBuilder::new();
        let mut is_transformed = BooleanBuilder::new();
        let mut published_metadata_hash = StringBuilder::new();

        for entry in entries {
            record_id.append_value(&entry.record_id);
            identifier.append_value(&entry.identifier);
            record_is_valid.append_value(entry.record_is_valid);
            is_transformed.append_value(entry.is_transformed);
            match &entry.published_metadata_hash {
                Some(h) => published_metadata_hash.append_value(h),
                None => published_metadata_hash.append_null(),
            }
        }

        let batch = RecordBatch::try_new(
            index_schema(),
            vec![
                Arc::new(record_id.finish()),
                Arc::new(identifier.finish()),
                Arc::new(record_is_valid.finish()),
                Arc::new(is_transformed.finish()),
                Arc::new(published_metadata_hash.finish()),
            ],
        )
        .map_err(|e| EngineError::InvalidInput(format!("index batch construction failed: {e}")))?;

        let mut writer =
            ColumnarWriter::create_with_schema(&path, index_schema(), &WriterConfig::default())?;
        writer.write_batch(&batch)?;
        writer.close()
    }

    /// Load the entire index for `snapshot_id` into memory, applying
    /// `status_filter`. Returns an empty list if no sidecar exists yet.
    pub fn load_index(&self, snapshot_id: i64, status_filter: StatusFilter) -> Result<Vec<IndexEntry>> {
        let path = self.layout.index_path(snapshot_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path).map_err(|e| EngineError::io(&path, e))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| EngineError::MalformedFile {
                file: path.clone(),
                cause: format!("footer parse failed: {e}"),
            })?
            .build()
            .map_err(|e| EngineError::MalformedFile {
                file: path.clone(),
                cause: format!("reader build failed: {e}"),
            })?;

        let mut out = Vec::new();
        for batch in reader {
            let batch = batch.map_err(|e| EngineError::MalformedFile {
                file: path.clone(),
                cause: format!("batch decode failed: {e}"),
            })?;
            for row in 0..batch.num_rows() {
                let entry = decode_row(&batch, row);
                if status_filter.matches(&entry) {
                    out.push(entry);
                }
            }
        }
        Ok(out)
    }
}

fn decode_row(batch: &RecordBatch, row: usize) -> IndexEntry {
    let str_col = |name: &str| -> Option<String> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .and_then(|a| if a.is_null(row) { None } else { Some(a.value(row).to_string()) })
    };
    let bool_col = |name: &str| -> bool {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<BooleanArray>())
            .map(|a| a.value(row))
            .unwrap_or(false)
    };
    IndexEntry {
        record_id: str_col(columns::RECORD_ID).unwrap_or_default(),
        identifier: str_col(columns::IDENTIFIER).unwrap_or_default(),
        record_is_valid: bool_col(columns::RECORD_IS_VALID),
        is_transformed: bool_col(columns::IS_TRANSFORMED),
        published_metadata_hash: str_col(columns::PUBLISHED_METADATA_HASH),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_sidecar_yields_empty_list() {
        let dir = tempdir().unwrap();
        let layout = Arc::new(PartitionLayout::new(dir.path()));
        let sidecar = IndexSidecar::new(layout);
        assert!(sidecar.load_index(1, StatusFilter::All).unwrap().is_empty());
    }

    #[test]
    fn record_then_flush_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let layout = Arc::new(PartitionLayout::new(dir.path()));
        let sidecar = IndexSidecar::new(layout);
        sidecar.record(
            1,
            IndexEntry {
                record_id: "a".to_string(),
                identifier: "oai:a".to_string(),
                record_is_valid: true,
                is_transformed: false,
                published_metadata_hash: None,
            },
        );
        sidecar.record(
            1,
            IndexEntry {
                record_id: "b".to_string(),
                identifier: "oai:b".to_string(),
                record_is_valid: false,
                is_transformed: true,
                published_metadata_hash: Some("deadbeef".to_string()),
            },
        );
        sidecar.flush(1).unwrap();

        let all = sidecar.load_index(1, StatusFilter::All).unwrap();
        assert_eq!(all.len(), 2);
        let valid = sidecar.load_index(1, StatusFilter::ValidOnly).unwrap();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].record_id, "a");
    }

    #[test]
    fn flush_rewrites_wholesale_without_duplicating() {
        let dir = tempdir().unwrap();
        let layout = Arc::new(PartitionLayout::new(dir.path()));
        let sidecar = IndexSidecar::new(layout);
        sidecar.record(
            1,
            IndexEntry {
                record_id: "a".to_string(),
                identifier: "oai:a".to_string(),
                record_is_valid: true,
                is_transformed: false,
                published_metadata_hash: None,
            },
        );
        sidecar.flush(1).unwrap();
        sidecar.flush(1).unwrap();
        assert_eq!(sidecar.load_index(1, StatusFilter::All).unwrap().len(), 1);
    }
}
