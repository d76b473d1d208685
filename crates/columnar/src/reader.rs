//! Columnar reader: opens one file, applies a pushdown predicate, and
//! exposes three read modes — streaming, value-only aggregation, and
//! skip/limit pagination.
//!
//! Pushdown happens at two levels: row groups whose column min/max
//! statistics prove the predicate unsatisfiable are never decoded
//! (`row_group_satisfiable`), and individual rows are tested against the
//! raw columns before a [`Fact`] object is ever built (`row_matches`).

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::{Array, BooleanArray, Int32Array, Int64Array, RecordBatch, StringArray};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::metadata::RowGroupMetaData;
use parquet::file::statistics::Statistics;
use vstat_core::{EngineError, Fact, Result};

use crate::codec::decode_row;
use crate::predicate::{ColumnValue, Predicate};
use crate::schema::fact_schema;

/// One decoded row passed to [`ColumnarReader::aggregate`]: only the
/// columns the aggregator actually needs, with no intermediate [`Fact`]
/// object built.
#[derive(Debug, Clone)]
pub struct AggregateRow {
    /// Content-addressed record id.
    pub id: String,
    /// Rule this row belongs to.
    pub rule_id: i32,
    /// Verdict for this occurrence.
    pub is_valid: bool,
    /// Verdict for the whole record.
    pub record_is_valid: bool,
    /// Whether the record was transformed.
    pub is_transformed: bool,
}

/// Runtime configuration for opening a file. Kept separate from
/// [`crate::writer::WriterConfig`] since a reader never needs page/row-group
/// sizing, only batch size for the underlying arrow reader.
#[derive(Debug, Clone, Copy)]
pub struct ReaderConfig {
    /// Arrow record batch size used while scanning.
    pub batch_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig { batch_size: 8192 }
    }
}

/// Opens one columnar file and streams rows surviving `predicate`.
pub struct ColumnarReader {
    path: PathBuf,
    config: ReaderConfig,
    predicate: Predicate,
}

impl ColumnarReader {
    /// Construct a reader for `path`. `predicate` defaults to
    /// [`Predicate::True`] (no filtering) when the caller wants every row.
    pub fn new(path: impl Into<PathBuf>, config: ReaderConfig, predicate: Predicate) -> Self {
        ColumnarReader {
            path: path.into(),
            config,
            predicate,
        }
    }

    /// Stream decoded facts in file order, invoking `callback` once per
    /// surviving row.
    pub fn stream(&self, mut callback: impl FnMut(Fact)) -> Result<()> {
        self.for_each_surviving_row(|batch, row| {
            let fact = decode_row(batch, row).map_err(|e| self.as_malformed(e))?;
            callback(fact);
            Ok(())
        })
    }

    /// Like [`Self::stream`] but skips materialising a full [`Fact`]; used
    /// by the aggregator's hot path.
    pub fn aggregate(&self, mut callback: impl FnMut(AggregateRow)) -> Result<()> {
        self.for_each_surviving_row(|batch, row| {
            callback(extract_aggregate_row(batch, row));
            Ok(())
        })
    }

    /// Skip `offset` surviving rows, then collect up to `limit`. Returns
    /// the collected facts and the offset still remaining to be skipped
    /// (nonzero only if the file was exhausted before `offset` rows were
    /// seen, so the caller can carry it into the next file).
    pub fn read_with_skip(&self, offset: usize, limit: usize) -> Result<(Vec<Fact>, usize)> {
        let mut remaining_offset = offset;
        let mut collected = Vec::new();
        self.for_each_surviving_row(|batch, row| {
            if collected.len() >= limit {
                return Ok(());
            }
            if remaining_offset > 0 {
                remaining_offset -= 1;
                return Ok(());
            }
            let fact = decode_row(batch, row).map_err(|e| self.as_malformed(e))?;
            collected.push(fact);
            Ok(())
        })?;
        Ok((collected, remaining_offset))
    }

    /// Count surviving rows without materialising any of them.
    pub fn count(&self) -> Result<usize> {
        let mut n = 0usize;
        self.for_each_surviving_row(|_, _| {
            n += 1;
            Ok(())
        })?;
        Ok(n)
    }

    fn as_malformed(&self, err: EngineError) -> EngineError {
        match err {
            EngineError::InvalidInput(cause) | EngineError::MalformedFile { cause, .. } => {
                EngineError::MalformedFile {
                    file: self.path.clone(),
                    cause,
                }
            }
            other => other,
        }
    }

    /// Drive `f` over every row surviving row-group pruning and row-level
    /// predicate evaluation. The file handle is always released when this
    /// returns, on every exit path, because the `File`/reader live only in
    /// this function's stack frame.
    fn for_each_surviving_row(
        &self,
        mut f: impl FnMut(&RecordBatch, usize) -> Result<()>,
    ) -> Result<()> {
        let file = File::open(&self.path).map_err(|e| EngineError::io(&self.path, e))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| {
            EngineError::MalformedFile {
                file: self.path.clone(),
                cause: format!("footer parse failed: {e}"),
            }
        })?;

        let metadata = builder.metadata().clone();
        let surviving_groups: Vec<usize> = (0..metadata.num_row_groups())
            .filter(|&i| row_group_satisfiable(metadata.row_group(i), &self.predicate))
            .collect();

        let reader = builder
            .with_row_groups(surviving_groups)
            .with_batch_size(self.config.batch_size)
            .build()
            .map_err(|e| EngineError::MalformedFile {
                file: self.path.clone(),
                cause: format!("reader build failed: {e}"),
            })?;

        for batch in reader {
            let batch = batch.map_err(|e| EngineError::MalformedFile {
                file: self.path.clone(),
                cause: format!("batch decode failed: {e}"),
            })?;
            for row in 0..batch.num_rows() {
                if row_matches(&batch, row, &self.predicate) {
                    f(&batch, row)?;
                }
            }
        }
        Ok(())
    }
}

fn extract_aggregate_row(batch: &RecordBatch, row: usize) -> AggregateRow {
    let id = batch
        .column_by_name(crate::schema::columns::ID)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .map(|a| a.value(row).to_string())
        .unwrap_or_default();
    let rule_id = batch
        .column_by_name(crate::schema::columns::RULE_ID)
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .map(|a| a.value(row))
        .unwrap_or_default();
    let is_valid = bool_col(batch, crate::schema::columns::IS_VALID, row);
    let record_is_valid = bool_col(batch, crate::schema::columns::RECORD_IS_VALID, row);
    let is_transformed = bool_col(batch, crate::schema::columns::IS_TRANSFORMED, row);
    AggregateRow {
        id,
        rule_id,
        is_valid,
        record_is_valid,
        is_transformed,
    }
}

fn bool_col(batch: &RecordBatch, name: &str, row: usize) -> bool {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<BooleanArray>())
        .map(|a| a.value(row))
        .unwrap_or(false)
}

/// Evaluate `predicate` against row `row` of `batch` using the raw typed
/// arrays, never constructing a [`Fact`].
fn row_matches(batch: &RecordBatch, row: usize, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::True => true,
        Predicate::Eq { column, value } => match value {
            ColumnValue::Bool(v) => bool_col(batch, column, row) == *v,
            ColumnValue::Int32(v) => batch
                .column_by_name(column)
                .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
                .map(|a| !a.is_null(row) && a.value(row) == *v)
                .unwrap_or(false),
            ColumnValue::Int64(v) => batch
                .column_by_name(column)
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .map(|a| !a.is_null(row) && a.value(row) == *v)
                .unwrap_or(false),
            ColumnValue::Utf8(v) => batch
                .column_by_name(column)
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .map(|a| !a.is_null(row) && a.value(row) == v)
                .unwrap_or(false),
        },
        Predicate::And(a, b) => row_matches(batch, row, a) && row_matches(batch, row, b),
        Predicate::Or(a, b) => row_matches(batch, row, a) || row_matches(batch, row, b),
    }
}

/// True unless `predicate` can be proven unsatisfiable for every row in
/// `row_group` using its column min/max statistics.
fn row_group_satisfiable(row_group: &RowGroupMetaData, predicate: &Predicate) -> bool {
    !prunable(row_group, predicate)
}

fn prunable(row_group: &RowGroupMetaData, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::True => false,
        Predicate::Eq { column, value } => eq_prunable(row_group, column, value),
        Predicate::And(a, b) => prunable(row_group, a) || prunable(row_group, b),
        Predicate::Or(a, b) => prunable(row_group, a) && prunable(row_group, b),
    }
}

fn eq_prunable(row_group: &RowGroupMetaData, column: &str, value: &ColumnValue) -> bool {
    let Some(idx) = column_index(row_group, column) else {
        return false;
    };
    let Some(stats) = row_group.column(idx).statistics() else {
        return false;
    };
    match (stats, value) {
        (Statistics::Boolean(s), ColumnValue::Bool(v)) => match (s.min_opt(), s.max_opt()) {
            (Some(min), Some(max)) => v < min || v > max,
            _ => false,
        },
        (Statistics::Int32(s), ColumnValue::Int32(v)) => match (s.min_opt(), s.max_opt()) {
            (Some(min), Some(max)) => v < min || v > max,
            _ => false,
        },
        (Statistics::Int64(s), ColumnValue::Int64(v)) => match (s.min_opt(), s.max_opt()) {
            (Some(min), Some(max)) => v < min || v > max,
            _ => false,
        },
        (Statistics::ByteArray(s), ColumnValue::Utf8(v)) => match (s.min_opt(), s.max_opt()) {
            (Some(min), Some(max)) => {
                let v = v.as_bytes();
                v < min.as_bytes() || v > max.as_bytes()
            }
            _ => false,
        },
        _ => false,
    }
}

fn column_index(row_group: &RowGroupMetaData, column: &str) -> Option<usize> {
    let schema = fact_schema();
    schema.index_of(column).ok().filter(|&i| i < row_group.num_columns())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_batch;
    use crate::writer::{ColumnarWriter, WriterConfig};
    use tempfile::tempdir;
    use vstat_core::{Fact, Provenance};

    fn write_sample(path: &Path) {
        let facts = vec![
            Fact {
                id: "a".into(),
                identifier: "oai:a".into(),
                snapshot_id: 1,
                provenance: Provenance {
                    network: Some("NET".into()),
                    ..Default::default()
                },
                rule_id: 7,
                value: Some("x".into()),
                is_valid: true,
                record_is_valid: true,
                is_transformed: false,
            },
            Fact {
                id: "b".into(),
                identifier: "oai:b".into(),
                snapshot_id: 1,
                provenance: Provenance {
                    network: Some("NET".into()),
                    ..Default::default()
                },
                rule_id: 8,
                value: Some("z".into()),
                is_valid: false,
                record_is_valid: false,
                is_transformed: false,
            },
        ];
        let batch = encode_batch(&facts).unwrap();
        let mut w = ColumnarWriter::create(path, &WriterConfig::default()).unwrap();
        w.write_batch(&batch).unwrap();
        w.close().unwrap();
    }

    #[test]
    fn stream_returns_all_rows_with_true_predicate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("part-00000.parquet");
        write_sample(&path);
        let reader = ColumnarReader::new(&path, ReaderConfig::default(), Predicate::True);
        let mut seen = Vec::new();
        reader.stream(|f| seen.push(f.id.clone())).unwrap();
        assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn stream_applies_eq_predicate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("part-00000.parquet");
        write_sample(&path);
        let predicate = Predicate::eq(
            crate::schema::columns::RULE_ID,
            ColumnValue::Int32(7),
        );
        let reader = ColumnarReader::new(&path, ReaderConfig::default(), predicate);
        let mut seen = Vec::new();
        reader.stream(|f| seen.push(f.id.clone())).unwrap();
        assert_eq!(seen, vec!["a".to_string()]);
    }

    #[test]
    fn read_with_skip_paginates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("part-00000.parquet");
        write_sample(&path);
        let reader = ColumnarReader::new(&path, ReaderConfig::default(), Predicate::True);
        let (page, remaining) = reader.read_with_skip(1, 1).unwrap();
        assert_eq!(remaining, 0);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "b");
    }

    #[test]
    fn count_matches_predicate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("part-00000.parquet");
        write_sample(&path);
        let predicate = Predicate::eq(
            crate::schema::columns::RECORD_IS_VALID,
            ColumnValue::Bool(true),
        );
        let reader = ColumnarReader::new(&path, ReaderConfig::default(), predicate);
        assert_eq!(reader.count().unwrap(), 1);
    }
}
