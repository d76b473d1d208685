//! Columnar writer: creates one file with a configured row-group size,
//! page size, compression codec and dictionary encoding.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, Encoding};
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use vstat_core::{EngineError, Result};

use crate::schema::fact_schema;

/// Write mode. The engine never overwrites an existing file except during
/// an explicit `clean`, which removes the file before writing a new one
/// rather than opening in an overwrite mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail if the file already exists.
    Create,
}

/// Construction options for [`ColumnarWriter`].
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Compression codec. Default: Snappy (a fast general-purpose codec).
    pub compression: Compression,
    /// Whether to dictionary-encode string columns.
    pub dictionary_encoding: bool,
    /// Data page size, in bytes.
    pub page_size: usize,
    /// Row group size, in bytes.
    pub row_group_size: usize,
    /// Write mode.
    pub write_mode: WriteMode,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            compression: Compression::SNAPPY,
            dictionary_encoding: true,
            page_size: 1024 * 1024,
            row_group_size: 128 * 1024 * 1024,
            write_mode: WriteMode::Create,
        }
    }
}

/// Writes one columnar file, closing (committing the footer) on
/// [`ColumnarWriter::close`] or on drop. A partially written file (panic or
/// early drop before `close`) is left on disk for the caller to delete and
/// retry; `close` is the only path that commits a valid footer.
pub struct ColumnarWriter {
    path: PathBuf,
    inner: Option<ArrowWriter<File>>,
}

impl ColumnarWriter {
    /// Create a new fact file at `path` per `config`. Fails if the file
    /// already exists (the engine is append-mostly at the file-set level,
    /// never at the single-file level).
    pub fn create(path: impl Into<PathBuf>, config: &WriterConfig) -> Result<Self> {
        Self::create_with_schema(path, fact_schema(), config)
    }

    /// Create a new file at `path` with an arbitrary `schema` (used by the
    /// lightweight index sidecar, whose schema is narrower than the fact
    /// table's).
    pub fn create_with_schema(
        path: impl Into<PathBuf>,
        schema: SchemaRef,
        config: &WriterConfig,
    ) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| EngineError::io(&path, e))?;

        let props = build_properties(config);
        let writer = ArrowWriter::try_new(file, schema, Some(props))
            .map_err(|e| EngineError::InvalidInput(format!("writer init failed: {e}")))?;

        Ok(ColumnarWriter {
            path,
            inner: Some(writer),
        })
    }

    /// Write one batch of rows.
    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        let writer = self
            .inner
            .as_mut()
            .expect("write_batch called after close");
        writer
            .write(batch)
            .map_err(|e| EngineError::InvalidInput(format!("write failed: {e}")))
    }

    /// Commit the footer and close the file. Required for the file to be
    /// readable; a file that never reaches `close` is a partial write.
    pub fn close(mut self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<()> {
        if let Some(writer) = self.inner.take() {
            writer
                .close()
                .map_err(|e| EngineError::InvalidInput(format!("footer commit failed: {e}")))?;
        }
        Ok(())
    }

    /// Path this writer is writing to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ColumnarWriter {
    fn drop(&mut self) {
        if self.inner.is_some() {
            // Dropped without an explicit close: best-effort footer commit
            // so we don't leave an unreadable file behind on a clean
            // unwind. A panic mid-write can still leave a partial file;
            // the caller is responsible for deleting and retrying those.
            let _ = self.close_inner();
        }
    }
}

fn build_properties(config: &WriterConfig) -> WriterProperties {
    let mut builder = WriterProperties::builder()
        .set_compression(config.compression)
        .set_data_page_size_limit(config.page_size)
        .set_max_row_group_size(config.row_group_size)
        .set_statistics_enabled(EnabledStatistics::Chunk);

    builder = if config.dictionary_encoding {
        builder
            .set_dictionary_enabled(true)
            .set_encoding(Encoding::PLAIN)
    } else {
        builder.set_dictionary_enabled(false)
    };

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_batch;
    use tempfile::tempdir;
    use vstat_core::{Fact, Provenance};

    #[test]
    fn create_refuses_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("part-00000.parquet");
        let cfg = WriterConfig::default();
        let w = ColumnarWriter::create(&path, &cfg).unwrap();
        w.close().unwrap();
        assert!(ColumnarWriter::create(&path, &cfg).is_err());
    }

    #[test]
    fn write_then_close_produces_readable_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("part-00000.parquet");
        let cfg = WriterConfig::default();
        let mut w = ColumnarWriter::create(&path, &cfg).unwrap();
        let fact = Fact {
            id: "a".into(),
            identifier: "oai:a".into(),
            snapshot_id: 1,
            provenance: Provenance::default(),
            rule_id: 7,
            value: Some("x".into()),
            is_valid: true,
            record_is_valid: true,
            is_transformed: false,
        };
        let batch = encode_batch(&[fact]).unwrap();
        w.write_batch(&batch).unwrap();
        w.close().unwrap();
        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
