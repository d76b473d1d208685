//! Buffered multi-file writer: accumulates facts per partition key and
//! flushes to a new `part-NNNNN` file once the dynamic-sizing threshold is
//! reached.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use vstat_columnar::{encode_batch, ColumnarWriter, WriterConfig};
use vstat_core::{Fact, PartitionKey, Result};
use vstat_partition::PartitionLayout;

use crate::sizing::{self, SizeEstimates};

struct PartitionBuffer {
    buffer: Vec<Fact>,
    file_counter: u32,
}

/// Accumulates fact rows per `(snapshot_id, network, is_valid)` partition
/// key and flushes each partition's buffer to a new `part-NNNNN` file once
/// it reaches the dynamic threshold for that snapshot.
///
/// Partition buffers and file counters are guarded by one mutex per
/// partition; [`Self::flush_all`] holds each partition's mutex only while
/// flushing that partition, never all of them at once.
pub struct BufferedMultiFileWriter {
    layout: Arc<PartitionLayout>,
    buffers: DashMap<PartitionKey, Mutex<PartitionBuffer>>,
    sizes: Arc<SizeEstimates>,
    records_per_file: usize,
    enable_dynamic_sizing: bool,
    writer_config: WriterConfig,
}

impl BufferedMultiFileWriter {
    /// Build a writer over `layout`, using `sizes` to resolve the dynamic
    /// threshold for each snapshot.
    pub fn new(
        layout: Arc<PartitionLayout>,
        sizes: Arc<SizeEstimates>,
        records_per_file: usize,
        enable_dynamic_sizing: bool,
    ) -> Self {
        BufferedMultiFileWriter {
            layout,
            buffers: DashMap::new(),
            sizes,
            records_per_file,
            enable_dynamic_sizing,
            writer_config: WriterConfig::default(),
        }
    }

    /// Append `fact` to its partition's buffer, flushing that partition if
    /// the buffer has reached the snapshot's dynamic threshold. Returns
    /// whether this call triggered a flush, so callers that keep a sidecar
    /// in step with the main writer (see `Engine::ingest`) know when to
    /// rewrite it.
    pub fn enqueue(&self, fact: Fact) -> Result<bool> {
        let key = fact.partition_key();
        self.with_buffer(&key, |buf| {
            buf.buffer.push(fact);
            let threshold = self.threshold_for(key.snapshot_id);
            if buf.buffer.len() >= threshold {
                self.flush_locked(&key, buf)?;
                Ok(true)
            } else {
                Ok(false)
            }
        })
    }

    /// Flush one partition's buffer, if non-empty.
    pub fn flush(&self, key: &PartitionKey) -> Result<()> {
        self.with_buffer(key, |buf| self.flush_locked(key, buf))
    }

    /// Flush every non-empty buffer across every partition this writer has
    /// touched. Used on finalise and on shutdown.
    pub fn flush_all(&self) -> Result<()> {
        let keys: Vec<PartitionKey> = self.buffers.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.flush(&key)?;
        }
        Ok(())
    }

    /// Flush every partition belonging to one snapshot (used so a partial
    /// `flush_all` failure elsewhere doesn't force flushing unrelated
    /// snapshots).
    pub fn flush_snapshot(&self, snapshot_id: i64) -> Result<()> {
        let keys: Vec<PartitionKey> = self
            .buffers
            .iter()
            .filter(|e| e.key().snapshot_id == snapshot_id)
            .map(|e| e.key().clone())
            .collect();
        for key in keys {
            self.flush(&key)?;
        }
        Ok(())
    }

    fn threshold_for(&self, snapshot_id: i64) -> usize {
        sizing::threshold(
            self.sizes.get(snapshot_id),
            self.enable_dynamic_sizing,
            self.records_per_file,
        )
    }

    fn with_buffer<T>(
        &self,
        key: &PartitionKey,
        f: impl FnOnce(&mut PartitionBuffer) -> Result<T>,
    ) -> Result<T> {
        if !self.buffers.contains_key(key) {
            let initial_counter = self.initial_counter(key)?;
            self.buffers.entry(key.clone()).or_insert_with(|| {
                Mutex::new(PartitionBuffer {
                    buffer: Vec::new(),
                    file_counter: initial_counter,
                })
            });
        }
        let entry = self.buffers.get(key).expect("just inserted");
        let mut guard = entry.lock();
        f(&mut guard)
    }

    fn initial_counter(&self, key: &PartitionKey) -> Result<u32> {
        let dir = self.layout.partition_dir(key);
        Ok(self.layout.part_files_in(&dir)?.len() as u32)
    }

    fn flush_locked(&self, key: &PartitionKey, buf: &mut PartitionBuffer) -> Result<()> {
        if buf.buffer.is_empty() {
            return Ok(());
        }
        let path = self.layout.part_file_path(key, buf.file_counter);
        debug!(?path, rows = buf.buffer.len(), "flushing partition buffer");

        let batch = encode_batch(&buf.buffer)?;
        let mut writer = ColumnarWriter::create(&path, &self.writer_config)?;
        if let Err(e) = writer.write_batch(&batch) {
            // Partial file: delete so a retry doesn't find a half-written
            // part file sitting at this counter.
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }
        if let Err(e) = writer.close() {
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }

        buf.file_counter += 1;
        buf.buffer.clear();
        self.layout.invalidate(key.snapshot_id);
        Ok(())
    }

    /// Number of facts currently buffered (not yet durable) for `key`.
    /// Intended for tests and diagnostics.
    pub fn pending_count(&self, key: &PartitionKey) -> usize {
        self.buffers
            .get(key)
            .map(|e| e.lock().buffer.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use vstat_core::Provenance;

    fn fact(id: &str, snapshot_id: i64) -> Fact {
        Fact {
            id: id.to_string(),
            identifier: format!("oai:{id}"),
            snapshot_id,
            provenance: Provenance {
                network: Some("NET".to_string()),
                ..Default::default()
            },
            rule_id: 7,
            value: Some("x".to_string()),
            is_valid: true,
            record_is_valid: true,
            is_transformed: false,
        }
    }

    #[test]
    fn flushes_when_threshold_reached() {
        let dir = tempdir().unwrap();
        let layout = Arc::new(PartitionLayout::new(dir.path()));
        let sizes = Arc::new(SizeEstimates::new());
        let writer = BufferedMultiFileWriter::new(layout.clone(), sizes, 2, false);

        let key = PartitionKey {
            snapshot_id: 1,
            network: "NET".to_string(),
            is_valid: true,
        };

        writer.enqueue(fact("a", 1)).unwrap();
        assert_eq!(writer.pending_count(&key), 1);
        writer.enqueue(fact("b", 1)).unwrap();
        // threshold of 2 reached: buffer flushed and cleared
        assert_eq!(writer.pending_count(&key), 0);

        let files = layout.part_files_in(&layout.partition_dir(&key)).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("part-00000.parquet"));
    }

    #[test]
    fn flush_all_covers_every_partition() {
        let dir = tempdir().unwrap();
        let layout = Arc::new(PartitionLayout::new(dir.path()));
        let sizes = Arc::new(SizeEstimates::new());
        let writer = BufferedMultiFileWriter::new(layout.clone(), sizes, 1_000, false);

        writer.enqueue(fact("a", 1)).unwrap();
        let mut other = fact("b", 1);
        other.is_valid = false;
        writer.enqueue(other).unwrap();

        writer.flush_all().unwrap();

        let valid_key = PartitionKey {
            snapshot_id: 1,
            network: "NET".to_string(),
            is_valid: true,
        };
        let invalid_key = PartitionKey {
            snapshot_id: 1,
            network: "NET".to_string(),
            is_valid: false,
        };
        assert_eq!(
            layout
                .part_files_in(&layout.partition_dir(&valid_key))
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            layout
                .part_files_in(&layout.partition_dir(&invalid_key))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn file_counter_resumes_from_disk() {
        let dir = tempdir().unwrap();
        let layout = Arc::new(PartitionLayout::new(dir.path()));
        let sizes = Arc::new(SizeEstimates::new());
        let key = PartitionKey {
            snapshot_id: 1,
            network: "NET".to_string(),
            is_valid: true,
        };
        std::fs::create_dir_all(layout.partition_dir(&key)).unwrap();
        std::fs::write(layout.partition_dir(&key).join("part-00000.parquet"), b"x").unwrap();

        let writer = BufferedMultiFileWriter::new(layout.clone(), sizes, 1, false);
        writer.enqueue(fact("a", 1)).unwrap();
        let files = layout.part_files_in(&layout.partition_dir(&key)).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[1].ends_with("part-00001.parquet"));
    }
}
