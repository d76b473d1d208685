//! The top-level `Engine` facade: owns the partition layout, the buffered
//! writer, the index sidecar and the query surface, and drives the
//! per-snapshot lifecycle.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};
use vstat_aggregate::{
    aggregate, AggregateResult, Filter, QuerySurface, SnapshotSummary,
};
use vstat_columnar::Predicate;
use vstat_core::{EngineConfig, EngineError, Fact, RecordVerdict, Result};
use vstat_index::{IndexEntry, IndexSidecar, StatusFilter};
use vstat_ingest::{explode, BufferedMultiFileWriter, SizeEstimates};
use vstat_partition::PartitionLayout;

use crate::lifecycle::LifecycleController;

/// The engine. One instance owns one `base_path` tree; construct it once per
/// process (or per test) and share it behind an `Arc` if multiple callers
/// need it.
pub struct Engine {
    config: EngineConfig,
    layout: Arc<PartitionLayout>,
    lifecycle: LifecycleController,
    sizes: Arc<SizeEstimates>,
    writer: BufferedMultiFileWriter,
    index: IndexSidecar,
    query: QuerySurface,
}

impl Engine {
    /// Open (or create) an engine rooted at `config.base_path`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.base_path)
            .map_err(|e| EngineError::io(&config.base_path, e))?;
        let layout = Arc::new(PartitionLayout::new(&config.base_path));
        let sizes = Arc::new(SizeEstimates::new());
        let writer = BufferedMultiFileWriter::new(
            layout.clone(),
            sizes.clone(),
            config.records_per_file,
            config.enable_dynamic_sizing,
        );
        let index = IndexSidecar::new(layout.clone());
        let query = QuerySurface::new(layout.clone(), config.clone());

        Ok(Engine {
            config,
            layout,
            lifecycle: LifecycleController::new(),
            sizes,
            writer,
            index,
            query,
        })
    }

    /// Root directory this engine owns.
    pub fn base_path(&self) -> &Path {
        self.layout.base_path()
    }

    /// Register the expected record count for a snapshot, used to pick its
    /// dynamic file-size tier. Optional; snapshots with no estimate fall
    /// back to `records_per_file`.
    pub fn register_size_estimate(&self, snapshot_id: i64, expected_records: u64) {
        self.sizes.register(snapshot_id, expected_records);
    }

    /// Create the snapshot directory and zero its counters. Fails with
    /// [`EngineError::Busy`] if the snapshot is already open for writes.
    ///
    /// Deliberately does not persist a placeholder summary: `stats()` while
    /// `Open` must reflect whatever has already been flushed to disk, and a
    /// cached placeholder (or a stale summary left over from a prior
    /// finalise, on re-initialise) would shadow that. Only `finalise()`
    /// writes the authoritative `_SUMMARY.json`.
    pub fn initialise(&self, snapshot_id: i64) -> Result<()> {
        self.lifecycle.begin_initialise(snapshot_id)?;
        let dir = self.layout.snapshot_dir(snapshot_id);
        std::fs::create_dir_all(&dir).map_err(|e| EngineError::io(&dir, e))?;
        vstat_aggregate::delete_summary(&self.layout, snapshot_id)?;
        info!(snapshot_id, "snapshot initialised");
        Ok(())
    }

    /// Explode one upstream verdict into fact rows, enqueue them into the
    /// buffered writer, and record its index sidecar entry. Legal only while
    /// the snapshot is `Open`.
    ///
    /// If enqueuing any fact row triggers the main writer's threshold flush,
    /// the index sidecar is rewritten wholesale in step with it, so
    /// `load_index` reflects already-flushed records during `Open` rather
    /// than only after `finalise`.
    pub fn ingest(&self, verdict: &RecordVerdict) -> Result<()> {
        self.lifecycle.require_open(verdict.snapshot_id)?;

        let mut flushed = false;
        for fact in explode(verdict) {
            if self.writer.enqueue(fact)? {
                flushed = true;
            }
        }
        self.index.record(
            verdict.snapshot_id,
            IndexEntry {
                record_id: verdict.id.clone(),
                identifier: verdict.identifier.clone(),
                record_is_valid: verdict.record_is_valid,
                is_transformed: verdict.is_transformed,
                published_metadata_hash: None,
            },
        );
        if flushed {
            self.index.flush(verdict.snapshot_id)?;
        }
        Ok(())
    }

    /// Flush all buffers for this snapshot, regenerate its summary, and
    /// transition it to `Finalised`.
    pub fn finalise(&self, snapshot_id: i64) -> Result<()> {
        self.lifecycle.require_open(snapshot_id)?;
        self.writer.flush_snapshot(snapshot_id)?;
        self.index.flush(snapshot_id)?;

        let summary = self.regenerate_summary(snapshot_id)?;
        vstat_aggregate::write_summary(&self.layout, &summary)?;
        self.lifecycle.finalise(snapshot_id)?;
        debug!(snapshot_id, total_records = summary.total_records, "snapshot finalised");
        Ok(())
    }

    fn regenerate_summary(&self, snapshot_id: i64) -> Result<SnapshotSummary> {
        let result = aggregate(
            &self.layout,
            snapshot_id,
            Predicate::True,
            self.config.parallel_threshold,
            self.config.enable_parallel_processing,
        )?;
        let partition_count = self.layout.partition_dirs(snapshot_id)?.len() as u64;
        Ok(SnapshotSummary::from_aggregate(snapshot_id, &result, partition_count))
    }

    /// Flush, delete every file under the snapshot subtree, delete the
    /// summary, and invalidate every cache — but keep the subtree directory
    /// itself (unlike [`Self::delete`]).
    pub fn clean(&self, snapshot_id: i64) -> Result<()> {
        self.writer.flush_snapshot(snapshot_id)?;
        let dir = self.layout.snapshot_dir(snapshot_id);
        clear_dir_contents(&dir)?;
        vstat_aggregate::delete_summary(&self.layout, snapshot_id)?;
        self.layout.invalidate(snapshot_id);
        self.sizes.clear(snapshot_id);
        Ok(())
    }

    /// Same as [`Self::clean`], but also removes the snapshot's subtree
    /// directory and marks it `Deleted`.
    pub fn delete(&self, snapshot_id: i64) -> Result<()> {
        self.clean(snapshot_id)?;
        let dir = self.layout.snapshot_dir(snapshot_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| EngineError::io(&dir, e))?;
        }
        self.layout.invalidate(snapshot_id);
        self.lifecycle.mark_deleted(snapshot_id);
        Ok(())
    }

    /// Snapshot summary: fast path from the sidecar, or a live aggregation
    /// if it's missing or unreadable.
    pub fn stats(&self, snapshot_id: i64) -> Result<SnapshotSummary> {
        self.lifecycle.require_readable(snapshot_id)?;
        self.query.stats(snapshot_id)
    }

    /// Filtered aggregation; never persisted to disk.
    pub fn stats_filtered(&self, snapshot_id: i64, filter: &Filter) -> Result<AggregateResult> {
        self.lifecycle.require_readable(snapshot_id)?;
        self.query.stats_filtered(snapshot_id, filter)
    }

    /// Sum of matching fact rows across every partition file, TTL-cached.
    pub fn count(&self, snapshot_id: i64, filter: &Filter) -> Result<usize> {
        self.lifecycle.require_readable(snapshot_id)?;
        self.query.count(snapshot_id, filter)
    }

    /// One deterministic page of facts.
    pub fn paginate(&self, snapshot_id: i64, filter: &Filter, page: usize, size: usize) -> Result<Vec<Fact>> {
        self.lifecycle.require_readable(snapshot_id)?;
        self.query.paginate(snapshot_id, filter, page, size)
    }

    /// Occurrence-value histogram for one `(rule_id, valid)` pair.
    pub fn rule_occurrences(
        &self,
        snapshot_id: i64,
        rule_id: i32,
        valid: bool,
        filter: Option<&Filter>,
    ) -> Result<HashMap<String, u64>> {
        self.lifecycle.require_readable(snapshot_id)?;
        self.query.rule_occurrences(snapshot_id, rule_id, valid, filter)
    }

    /// Load the lightweight index sidecar for a snapshot.
    pub fn load_index(&self, snapshot_id: i64, status_filter: StatusFilter) -> Result<Vec<IndexEntry>> {
        self.lifecycle.require_readable(snapshot_id)?;
        self.index.load_index(snapshot_id, status_filter)
    }

    /// Deliberately unimplemented: see the lifecycle open questions.
    pub fn copy_snapshot(&self, _from: i64, _to: i64) -> Result<()> {
        Err(EngineError::Unsupported("copy_snapshot"))
    }

    /// Deliberately unimplemented: see the lifecycle open questions.
    pub fn delete_by_id(&self, _snapshot_id: i64, _record_id: &str) -> Result<()> {
        Err(EngineError::Unsupported("delete_by_id"))
    }

    /// Flush every still-open snapshot's buffers. Also invoked from `Drop`
    /// as a best-effort safety net; calling it explicitly lets the caller
    /// observe and handle a flush failure before the engine is dropped.
    pub fn shutdown(self) -> Result<()> {
        self.writer.flush_all()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush_all() {
            warn!(error = %e, "best-effort flush on drop failed; some buffered facts may be lost");
        }
    }
}

fn clear_dir_contents(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir).map_err(|e| EngineError::io(dir, e))? {
        let entry = entry.map_err(|e| EngineError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path).map_err(|e| EngineError::io(&path, e))?;
        } else {
            std::fs::remove_file(&path).map_err(|e| EngineError::io(&path, e))?;
        }
    }
    Ok(())
}
