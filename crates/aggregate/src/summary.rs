//! Snapshot summary: a JSON sidecar written once per snapshot at finalise,
//! answering `stats(snapshot)` without re-running the aggregator.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;

use serde::{Deserialize, Serialize};
use vstat_core::{EngineError, Result};
use vstat_partition::PartitionLayout;

use crate::aggregator::AggregateResult;

/// `_SUMMARY.json` contents. Field order and names are bit-exact with the
/// external interface; `BTreeMap` keeps the rule-count objects in a
/// deterministic (sorted-by-key) order across writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub snapshot_id: i64,
    pub total_records: u64,
    pub valid_records: u64,
    pub transformed_records: u64,
    pub valid_rule_counts: BTreeMap<String, u64>,
    pub invalid_rule_counts: BTreeMap<String, u64>,
    pub partition_count: u64,
    pub total_fact_rows: u64,
}

impl SnapshotSummary {
    /// Build a summary from an unfiltered aggregation result plus the
    /// partition count, which the aggregator itself doesn't track.
    pub fn from_aggregate(snapshot_id: i64, result: &AggregateResult, partition_count: u64) -> Self {
        SnapshotSummary {
            snapshot_id,
            total_records: result.total_count,
            valid_records: result.valid_count,
            transformed_records: result.transformed_count,
            valid_rule_counts: result.valid_rule_counts.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            invalid_rule_counts: result.invalid_rule_counts.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            partition_count,
            total_fact_rows: result.total_fact_rows,
        }
    }

    /// An all-zero summary for a snapshot with no fact rows yet. Not written
    /// to disk at `initialise` — see `Engine::initialise` — but useful for
    /// callers that want a zero-valued placeholder value directly.
    pub fn empty(snapshot_id: i64) -> Self {
        SnapshotSummary {
            snapshot_id,
            total_records: 0,
            valid_records: 0,
            transformed_records: 0,
            valid_rule_counts: BTreeMap::new(),
            invalid_rule_counts: BTreeMap::new(),
            partition_count: 0,
            total_fact_rows: 0,
        }
    }
}

/// Write `summary` to its snapshot's sidecar path, replacing any prior copy.
pub fn write_summary(layout: &PartitionLayout, summary: &SnapshotSummary) -> Result<()> {
    let path = layout.summary_path(summary.snapshot_id);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
    }
    let file = File::create(&path).map_err(|e| EngineError::io(&path, e))?;
    serde_json::to_writer_pretty(BufWriter::new(file), summary)
        .map_err(|e| EngineError::InvalidInput(format!("summary serialisation failed: {e}")))
}

/// Read the summary for `snapshot_id`. Callers should treat any error here
/// (missing file, truncated JSON) as "fall back to live aggregation" rather
/// than propagate it.
pub fn read_summary(layout: &PartitionLayout, snapshot_id: i64) -> Result<SnapshotSummary> {
    let path = layout.summary_path(snapshot_id);
    let bytes = std::fs::read(&path).map_err(|e| EngineError::SummaryUnavailable {
        snapshot_id,
        cause: e.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| EngineError::SummaryUnavailable {
        snapshot_id,
        cause: e.to_string(),
    })
}

/// Delete the summary sidecar, if present. Used by `clean`/`delete`; a
/// missing file is not an error.
pub fn delete_summary(layout: &PartitionLayout, snapshot_id: i64) -> Result<()> {
    let path = layout.summary_path(snapshot_id);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EngineError::io(&path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_summary_is_unavailable_not_a_panic() {
        let dir = tempdir().unwrap();
        let layout = PartitionLayout::new(dir.path());
        let err = read_summary(&layout, 1).unwrap_err();
        assert!(matches!(err, EngineError::SummaryUnavailable { .. }));
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let layout = PartitionLayout::new(dir.path());
        let mut summary = SnapshotSummary::empty(1);
        summary.total_records = 3;
        summary.valid_rule_counts.insert("7".to_string(), 2);
        write_summary(&layout, &summary).unwrap();
        let read_back = read_summary(&layout, 1).unwrap();
        assert_eq!(read_back, summary);
    }

    #[test]
    fn delete_summary_is_idempotent() {
        let dir = tempdir().unwrap();
        let layout = PartitionLayout::new(dir.path());
        delete_summary(&layout, 1).unwrap();
        write_summary(&layout, &SnapshotSummary::empty(1)).unwrap();
        delete_summary(&layout, 1).unwrap();
        delete_summary(&layout, 1).unwrap();
        assert!(read_summary(&layout, 1).is_err());
    }
}
