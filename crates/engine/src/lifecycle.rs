//! Per-snapshot lifecycle state machine: `Absent -> Open -> Finalised ->
//! Deleted`. Writes are legal only in `Open`; reads are legal in `Open`
//! (against already-flushed files) and in `Finalised`.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use vstat_core::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotState {
    Absent,
    Open,
    Finalised,
    Deleted,
}

/// Tracks every snapshot's lifecycle state in one concurrent map. A snapshot
/// missing from the map is `Absent`.
#[derive(Default)]
pub struct LifecycleController {
    states: DashMap<i64, SnapshotState>,
}

impl LifecycleController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state; `Absent` if the snapshot was never initialised.
    pub fn state(&self, snapshot_id: i64) -> SnapshotState {
        self.states
            .get(&snapshot_id)
            .map(|s| *s)
            .unwrap_or(SnapshotState::Absent)
    }

    /// Transition a snapshot to `Open`. Fails with [`EngineError::Busy`] if
    /// it is already open for writes by another caller.
    pub fn begin_initialise(&self, snapshot_id: i64) -> Result<()> {
        match self.states.entry(snapshot_id) {
            Entry::Occupied(e) if *e.get() == SnapshotState::Open => {
                Err(EngineError::Busy(snapshot_id))
            }
            Entry::Occupied(mut e) => {
                e.insert(SnapshotState::Open);
                Ok(())
            }
            Entry::Vacant(e) => {
                e.insert(SnapshotState::Open);
                Ok(())
            }
        }
    }

    /// Fail unless `snapshot_id` is currently `Open`.
    pub fn require_open(&self, snapshot_id: i64) -> Result<()> {
        if self.state(snapshot_id) == SnapshotState::Open {
            Ok(())
        } else {
            Err(EngineError::InvalidState {
                snapshot_id,
                reason: format!("expected Open, found {:?}", self.state(snapshot_id)),
            })
        }
    }

    /// Fail unless reads are legal: `Open` (on already-flushed files) or
    /// `Finalised`.
    pub fn require_readable(&self, snapshot_id: i64) -> Result<()> {
        match self.state(snapshot_id) {
            SnapshotState::Open | SnapshotState::Finalised => Ok(()),
            other => Err(EngineError::InvalidState {
                snapshot_id,
                reason: format!("not readable in state {other:?}"),
            }),
        }
    }

    /// Transition `Open -> Finalised`.
    pub fn finalise(&self, snapshot_id: i64) -> Result<()> {
        self.require_open(snapshot_id)?;
        self.states.insert(snapshot_id, SnapshotState::Finalised);
        Ok(())
    }

    /// Force the state to `Deleted`, regardless of the current state.
    pub fn mark_deleted(&self, snapshot_id: i64) {
        self.states.insert(snapshot_id, SnapshotState::Deleted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_until_initialised() {
        let lifecycle = LifecycleController::new();
        assert_eq!(lifecycle.state(1), SnapshotState::Absent);
    }

    #[test]
    fn second_concurrent_initialise_is_busy() {
        let lifecycle = LifecycleController::new();
        lifecycle.begin_initialise(1).unwrap();
        let err = lifecycle.begin_initialise(1).unwrap_err();
        assert!(matches!(err, EngineError::Busy(1)));
    }

    #[test]
    fn reads_legal_in_open_and_finalised_only() {
        let lifecycle = LifecycleController::new();
        assert!(lifecycle.require_readable(1).is_err());
        lifecycle.begin_initialise(1).unwrap();
        assert!(lifecycle.require_readable(1).is_ok());
        lifecycle.finalise(1).unwrap();
        assert!(lifecycle.require_readable(1).is_ok());
        lifecycle.mark_deleted(1);
        assert!(lifecycle.require_readable(1).is_err());
    }

    #[test]
    fn reinitialise_after_finalise_reopens() {
        let lifecycle = LifecycleController::new();
        lifecycle.begin_initialise(1).unwrap();
        lifecycle.finalise(1).unwrap();
        lifecycle.begin_initialise(1).unwrap();
        assert_eq!(lifecycle.state(1), SnapshotState::Open);
    }
}
