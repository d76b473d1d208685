//! Dynamic file sizing: picks a per-file row threshold from the total
//! expected records for a snapshot, when known.

use dashmap::DashMap;

/// Per-snapshot expected-record-count registry, consulted by
/// [`threshold`]. Registering an estimate is optional; snapshots with no
/// estimate fall back to the configured fixed default.
#[derive(Default)]
pub struct SizeEstimates {
    estimates: DashMap<i64, u64>,
}

impl SizeEstimates {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or overwrite) the expected record count for a snapshot.
    pub fn register(&self, snapshot_id: i64, expected_records: u64) {
        self.estimates.insert(snapshot_id, expected_records);
    }

    /// Forget a snapshot's estimate (called on delete/clean).
    pub fn clear(&self, snapshot_id: i64) {
        self.estimates.remove(&snapshot_id);
    }

    /// The registered estimate, if any.
    pub fn get(&self, snapshot_id: i64) -> Option<u64> {
        self.estimates.get(&snapshot_id).map(|v| *v)
    }
}

/// Choose the per-file row threshold for a snapshot.
///
/// - `< 100,000` expected records → 50,000 rows/file
/// - `< 1,000,000` → 500,000
/// - `< 10,000,000` → 1,000,000
/// - otherwise → 2,000,000
///
/// If `enable_dynamic_sizing` is false, or no estimate was registered,
/// `fixed_default` is used instead.
pub fn threshold(expected_records: Option<u64>, enable_dynamic_sizing: bool, fixed_default: usize) -> usize {
    if !enable_dynamic_sizing {
        return fixed_default;
    }
    match expected_records {
        Some(n) if n < 100_000 => 50_000,
        Some(n) if n < 1_000_000 => 500_000,
        Some(n) if n < 10_000_000 => 1_000_000,
        Some(_) => 2_000_000,
        None => fixed_default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_match_spec() {
        assert_eq!(threshold(Some(1), true, 100_000), 50_000);
        assert_eq!(threshold(Some(99_999), true, 100_000), 50_000);
        assert_eq!(threshold(Some(100_000), true, 100_000), 500_000);
        assert_eq!(threshold(Some(999_999), true, 100_000), 500_000);
        assert_eq!(threshold(Some(1_000_000), true, 100_000), 1_000_000);
        assert_eq!(threshold(Some(9_999_999), true, 100_000), 1_000_000);
        assert_eq!(threshold(Some(10_000_000), true, 100_000), 2_000_000);
    }

    #[test]
    fn no_estimate_uses_fixed_default() {
        assert_eq!(threshold(None, true, 100_000), 100_000);
    }

    #[test]
    fn disabled_always_uses_fixed_default() {
        assert_eq!(threshold(Some(1), false, 77), 77);
    }

    #[test]
    fn registry_roundtrip() {
        let reg = SizeEstimates::new();
        assert_eq!(reg.get(1), None);
        reg.register(1, 200_000);
        assert_eq!(reg.get(1), Some(200_000));
        reg.clear(1);
        assert_eq!(reg.get(1), None);
    }
}
