//! The canonical fact row and record verdict schema.
//!
//! A single per-record validation outcome produced upstream is an
//! [`RecordVerdict`]; it is exploded into many [`Fact`] rows, one per
//! `(rule_id, value)` pair, before being written to the columnar store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Denormalised provenance columns carried on every fact row belonging to
/// the same record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Provenance {
    /// Harvest origin (endpoint base URL or similar).
    pub origin: Option<String>,
    /// Network the record was harvested through. Defaults to `"UNKNOWN"`
    /// when absent, per the explosion stage.
    pub network: Option<String>,
    /// Source repository identifier.
    pub repository: Option<String>,
    /// Owning institution.
    pub institution: Option<String>,
    /// OAI-PMH (or equivalent) metadata prefix.
    pub metadata_prefix: Option<String>,
    /// OAI-PMH (or equivalent) set specification.
    pub set_spec: Option<String>,
}

/// One `(record, rule, value)` triple as stored in the columnar fact table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    /// Stable hash of the record; groups fact rows of the same record.
    pub id: String,
    /// The record's external (harvest-protocol) identifier.
    pub identifier: String,
    /// Validation run this fact belongs to.
    pub snapshot_id: i64,
    /// Denormalised provenance.
    pub provenance: Provenance,
    /// Rule that produced this occurrence.
    pub rule_id: i32,
    /// Normalised occurrence value (trimmed, whitespace-collapsed).
    pub value: Option<String>,
    /// Verdict for this occurrence under this rule.
    pub is_valid: bool,
    /// Verdict for the whole record (redundant across all of its rows).
    pub record_is_valid: bool,
    /// Whether the record underwent a content transformation.
    pub is_transformed: bool,
}

impl Fact {
    /// Partition key this fact row belongs to.
    pub fn partition_key(&self) -> crate::PartitionKey {
        crate::PartitionKey {
            snapshot_id: self.snapshot_id,
            network: self
                .provenance
                .network
                .clone()
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            is_valid: self.is_valid,
        }
    }
}

/// Upstream input to the explosion stage: one record's validation verdict
/// together with the per-rule occurrence lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordVerdict {
    /// Stable hash of the record.
    pub id: String,
    /// The record's external identifier.
    pub identifier: String,
    /// Validation run this verdict belongs to.
    pub snapshot_id: i64,
    /// Denormalised provenance for the whole record.
    pub provenance: Provenance,
    /// Verdict for the whole record.
    pub record_is_valid: bool,
    /// Whether the record underwent a content transformation.
    pub is_transformed: bool,
    /// Values that matched each rule and were judged valid.
    pub valid_occurrences: BTreeMap<String, Vec<String>>,
    /// Values that matched each rule and were judged invalid.
    pub invalid_occurrences: BTreeMap<String, Vec<String>>,
}

/// Normalise an occurrence value: trim leading/trailing whitespace and
/// collapse runs of internal whitespace to a single space. Case is
/// preserved. Returns `None` for values that normalise to empty.
pub fn normalize_value(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Identifies a partition leaf directory: `(snapshot_id, network, is_valid)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    /// Validation run.
    pub snapshot_id: i64,
    /// Harvest network.
    pub network: String,
    /// Per-occurrence validity (the fact table's `is_valid` column).
    pub is_valid: bool,
}

impl PartitionKey {
    /// Relative path of this partition's leaf directory under
    /// `<base>/snapshot_id=<N>/`.
    pub fn relative_dir(&self) -> String {
        format!(
            "network={}/is_valid={}",
            self.network,
            if self.is_valid { "true" } else { "false" }
        )
    }
}
