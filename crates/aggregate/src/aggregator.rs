//! The aggregator: folds every partition file for a snapshot into unique-id
//! counts and per-rule counts, in parallel when the file count clears
//! `parallel_threshold`.
//!
//! All counts are counts of **unique records** (by `id`), never of fact
//! rows: a record with ten occurrences of the same rule still counts once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;
use vstat_columnar::{AggregateRow, ColumnarReader, Predicate, ReaderConfig};
use vstat_core::Result;
use vstat_partition::PartitionLayout;

const EXPECTED_RECORDS: usize = 50_000;
const EXPECTED_RULES: usize = 200;

/// A file that failed to read during aggregation. Aggregation continues past
/// these; they are surfaced rather than silently swallowed.
#[derive(Debug, Clone)]
pub struct AggregateFileError {
    pub file: PathBuf,
    pub cause: String,
}

/// Result of one aggregation run.
#[derive(Debug, Clone, Default)]
pub struct AggregateResult {
    pub total_count: u64,
    pub valid_count: u64,
    pub transformed_count: u64,
    pub valid_rule_counts: FxHashMap<String, u64>,
    pub invalid_rule_counts: FxHashMap<String, u64>,
    /// Total fact rows scanned (not unique records); used by the summary's
    /// `total_fact_rows` field.
    pub total_fact_rows: u64,
    pub errors: Vec<AggregateFileError>,
}

/// Process-wide interning pool for rule-id strings, keyed by the integer
/// rule id so the aggregator's hot loop never allocates a fresh `String` for
/// a rule it has already seen.
static RULE_ID_POOL: Lazy<DashMap<i32, Arc<str>>> = Lazy::new(DashMap::new);

fn intern_rule_id(rule_id: i32) -> Arc<str> {
    if let Some(existing) = RULE_ID_POOL.get(&rule_id) {
        return existing.clone();
    }
    let interned: Arc<str> = Arc::from(rule_id.to_string());
    RULE_ID_POOL.insert(rule_id, interned.clone());
    interned
}

/// Per-file (or per-worker) accumulator, merged sequentially after the
/// parallel fold completes.
struct PartialState {
    unique_ids: FxHashSet<String>,
    valid_ids: FxHashSet<String>,
    transformed_ids: FxHashSet<String>,
    valid_rule_sets: FxHashMap<Arc<str>, FxHashSet<String>>,
    invalid_rule_sets: FxHashMap<Arc<str>, FxHashSet<String>>,
    row_count: u64,
    error: Option<AggregateFileError>,
}

impl PartialState {
    fn empty() -> Self {
        PartialState {
            unique_ids: FxHashSet::with_capacity_and_hasher(EXPECTED_RECORDS, Default::default()),
            valid_ids: FxHashSet::with_capacity_and_hasher(EXPECTED_RECORDS, Default::default()),
            transformed_ids: FxHashSet::with_capacity_and_hasher(EXPECTED_RECORDS, Default::default()),
            valid_rule_sets: FxHashMap::with_capacity_and_hasher(EXPECTED_RULES, Default::default()),
            invalid_rule_sets: FxHashMap::with_capacity_and_hasher(EXPECTED_RULES, Default::default()),
            row_count: 0,
            error: None,
        }
    }

    fn absorb(&mut self, row: AggregateRow) {
        self.row_count += 1;
        self.unique_ids.insert(row.id.clone());
        if row.record_is_valid {
            self.valid_ids.insert(row.id.clone());
        }
        if row.is_transformed {
            self.transformed_ids.insert(row.id.clone());
        }
        let rule = intern_rule_id(row.rule_id);
        let target = if row.is_valid {
            &mut self.valid_rule_sets
        } else {
            &mut self.invalid_rule_sets
        };
        target.entry(rule).or_default().insert(row.id);
    }
}

/// Folds every partition file belonging to `snapshot_id` surviving
/// `predicate` into one [`AggregateResult`].
pub fn aggregate(
    layout: &PartitionLayout,
    snapshot_id: i64,
    predicate: Predicate,
    parallel_threshold: usize,
    enable_parallel_processing: bool,
) -> Result<AggregateResult> {
    let files = layout.fact_files(snapshot_id)?;
    if files.is_empty() {
        return Ok(AggregateResult::default());
    }

    let use_parallel = enable_parallel_processing && files.len() >= parallel_threshold;
    let partials: Vec<PartialState> = if use_parallel {
        files
            .par_iter()
            .map(|f| scan_file(f, &predicate))
            .collect()
    } else {
        files.iter().map(|f| scan_file(f, &predicate)).collect()
    };

    Ok(merge(partials))
}

fn scan_file(path: &Path, predicate: &Predicate) -> PartialState {
    let mut state = PartialState::empty();
    let reader = ColumnarReader::new(path, ReaderConfig::default(), predicate.clone());
    if let Err(e) = reader.aggregate(|row| state.absorb(row)) {
        warn!(file = %path.display(), error = %e, "skipping unreadable partition file during aggregation");
        state.error = Some(AggregateFileError {
            file: path.to_path_buf(),
            cause: e.to_string(),
        });
    }
    state
}

fn merge(partials: Vec<PartialState>) -> AggregateResult {
    let mut unique_ids: FxHashSet<String> =
        FxHashSet::with_capacity_and_hasher(EXPECTED_RECORDS, Default::default());
    let mut valid_ids: FxHashSet<String> =
        FxHashSet::with_capacity_and_hasher(EXPECTED_RECORDS, Default::default());
    let mut transformed_ids: FxHashSet<String> =
        FxHashSet::with_capacity_and_hasher(EXPECTED_RECORDS, Default::default());
    let mut valid_rule_sets: FxHashMap<Arc<str>, FxHashSet<String>> =
        FxHashMap::with_capacity_and_hasher(EXPECTED_RULES, Default::default());
    let mut invalid_rule_sets: FxHashMap<Arc<str>, FxHashSet<String>> =
        FxHashMap::with_capacity_and_hasher(EXPECTED_RULES, Default::default());
    let mut row_count = 0u64;
    let mut errors = Vec::new();

    for partial in partials {
        row_count += partial.row_count;
        unique_ids.extend(partial.unique_ids);
        valid_ids.extend(partial.valid_ids);
        transformed_ids.extend(partial.transformed_ids);
        for (rule, ids) in partial.valid_rule_sets {
            valid_rule_sets.entry(rule).or_default().extend(ids);
        }
        for (rule, ids) in partial.invalid_rule_sets {
            invalid_rule_sets.entry(rule).or_default().extend(ids);
        }
        if let Some(e) = partial.error {
            errors.push(e);
        }
    }

    AggregateResult {
        total_count: unique_ids.len() as u64,
        valid_count: valid_ids.len() as u64,
        transformed_count: transformed_ids.len() as u64,
        valid_rule_counts: valid_rule_sets
            .into_iter()
            .map(|(rule, ids)| (rule.to_string(), ids.len() as u64))
            .collect(),
        invalid_rule_counts: invalid_rule_sets
            .into_iter()
            .map(|(rule, ids)| (rule.to_string(), ids.len() as u64))
            .collect(),
        total_fact_rows: row_count,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use vstat_columnar::{encode_batch, ColumnarWriter, WriterConfig};
    use vstat_core::{Fact, PartitionKey, Provenance};

    fn write_facts(layout: &PartitionLayout, snapshot_id: i64, facts: &[Fact]) {
        let mut by_partition: FxHashMap<PartitionKey, Vec<Fact>> = FxHashMap::default();
        for fact in facts {
            by_partition.entry(fact.partition_key()).or_default().push(fact.clone());
        }
        for (key, rows) in by_partition {
            std::fs::create_dir_all(layout.partition_dir(&key)).unwrap();
            let path = layout.part_file_path(&key, 0);
            let batch = encode_batch(&rows).unwrap();
            let mut writer = ColumnarWriter::create(&path, &WriterConfig::default()).unwrap();
            writer.write_batch(&batch).unwrap();
            writer.close().unwrap();
        }
        layout.invalidate(snapshot_id);
    }

    fn sample_fact(id: &str, rule_id: i32, is_valid: bool, record_is_valid: bool) -> Fact {
        Fact {
            id: id.to_string(),
            identifier: format!("oai:{id}"),
            snapshot_id: 1,
            provenance: Provenance {
                network: Some("NET".into()),
                ..Default::default()
            },
            rule_id,
            value: Some("x".into()),
            is_valid,
            record_is_valid,
            is_transformed: false,
        }
    }

    #[test]
    fn empty_snapshot_yields_all_zeros() {
        let dir = tempdir().unwrap();
        let layout = PartitionLayout::new(dir.path());
        let result = aggregate(&layout, 1, Predicate::True, 5, false).unwrap();
        assert_eq!(result.total_count, 0);
        assert_eq!(result.valid_count, 0);
        assert!(result.valid_rule_counts.is_empty());
    }

    #[test]
    fn counts_unique_records_not_rows() {
        let dir = tempdir().unwrap();
        let layout = PartitionLayout::new(dir.path());
        // Two rows for record "a" under rule 7, both valid: still one id.
        let facts = vec![
            sample_fact("a", 7, true, true),
            sample_fact("a", 7, true, true),
            sample_fact("b", 7, false, false),
        ];
        write_facts(&layout, 1, &facts);
        let result = aggregate(&layout, 1, Predicate::True, 5, false).unwrap();
        assert_eq!(result.total_count, 2);
        assert_eq!(result.valid_count, 1);
        assert_eq!(result.valid_rule_counts.get("7"), Some(&1));
        assert_eq!(result.invalid_rule_counts.get("7"), Some(&1));
    }

    #[test]
    fn parallel_and_sequential_folds_agree() {
        let dir = tempdir().unwrap();
        let layout = PartitionLayout::new(dir.path());
        let facts = vec![
            sample_fact("a", 1, true, true),
            sample_fact("b", 2, false, false),
        ];
        write_facts(&layout, 1, &facts);
        let sequential = aggregate(&layout, 1, Predicate::True, 1000, false).unwrap();
        let parallel = aggregate(&layout, 1, Predicate::True, 1, true).unwrap();
        assert_eq!(sequential.total_count, parallel.total_count);
        assert_eq!(sequential.valid_count, parallel.valid_count);
        assert_eq!(sequential.valid_rule_counts, parallel.valid_rule_counts);
    }
}
