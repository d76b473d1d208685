//! The unified query surface: `stats`, `stats_filtered`, `count`,
//! `paginate`, and `rule_occurrences`, all built on the aggregator, the
//! filter translator and the summary sidecar.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::warn;
use vstat_columnar::{schema::columns, ColumnValue, ColumnarReader, Predicate, ReaderConfig};
use vstat_core::{EngineConfig, Fact, Result};
use vstat_partition::PartitionLayout;

use crate::aggregator::{aggregate, AggregateResult};
use crate::filter::{build_predicate, Filter};
use crate::summary::{self, SnapshotSummary};

struct CachedCount {
    value: usize,
    inserted_at: Instant,
}

/// Owns the count cache and ties the aggregator, filter translator and
/// summary sidecar together into the five query operations.
pub struct QuerySurface {
    layout: Arc<PartitionLayout>,
    config: EngineConfig,
    count_cache: DashMap<(i64, u64), CachedCount>,
}

impl QuerySurface {
    pub fn new(layout: Arc<PartitionLayout>, config: EngineConfig) -> Self {
        QuerySurface {
            layout,
            config,
            count_cache: DashMap::new(),
        }
    }

    /// Fast-path stats: read the summary if present; otherwise run a full
    /// aggregation over whatever is already on disk and return it.
    ///
    /// The live-aggregation branch deliberately does not persist its result.
    /// `_SUMMARY.json` only exists once a snapshot has been finalised (see
    /// `Engine::finalise`), so its mere presence already means it is
    /// authoritative; caching an ad-hoc result here would instead let a
    /// snapshot still `Open` for writes get stuck serving a stale summary
    /// through every later flush until the next finalise.
    pub fn stats(&self, snapshot_id: i64) -> Result<SnapshotSummary> {
        match summary::read_summary(&self.layout, snapshot_id) {
            Ok(summary) => Ok(summary),
            Err(_) => {
                let result = self.run_aggregate(snapshot_id, Predicate::True)?;
                let partition_count = self.layout.partition_dirs(snapshot_id)?.len() as u64;
                Ok(SnapshotSummary::from_aggregate(snapshot_id, &result, partition_count))
            }
        }
    }

    /// Filtered aggregation. Never written to the summary sidecar — the
    /// filter space is open-ended.
    pub fn stats_filtered(&self, snapshot_id: i64, filter: &Filter) -> Result<AggregateResult> {
        self.run_aggregate(snapshot_id, build_predicate(filter))
    }

    fn run_aggregate(&self, snapshot_id: i64, predicate: Predicate) -> Result<AggregateResult> {
        aggregate(
            &self.layout,
            snapshot_id,
            predicate,
            self.config.parallel_threshold,
            self.config.enable_parallel_processing,
        )
    }

    /// Sum of `reader.count()` across every partition file, memoised for
    /// `count_cache_ttl`.
    pub fn count(&self, snapshot_id: i64, filter: &Filter) -> Result<usize> {
        let key = (snapshot_id, filter_hash(filter));
        if let Some(cached) = self.count_cache.get(&key) {
            if cached.inserted_at.elapsed() < self.config.count_cache_ttl {
                return Ok(cached.value);
            }
        }

        let predicate = build_predicate(filter);
        let files = self.layout.fact_files(snapshot_id)?;
        let (total, successes, last_err) = files.iter().fold(
            (0usize, 0usize, None),
            |(total, successes, last_err), file| {
                let reader = ColumnarReader::new(file, ReaderConfig::default(), predicate.clone());
                match reader.count() {
                    Ok(n) => (total + n, successes + 1, last_err),
                    Err(e) => {
                        warn!(file = %file.display(), error = %e, "skipping unreadable file in count()");
                        (total, successes, Some(e))
                    }
                }
            },
        );
        if successes == 0 {
            if let Some(e) = last_err {
                return Err(e);
            }
        }

        self.count_cache.insert(
            key,
            CachedCount {
                value: total,
                inserted_at: Instant::now(),
            },
        );
        Ok(total)
    }

    /// Deterministic page of facts: files sorted by path, skip/limit carried
    /// across file boundaries, stopping as soon as `size` rows are collected.
    pub fn paginate(&self, snapshot_id: i64, filter: &Filter, page: usize, size: usize) -> Result<Vec<Fact>> {
        let predicate = build_predicate(filter);
        let files = self.layout.fact_files(snapshot_id)?;
        let mut offset = page.saturating_mul(size);
        let mut results = Vec::new();
        let mut successes = 0usize;
        let mut last_err = None;

        for file in &files {
            if results.len() >= size {
                break;
            }
            let reader = ColumnarReader::new(file, ReaderConfig::default(), predicate.clone());
            match reader.read_with_skip(offset, size - results.len()) {
                Ok((facts, remaining)) => {
                    successes += 1;
                    offset = remaining;
                    results.extend(facts);
                }
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "skipping unreadable file in paginate()");
                    last_err = Some(e);
                }
            }
        }
        if successes == 0 && !files.is_empty() {
            if let Some(e) = last_err {
                return Err(e);
            }
        }
        Ok(results)
    }

    /// Histogram of occurrence values for one `(rule_id, valid)` pair,
    /// narrowed further by an optional caller filter.
    pub fn rule_occurrences(
        &self,
        snapshot_id: i64,
        rule_id: i32,
        valid: bool,
        filter: Option<&Filter>,
    ) -> Result<HashMap<String, u64>> {
        let mut predicate = Predicate::eq(columns::SNAPSHOT_ID, ColumnValue::Int64(snapshot_id))
            .and(Predicate::eq(columns::RULE_ID, ColumnValue::Int32(rule_id)))
            .and(Predicate::eq(columns::IS_VALID, ColumnValue::Bool(valid)));
        if let Some(filter) = filter {
            predicate = predicate.and(build_predicate(filter));
        }

        let files = self.layout.fact_files(snapshot_id)?;
        let mut histogram = HashMap::new();
        let mut successes = 0usize;
        let mut last_err = None;
        for file in &files {
            let reader = ColumnarReader::new(file, ReaderConfig::default(), predicate.clone());
            match reader.stream(|fact| {
                if let Some(value) = fact.value {
                    *histogram.entry(value).or_insert(0u64) += 1;
                }
            }) {
                Ok(()) => successes += 1,
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "skipping unreadable file in rule_occurrences()");
                    last_err = Some(e);
                }
            }
        }
        if successes == 0 && !files.is_empty() {
            if let Some(e) = last_err {
                return Err(e);
            }
        }
        Ok(histogram)
    }
}

fn filter_hash(filter: &Filter) -> u64 {
    let mut hasher = DefaultHasher::new();
    filter.hash(&mut hasher);
    hasher.finish()
}
