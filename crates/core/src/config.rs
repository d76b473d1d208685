//! Engine configuration.
//!
//! Controls on-disk layout, dynamic file sizing, and caching behaviour.
//! Loading this from a file (TOML/JSON) is left to the hosting process;
//! `EngineConfig` itself just derives `Serialize`/`Deserialize` so callers
//! may do so if they wish.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root directory the engine owns.
    pub base_path: PathBuf,
    /// Fallback per-file record threshold used when dynamic sizing is
    /// disabled or no snapshot size estimate was registered.
    pub records_per_file: usize,
    /// Use the size tiers in the buffered writer's dynamic sizing policy.
    pub enable_dynamic_sizing: bool,
    /// Allow the aggregator to fold partition files in parallel.
    pub enable_parallel_processing: bool,
    /// Minimum number of files before the aggregator parallelises its fold.
    pub parallel_threshold: usize,
    /// TTL for the in-memory `count()` cache.
    #[serde(with = "duration_secs")]
    pub count_cache_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            base_path: PathBuf::from("./data"),
            records_per_file: 100_000,
            enable_dynamic_sizing: true,
            enable_parallel_processing: true,
            parallel_threshold: 5,
            count_cache_ttl: Duration::from_secs(300),
        }
    }
}

impl EngineConfig {
    /// Start a config rooted at `base_path` with every other field at its
    /// default.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        EngineConfig {
            base_path: base_path.into(),
            ..Default::default()
        }
    }

    /// Configuration tuned for tests: smaller thresholds, parallelism off
    /// by default so tests are deterministic unless they opt in.
    pub fn for_testing(base_path: impl Into<PathBuf>) -> Self {
        EngineConfig {
            base_path: base_path.into(),
            records_per_file: 1_000,
            enable_dynamic_sizing: true,
            enable_parallel_processing: false,
            parallel_threshold: 5,
            count_cache_ttl: Duration::from_secs(300),
        }
    }

    /// Set the fallback per-file record threshold.
    pub fn with_records_per_file(mut self, n: usize) -> Self {
        self.records_per_file = n;
        self
    }

    /// Toggle dynamic file sizing.
    pub fn with_dynamic_sizing(mut self, enabled: bool) -> Self {
        self.enable_dynamic_sizing = enabled;
        self
    }

    /// Toggle parallel aggregation.
    pub fn with_parallel_processing(mut self, enabled: bool) -> Self {
        self.enable_parallel_processing = enabled;
        self
    }

    /// Set the minimum file count before the aggregator parallelises.
    pub fn with_parallel_threshold(mut self, n: usize) -> Self {
        self.parallel_threshold = n;
        self
    }

    /// Set the count-cache TTL.
    pub fn with_count_cache_ttl(mut self, ttl: Duration) -> Self {
        self.count_cache_ttl = ttl;
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.records_per_file, 100_000);
        assert!(cfg.enable_dynamic_sizing);
        assert!(cfg.enable_parallel_processing);
        assert_eq!(cfg.parallel_threshold, 5);
        assert_eq!(cfg.count_cache_ttl, Duration::from_secs(300));
    }

    #[test]
    fn builder_chain() {
        let cfg = EngineConfig::new("/tmp/x")
            .with_records_per_file(50)
            .with_dynamic_sizing(false)
            .with_parallel_threshold(10);
        assert_eq!(cfg.records_per_file, 50);
        assert!(!cfg.enable_dynamic_sizing);
        assert_eq!(cfg.parallel_threshold, 10);
    }
}
