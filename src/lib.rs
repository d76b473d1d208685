//! # vstat
//!
//! A columnar storage engine for harvest validation statistics: ingest
//! per-record validation verdicts, explode them into `(record, rule, value)`
//! fact rows, partition and compress them Hive-style, and answer
//! aggregate/paginated queries with predicate pushdown.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use vstat::{Engine, EngineConfig, Provenance, RecordVerdict};
//!
//! fn main() -> vstat::Result<()> {
//!     let engine = Engine::new(EngineConfig::new("./data"))?;
//!
//!     engine.initialise(1)?;
//!
//!     let mut valid = BTreeMap::new();
//!     valid.insert("7".to_string(), vec!["2024-01-01".to_string()]);
//!     engine.ingest(&RecordVerdict {
//!         id: "a1".to_string(),
//!         identifier: "oai:repo:a1".to_string(),
//!         snapshot_id: 1,
//!         provenance: Provenance {
//!             network: Some("EXAMPLE".to_string()),
//!             ..Default::default()
//!         },
//!         record_is_valid: true,
//!         is_transformed: false,
//!         valid_occurrences: valid,
//!         invalid_occurrences: BTreeMap::new(),
//!     })?;
//!
//!     engine.finalise(1)?;
//!
//!     let stats = engine.stats(1)?;
//!     assert_eq!(stats.total_records, 1);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Layers
//!
//! | Crate | Purpose | Key types |
//! |-------|---------|-----------|
//! | `vstat-core` | error/config/data model | [`EngineError`], [`EngineConfig`], [`Fact`] |
//! | `vstat-columnar` | fact codec, reader/writer, predicate pushdown | `ColumnarReader`, `ColumnarWriter`, `Predicate` |
//! | `vstat-partition` | Hive-style partition layout | `PartitionLayout` |
//! | `vstat-ingest` | explosion stage, buffered multi-file writer | `BufferedMultiFileWriter` |
//! | `vstat-index` | lightweight identity/validity sidecar | `IndexSidecar` |
//! | `vstat-aggregate` | aggregator, filter translator, summary, query surface | `QuerySurface`, `Filter` |
//! | `vstat-engine` | lifecycle controller and the [`Engine`] facade | [`Engine`] |
//!
//! Only this crate's re-exports are considered the stable public surface;
//! the per-layer crates are implementation detail and may change shape
//! between releases.

pub use vstat_aggregate::{
    aggregate, AggregateFileError, AggregateResult, Filter, QuerySurface, SnapshotSummary,
};
pub use vstat_columnar::{ColumnValue, Predicate};
pub use vstat_core::{
    normalize_value, EngineConfig, EngineError, Fact, PartitionKey, Provenance, RecordVerdict, Result,
};
pub use vstat_engine::{Engine, LifecycleController, SnapshotState};
pub use vstat_index::{IndexEntry, StatusFilter};
