//! Core types shared across the validation statistics engine.
//!
//! This crate defines the foundational, dependency-light vocabulary used
//! throughout the workspace:
//! - [`Fact`]: one `(record, rule, value)` triple as stored on disk
//! - [`RecordVerdict`]: the upstream input to the explosion stage
//! - [`PartitionKey`]: `(snapshot_id, network, is_valid)` partition identity
//! - [`EngineConfig`]: engine-wide configuration
//! - [`EngineError`] / [`Result`]: the unified error type

pub mod config;
pub mod error;
pub mod model;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use model::{normalize_value, Fact, PartitionKey, Provenance, RecordVerdict};
