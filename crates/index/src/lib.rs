//! Lightweight index sidecar: identity/validity-only columnar file per
//! snapshot, intended for full-memory scans by consumers that need
//! repeated lookups without touching the (larger) fact table.

pub mod sidecar;

pub use sidecar::{IndexEntry, IndexSidecar, StatusFilter};
