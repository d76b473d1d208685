//! The lifecycle controller and the top-level [`Engine`] facade that ties
//! together the columnar, partition, ingest, index and aggregate crates
//! into one validation-statistics storage engine.

pub mod engine;
pub mod lifecycle;

pub use engine::Engine;
pub use lifecycle::{LifecycleController, SnapshotState};
