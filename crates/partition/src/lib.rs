//! Partition layout manager: path conventions and a per-snapshot directory
//! cache.

pub mod layout;

pub use layout::PartitionLayout;
