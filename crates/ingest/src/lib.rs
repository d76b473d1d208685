//! Ingest path: explode upstream verdicts into fact rows and buffer them
//! into partitioned, dynamically-sized files.

pub mod buffered_writer;
pub mod explode;
pub mod sizing;

pub use buffered_writer::BufferedMultiFileWriter;
pub use explode::{explode, partition_keys_for};
pub use sizing::{threshold, SizeEstimates};
