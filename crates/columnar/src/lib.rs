//! Columnar file format: the fact row codec, the predicate pushdown tree,
//! and the reader/writer pair built on `arrow`/`parquet`.

pub mod codec;
pub mod predicate;
pub mod reader;
pub mod schema;
pub mod writer;

pub use codec::{decode_batch, decode_row, encode_batch};
pub use predicate::{ColumnValue, Predicate};
pub use reader::{AggregateRow, ColumnarReader, ReaderConfig};
pub use schema::{fact_schema, index_schema};
pub use writer::{ColumnarWriter, WriteMode, WriterConfig};
