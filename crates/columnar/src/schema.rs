//! Arrow schemas for the fact file and the lightweight index sidecar.
//!
//! Column layout mirrors the external interface bit-exactly: required
//! columns are non-nullable, optional provenance columns (and `value`) are
//! nullable.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema};

/// Column name constants, used by the codec, the predicate translator and
/// the reader's row-group pruning so a typo can't silently desync them.
pub mod columns {
    /// Stable content-addressed record hash.
    pub const ID: &str = "id";
    /// External (harvest-protocol) identifier.
    pub const IDENTIFIER: &str = "identifier";
    /// Validation run.
    pub const SNAPSHOT_ID: &str = "snapshot_id";
    /// Harvest origin.
    pub const ORIGIN: &str = "origin";
    /// Harvest network (also encoded in the partition path).
    pub const NETWORK: &str = "network";
    /// Source repository.
    pub const REPOSITORY: &str = "repository";
    /// Owning institution.
    pub const INSTITUTION: &str = "institution";
    /// OAI-PMH metadata prefix.
    pub const METADATA_PREFIX: &str = "metadata_prefix";
    /// OAI-PMH set spec.
    pub const SET_SPEC: &str = "set_spec";
    /// Rule that produced this occurrence.
    pub const RULE_ID: &str = "rule_id";
    /// Normalised occurrence value.
    pub const VALUE: &str = "value";
    /// Verdict for this occurrence.
    pub const IS_VALID: &str = "is_valid";
    /// Verdict for the whole record.
    pub const RECORD_IS_VALID: &str = "record_is_valid";
    /// Whether the record was transformed.
    pub const IS_TRANSFORMED: &str = "is_transformed";

    /// Index sidecar: record identity column (same content as [`ID`]).
    pub const RECORD_ID: &str = "record_id";
    /// Index sidecar: optional content hash of the published metadata.
    pub const PUBLISHED_METADATA_HASH: &str = "published_metadata_hash";
}

/// Build the arrow schema for a fact file (`part-NNNNN.parquet`).
pub fn fact_schema() -> Arc<Schema> {
    use columns::*;
    Arc::new(Schema::new(vec![
        Field::new(ID, DataType::Utf8, false),
        Field::new(IDENTIFIER, DataType::Utf8, false),
        Field::new(SNAPSHOT_ID, DataType::Int64, false),
        Field::new(ORIGIN, DataType::Utf8, false),
        Field::new(NETWORK, DataType::Utf8, true),
        Field::new(REPOSITORY, DataType::Utf8, true),
        Field::new(INSTITUTION, DataType::Utf8, true),
        Field::new(METADATA_PREFIX, DataType::Utf8, true),
        Field::new(SET_SPEC, DataType::Utf8, true),
        Field::new(RULE_ID, DataType::Int32, false),
        Field::new(VALUE, DataType::Utf8, true),
        Field::new(IS_VALID, DataType::Boolean, false),
        Field::new(RECORD_IS_VALID, DataType::Boolean, false),
        Field::new(IS_TRANSFORMED, DataType::Boolean, false),
    ]))
}

/// Build the arrow schema for the lightweight index sidecar
/// (`validation_index.parquet`).
pub fn index_schema() -> Arc<Schema> {
    use columns::*;
    Arc::new(Schema::new(vec![
        Field::new(RECORD_ID, DataType::Utf8, false),
        Field::new(IDENTIFIER, DataType::Utf8, false),
        Field::new(RECORD_IS_VALID, DataType::Boolean, false),
        Field::new(IS_TRANSFORMED, DataType::Boolean, false),
        Field::new(PUBLISHED_METADATA_HASH, DataType::Utf8, true),
    ]))
}
