//! Bidirectional conversion between [`Fact`] and a columnar row.
//!
//! `encode` builds one column of an arrow `RecordBatch` per call site (the
//! buffered writer accumulates a `Vec<Fact>` and calls [`encode_batch`]
//! once per flush); `decode_row`/`decode_batch` read a `RecordBatch` back
//! into `Fact` values, refusing rows that are missing a required field.

use std::sync::Arc;

use arrow::array::{
    Array, BooleanArray, BooleanBuilder, Int32Array, Int32Builder, Int64Array, Int64Builder,
    RecordBatch, StringArray, StringBuilder,
};
use vstat_core::{normalize_value, EngineError, Fact, Provenance, Result};

use crate::schema::{columns, fact_schema};

/// Encode a slice of facts into one `RecordBatch`, normalising `value` at
/// encode time (trim + collapse whitespace, case preserved).
pub fn encode_batch(facts: &[Fact]) -> Result<RecordBatch> {
    let mut id = StringBuilder::new();
    let mut identifier = StringBuilder::new();
    let mut snapshot_id = Int64Builder::new();
    let mut origin = StringBuilder::new();
    let mut network = StringBuilder::new();
    let mut repository = StringBuilder::new();
    let mut institution = StringBuilder::new();
    let mut metadata_prefix = StringBuilder::new();
    let mut set_spec = StringBuilder::new();
    let mut rule_id = Int32Builder::new();
    let mut value = StringBuilder::new();
    let mut is_valid = BooleanBuilder::new();
    let mut record_is_valid = BooleanBuilder::new();
    let mut is_transformed = BooleanBuilder::new();

    for fact in facts {
        if fact.id.is_empty() || fact.identifier.is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "fact missing required id/identifier for record {:?}",
                fact.id
            )));
        }
        id.append_value(&fact.id);
        identifier.append_value(&fact.identifier);
        snapshot_id.append_value(fact.snapshot_id);
        origin.append_value(fact.provenance.origin.as_deref().unwrap_or(""));
        append_optional(&mut network, fact.provenance.network.as_deref());
        append_optional(&mut repository, fact.provenance.repository.as_deref());
        append_optional(&mut institution, fact.provenance.institution.as_deref());
        append_optional(
            &mut metadata_prefix,
            fact.provenance.metadata_prefix.as_deref(),
        );
        append_optional(&mut set_spec, fact.provenance.set_spec.as_deref());
        rule_id.append_value(fact.rule_id);
        let normalised = fact.value.as_deref().and_then(normalize_value);
        append_optional(&mut value, normalised.as_deref());
        is_valid.append_value(fact.is_valid);
        record_is_valid.append_value(fact.record_is_valid);
        is_transformed.append_value(fact.is_transformed);
    }

    RecordBatch::try_new(
        fact_schema(),
        vec![
            Arc::new(id.finish()),
            Arc::new(identifier.finish()),
            Arc::new(snapshot_id.finish()),
            Arc::new(origin.finish()),
            Arc::new(network.finish()),
            Arc::new(repository.finish()),
            Arc::new(institution.finish()),
            Arc::new(metadata_prefix.finish()),
            Arc::new(set_spec.finish()),
            Arc::new(rule_id.finish()),
            Arc::new(value.finish()),
            Arc::new(is_valid.finish()),
            Arc::new(record_is_valid.finish()),
            Arc::new(is_transformed.finish()),
        ],
    )
    .map_err(|e| EngineError::InvalidInput(format!("batch construction failed: {e}")))
}

fn append_optional(builder: &mut StringBuilder, value: Option<&str>) {
    match value {
        Some(v) => builder.append_value(v),
        None => builder.append_null(),
    }
}

/// Decode every surviving row of a batch into owned [`Fact`] values.
pub fn decode_batch(batch: &RecordBatch) -> Result<Vec<Fact>> {
    (0..batch.num_rows()).map(|row| decode_row(batch, row)).collect()
}

/// Decode row `row` of `batch` into a [`Fact`], refusing the row if a
/// required column (`id`, `identifier`, `snapshot_id`, `rule_id`,
/// `is_valid`, `record_is_valid`, `is_transformed`) is null.
pub fn decode_row(batch: &RecordBatch, row: usize) -> Result<Fact> {
    let col = |name: &str| {
        batch
            .column_by_name(name)
            .ok_or_else(|| EngineError::MalformedFile {
                file: Default::default(),
                cause: format!("missing column {name}"),
            })
    };

    let id_arr = col(columns::ID)?.as_any().downcast_ref::<StringArray>().unwrap();
    let identifier_arr = col(columns::IDENTIFIER)?
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    let snapshot_arr = col(columns::SNAPSHOT_ID)?
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    let rule_arr = col(columns::RULE_ID)?.as_any().downcast_ref::<Int32Array>().unwrap();
    let is_valid_arr = col(columns::IS_VALID)?
        .as_any()
        .downcast_ref::<BooleanArray>()
        .unwrap();
    let record_is_valid_arr = col(columns::RECORD_IS_VALID)?
        .as_any()
        .downcast_ref::<BooleanArray>()
        .unwrap();
    let is_transformed_arr = col(columns::IS_TRANSFORMED)?
        .as_any()
        .downcast_ref::<BooleanArray>()
        .unwrap();

    if id_arr.is_null(row)
        || identifier_arr.is_null(row)
        || snapshot_arr.is_null(row)
        || rule_arr.is_null(row)
        || is_valid_arr.is_null(row)
        || record_is_valid_arr.is_null(row)
        || is_transformed_arr.is_null(row)
    {
        return Err(EngineError::InvalidInput(format!(
            "row {row} missing a required field"
        )));
    }

    let origin_arr = col(columns::ORIGIN)?.as_any().downcast_ref::<StringArray>().unwrap();
    let value_arr = col(columns::VALUE)?.as_any().downcast_ref::<StringArray>().unwrap();

    Ok(Fact {
        id: id_arr.value(row).to_string(),
        identifier: identifier_arr.value(row).to_string(),
        snapshot_id: snapshot_arr.value(row),
        provenance: Provenance {
            origin: opt_string(origin_arr, row),
            network: opt_named(batch, columns::NETWORK, row),
            repository: opt_named(batch, columns::REPOSITORY, row),
            institution: opt_named(batch, columns::INSTITUTION, row),
            metadata_prefix: opt_named(batch, columns::METADATA_PREFIX, row),
            set_spec: opt_named(batch, columns::SET_SPEC, row),
        },
        rule_id: rule_arr.value(row),
        value: opt_string(value_arr, row),
        is_valid: is_valid_arr.value(row),
        record_is_valid: record_is_valid_arr.value(row),
        is_transformed: is_transformed_arr.value(row),
    })
}

fn opt_string(arr: &StringArray, row: usize) -> Option<String> {
    if arr.is_null(row) {
        None
    } else {
        Some(arr.value(row).to_string())
    }
}

fn opt_named(batch: &RecordBatch, name: &str, row: usize) -> Option<String> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .and_then(|arr| opt_string(arr, row))
}
