//! Filter → predicate translator.
//!
//! A [`Filter`] is the caller-facing, loosely-typed query shape; translating
//! it into a [`Predicate`] is the only place numeric parsing happens, so it
//! is also the only place a malformed value can be dropped with a warning
//! rather than failing the call.

use tracing::warn;
use vstat_columnar::{
    schema::columns, ColumnValue, Predicate,
};

/// Caller-facing filter. Every field is optional; an all-`None` filter
/// translates to [`Predicate::True`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Filter {
    pub snapshot_id: Option<i64>,
    pub identifier: Option<String>,
    /// Applied against the `record_is_valid` column.
    pub is_valid: Option<bool>,
    pub is_transformed: Option<bool>,
    /// Rule id, as a string, to require a valid occurrence of.
    pub valid_rules_filter: Option<String>,
    /// Rule id, as a string, to require an invalid occurrence of.
    pub invalid_rules_filter: Option<String>,
}

/// Build a [`Predicate`] from `filter`. Numeric fields that fail to parse are
/// logged and dropped rather than failing the whole translation.
pub fn build_predicate(filter: &Filter) -> Predicate {
    let mut predicate = Predicate::True;

    if let Some(snapshot_id) = filter.snapshot_id {
        predicate = predicate.and(Predicate::eq(
            columns::SNAPSHOT_ID,
            ColumnValue::Int64(snapshot_id),
        ));
    }
    if let Some(identifier) = &filter.identifier {
        predicate = predicate.and(Predicate::eq(
            columns::IDENTIFIER,
            ColumnValue::Utf8(identifier.clone()),
        ));
    }
    if let Some(is_valid) = filter.is_valid {
        predicate = predicate.and(Predicate::eq(
            columns::RECORD_IS_VALID,
            ColumnValue::Bool(is_valid),
        ));
    }
    if let Some(is_transformed) = filter.is_transformed {
        predicate = predicate.and(Predicate::eq(
            columns::IS_TRANSFORMED,
            ColumnValue::Bool(is_transformed),
        ));
    }
    if let Some(raw) = &filter.valid_rules_filter {
        match raw.parse::<i32>() {
            Ok(rule_id) => {
                predicate = predicate.and(
                    Predicate::eq(columns::RULE_ID, ColumnValue::Int32(rule_id))
                        .and(Predicate::eq(columns::IS_VALID, ColumnValue::Bool(true))),
                );
            }
            Err(e) => warn!(value = %raw, error = %e, "dropping unparseable valid_rules_filter clause"),
        }
    }
    if let Some(raw) = &filter.invalid_rules_filter {
        match raw.parse::<i32>() {
            Ok(rule_id) => {
                predicate = predicate.and(
                    Predicate::eq(columns::RULE_ID, ColumnValue::Int32(rule_id))
                        .and(Predicate::eq(columns::IS_VALID, ColumnValue::Bool(false))),
                );
            }
            Err(e) => warn!(value = %raw, error = %e, "dropping unparseable invalid_rules_filter clause"),
        }
    }

    predicate
}
