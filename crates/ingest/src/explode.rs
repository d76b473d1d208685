//! Explosion stage: converts one upstream [`RecordVerdict`] into many
//! [`Fact`] rows, one per `(rule_id, value)` pair, deduplicated within the
//! verdict.

use std::collections::HashSet;

use tracing::warn;
use vstat_core::{normalize_value, Fact, PartitionKey, Provenance, RecordVerdict};

/// Explode `verdict` into its fact rows. Rule ids that fail to parse as a
/// non-negative integer are dropped with a warning that includes the
/// record id (invariant 3). Duplicate `(rule_id, normalised value)` pairs
/// within the same verdict are filtered (invariant 2); the dedup set is
/// local to this call and discarded afterwards.
pub fn explode(verdict: &RecordVerdict) -> Vec<Fact> {
    let mut seen: HashSet<(i32, String)> = HashSet::new();
    let mut facts = Vec::new();

    let provenance = normalise_provenance(&verdict.provenance);

    for (rule_id_str, values) in &verdict.valid_occurrences {
        emit_rule(
            verdict,
            &provenance,
            rule_id_str,
            values,
            true,
            &mut seen,
            &mut facts,
        );
    }
    for (rule_id_str, values) in &verdict.invalid_occurrences {
        emit_rule(
            verdict,
            &provenance,
            rule_id_str,
            values,
            false,
            &mut seen,
            &mut facts,
        );
    }

    facts
}

fn emit_rule(
    verdict: &RecordVerdict,
    provenance: &Provenance,
    rule_id_str: &str,
    values: &[String],
    is_valid: bool,
    seen: &mut HashSet<(i32, String)>,
    facts: &mut Vec<Fact>,
) {
    let rule_id = match rule_id_str.parse::<i32>() {
        Ok(id) if id >= 0 => id,
        _ => {
            warn!(
                record_id = %verdict.id,
                rule_id = rule_id_str,
                "dropping fact rows: rule_id failed to parse as a non-negative integer"
            );
            return;
        }
    };

    for raw_value in values {
        let Some(value) = normalize_value(raw_value) else {
            continue;
        };
        if !seen.insert((rule_id, value.clone())) {
            continue;
        }
        facts.push(Fact {
            id: verdict.id.clone(),
            identifier: verdict.identifier.clone(),
            snapshot_id: verdict.snapshot_id,
            provenance: provenance.clone(),
            rule_id,
            value: Some(value),
            is_valid,
            record_is_valid: verdict.record_is_valid,
            is_transformed: verdict.is_transformed,
        });
    }
}

fn normalise_provenance(provenance: &Provenance) -> Provenance {
    let mut out = provenance.clone();
    if out.network.as_deref().map(str::is_empty).unwrap_or(true) {
        out.network = Some("UNKNOWN".to_string());
    }
    out
}

/// Derive every distinct [`PartitionKey`] a verdict's fact rows will land
/// under (at most two: one per `is_valid` side, sharing `network`).
pub fn partition_keys_for(verdict: &RecordVerdict) -> Vec<PartitionKey> {
    let network = verdict
        .provenance
        .network
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "UNKNOWN".to_string());
    let mut keys = Vec::new();
    if !verdict.valid_occurrences.is_empty() {
        keys.push(PartitionKey {
            snapshot_id: verdict.snapshot_id,
            network: network.clone(),
            is_valid: true,
        });
    }
    if !verdict.invalid_occurrences.is_empty() {
        keys.push(PartitionKey {
            snapshot_id: verdict.snapshot_id,
            network,
            is_valid: false,
        });
    }
    keys
}
