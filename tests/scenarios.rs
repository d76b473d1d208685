//! End-to-end scenarios S1-S6.

use std::collections::BTreeMap;

use tempfile::tempdir;
use vstat::{Engine, EngineConfig, Filter, Provenance, RecordVerdict};

fn verdict(
    id: &str,
    snapshot_id: i64,
    record_is_valid: bool,
    valid: &[(&str, &[&str])],
    invalid: &[(&str, &[&str])],
) -> RecordVerdict {
    let to_map = |pairs: &[(&str, &[&str])]| -> BTreeMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    };
    RecordVerdict {
        id: id.to_string(),
        identifier: format!("oai:{id}"),
        snapshot_id,
        provenance: Provenance {
            network: Some("NET".to_string()),
            ..Default::default()
        },
        record_is_valid,
        is_transformed: false,
        valid_occurrences: to_map(valid),
        invalid_occurrences: to_map(invalid),
    }
}

/// S1 - single verdict, single rule: duplicated occurrence values collapse
/// to one fact row each.
#[test]
fn s1_single_verdict_single_rule() {
    let dir = tempdir().unwrap();
    let engine = Engine::new(EngineConfig::for_testing(dir.path())).unwrap();
    engine.initialise(1).unwrap();
    engine
        .ingest(&verdict("a", 1, true, &[("7", &["x", "x", "y"])], &[]))
        .unwrap();
    engine.finalise(1).unwrap();

    let stats = engine.stats(1).unwrap();
    assert_eq!(stats.total_records, 1);
    assert_eq!(stats.valid_records, 1);
    assert_eq!(stats.transformed_records, 0);
    assert_eq!(stats.valid_rule_counts.get("7"), Some(&1));
    assert!(stats.invalid_rule_counts.is_empty());

    // Fact file contains exactly 2 rows: x and y, deduplicated.
    let page = engine.paginate(1, &Filter::default(), 0, 10).unwrap();
    assert_eq!(page.len(), 2);
    let values: std::collections::HashSet<_> = page.iter().map(|f| f.value.clone().unwrap()).collect();
    assert_eq!(
        values,
        std::collections::HashSet::from(["x".to_string(), "y".to_string()])
    );
}

/// S2 - two verdicts, mixed valid/invalid.
#[test]
fn s2_two_verdicts_mixed() {
    let dir = tempdir().unwrap();
    let engine = Engine::new(EngineConfig::for_testing(dir.path())).unwrap();
    engine.initialise(2).unwrap();
    engine
        .ingest(&verdict("a", 2, true, &[("7", &["x"])], &[]))
        .unwrap();
    engine
        .ingest(&verdict("b", 2, false, &[], &[("7", &["z"]), ("8", &["w"])]))
        .unwrap();
    engine.finalise(2).unwrap();

    let stats = engine.stats(2).unwrap();
    assert_eq!(stats.total_records, 2);
    assert_eq!(stats.valid_records, 1);
    assert_eq!(stats.valid_rule_counts.get("7"), Some(&1));
    assert_eq!(stats.invalid_rule_counts.get("7"), Some(&1));
    assert_eq!(stats.invalid_rule_counts.get("8"), Some(&1));
}

/// S3 - filter by rule: count and pagination narrow to the matching record.
#[test]
fn s3_filter_by_rule() {
    let dir = tempdir().unwrap();
    let engine = Engine::new(EngineConfig::for_testing(dir.path())).unwrap();
    engine.initialise(2).unwrap();
    engine
        .ingest(&verdict("a", 2, true, &[("7", &["x"])], &[]))
        .unwrap();
    engine
        .ingest(&verdict("b", 2, false, &[], &[("7", &["z"]), ("8", &["w"])]))
        .unwrap();
    engine.finalise(2).unwrap();

    let filter = Filter {
        valid_rules_filter: Some("7".to_string()),
        ..Default::default()
    };
    assert_eq!(engine.count(2, &filter).unwrap(), 1);
    let page = engine.paginate(2, &filter, 0, 10).unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, "a");
}

/// S4 - occurrence histogram across two records sharing one rule.
#[test]
fn s4_occurrence_histogram() {
    let dir = tempdir().unwrap();
    let engine = Engine::new(EngineConfig::for_testing(dir.path())).unwrap();
    engine.initialise(4).unwrap();
    engine
        .ingest(&verdict("a", 4, true, &[("7", &["x", "y"])], &[]))
        .unwrap();
    engine
        .ingest(&verdict("b", 4, true, &[("7", &["x", "z"])], &[]))
        .unwrap();
    engine.finalise(4).unwrap();

    let histogram = engine.rule_occurrences(4, 7, true, None).unwrap();
    assert_eq!(histogram.get("x"), Some(&2));
    assert_eq!(histogram.get("y"), Some(&1));
    assert_eq!(histogram.get("z"), Some(&1));
}

/// S5 - summary fast path: the second `stats` call reads `_SUMMARY.json`
/// rather than re-aggregating; observable here as the file existing and
/// both calls agreeing byte-for-byte on every field.
#[test]
fn s5_summary_fast_path() {
    let dir = tempdir().unwrap();
    let engine = Engine::new(EngineConfig::for_testing(dir.path())).unwrap();
    engine.initialise(5).unwrap();
    engine
        .ingest(&verdict("a", 5, true, &[("7", &["x"])], &[]))
        .unwrap();
    engine.finalise(5).unwrap();

    let summary_path = dir.path().join("snapshot_id=5/_SUMMARY.json");
    assert!(summary_path.exists());
    let mtime_after_finalise = std::fs::metadata(&summary_path).unwrap().modified().unwrap();

    let first = engine.stats(5).unwrap();
    let second = engine.stats(5).unwrap();
    assert_eq!(first, second);
    // Reading stats() does not rewrite the summary: mtime is unchanged.
    let mtime_after_reads = std::fs::metadata(&summary_path).unwrap().modified().unwrap();
    assert_eq!(mtime_after_finalise, mtime_after_reads);
}

/// S6 - dynamic sizing: with no size estimate registered, the engine falls
/// back to its fixed per-file threshold; ingesting 200,000 single-fact
/// verdicts against a 50,000-row threshold produces exactly 4 full files.
#[test]
#[ignore = "allocates and writes 200k rows; run explicitly with --ignored"]
fn s6_dynamic_sizing_produces_four_files() {
    let dir = tempdir().unwrap();
    let config = EngineConfig::for_testing(dir.path()).with_records_per_file(50_000);
    let engine = Engine::new(config).unwrap();
    engine.initialise(6).unwrap();

    for i in 0..200_000 {
        let id = format!("rec-{i}");
        engine
            .ingest(&verdict(&id, 6, true, &[("7", &["x"])], &[]))
            .unwrap();
    }
    engine.finalise(6).unwrap();

    let stats = engine.stats(6).unwrap();
    assert_eq!(stats.total_records, 200_000);

    let partition_dir = dir
        .path()
        .join("snapshot_id=6/network=NET/is_valid=true");
    let mut files: Vec<_> = std::fs::read_dir(&partition_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    files.sort();
    assert_eq!(files.len(), 4);
}
