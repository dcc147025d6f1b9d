//! End-to-end integration tests: CSV -> records -> tree -> JSON -> deserialize.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use arbor_io::{CsvRecordReader, ExperimentName, ImportanceEntry, ResultWriter, TreeNodeEntry};
use arbor_tree::{CrossValidation, ImportanceTable, RecordParser, SplitCriterion, TreeConfig};
use tempfile::TempDir;

/// Path to the test fixture directory.
fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn csv_lines_parse_into_typed_records() {
    let lines = CsvRecordReader::new(&fixture_path("weather.csv"))
        .read()
        .expect("fixture should parse");
    assert_eq!(lines.len(), 14);

    let records = RecordParser::new().with_target("play").parse_all(&lines).unwrap();
    assert_eq!(records[0].class("play"), Some("no"));
    assert!(records[0].get("temperature").unwrap().is_numeric());
    assert!(!records[0].get("outlook").unwrap().is_numeric());
}

#[test]
fn tree_export_round_trip() {
    let lines = CsvRecordReader::new(&fixture_path("weather.csv")).read().unwrap();
    let records = RecordParser::new().parse_all(&lines).unwrap();
    let tree = TreeConfig::new().fit(&records, "play").unwrap();

    // The training set is consistent, so resubstitution is exact.
    let eval = tree.evaluate(&records).unwrap();
    assert!((eval.accuracy() - 1.0).abs() < 1e-10);

    let nodes: Vec<TreeNodeEntry> = tree
        .views()
        .into_iter()
        .map(|v| TreeNodeEntry {
            id: v.id.index(),
            parent: v.parent.map(|p| p.index()),
            label: v.label,
            predicate: v.predicate,
            depth: v.depth,
            is_leaf: v.is_leaf,
            class: v.class,
            n_samples: v.n_samples,
        })
        .collect();

    let dir = TempDir::new().unwrap();
    let writer = ResultWriter::new(dir.path(), ExperimentName::new("weather".into()).unwrap())
        .unwrap();
    let path = writer.write_tree("play", &nodes).unwrap();

    let content = read_json(&path);
    assert_eq!(content["n_nodes"].as_u64().unwrap() as usize, tree.n_nodes());
    assert_eq!(content["n_leaves"].as_u64().unwrap() as usize, tree.n_leaves());
    assert_eq!(
        content["edges"].as_array().unwrap().len(),
        tree.n_nodes() - 1,
        "a tree has one edge per non-root node"
    );
    assert_eq!(content["nodes"][0]["label"], "outlook");
    assert_eq!(content["nodes"][0]["n_samples"], 14);
}

#[test]
fn importance_and_predictions_round_trip() {
    let lines = CsvRecordReader::new(&fixture_path("weather.csv")).read().unwrap();
    let records = RecordParser::new().parse_all(&lines).unwrap();
    let tree = TreeConfig::new()
        .with_criterion(SplitCriterion::GainRatio)
        .fit(&records, "play")
        .unwrap();

    let rows: Vec<ImportanceEntry> = ImportanceTable::from_tree(&tree)
        .rows()
        .iter()
        .map(|r| ImportanceEntry {
            rank: r.rank,
            attribute: r.attribute.clone(),
            cumulative_gain: r.cumulative_gain,
            share: r.share,
            n_splits: r.n_splits,
        })
        .collect();
    assert!(!rows.is_empty());

    let buckets: BTreeMap<String, Vec<String>> = tree
        .evaluate(&records)
        .unwrap()
        .predictions()
        .iter()
        .map(|(class, ids)| (class.clone(), ids.iter().map(|id| id.to_string()).collect()))
        .collect();

    let dir = TempDir::new().unwrap();
    let writer = ResultWriter::new(dir.path(), ExperimentName::new("gr".into()).unwrap()).unwrap();
    let importance = read_json(&writer.write_importance("play", "GainRatio", &rows).unwrap());
    let predictions = read_json(&writer.write_predictions(&buckets).unwrap());

    assert_eq!(importance["features"][0]["rank"], 1);
    let shares: f64 = importance["features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["share"].as_f64().unwrap())
        .sum();
    assert!((shares - 1.0).abs() < 1e-10);
    assert_eq!(predictions["n_records"], 14);
    assert_eq!(predictions["classes"]["yes"].as_array().unwrap().len(), 9);
}

#[test]
fn cross_validation_over_csv() {
    let lines = CsvRecordReader::new(&fixture_path("weather.csv")).read().unwrap();
    let pooled = RecordParser::new().parse_all(&lines).unwrap();
    let result = CrossValidation::new(7)
        .evaluate(&TreeConfig::new(), &pooled, "play")
        .unwrap();
    assert_eq!(result.folds.len(), 7);
    assert!(result.folds.iter().all(|f| f.n_test == 2 && f.n_train == 12));
    assert!((0.0..=1.0).contains(&result.mean_accuracy));
}
