//! JSON result writer for runs, cross-validation, importance and tree exports.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::{CvSummary, ExperimentName, ImportanceEntry, RunSummary, TreeNodeEntry};

/// Writes arbor results to JSON files named `{experiment}_{kind}.json`.
///
/// Creates the output directory on construction if it does not exist.
pub struct ResultWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

impl ResultWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    /// Write a train/test run to `{experiment}_run.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all)]
    pub fn write_run(&self, summary: &RunSummary) -> Result<PathBuf, IoError> {
        let artifact = RunArtifact {
            experiment: self.experiment.as_str(),
            summary,
        };
        self.write_json("run", &artifact)
    }

    /// Write a cross-validation to `{experiment}_cv.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all)]
    pub fn write_cv(&self, summary: &CvSummary) -> Result<PathBuf, IoError> {
        let artifact = CvArtifact {
            experiment: self.experiment.as_str(),
            summary,
        };
        self.write_json("cv", &artifact)
    }

    /// Write a ranked importance table to `{experiment}_importance.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all)]
    pub fn write_importance(
        &self,
        target: &str,
        criterion: &str,
        rows: &[ImportanceEntry],
    ) -> Result<PathBuf, IoError> {
        let artifact = ImportanceArtifact {
            experiment: self.experiment.as_str(),
            target,
            criterion,
            features: rows,
        };
        self.write_json("importance", &artifact)
    }

    /// Write a tree as a node list and an edge list to `{experiment}_tree.json`.
    ///
    /// Edges are derived from each node's parent; `nodes` must be in
    /// pre-order with the root first.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all, fields(n_nodes = nodes.len()))]
    pub fn write_tree(&self, target: &str, nodes: &[TreeNodeEntry]) -> Result<PathBuf, IoError> {
        let edges: Vec<EdgeEntry> = nodes
            .iter()
            .filter_map(|n| {
                n.parent.map(|parent| EdgeEntry {
                    from: parent,
                    to: n.id,
                    predicate: n.predicate.as_deref().unwrap_or(""),
                })
            })
            .collect();

        let artifact = TreeArtifact {
            experiment: self.experiment.as_str(),
            target,
            n_nodes: nodes.len(),
            n_leaves: nodes.iter().filter(|n| n.is_leaf).count(),
            depth: nodes.iter().map(|n| n.depth).max().unwrap_or(0),
            nodes,
            edges,
        };
        self.write_json("tree", &artifact)
    }

    /// Write predicted-class buckets to `{experiment}_predictions.json`.
    ///
    /// `buckets` maps each predicted class to the ids of the records that
    /// received it.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all)]
    pub fn write_predictions(
        &self,
        buckets: &BTreeMap<String, Vec<String>>,
    ) -> Result<PathBuf, IoError> {
        let artifact = PredictionsArtifact {
            experiment: self.experiment.as_str(),
            n_records: buckets.values().map(Vec::len).sum(),
            classes: buckets,
        };
        self.write_json("predictions", &artifact)
    }

    /// Return the path where the model binary should be saved.
    ///
    /// Does not write anything; just computes `{output_dir}/{experiment}_model.bin`.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_model.bin", self.experiment.as_str()))
    }

    fn write_json<T: Serialize>(&self, kind: &str, artifact: &T) -> Result<PathBuf, IoError> {
        let path = self
            .output_dir
            .join(format!("{}_{kind}.json", self.experiment.as_str()));

        let json = serde_json::to_string_pretty(artifact).map_err(|e| IoError::SerializeJson {
            path: path.clone(),
            source: e,
        })?;
        fs::write(&path, &json).map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        info!(path = %path.display(), kind, "result written");
        Ok(path)
    }
}

// --- Shadow structs for JSON serialization ---

#[derive(Serialize)]
struct RunArtifact<'a> {
    experiment: &'a str,
    #[serde(flatten)]
    summary: &'a RunSummary,
}

#[derive(Serialize)]
struct CvArtifact<'a> {
    experiment: &'a str,
    #[serde(flatten)]
    summary: &'a CvSummary,
}

#[derive(Serialize)]
struct ImportanceArtifact<'a> {
    experiment: &'a str,
    target: &'a str,
    criterion: &'a str,
    features: &'a [ImportanceEntry],
}

#[derive(Serialize)]
struct TreeArtifact<'a> {
    experiment: &'a str,
    target: &'a str,
    n_nodes: usize,
    n_leaves: usize,
    depth: usize,
    nodes: &'a [TreeNodeEntry],
    edges: Vec<EdgeEntry<'a>>,
}

#[derive(Serialize)]
struct EdgeEntry<'a> {
    from: usize,
    to: usize,
    predicate: &'a str,
}

#[derive(Serialize)]
struct PredictionsArtifact<'a> {
    experiment: &'a str,
    n_records: usize,
    classes: &'a BTreeMap<String, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClassMetricsEntry, FoldEntry};
    use tempfile::TempDir;

    fn writer(dir: &Path, name: &str) -> ResultWriter {
        ResultWriter::new(dir, ExperimentName::new(name.into()).unwrap()).unwrap()
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    fn sample_run() -> RunSummary {
        RunSummary {
            target: "play".into(),
            criterion: "InfoGain".into(),
            max_depth: "unlimited".into(),
            pruning: None,
            n_train: 10,
            n_test: 4,
            n_nodes: 5,
            n_leaves: 3,
            depth: 2,
            pruned_nodes: 0,
            build_ms: 0.4,
            evaluate_ms: 0.1,
            accuracy: 0.75,
            mcc: 0.5,
            fallbacks: 1,
            labels: vec!["no".into(), "yes".into()],
            confusion_matrix: vec![vec![1, 1], vec![0, 2]],
            class_metrics: vec![ClassMetricsEntry {
                class: "no".into(),
                precision: 1.0,
                recall: 0.5,
                f1: 2.0 / 3.0,
                support: 2,
            }],
        }
    }

    #[test]
    fn write_run_json_structure() {
        let dir = TempDir::new().unwrap();
        let path = writer(dir.path(), "weather").write_run(&sample_run()).unwrap();
        assert_eq!(path, dir.path().join("weather_run.json"));

        let content = read_json(&path);
        assert_eq!(content["experiment"], "weather");
        assert_eq!(content["target"], "play");
        assert_eq!(content["n_nodes"], 5);
        assert!(content["pruning"].is_null());
        assert_eq!(content["confusion_matrix"][0][1], 1);
        assert_eq!(content["class_metrics"][0]["class"], "no");
    }

    #[test]
    fn write_cv_json_structure() {
        let dir = TempDir::new().unwrap();
        let summary = CvSummary {
            target: "play".into(),
            criterion: "GiniIndex".into(),
            n_folds: 2,
            n_records: 4,
            shuffle_seed: Some(7),
            mean_accuracy: 0.5,
            std_accuracy: 0.5,
            mean_mcc: 0.0,
            mean_build_ms: 0.2,
            folds: vec![
                FoldEntry { fold: 0, n_train: 2, n_test: 2, accuracy: 1.0, mcc: 1.0, build_ms: 0.2 },
                FoldEntry { fold: 1, n_train: 2, n_test: 2, accuracy: 0.0, mcc: -1.0, build_ms: 0.2 },
            ],
            labels: vec!["no".into(), "yes".into()],
            confusion_matrix: vec![vec![0, 1], vec![1, 0]],
        };
        let path = writer(dir.path(), "cv_test").write_cv(&summary).unwrap();

        let content = read_json(&path);
        assert_eq!(content["experiment"], "cv_test");
        assert_eq!(content["shuffle_seed"], 7);
        assert_eq!(content["folds"].as_array().unwrap().len(), 2);
        assert_eq!(content["folds"][1]["n_test"], 2);
    }

    #[test]
    fn write_tree_derives_edges() {
        let dir = TempDir::new().unwrap();
        let node = |id, parent, predicate: Option<&str>, is_leaf, depth| TreeNodeEntry {
            id,
            parent,
            label: if is_leaf { "A".into() } else { "a".into() },
            predicate: predicate.map(String::from),
            depth,
            is_leaf,
            class: "A".into(),
            n_samples: 4,
        };
        let nodes = vec![
            node(0, None, None, false, 0),
            node(1, Some(0), Some("a <= 2.5"), true, 1),
            node(2, Some(0), Some("a > 2.5"), true, 1),
        ];
        let path = writer(dir.path(), "tree_test").write_tree("cls", &nodes).unwrap();

        let content = read_json(&path);
        assert_eq!(content["n_nodes"], 3);
        assert_eq!(content["n_leaves"], 2);
        assert_eq!(content["depth"], 1);
        let edges = content["edges"].as_array().unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0]["from"], 0);
        assert_eq!(edges[0]["to"], 1);
        assert_eq!(edges[1]["predicate"], "a > 2.5");
    }

    #[test]
    fn write_predictions_counts_records() {
        let dir = TempDir::new().unwrap();
        let mut buckets = BTreeMap::new();
        buckets.insert("no".to_string(), vec!["r1".to_string()]);
        buckets.insert("yes".to_string(), vec!["r0".to_string(), "r2".to_string()]);
        let path = writer(dir.path(), "pred").write_predictions(&buckets).unwrap();

        let content = read_json(&path);
        assert_eq!(content["n_records"], 3);
        assert_eq!(content["classes"]["yes"][1], "r2");
    }

    #[test]
    fn write_importance_keeps_row_order() {
        let dir = TempDir::new().unwrap();
        let rows = vec![
            ImportanceEntry { rank: 1, attribute: "outlook".into(), cumulative_gain: 3.0, share: 0.75, n_splits: 1 },
            ImportanceEntry { rank: 2, attribute: "humidity".into(), cumulative_gain: 1.0, share: 0.25, n_splits: 2 },
        ];
        let path = writer(dir.path(), "imp").write_importance("play", "GainRatio", &rows).unwrap();

        let content = read_json(&path);
        assert_eq!(content["criterion"], "GainRatio");
        assert_eq!(content["features"][0]["attribute"], "outlook");
        assert_eq!(content["features"][1]["rank"], 2);
    }

    #[test]
    fn new_creates_nested_output_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested").join("deep");
        let w = writer(&nested, "nested_test");
        assert!(nested.is_dir());
        assert_eq!(w.model_path(), nested.join("nested_test_model.bin"));
    }
}
