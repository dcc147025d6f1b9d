//! Tree persistence via bincode.

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::error::TreeError;
use crate::tree::DecisionTree;

/// Current binary format version.
const FORMAT_VERSION: u32 = 2;

/// Versioned envelope; `T` is `&DecisionTree` when saving and
/// `DecisionTree` when loading.
#[derive(serde::Serialize, serde::Deserialize)]
struct ModelEnvelope<T> {
    format_version: u32,
    target: String,
    n_nodes: usize,
    tree: T,
}

impl DecisionTree {
    /// Save the tree to a binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`TreeError::SerializeModel`] | bincode encoding failed |
    /// | [`TreeError::WriteModel`] | file write failed |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TreeError> {
        let path = path.as_ref();

        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION,
            target: self.target().to_string(),
            n_nodes: self.n_nodes(),
            tree: self,
        };

        let bytes =
            bincode::serialize(&envelope).map_err(|e| TreeError::SerializeModel { source: e })?;

        std::fs::write(path, &bytes).map_err(|e| TreeError::WriteModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        info!(size_bytes = bytes.len(), n_nodes = self.n_nodes(), "tree saved");
        Ok(())
    }

    /// Load a tree from a binary file written by [`DecisionTree::save`].
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`TreeError::ReadModel`] | file read failed |
    /// | [`TreeError::DeserializeModel`] | bincode decoding failed |
    /// | [`TreeError::IncompatibleModelVersion`] | format version mismatch |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TreeError> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|e| TreeError::ReadModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        let envelope: ModelEnvelope<DecisionTree> =
            bincode::deserialize(&bytes).map_err(|e| TreeError::DeserializeModel {
                path: path.to_path_buf(),
                source: e,
            })?;

        if envelope.format_version != FORMAT_VERSION {
            return Err(TreeError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: envelope.format_version,
                path: path.to_path_buf(),
            });
        }

        debug!(
            target_attribute = %envelope.target,
            n_nodes = envelope.n_nodes,
            "tree loaded"
        );
        Ok(envelope.tree)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::record::RecordParser;
    use crate::tree::TreeConfig;

    #[test]
    fn round_trip_identical_predictions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tree.bin");

        let records = RecordParser::new()
            .parse_all(["a:1,c:x,cls:A", "a:2,c:y,cls:A", "a:8,c:x,cls:B", "a:9,c:y,cls:B"])
            .unwrap();
        let tree = TreeConfig::new().fit(&records, "cls").unwrap();
        tree.save(&path).unwrap();
        let loaded = DecisionTree::load(&path).unwrap();

        assert_eq!(loaded, tree);
        for record in &records {
            assert_eq!(loaded.predict(record), tree.predict(record));
        }
    }

    #[test]
    fn wrong_version_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.bin");
        let records = RecordParser::new().parse_all(["a:1,cls:A"]).unwrap();
        let tree = TreeConfig::new().fit(&records, "cls").unwrap();
        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION + 1,
            target: "cls".to_string(),
            n_nodes: 1,
            tree: &tree,
        };
        std::fs::write(&path, bincode::serialize(&envelope).unwrap()).unwrap();
        let err = DecisionTree::load(&path).unwrap_err();
        assert!(matches!(err, TreeError::IncompatibleModelVersion { found: 2, .. }));
    }

    #[test]
    fn load_nonexistent_file_error() {
        let dir = TempDir::new().unwrap();
        let err = DecisionTree::load(dir.path().join("missing.bin")).unwrap_err();
        assert!(matches!(err, TreeError::ReadModel { .. }));
    }

    #[test]
    fn load_corrupt_file_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.bin");
        std::fs::write(&path, b"not a tree").unwrap();
        let err = DecisionTree::load(&path).unwrap_err();
        assert!(matches!(err, TreeError::DeserializeModel { .. }));
    }
}
