//! Structural classification of an extracted payload by marker files.

use std::path::{Path, PathBuf};

use crate::config::LoaderConfig;

#[derive(Debug, Clone)]
pub struct StructuralClassifier {
    bag_marker: String,
    payload_directory: String,
    config_file: String,
}

impl StructuralClassifier {
    pub fn new(
        bag_marker: impl Into<String>,
        payload_directory: impl Into<String>,
        config_file: impl Into<String>,
    ) -> Self {
        Self {
            bag_marker: bag_marker.into(),
            payload_directory: payload_directory.into(),
            config_file: config_file.into(),
        }
    }

    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(
            &config.bagit.detection_file,
            &config.bagit.payload_directory,
            &config.compendium.config_file,
        )
    }

    pub fn detect_bag(&self, root: &Path) -> bool {
        root.join(&self.bag_marker).is_file()
    }

    /// Directory holding the actual content: the bag payload directory for
    /// bags, the root otherwise.
    pub fn content_root(&self, root: &Path, is_bag: bool) -> PathBuf {
        if is_bag {
            root.join(&self.payload_directory)
        } else {
            root.to_path_buf()
        }
    }

    pub fn detect_compendium(&self, root: &Path, is_bag: bool) -> Option<PathBuf> {
        let candidate = self.content_root(root, is_bag).join(&self.config_file);
        candidate.is_file().then_some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn classifier() -> StructuralClassifier {
        StructuralClassifier::new("bagit.txt", "data", "erc.yml")
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_plain_workspace() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("main.R"));

        let classifier = classifier();
        assert!(!classifier.detect_bag(tmp.path()));
        assert!(classifier.detect_compendium(tmp.path(), false).is_none());
        assert_eq!(classifier.content_root(tmp.path(), false), tmp.path());
    }

    #[test]
    fn test_bag_with_compendium_in_payload() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("bagit.txt"));
        touch(&tmp.path().join("data/erc.yml"));

        let classifier = classifier();
        assert!(classifier.detect_bag(tmp.path()));
        assert_eq!(
            classifier.detect_compendium(tmp.path(), true),
            Some(tmp.path().join("data/erc.yml"))
        );
        assert_eq!(
            classifier.content_root(tmp.path(), true),
            tmp.path().join("data")
        );
    }

    #[test]
    fn test_bag_ignores_root_config() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("bagit.txt"));
        touch(&tmp.path().join("erc.yml"));

        let classifier = classifier();
        assert!(classifier.detect_bag(tmp.path()));
        assert!(classifier.detect_compendium(tmp.path(), true).is_none());
    }

    #[test]
    fn test_compendium_without_bag() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("erc.yml"));

        let classifier = classifier();
        assert!(!classifier.detect_bag(tmp.path()));
        assert_eq!(
            classifier.detect_compendium(tmp.path(), false),
            Some(tmp.path().join("erc.yml"))
        );
    }

    #[test]
    fn test_marker_directory_does_not_count() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("bagit.txt")).unwrap();
        std::fs::create_dir_all(tmp.path().join("erc.yml")).unwrap();

        let classifier = classifier();
        assert!(!classifier.detect_bag(tmp.path()));
        assert!(classifier.detect_compendium(tmp.path(), false).is_none());
    }
}
