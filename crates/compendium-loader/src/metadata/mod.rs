//! Metadata extraction and brokering through sandboxed tool runs.

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::config::LoaderConfig;
use crate::error::SandboxError;
use crate::sandbox::BindMount;

pub mod broker;
pub mod extract;

pub use broker::{MappingOutcome, MetadataBroker};
pub use extract::{ExtractionOutcome, MetadataExtractor};

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Container '{name}' exited with code {exit_code}")]
    ToolFailed {
        name: String,
        exit_code: i32,
        tail: String,
    },

    #[error("Failed to prepare '{path}': {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read '{path}': {source}")]
    ReadOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{file}': {source}")]
    Parse {
        file: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Container settings shared by extraction and brokering.
#[derive(Debug, Clone)]
pub struct ContainerSettings {
    pub image: String,
    pub remove: bool,
    /// Named volume replacing all bind mounts, mounted at `base_path`.
    pub volume: Option<String>,
    pub base_path: PathBuf,
}

impl ContainerSettings {
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self {
            image: config.metadata.container.image.clone(),
            remove: config.metadata.container.remove,
            volume: config.metadata.container.volume.clone(),
            base_path: config.base_path.clone(),
        }
    }

    /// Same-path binds for `paths`, or the configured volume instead.
    pub fn mounts(&self, paths: &[&Path]) -> Vec<BindMount> {
        match &self.volume {
            Some(volume) => vec![BindMount::volume(volume, &self.base_path)],
            None => paths.iter().map(|p| BindMount::same_path(*p)).collect(),
        }
    }
}

/// Sets `value` at the dotted `path` inside `tree`, creating objects on the
/// way and replacing non-object intermediates.
pub fn set_at_path(tree: &mut Value, path: &str, value: Value) {
    let mut current = tree;
    let mut parts = path.split('.').filter(|p| !p.is_empty()).peekable();
    while let Some(part) = parts.next() {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return;
        }
        current = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_at_top_level() {
        let mut tree = json!({"raw": {"title": "t"}});
        set_at_path(&mut tree, "o2r", json!({"title": "T"}));
        assert_eq!(tree, json!({"raw": {"title": "t"}, "o2r": {"title": "T"}}));
    }

    #[test]
    fn test_set_at_nested_path() {
        let mut tree = json!({});
        set_at_path(&mut tree, "zenodo.metadata", json!({"upload_type": "publication"}));
        assert_eq!(
            tree,
            json!({"zenodo": {"metadata": {"upload_type": "publication"}}})
        );
    }

    #[test]
    fn test_set_replaces_scalar_intermediate() {
        let mut tree = json!({"zenodo": 1});
        set_at_path(&mut tree, "zenodo.metadata", json!(true));
        assert_eq!(tree, json!({"zenodo": {"metadata": true}}));
    }

    #[test]
    fn test_set_on_null_root() {
        let mut tree = Value::Null;
        set_at_path(&mut tree, "o2r", json!({}));
        assert_eq!(tree, json!({"o2r": {}}));
    }

    #[test]
    fn test_volume_replaces_binds() {
        let settings = ContainerSettings {
            image: "meta".to_string(),
            remove: true,
            volume: Some("o2r_data".to_string()),
            base_path: PathBuf::from("/tmp/o2r"),
        };
        let mounts = settings.mounts(&[Path::new("/tmp/o2r/compendium/x")]);
        assert_eq!(mounts, vec![BindMount::volume("o2r_data", "/tmp/o2r")]);
    }

    #[test]
    fn test_binds_without_volume() {
        let settings = ContainerSettings {
            image: "meta".to_string(),
            remove: true,
            volume: None,
            base_path: PathBuf::from("/tmp/o2r"),
        };
        let mounts = settings.mounts(&[Path::new("/a"), Path::new("/b")]);
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[1].target, PathBuf::from("/b"));
    }
}
