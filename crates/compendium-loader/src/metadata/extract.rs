use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::config::LoaderConfig;
use crate::sandbox::{SandboxInvocation, SandboxRunner};

use super::{ContainerSettings, MetadataError};

/// What one extraction run left in its output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Found {
        output_dir: PathBuf,
        files: Vec<PathBuf>,
    },
    Empty {
        output_dir: PathBuf,
    },
}

impl ExtractionOutcome {
    pub fn output_dir(&self) -> &Path {
        match self {
            ExtractionOutcome::Found { output_dir, .. } => output_dir,
            ExtractionOutcome::Empty { output_dir } => output_dir,
        }
    }
}

pub struct MetadataExtractor {
    runner: Arc<dyn SandboxRunner>,
    container: ContainerSettings,
    module: String,
    output_dir: String,
    best_candidate_file: String,
    stay_offline: bool,
}

impl MetadataExtractor {
    pub fn from_config(config: &LoaderConfig, runner: Arc<dyn SandboxRunner>) -> Self {
        let extract = &config.metadata.extract;
        Self {
            runner,
            container: ContainerSettings::from_config(config),
            module: extract.module.clone(),
            output_dir: extract.output_dir.clone(),
            best_candidate_file: extract.best_candidate_file.clone(),
            stay_offline: extract.stay_offline,
        }
    }

    pub fn output_dir_for(&self, content_root: &Path) -> PathBuf {
        content_root.join(&self.output_dir)
    }

    pub fn best_candidate_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(&self.best_candidate_file)
    }

    pub fn build_invocation(
        &self,
        id: &str,
        payload_root: &Path,
        content_root: &Path,
    ) -> SandboxInvocation {
        let output_dir = self.output_dir_for(content_root);
        let mut command = vec![
            "-debug".to_string(),
            self.module.clone(),
            "--inputdir".to_string(),
            content_root.display().to_string(),
            "--outputdir".to_string(),
            output_dir.display().to_string(),
            "--metafiles".to_string(),
            "--ercid".to_string(),
            id.to_string(),
            "--basedir".to_string(),
            payload_root.display().to_string(),
        ];
        if self.stay_offline {
            command.push("--stayoffline".to_string());
        }

        SandboxInvocation {
            name: format!("meta_extract_{}", id),
            image: self.container.image.clone(),
            command,
            mounts: self.container.mounts(&[content_root, output_dir.as_path()]),
            remove: self.container.remove,
        }
    }

    /// Runs the extraction container over `content_root` and lists what it
    /// produced.
    pub async fn extract(
        &self,
        id: &str,
        payload_root: &Path,
        content_root: &Path,
    ) -> Result<ExtractionOutcome, MetadataError> {
        let output_dir = self.output_dir_for(content_root);
        // Created up front so the mount does not create it with container
        // ownership.
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| MetadataError::Prepare {
                path: output_dir.clone(),
                source: e,
            })?;

        let invocation = self.build_invocation(id, payload_root, content_root);
        let output = self.runner.run(&invocation).await?;
        if !output.success() {
            return Err(MetadataError::ToolFailed {
                name: invocation.name,
                exit_code: output.exit_code,
                tail: output.log_tail(20),
            });
        }

        let files = list_files(&output_dir).await?;
        if files.is_empty() {
            info!("Metadata extraction produced no files");
            return Ok(ExtractionOutcome::Empty { output_dir });
        }

        debug!(count = files.len(), "Metadata extraction produced files");
        Ok(ExtractionOutcome::Found { output_dir, files })
    }

    /// Parses the best candidate file, `None` when it was not produced.
    pub async fn load_raw(&self, output_dir: &Path) -> Result<Option<Value>, MetadataError> {
        let path = self.best_candidate_path(output_dir);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MetadataError::ReadOutput {
                    path,
                    source: e,
                })
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| MetadataError::Parse {
                file: self.best_candidate_file.clone(),
                source: e,
            })
    }
}

async fn list_files(dir: &Path) -> Result<Vec<PathBuf>, MetadataError> {
    let read_err = |e: std::io::Error| MetadataError::ReadOutput {
        path: dir.to_path_buf(),
        source: e,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        if entry.file_type().await.map_err(read_err)?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
