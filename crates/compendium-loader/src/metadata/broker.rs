use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::Value;
use tracing::{info, warn, Instrument};

use crate::config::{LoaderConfig, MappingConfig};
use crate::sandbox::{SandboxInvocation, SandboxRunner};

use super::{ContainerSettings, MetadataError};

/// Result of brokering raw metadata through one mapping.
#[derive(Debug)]
pub struct MappingOutcome {
    pub mapping: String,
    pub target_element: String,
    pub result: Result<Value, MetadataError>,
}

pub struct MetadataBroker {
    runner: Arc<dyn SandboxRunner>,
    container: ContainerSettings,
    module: String,
    mappings: BTreeMap<String, MappingConfig>,
}

impl MetadataBroker {
    pub fn from_config(config: &LoaderConfig, runner: Arc<dyn SandboxRunner>) -> Self {
        Self {
            runner,
            container: ContainerSettings::from_config(config),
            module: config.metadata.broker.module.clone(),
            mappings: config.metadata.broker.mappings.clone(),
        }
    }

    pub fn mappings(&self) -> &BTreeMap<String, MappingConfig> {
        &self.mappings
    }

    pub fn build_invocation(
        &self,
        id: &str,
        name: &str,
        mapping: &MappingConfig,
        raw_file: &Path,
        metadata_dir: &Path,
    ) -> SandboxInvocation {
        SandboxInvocation {
            name: format!("meta_broker_{}_{}", id, name),
            image: self.container.image.clone(),
            command: vec![
                "-debug".to_string(),
                self.module.clone(),
                "--inputfile".to_string(),
                raw_file.display().to_string(),
                "--map".to_string(),
                mapping.mapping_file.clone(),
                "--outputdir".to_string(),
                metadata_dir.display().to_string(),
            ],
            mounts: self.container.mounts(&[metadata_dir]),
            remove: self.container.remove,
        }
    }

    /// Runs every configured mapping concurrently and joins the results.
    ///
    /// A failing mapping only affects its own outcome.
    pub async fn broker_all(
        &self,
        id: &str,
        raw_file: &Path,
        metadata_dir: &Path,
    ) -> Vec<MappingOutcome> {
        let runs = self.mappings.iter().map(|(name, mapping)| {
            let span = tracing::info_span!("broker_mapping", mapping = %name);
            async move {
                let result = self
                    .broker_one(id, name, mapping, raw_file, metadata_dir)
                    .await;
                match &result {
                    Ok(_) => info!("Mapping succeeded"),
                    Err(e) => warn!(error = %e, "Mapping failed"),
                }
                MappingOutcome {
                    mapping: name.clone(),
                    target_element: mapping.target_element.clone(),
                    result,
                }
            }
            .instrument(span)
        });

        join_all(runs).await
    }

    async fn broker_one(
        &self,
        id: &str,
        name: &str,
        mapping: &MappingConfig,
        raw_file: &Path,
        metadata_dir: &Path,
    ) -> Result<Value, MetadataError> {
        let invocation = self.build_invocation(id, name, mapping, raw_file, metadata_dir);
        let output = self.runner.run(&invocation).await?;
        if !output.success() {
            return Err(MetadataError::ToolFailed {
                name: invocation.name,
                exit_code: output.exit_code,
                tail: output.log_tail(20),
            });
        }

        let output_file = metadata_dir.join(&mapping.file);
        let content = tokio::fs::read_to_string(&output_file)
            .await
            .map_err(|e| MetadataError::ReadOutput {
                path: output_file.clone(),
                source: e,
            })?;
        serde_json::from_str(&content).map_err(|e| MetadataError::Parse {
            file: mapping.file.clone(),
            source: e,
        })
    }
}
