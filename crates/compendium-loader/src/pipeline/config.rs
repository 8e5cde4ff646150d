use std::path::PathBuf;

use crate::config::LoaderConfig;

/// Settings the driver itself reads; stage collaborators carry their own.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub base_path: PathBuf,
    pub id_length: usize,
    pub supported_content_types: Vec<String>,
    pub keep_incoming_archive: bool,
    pub validate_bag: bool,
    pub fail_on_invalid_bag: bool,
    pub fail_on_no_metadata: bool,
    pub fail_on_mapping_error: bool,
}

impl PipelineConfig {
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self {
            base_path: config.base_path.clone(),
            id_length: config.id_length,
            supported_content_types: config.supported_content_types.clone(),
            keep_incoming_archive: config.keep_incoming_archive,
            validate_bag: config.bagit.validate,
            fail_on_invalid_bag: config.bagit.fail_on_invalid,
            fail_on_no_metadata: config.metadata.extract.fail_on_no_metadata,
            fail_on_mapping_error: config.metadata.broker.fail_on_mapping_error,
        }
    }
}
