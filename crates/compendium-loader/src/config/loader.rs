use std::path::{Path, PathBuf};

use regex::Regex;

use crate::config::schema::LoaderConfig;
use crate::error::ConfigError;

pub const ENV_BASE_PATH: &str = "COMPENDIUM_LOADER_BASEPATH";
pub const ENV_DATABASE: &str = "COMPENDIUM_LOADER_DATABASE";
pub const ENV_META_IMAGE: &str = "COMPENDIUM_LOADER_META_IMAGE";

/// Config file read when none is given: `<config dir>/compendium-loader/config.yml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("compendium-loader").join("config.yml"))
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<LoaderConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

/// Parses YAML, applies environment overrides and validates the result.
pub fn load_config_from_str(content: &str) -> Result<LoaderConfig, ConfigError> {
    let mut config: LoaderConfig = if content.trim().is_empty() {
        LoaderConfig::default()
    } else {
        serde_yaml::from_str(content)?
    };

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

pub fn apply_env_overrides(config: &mut LoaderConfig) {
    if let Some(base) = non_empty_env(ENV_BASE_PATH) {
        config.base_path = PathBuf::from(base);
    }
    if let Some(db) = non_empty_env(ENV_DATABASE) {
        config.database_path = Some(PathBuf::from(db));
    }
    if let Some(image) = non_empty_env(ENV_META_IMAGE) {
        config.metadata.container.image = image;
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn validate_config(config: &LoaderConfig) -> Result<(), ConfigError> {
    if config.id_length == 0 || config.id_length > 64 {
        return Err(ConfigError::Validation {
            message: format!("id_length must be between 1 and 64, got {}", config.id_length),
        });
    }

    if config.supported_content_types.is_empty() {
        return Err(ConfigError::Validation {
            message: "supported_content_types must not be empty".to_string(),
        });
    }

    if config.encoding.supported_encodings.is_empty() {
        return Err(ConfigError::Validation {
            message: "encoding.supported_encodings must not be empty".to_string(),
        });
    }

    compile_pattern("id_regex", &config.id_regex)?;
    compile_pattern("encoding.text_file_regex", &config.encoding.text_file_regex)?;

    for (name, mapping) in &config.metadata.broker.mappings {
        if name.trim().is_empty() {
            return Err(ConfigError::InvalidMapping {
                name: name.clone(),
                reason: "Mapping name must not be empty".to_string(),
            });
        }
        if mapping.target_element.trim().is_empty() {
            return Err(ConfigError::InvalidMapping {
                name: name.clone(),
                reason: "target_element must not be empty".to_string(),
            });
        }
        if mapping.file.contains('/') || mapping.file.contains('\\') {
            return Err(ConfigError::InvalidMapping {
                name: name.clone(),
                reason: "file must be a plain file name".to_string(),
            });
        }
    }

    Ok(())
}

fn compile_pattern(name: &str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        name: name.to_string(),
        reason: e.to_string(),
    })
}
