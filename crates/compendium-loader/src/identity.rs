//! Compendium identifiers: random tokens and declared ids.

use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;

use crate::error::ConfigError;

const TOKEN_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Random source unavailable: {0}")]
    Random(String),

    #[error("Failed to read configuration file '{path}': {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file: {0}")]
    ParseConfig(#[from] serde_yaml::Error),

    #[error("No id declared in configuration file")]
    MissingId,

    #[error("Declared id '{0}' does not match the id format")]
    InvalidId(String),
}

/// Generates an alphanumeric token of `length` characters.
pub fn generate_id(length: usize) -> Result<String, IdentityError> {
    let mut id = String::with_capacity(length);
    let mut buf = [0u8; 64];
    // 248 is the largest multiple of the alphabet size below 256, which
    // keeps the distribution uniform.
    let limit = (256 / TOKEN_ALPHABET.len() * TOKEN_ALPHABET.len()) as u8;
    while id.len() < length {
        getrandom::fill(&mut buf).map_err(|e| IdentityError::Random(e.to_string()))?;
        for byte in buf.iter().copied().filter(|b| *b < limit) {
            if id.len() == length {
                break;
            }
            id.push(TOKEN_ALPHABET[byte as usize % TOKEN_ALPHABET.len()] as char);
        }
    }
    Ok(id)
}

/// Reads the `id` field of a compendium configuration file.
///
/// Numeric ids are accepted and converted to their decimal form.
pub fn read_declared_id(config_path: &Path) -> Result<String, IdentityError> {
    let content =
        std::fs::read_to_string(config_path).map_err(|e| IdentityError::ReadConfig {
            path: config_path.to_path_buf(),
            source: e,
        })?;
    let doc: serde_yaml::Value = serde_yaml::from_str(&content)?;

    let id = match doc.get("id") {
        Some(serde_yaml::Value::String(s)) => s.trim().to_string(),
        Some(serde_yaml::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };

    if id.is_empty() {
        return Err(IdentityError::MissingId);
    }
    Ok(id)
}

/// Validates declared ids against the configured format.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    id_regex: Regex,
}

impl IdentityResolver {
    pub fn new(id_regex: Regex) -> Self {
        Self { id_regex }
    }

    pub fn from_pattern(pattern: &str) -> Result<Self, ConfigError> {
        let id_regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            name: "id_regex".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(id_regex))
    }

    pub fn is_valid(&self, id: &str) -> bool {
        self.id_regex.is_match(id)
    }

    /// Reads and validates the declared id.
    pub fn declared_id(&self, config_path: &Path) -> Result<String, IdentityError> {
        let id = read_declared_id(config_path)?;
        if !self.is_valid(&id) {
            return Err(IdentityError::InvalidId(id));
        }
        Ok(id)
    }
}
