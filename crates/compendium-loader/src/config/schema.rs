use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
    /// Defaults to `<base_path>/loader.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_id_length")]
    pub id_length: usize,
    #[serde(default = "default_id_regex")]
    pub id_regex: String,
    #[serde(default = "default_content_types")]
    pub supported_content_types: Vec<String>,
    #[serde(default)]
    pub keep_incoming_archive: bool,
    #[serde(default)]
    pub bagit: BagitConfig,
    #[serde(default)]
    pub compendium: CompendiumConfig,
    #[serde(default)]
    pub encoding: EncodingConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

impl LoaderConfig {
    /// Transient downloaded or uploaded archives.
    pub fn incoming_dir(&self) -> PathBuf {
        self.base_path.join("incoming")
    }

    /// Canonical payload directories, one per compendium id.
    pub fn compendium_dir(&self) -> PathBuf {
        self.base_path.join("compendium")
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.base_path.join("loader.db"))
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            database_path: None,
            id_length: default_id_length(),
            id_regex: default_id_regex(),
            supported_content_types: default_content_types(),
            keep_incoming_archive: false,
            bagit: BagitConfig::default(),
            compendium: CompendiumConfig::default(),
            encoding: EncodingConfig::default(),
            metadata: MetadataConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

fn default_base_path() -> PathBuf {
    PathBuf::from("/tmp/o2r")
}

fn default_id_length() -> usize {
    20
}

fn default_id_regex() -> String {
    r"^[A-Za-z][A-Za-z0-9_.\-]{4,63}$".to_string()
}

fn default_content_types() -> Vec<String> {
    vec!["compendium".to_string(), "workspace".to_string()]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BagitConfig {
    #[serde(default = "default_bag_detection_file")]
    pub detection_file: String,
    #[serde(default = "default_payload_directory")]
    pub payload_directory: String,
    #[serde(default = "default_true")]
    pub validate: bool,
    /// Compare `Payload-Oxum` only instead of recomputing every checksum.
    #[serde(default)]
    pub validate_fast: bool,
    #[serde(default = "default_true")]
    pub fail_on_invalid: bool,
}

fn default_bag_detection_file() -> String {
    "bagit.txt".to_string()
}

fn default_payload_directory() -> String {
    "data".to_string()
}

impl Default for BagitConfig {
    fn default() -> Self {
        Self {
            detection_file: default_bag_detection_file(),
            payload_directory: default_payload_directory(),
            validate: true,
            validate_fast: false,
            fail_on_invalid: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompendiumConfig {
    #[serde(default = "default_config_file")]
    pub config_file: String,
}

fn default_config_file() -> String {
    "erc.yml".to_string()
}

impl Default for CompendiumConfig {
    fn default() -> Self {
        Self {
            config_file: default_config_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingConfig {
    #[serde(default = "default_text_file_regex")]
    pub text_file_regex: String,
    #[serde(default = "default_supported_encodings")]
    pub supported_encodings: Vec<String>,
}

fn default_text_file_regex() -> String {
    r"(?i)\.(txt|r|rmd|text|json|yml|yaml|md|csv|tex|bib|xml|html|htm|py|sh)$".to_string()
}

fn default_supported_encodings() -> Vec<String> {
    vec!["UTF-8".to_string()]
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            text_file_regex: default_text_file_regex(),
            supported_encodings: default_supported_encodings(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(default = "default_image")]
    pub image: String,
    /// Container CLI used by the docker runner.
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_true")]
    pub remove: bool,
    /// When set, bind mounts are replaced by `<volume>:<base_path>`.
    #[serde(default)]
    pub volume: Option<String>,
}

fn default_image() -> String {
    "o2rproject/o2r-meta:latest".to_string()
}

fn default_program() -> String {
    "docker".to_string()
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            program: default_program(),
            remove: true,
            volume: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    #[serde(default = "default_extract_module")]
    pub module: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_best_candidate_file")]
    pub best_candidate_file: String,
    #[serde(default)]
    pub fail_on_no_metadata: bool,
    #[serde(default = "default_true")]
    pub stay_offline: bool,
}

fn default_extract_module() -> String {
    "extract".to_string()
}

fn default_output_dir() -> String {
    ".erc".to_string()
}

fn default_best_candidate_file() -> String {
    "metadata_raw.json".to_string()
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            module: default_extract_module(),
            output_dir: default_output_dir(),
            best_candidate_file: default_best_candidate_file(),
            fail_on_no_metadata: false,
            stay_offline: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_module")]
    pub module: String,
    /// Escalate a single failing mapping to an ingestion failure.
    #[serde(default)]
    pub fail_on_mapping_error: bool,
    #[serde(default = "default_mappings")]
    pub mappings: BTreeMap<String, MappingConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Transformation ruleset path inside the container image.
    pub mapping_file: String,
    /// Output file name written into the metadata directory.
    pub file: String,
    /// Dotted key path in the metadata tree receiving the output.
    pub target_element: String,
}

fn default_broker_module() -> String {
    "broker".to_string()
}

fn default_mappings() -> BTreeMap<String, MappingConfig> {
    let mut mappings = BTreeMap::new();
    mappings.insert(
        "o2r".to_string(),
        MappingConfig {
            mapping_file: "broker/mappings/o2r-map.json".to_string(),
            file: "metadata_o2r.json".to_string(),
            target_element: "o2r".to_string(),
        },
    );
    mappings
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            module: default_broker_module(),
            fail_on_mapping_error: false,
            mappings: default_mappings(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub webdav: WebdavConfig,
    #[serde(default)]
    pub zenodo: ZenodoConfig,
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

fn default_download_timeout() -> u64 {
    120
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            webdav: WebdavConfig::default(),
            zenodo: ZenodoConfig::default(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebdavConfig {
    /// Second-level host labels accepted for public shares (`sciebo` for
    /// `uni-muenster.sciebo.de`).
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
    /// WebDAV endpoint for public links, resolved against the share URL.
    #[serde(default = "default_webdav_path")]
    pub webdav_path: String,
}

fn default_allowed_hosts() -> Vec<String> {
    vec!["sciebo".to_string()]
}

fn default_webdav_path() -> String {
    "/public.php/webdav".to_string()
}

impl Default for WebdavConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: default_allowed_hosts(),
            webdav_path: default_webdav_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZenodoConfig {
    #[serde(default = "default_zenodo_host")]
    pub default_host: String,
    #[serde(default = "default_zenodo_url")]
    pub zenodo_url: String,
    #[serde(default = "default_sandbox_url")]
    pub sandbox_url: String,
}

fn default_zenodo_host() -> String {
    "zenodo.org".to_string()
}

fn default_zenodo_url() -> String {
    "https://zenodo.org/record/".to_string()
}

fn default_sandbox_url() -> String {
    "https://sandbox.zenodo.org/record/".to_string()
}

impl Default for ZenodoConfig {
    fn default() -> Self {
        Self {
            default_host: default_zenodo_host(),
            zenodo_url: default_zenodo_url(),
            sandbox_url: default_sandbox_url(),
        }
    }
}
