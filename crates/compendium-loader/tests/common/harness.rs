//! Test harness for isolated ingestion runs.
//!
//! The `TestHarness` struct provides a complete isolated environment for
//! exercising the pipeline, including:
//! - A temporary base path with `incoming/` and `compendium/` subtrees
//! - An in-memory database
//! - A scripted sandbox runner standing in for the metadata containers
//! - A local fetcher serving share and Zenodo downloads from memory

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use compendium_loader::bagit::ManifestBagValidator;
use compendium_loader::config::{LoaderConfig, MappingConfig};
use compendium_loader::db::{compendium_repo, CompendiumRow, Database};
use compendium_loader::error::SandboxError;
use compendium_loader::pipeline::{
    IngestError, IngestRequest, IngestSuccess, NoopProgress, Pipeline, ProgressEvent,
    ProgressReporter,
};
use compendium_loader::sandbox::{SandboxInvocation, SandboxOutput, SandboxRunner};
use compendium_loader::source::{
    ArchiveFetcher, DavEntry, DavRequest, SourceDescriptor, SourceError,
};

use super::builders::ArchiveBuilder;

pub const OWNER: &str = "0000-0001-6021-1617";

/// Output one brokering mapping produces; `None` makes its container fail.
#[derive(Debug, Clone)]
pub struct BrokerScript {
    pub mapping_file: String,
    pub output_file: String,
    pub body: Option<String>,
}

#[derive(Default)]
struct Script {
    extract_exit: i32,
    extract_files: Vec<(String, String)>,
    brokers: Vec<BrokerScript>,
    on_extract: Option<Box<dyn Fn() + Send>>,
}

/// Sandbox runner writing canned outputs into the mounted directories.
#[derive(Default)]
pub struct ScriptedRunner {
    script: Mutex<Script>,
    invocations: Mutex<Vec<SandboxInvocation>>,
}

impl ScriptedRunner {
    pub fn fail_extraction(&self, exit_code: i32) {
        self.script.lock().unwrap().extract_exit = exit_code;
    }

    /// Files the extraction container leaves in its output directory.
    pub fn extract_files(&self, files: &[(&str, &str)]) {
        self.script.lock().unwrap().extract_files = files
            .iter()
            .map(|(name, body)| (name.to_string(), body.to_string()))
            .collect();
    }

    /// Runs `hook` while the extraction container is running.
    pub fn on_extract(&self, hook: impl Fn() + Send + 'static) {
        self.script.lock().unwrap().on_extract = Some(Box::new(hook));
    }

    pub fn broker(&self, script: BrokerScript) {
        self.script.lock().unwrap().brokers.push(script);
    }

    pub fn invocations(&self) -> Vec<SandboxInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn invocation(&self, prefix: &str) -> Option<SandboxInvocation> {
        self.invocations()
            .into_iter()
            .find(|i| i.name.starts_with(prefix))
    }
}

#[async_trait]
impl SandboxRunner for ScriptedRunner {
    async fn run(&self, invocation: &SandboxInvocation) -> Result<SandboxOutput, SandboxError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        let script = self.script.lock().unwrap();
        let output_dir = PathBuf::from(invocation.arg_value("--outputdir").unwrap());

        if invocation.name.starts_with("meta_extract_") {
            if let Some(hook) = &script.on_extract {
                hook();
            }
            if script.extract_exit != 0 {
                return Ok(SandboxOutput {
                    exit_code: script.extract_exit,
                    logs: vec!["extraction crashed".to_string()],
                });
            }
            for (name, body) in &script.extract_files {
                std::fs::write(output_dir.join(name), body).unwrap();
            }
            return Ok(SandboxOutput {
                exit_code: 0,
                logs: Vec::new(),
            });
        }

        let map = invocation.arg_value("--map").unwrap_or_default();
        match script.brokers.iter().find(|b| b.mapping_file == map) {
            Some(BrokerScript {
                output_file,
                body: Some(body),
                ..
            }) => {
                std::fs::write(output_dir.join(output_file), body).unwrap();
                Ok(SandboxOutput {
                    exit_code: 0,
                    logs: Vec::new(),
                })
            }
            _ => Ok(SandboxOutput {
                exit_code: 1,
                logs: vec![format!("mapping {} failed", map)],
            }),
        }
    }
}

/// Fetcher serving registered bodies and share listings by URL.
#[derive(Default)]
pub struct LocalFetcher {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    listings: Mutex<HashMap<String, Vec<DavEntry>>>,
}

impl LocalFetcher {
    pub fn serve(&self, url: &str, body: Vec<u8>) {
        self.bodies.lock().unwrap().insert(url.to_string(), body);
    }

    pub fn serve_listing(&self, url: &str, entries: Vec<DavEntry>) {
        self.listings
            .lock()
            .unwrap()
            .insert(url.to_string(), entries);
    }

    fn body(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| SourceError::Http {
                url: url.to_string(),
                status: 404,
            })
    }
}

#[async_trait]
impl ArchiveFetcher for LocalFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, SourceError> {
        Ok(String::from_utf8_lossy(&self.body(url)?).into_owned())
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<u64, SourceError> {
        let body = self.body(url)?;
        std::fs::write(destination, &body).unwrap();
        Ok(body.len() as u64)
    }

    async fn list_share(&self, request: &DavRequest) -> Result<Vec<DavEntry>, SourceError> {
        self.listings
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .ok_or_else(|| SourceError::Http {
                url: request.url.clone(),
                status: 404,
            })
    }

    async fn download_share_file(
        &self,
        request: &DavRequest,
        destination: &Path,
    ) -> Result<u64, SourceError> {
        self.download(&request.url, destination).await
    }
}

/// Collects every progress event.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Test harness providing an isolated ingestion environment.
pub struct TestHarness {
    temp_dir: TempDir,
    pub config: LoaderConfig,
    pub db: Database,
    pub runner: Arc<ScriptedRunner>,
    pub fetcher: Arc<LocalFetcher>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Harness whose default configuration is adjusted by `adjust`.
    pub fn with_config(adjust: impl FnOnce(&mut LoaderConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut config = LoaderConfig::default();
        config.base_path = temp_dir.path().join("o2r");
        adjust(&mut config);

        Self {
            temp_dir,
            config,
            db: Database::open_in_memory().expect("Failed to open database"),
            runner: Arc::new(ScriptedRunner::default()),
            fetcher: Arc::new(LocalFetcher::default()),
        }
    }

    /// Configures an additional brokering mapping.
    pub fn add_mapping(&mut self, name: &str, mapping_file: &str, file: &str, target: &str) {
        self.config.metadata.broker.mappings.insert(
            name.to_string(),
            MappingConfig {
                mapping_file: mapping_file.to_string(),
                file: file.to_string(),
                target_element: target.to_string(),
            },
        );
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::with_collaborators(
            &self.config,
            self.db.clone(),
            self.runner.clone(),
            self.fetcher.clone(),
            Arc::new(ManifestBagValidator::new(
                &self.config.bagit.payload_directory,
                self.config.bagit.validate_fast,
            )),
        )
        .expect("Failed to build pipeline")
    }

    /// A path inside the temporary directory, outside the base path.
    pub fn temp_path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `archive` as a zip outside the base path.
    pub fn write_archive(&self, name: &str, archive: &ArchiveBuilder) -> PathBuf {
        let uploads = self.temp_dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        let path = uploads.join(name);
        archive.write_zip(&path);
        path
    }

    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestSuccess, IngestError> {
        self.pipeline().ingest(request, &NoopProgress).await
    }

    pub async fn upload(
        &self,
        archive: &ArchiveBuilder,
        content_type: &str,
    ) -> Result<IngestSuccess, IngestError> {
        let path = self.write_archive("upload.zip", archive);
        self.ingest(upload_request(&path, content_type)).await
    }

    pub fn compendium_dir(&self) -> PathBuf {
        self.config.compendium_dir()
    }

    pub fn incoming_dir(&self) -> PathBuf {
        self.config.incoming_dir()
    }

    /// Sorted names directly below `dir`; empty when it does not exist.
    pub fn entries(&self, dir: &Path) -> Vec<String> {
        let Ok(read) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = read
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn record(&self, id: &str) -> Option<CompendiumRow> {
        compendium_repo::find_by_id(&self.db, id).unwrap()
    }
}

pub fn upload_request(path: &Path, content_type: &str) -> IngestRequest {
    IngestRequest {
        owner: OWNER.to_string(),
        content_type: content_type.to_string(),
        source: SourceDescriptor::Upload {
            path: path.to_path_buf(),
            mime: Some("application/zip".to_string()),
        },
    }
}
