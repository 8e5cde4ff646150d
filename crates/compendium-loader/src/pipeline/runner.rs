use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::archive::{self, extract_archive, strip_single_basedir};
use crate::bagit::{BagValidator, ManifestBagValidator};
use crate::classify::StructuralClassifier;
use crate::config::LoaderConfig;
use crate::db::{compendium_repo, CompendiumRow, Database, DatabaseError};
use crate::encoding::ContentValidator;
use crate::error::{ConfigError, LoaderError};
use crate::identity::{self, IdentityResolver};
use crate::metadata::{set_at_path, ExtractionOutcome, MetadataBroker, MetadataExtractor};
use crate::sandbox::{DockerRunner, SandboxRunner};
use crate::sanitize;
use crate::source::{ArchiveFetcher, HttpFetcher, SourceDescriptor, SourceResolver};
use crate::storage::{remove_dir_if_exists, remove_file_if_exists, PayloadStore};

use super::config::PipelineConfig;
use super::context::{IngestRequest, PipelineContext};
use super::error::{IngestError, PipelineWarning, UNKNOWN_MESSAGE};
use super::progress::{ProgressEvent, ProgressReporter};
use super::stage::Stage;

const COMPENDIUM_CONTENT_TYPE: &str = "compendium";

/// A persisted ingestion.
#[derive(Debug, Clone)]
pub struct IngestSuccess {
    pub id: String,
    pub upload_id: String,
    pub payload_path: PathBuf,
    pub source_url: Option<String>,
    pub warnings: Vec<PipelineWarning>,
}

impl IngestSuccess {
    /// Caller-facing JSON body: `{"id": ...}`, plus `share_url` for remote
    /// sources.
    pub fn body(&self) -> Value {
        match &self.source_url {
            Some(url) => json!({ "id": self.id, "share_url": url }),
            None => json!({ "id": self.id }),
        }
    }
}

/// HTTP status and JSON body for a finished ingestion.
pub fn response(result: &Result<IngestSuccess, IngestError>) -> (u16, Value) {
    match result {
        Ok(success) => (200, success.body()),
        Err(e) => (e.status(), e.body()),
    }
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    db: Database,
    store: PayloadStore,
    sources: SourceResolver,
    classifier: StructuralClassifier,
    validator: ContentValidator,
    identity: IdentityResolver,
    bag_validator: Arc<dyn BagValidator>,
    extractor: MetadataExtractor,
    broker: MetadataBroker,
}

impl Pipeline {
    /// Production constructor: docker for sandboxed tools, HTTP for remote
    /// sources.
    pub fn from_config(config: &LoaderConfig, db: Database) -> Result<Self, LoaderError> {
        let runner = Arc::new(DockerRunner::new(&config.metadata.container.program));
        let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(
            config.sources.download_timeout_secs,
        ))?);
        let bag_validator = Arc::new(ManifestBagValidator::new(
            &config.bagit.payload_directory,
            config.bagit.validate_fast,
        ));
        Ok(Self::with_collaborators(
            config,
            db,
            runner,
            fetcher,
            bag_validator,
        )?)
    }

    /// Constructor with injected sandbox runner, fetcher and bag validator.
    pub fn with_collaborators(
        config: &LoaderConfig,
        db: Database,
        runner: Arc<dyn SandboxRunner>,
        fetcher: Arc<dyn ArchiveFetcher>,
        bag_validator: Arc<dyn BagValidator>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            config: Arc::new(PipelineConfig::from_config(config)),
            db,
            store: PayloadStore::from_config(config),
            sources: SourceResolver::new(&config.sources, fetcher),
            classifier: StructuralClassifier::from_config(config),
            validator: ContentValidator::from_config(&config.encoding)?,
            identity: IdentityResolver::from_pattern(&config.id_regex)?,
            bag_validator,
            extractor: MetadataExtractor::from_config(config, runner.clone()),
            broker: MetadataBroker::from_config(config, runner),
        })
    }

    pub fn store(&self) -> &PayloadStore {
        &self.store
    }

    /// Runs the plan for the request's source to completion or first
    /// failure, then rolls back and cleans up.
    pub async fn ingest(
        &self,
        request: IngestRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<IngestSuccess, IngestError> {
        let upload_id = identity::generate_id(self.config.id_length)?;
        let span = info_span!("ingest",
            id = %upload_id,
            source = request.source.kind(),
            origin = %request.source.redacted(),
        );
        let ctx = PipelineContext::new(request, upload_id);
        self.run(ctx, progress).instrument(span).await
    }

    async fn run(
        &self,
        mut ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<IngestSuccess, IngestError> {
        let plan = Stage::plan_for(&ctx.request.source);
        info!(owner = %ctx.request.owner, content_type = %ctx.request.content_type, "Ingestion started");

        for &stage in plan {
            progress.report(ProgressEvent::StageStarted { stage });
            let result = self
                .run_stage(stage, &mut ctx)
                .instrument(info_span!("stage", name = stage.name()))
                .await;
            if let Err(e) = result {
                warn!(
                    stage = stage.name(),
                    status = e.status(),
                    error = %sanitize::strip_base(&e.to_string(), &self.config.base_path),
                    "Stage failed"
                );
                progress.report(ProgressEvent::Failed {
                    stage,
                    error: e.user_message(),
                });
                ctx.failure = Some(e);
                break;
            }
            debug!(stage = stage.name(), "Stage completed");
        }

        if ctx.failure.is_some() {
            self.rollback(&ctx);
        }
        self.cleanup(&ctx);

        if let Some(e) = ctx.failure.take() {
            return Err(e);
        }

        let payload_path = ctx
            .payload_path
            .clone()
            .ok_or_else(|| IngestError::internal(UNKNOWN_MESSAGE, "no payload after save"))?;
        info!(id = %ctx.id, warnings = ctx.warnings.len(), "Ingestion completed");
        progress.report(ProgressEvent::Completed { id: ctx.id.clone() });

        Ok(IngestSuccess {
            id: ctx.id,
            upload_id: ctx.upload_id,
            payload_path,
            source_url: ctx.source_url,
            warnings: ctx.warnings,
        })
    }

    async fn run_stage(&self, stage: Stage, ctx: &mut PipelineContext) -> Result<(), IngestError> {
        match stage {
            Stage::ValidateRequest => self.step_validate_request(ctx),
            Stage::ResolveSource => self.step_resolve_source(ctx).await,
            Stage::Extract => self.step_extract(ctx).await,
            Stage::StripBasedir => self.step_strip_basedir(ctx),
            Stage::CollectTextFiles => self.step_collect_text_files(ctx),
            Stage::CheckEncoding => self.step_check_encoding(ctx),
            Stage::DetectBag => self.step_detect_bag(ctx),
            Stage::ValidateBag => self.step_validate_bag(ctx).await,
            Stage::DetectCompendium => self.step_detect_compendium(ctx),
            Stage::ResolveIdentity => self.step_resolve_identity(ctx),
            Stage::MovePayload => self.step_move_payload(ctx),
            Stage::ExtractMetadata => self.step_extract_metadata(ctx).await,
            Stage::LoadMetadata => self.step_load_metadata(ctx).await,
            Stage::BrokerMetadata => self.step_broker_metadata(ctx).await,
            Stage::Save => self.step_save(ctx),
        }
    }

    fn step_validate_request(&self, ctx: &mut PipelineContext) -> Result<(), IngestError> {
        let supported = &self.config.supported_content_types;
        if !supported.contains(&ctx.request.content_type) {
            let list = serde_json::to_string(supported)
                .map_err(|e| IngestError::internal(UNKNOWN_MESSAGE, e))?;
            return Err(IngestError::validation(format!(
                "Provided content_type \"{}\" not implemented, only {} supported.",
                ctx.request.content_type, list
            )));
        }

        if let SourceDescriptor::Upload {
            mime: Some(mime), ..
        } = &ctx.request.source
        {
            if !archive::is_supported_mime(mime) {
                return Err(IngestError::validation(
                    "extraction failed: unsupported mimetype",
                ));
            }
        }
        Ok(())
    }

    async fn step_resolve_source(&self, ctx: &mut PipelineContext) -> Result<(), IngestError> {
        self.store.ensure_layout()?;
        let destination = self.store.incoming_path(&ctx.upload_id);
        // Registered before the download so partial files are cleaned up.
        ctx.archive_path = Some(destination.clone());

        let resolved = self
            .sources
            .resolve(&ctx.request.source, &destination)
            .await?;
        ctx.source_url = resolved.source_url;
        Ok(())
    }

    async fn step_extract(&self, ctx: &mut PipelineContext) -> Result<(), IngestError> {
        let archive = required(&ctx.archive_path, "archive")?;
        let target = self.store.payload_path(&ctx.upload_id);
        ctx.rollback_paths.push(target.clone());
        ctx.payload_path = Some(target.clone());

        let summary = tokio::task::spawn_blocking(move || extract_archive(&archive, &target))
            .await
            .map_err(|e| IngestError::internal(UNKNOWN_MESSAGE, e))??;
        info!(
            format = ?summary.format,
            files = summary.files,
            directories = summary.directories,
            "Archive extracted"
        );
        Ok(())
    }

    fn step_strip_basedir(&self, ctx: &mut PipelineContext) -> Result<(), IngestError> {
        let payload = required(&ctx.payload_path, "payload")?;
        match strip_single_basedir(&payload) {
            Ok(Some(name)) => debug!(basedir = %name, "Stripped single base directory"),
            Ok(None) => debug!("No single base directory to strip"),
            Err(e) => return Err(IngestError::internal("stripping base dir failed", e)),
        }
        Ok(())
    }

    fn step_collect_text_files(&self, ctx: &mut PipelineContext) -> Result<(), IngestError> {
        let payload = required(&ctx.payload_path, "payload")?;
        ctx.text_files = self.validator.collect_text_files(&payload)?;
        Ok(())
    }

    fn step_check_encoding(&self, ctx: &mut PipelineContext) -> Result<(), IngestError> {
        let payload = required(&ctx.payload_path, "payload")?;
        let violations = self.validator.check(&payload, &ctx.text_files)?;
        if !violations.is_empty() {
            return Err(IngestError::Encoding { files: violations });
        }
        debug!(files = ctx.text_files.len(), "All text files passed encoding check");
        Ok(())
    }

    fn step_detect_bag(&self, ctx: &mut PipelineContext) -> Result<(), IngestError> {
        let payload = required(&ctx.payload_path, "payload")?;
        ctx.is_bag = self.classifier.detect_bag(&payload);
        debug!(is_bag = ctx.is_bag, "Bag detection");
        Ok(())
    }

    async fn step_validate_bag(&self, ctx: &mut PipelineContext) -> Result<(), IngestError> {
        if !ctx.is_bag || !self.config.validate_bag {
            return Ok(());
        }
        let payload = required(&ctx.payload_path, "payload")?;
        let Err(e) = self.bag_validator.validate(&payload).await else {
            debug!("Bag is valid");
            return Ok(());
        };

        let reason = sanitize::strip_base(
            &sanitize::strip_base(&e.to_string(), &payload),
            &self.config.base_path,
        );
        if self.config.fail_on_invalid_bag {
            return Err(IngestError::validation(format!("bag is invalid: {}", reason)));
        }
        warn!(reason = %reason, "Bag is invalid, continuing");
        ctx.warn(PipelineWarning::InvalidBag { reason });
        Ok(())
    }

    fn step_detect_compendium(&self, ctx: &mut PipelineContext) -> Result<(), IngestError> {
        let payload = required(&ctx.payload_path, "payload")?;
        ctx.config_path = self.classifier.detect_compendium(&payload, ctx.is_bag);
        ctx.is_compendium = ctx.config_path.is_some();
        debug!(is_compendium = ctx.is_compendium, "Compendium detection");

        if !ctx.is_compendium && ctx.request.content_type == COMPENDIUM_CONTENT_TYPE {
            return Err(IngestError::validation(format!(
                "content_type is {} but no compendium provided.",
                COMPENDIUM_CONTENT_TYPE
            )));
        }
        Ok(())
    }

    fn step_resolve_identity(&self, ctx: &mut PipelineContext) -> Result<(), IngestError> {
        if !ctx.is_compendium {
            return Ok(());
        }
        let config_path = required(&ctx.config_path, "configuration file")?;
        let declared = self.identity.declared_id(&config_path)?;

        let existing = compendium_repo::find_by_id(&self.db, &declared)
            .map_err(|e| IngestError::internal(UNKNOWN_MESSAGE, e))?;
        if let Some(row) = existing {
            warn!(id = %declared, existing_owner = %row.owner, "Declared id already exists");
            return Err(IngestError::Conflict {
                id: declared,
                existing_owner: Some(row.owner),
            });
        }

        info!(declared = %declared, "Adopting declared id");
        ctx.id = declared;
        Ok(())
    }

    fn step_move_payload(&self, ctx: &mut PipelineContext) -> Result<(), IngestError> {
        let payload = required(&ctx.payload_path, "payload")?;
        let outcome = self
            .store
            .move_to_canonical(&payload, &ctx.id, &ctx.upload_id)
            .map_err(|e| IngestError::internal("moving compendium files to new location failed", e))?;

        if let Some(backup) = &outcome.moved_aside {
            let redacted = sanitize::redact_path(backup);
            warn!(backup = %redacted, "Stale payload renamed aside");
            ctx.warn(PipelineWarning::MovedAside { backup: redacted });
            ctx.moved_aside = Some((backup.clone(), outcome.destination.clone()));
        }

        if outcome.destination != payload {
            ctx.config_path = ctx
                .config_path
                .as_deref()
                .map(|p| rebase(p, &payload, &outcome.destination));
            ctx.text_files = ctx
                .text_files
                .iter()
                .map(|p| rebase(p, &payload, &outcome.destination))
                .collect();
            ctx.rollback_paths.push(outcome.destination.clone());
            debug!(id = %ctx.id, "Payload moved to canonical location");
        }
        ctx.payload_path = Some(outcome.destination);
        Ok(())
    }

    async fn step_extract_metadata(&self, ctx: &mut PipelineContext) -> Result<(), IngestError> {
        let payload = required(&ctx.payload_path, "payload")?;
        let content_root = self.classifier.content_root(&payload, ctx.is_bag);

        let outcome = self
            .extractor
            .extract(&ctx.id, &payload, &content_root)
            .await
            .map_err(|e| IngestError::ExternalTool {
                tool: "metadata extraction".to_string(),
                detail: e.to_string(),
            })?;

        if let ExtractionOutcome::Empty { .. } = &outcome {
            self.no_metadata(ctx, "no files in the metadata directory")?;
        }
        ctx.metadata_dir = Some(outcome.output_dir().to_path_buf());
        Ok(())
    }

    async fn step_load_metadata(&self, ctx: &mut PipelineContext) -> Result<(), IngestError> {
        let Some(dir) = ctx.metadata_dir.clone() else {
            return self.no_metadata(ctx, "no metadata directory");
        };

        let raw = match self.extractor.load_raw(&dir).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return self.no_metadata(ctx, "no raw metadata file"),
            Err(e) => {
                warn!(error = %e, "Raw metadata could not be loaded");
                return self.no_metadata(ctx, "raw metadata could not be loaded");
            }
        };

        let mut raw = raw;
        if let (Some(url), Some(object)) = (&ctx.source_url, raw.as_object_mut()) {
            object.insert("source".to_string(), Value::String(url.clone()));
        }
        set_at_path(&mut ctx.metadata, "raw", raw);
        debug!("Raw metadata loaded");
        Ok(())
    }

    async fn step_broker_metadata(&self, ctx: &mut PipelineContext) -> Result<(), IngestError> {
        let Some(dir) = ctx.metadata_dir.clone() else {
            debug!("No metadata directory to broker from");
            return Ok(());
        };
        if ctx.raw_metadata().is_none() {
            debug!("No raw metadata to broker");
            return Ok(());
        }
        let raw_file = self.extractor.best_candidate_path(&dir);

        let outcomes = self.broker.broker_all(&ctx.id, &raw_file, &dir).await;
        for outcome in outcomes {
            match outcome.result {
                Ok(value) => set_at_path(&mut ctx.metadata, &outcome.target_element, value),
                Err(e) if self.config.fail_on_mapping_error => {
                    return Err(IngestError::ExternalTool {
                        tool: "metadata brokering".to_string(),
                        detail: format!("mapping {}: {}", outcome.mapping, e),
                    });
                }
                Err(e) => ctx.warn(PipelineWarning::BrokerFailed {
                    mapping: outcome.mapping,
                    error: e.to_string(),
                }),
            }
        }
        Ok(())
    }

    fn step_save(&self, ctx: &mut PipelineContext) -> Result<(), IngestError> {
        let mut row = CompendiumRow::new(&ctx.id, &ctx.request.owner);
        row.bag = ctx.is_bag;
        row.compendium = ctx.is_compendium;
        row.metadata = ctx.metadata.clone();
        row.upload_id = (ctx.id != ctx.upload_id).then(|| ctx.upload_id.clone());

        match compendium_repo::insert(&self.db, &row) {
            Ok(()) => {
                info!(id = %row.id, "Compendium saved");
                Ok(())
            }
            Err(DatabaseError::Duplicate { id }) => {
                let existing_owner = compendium_repo::find_by_id(&self.db, &id)
                    .ok()
                    .flatten()
                    .map(|r| r.owner);
                Err(IngestError::Conflict { id, existing_owner })
            }
            Err(e) => Err(IngestError::internal("Error saving new compendium", e)),
        }
    }

    /// Records missing metadata as a warning, or fails when configured to.
    fn no_metadata(&self, ctx: &mut PipelineContext, reason: &str) -> Result<(), IngestError> {
        if self.config.fail_on_no_metadata {
            return Err(IngestError::ExternalTool {
                tool: "metadata extraction".to_string(),
                detail: reason.to_string(),
            });
        }
        info!(reason, "Continuing with empty metadata");
        ctx.warn(PipelineWarning::NoMetadata);
        Ok(())
    }

    fn rollback(&self, ctx: &PipelineContext) {
        for path in ctx.rollback_paths.iter().rev() {
            match remove_dir_if_exists(path) {
                Ok(true) => info!(path = %sanitize::redact_path(path), "Rolled back payload directory"),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Rollback failed"),
            }
        }

        if let Some((backup, canonical)) = &ctx.moved_aside {
            match self.store.restore_aside(backup, canonical) {
                Ok(true) => info!(
                    path = %sanitize::redact_path(canonical),
                    "Restored stale payload directory"
                ),
                Ok(false) => warn!(
                    backup = %sanitize::redact_path(backup),
                    "Canonical path occupied, stale payload left aside"
                ),
                Err(e) => warn!(error = %e, "Failed to restore stale payload directory"),
            }
        }
    }

    fn cleanup(&self, ctx: &PipelineContext) {
        if self.config.keep_incoming_archive {
            return;
        }
        if let Some(archive) = &ctx.archive_path {
            match remove_file_if_exists(archive) {
                Ok(true) => debug!("Removed incoming archive"),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Failed to remove incoming archive"),
            }
        }
    }
}

fn required(value: &Option<PathBuf>, what: &str) -> Result<PathBuf, IngestError> {
    value
        .clone()
        .ok_or_else(|| IngestError::internal(UNKNOWN_MESSAGE, format!("{} not available", what)))
}

fn rebase(path: &Path, from: &Path, to: &Path) -> PathBuf {
    match path.strip_prefix(from) {
        Ok(relative) => to.join(relative),
        Err(_) => path.to_path_buf(),
    }
}
