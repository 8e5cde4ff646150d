//! Command-line interface definitions.
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint};

use crate::pipeline::IngestRequest;
use crate::source::SourceDescriptor;

const CLI_EXAMPLES: &str = "Examples:\n  compendium-loader upload paper.zip --owner 0000-0001-6021-1617 --content-type compendium\n  compendium-loader share https://uni-muenster.sciebo.de/s/G8vxQ1h50V4HpuA --owner 0000-0001-6021-1617 --path /workspace\n  compendium-loader zenodo 10.5281/zenodo.268443 --owner 0000-0001-6021-1617\n";

#[derive(Debug, Parser)]
#[command(
    name = "compendium-loader",
    version,
    about = "Ingest research compendia from uploads, public shares, and Zenodo",
    after_help = CLI_EXAMPLES,
    arg_required_else_help = true
)]
pub struct Cli {
    /// YAML configuration file. Falls back to
    /// `<config dir>/compendium-loader/config.yml`, then built-in defaults.
    #[arg(long, short = 'c', global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Log at debug level unless `RUST_LOG` is set.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest a local archive file.
    Upload(UploadArgs),
    /// Ingest a public WebDAV share (Zenodo and DOI links are routed to Zenodo).
    Share(ShareArgs),
    /// Ingest a Zenodo record by id, DOI, or record URL.
    Zenodo(ZenodoArgs),
}

/// Arguments every ingestion takes.
#[derive(Debug, Args, Clone)]
pub struct RequestArgs {
    /// Identifier of the user the compendium belongs to.
    #[arg(long)]
    pub owner: String,
    /// Declared content type.
    #[arg(long = "content-type", default_value = "compendium")]
    pub content_type: String,
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    pub archive: PathBuf,
    /// MIME type the archive was submitted with.
    #[arg(long)]
    pub mime: Option<String>,
    #[command(flatten)]
    pub request: RequestArgs,
}

#[derive(Debug, Args)]
pub struct ShareArgs {
    #[arg(value_hint = ValueHint::Url)]
    pub url: String,
    /// Directory or zip file inside the share.
    #[arg(long)]
    pub path: Option<String>,
    #[command(flatten)]
    pub request: RequestArgs,
}

#[derive(Debug, Args)]
pub struct ZenodoArgs {
    /// Record id, DOI, or record URL.
    pub record: String,
    /// `zenodo.org` or `sandbox.zenodo.org`.
    #[arg(long)]
    pub host: Option<String>,
    /// File in the record to load instead of the first linked zip.
    #[arg(long)]
    pub filename: Option<String>,
    #[command(flatten)]
    pub request: RequestArgs,
}

impl Commands {
    pub fn into_request(self) -> IngestRequest {
        let (request, source) = match self {
            Commands::Upload(args) => (
                args.request,
                SourceDescriptor::Upload {
                    path: args.archive,
                    mime: args.mime,
                },
            ),
            Commands::Share(args) => (
                args.request,
                SourceDescriptor::for_share_url(&args.url, args.path),
            ),
            Commands::Zenodo(args) => (
                args.request,
                SourceDescriptor::Zenodo {
                    record: args.record,
                    host: args.host,
                    filename: args.filename,
                },
            ),
        };
        IngestRequest {
            owner: request.owner,
            content_type: request.content_type,
            source,
        }
    }
}
