//! Command-line entry point for the compendium-loader binary.

use clap::Parser;

use compendium_loader::cli::Cli;
use compendium_loader::config::{default_config_path, load_config, load_config_from_str};
use compendium_loader::db::Database;
use compendium_loader::pipeline::{response, NoopProgress, Pipeline};
use compendium_loader::telemetry::{init_tracing, LogFormat};
use compendium_loader::LoaderError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_tracing(format, if cli.verbose { "debug" } else { "info" });

    let pipeline = match build_pipeline(&cli) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            eprintln!("compendium-loader: {err}");
            std::process::exit(1);
        }
    };

    let request = cli.command.into_request();
    let result = pipeline.ingest(request, &NoopProgress).await;
    let (status, body) = response(&result);
    println!("{body}");

    let exit_code = match status {
        200..=299 => 0,
        400..=499 => 2,
        _ => 1,
    };
    std::process::exit(exit_code);
}

fn build_pipeline(cli: &Cli) -> Result<Pipeline, LoaderError> {
    let path = cli
        .config
        .clone()
        .or_else(|| default_config_path().filter(|p| p.is_file()));
    let config = match path {
        Some(path) => load_config(path)?,
        None => load_config_from_str("")?,
    };
    let db = Database::open(&config.database_path())?;
    Pipeline::from_config(&config, db)
}
