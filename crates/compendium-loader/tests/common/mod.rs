//! Shared test utilities for compendium-loader integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated ingestion with a temporary base path
//! - Scripted sandbox runner and local fetcher fakes
//! - Builders for zip archives and BagIt bags

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{BrokerScript, LocalFetcher, RecordingProgress, ScriptedRunner, TestHarness};
