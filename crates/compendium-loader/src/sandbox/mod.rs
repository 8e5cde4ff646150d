//! Isolated execution of external tools in containers.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::SandboxError;

pub mod docker;

pub use docker::DockerRunner;

/// A directory made visible inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    /// Host path or named volume.
    pub source: String,
    pub target: PathBuf,
    pub read_only: bool,
}

impl BindMount {
    /// Mounts `path` at the same location inside the container.
    pub fn same_path(path: impl Into<PathBuf>) -> Self {
        let target = path.into();
        Self {
            source: target.to_string_lossy().into_owned(),
            target,
            read_only: false,
        }
    }

    pub fn volume(name: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: name.into(),
            target: target.into(),
            read_only: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxInvocation {
    /// Container name, used for log correlation.
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub mounts: Vec<BindMount>,
    /// Remove the container after it exits.
    pub remove: bool,
}

impl SandboxInvocation {
    /// Value following `flag` in the command, if any.
    pub fn arg_value(&self, flag: &str) -> Option<&str> {
        self.command
            .iter()
            .position(|arg| arg == flag)
            .and_then(|i| self.command.get(i + 1))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxOutput {
    pub exit_code: i32,
    pub logs: Vec<String>,
}

impl SandboxOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last `lines` log lines joined by newlines.
    pub fn log_tail(&self, lines: usize) -> String {
        let start = self.logs.len().saturating_sub(lines);
        self.logs[start..].join("\n")
    }
}

/// Runs one containerized tool invocation to completion.
///
/// A non-zero exit is reported through [`SandboxOutput::exit_code`], not as
/// an error; errors mean the container could not be run at all.
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    async fn run(&self, invocation: &SandboxInvocation) -> Result<SandboxOutput, SandboxError>;
}
