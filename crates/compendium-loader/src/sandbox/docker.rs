use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use crate::error::SandboxError;

use super::{BindMount, SandboxInvocation, SandboxOutput, SandboxRunner};

/// Runs invocations through the `docker` command line client.
#[derive(Debug, Clone)]
pub struct DockerRunner {
    program: String,
}

impl DockerRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments passed to the container CLI for `invocation`.
    pub fn build_args(invocation: &SandboxInvocation) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--name".to_string(),
            invocation.name.clone(),
        ];
        if invocation.remove {
            args.push("--rm".to_string());
        }
        for mount in &invocation.mounts {
            args.push("-v".to_string());
            args.push(mount_spec(mount));
        }
        args.push(invocation.image.clone());
        args.extend(invocation.command.iter().cloned());
        args
    }
}

impl Default for DockerRunner {
    fn default() -> Self {
        Self::new("docker")
    }
}

fn mount_spec(mount: &BindMount) -> String {
    let mut spec = format!("{}:{}", mount.source, mount.target.display());
    if mount.read_only {
        spec.push_str(":ro");
    }
    spec
}

#[async_trait]
impl SandboxRunner for DockerRunner {
    async fn run(&self, invocation: &SandboxInvocation) -> Result<SandboxOutput, SandboxError> {
        info!(container = %invocation.name, image = %invocation.image, "Starting container");

        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(Self::build_args(invocation))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| SandboxError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let name = invocation.name.as_str();

        let stdout_task = async {
            let mut collected = Vec::new();
            if let Some(stdout) = stdout_pipe {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(container = %name, "{}", line);
                    collected.push(line);
                }
            }
            collected
        };

        let stderr_task = async {
            let mut collected = Vec::new();
            if let Some(stderr) = stderr_pipe {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(container = %name, stream = "stderr", "{}", line);
                    collected.push(line);
                }
            }
            collected
        };

        let (mut logs, stderr_lines) = tokio::join!(stdout_task, stderr_task);
        logs.extend(stderr_lines);

        let status = child.wait().await.map_err(|e| SandboxError::Wait {
            name: invocation.name.clone(),
            source: e,
        })?;

        let output = SandboxOutput {
            exit_code: status.code().unwrap_or(-1),
            logs,
        };

        if output.success() {
            info!(container = %invocation.name, "Container finished");
        } else {
            warn!(
                container = %invocation.name,
                exit_code = output.exit_code,
                tail = %output.log_tail(20),
                "Container exited with failure"
            );
        }

        Ok(output)
    }
}
