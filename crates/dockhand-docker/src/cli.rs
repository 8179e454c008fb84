use std::process::Stdio;

use async_trait::async_trait;
use dockhand_core::runtime::{ContainerRuntime, RuntimeError, RuntimeUnit};
use tokio::process::Command;
use tracing::debug;

use crate::error::{DockerError, Result};
use crate::types::{PsLine, PS_FORMAT};

// ---------------------------------------------------------------------------
// DockerCli
// ---------------------------------------------------------------------------

/// Drives the `docker` command-line client, one subprocess per call.
///
/// Listing runs `docker ps --all --no-trunc --format PS_FORMAT` and reads
/// one JSON object per stdout line. Lifecycle calls run
/// `docker start|stop|restart <id>`. A non-zero exit is an error carrying the
/// captured stderr.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!(binary = %self.binary, ?args, "running docker");
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let msg = match (output.status.code(), stderr.is_empty()) {
            (Some(code), true) => format!("docker {} exited with code {code}", args[0]),
            (Some(code), false) => format!("docker {} exited with code {code}: {stderr}", args[0]),
            (None, true) => format!("docker {} terminated by signal", args[0]),
            (None, false) => format!("docker {} terminated by signal: {stderr}", args[0]),
        };
        Err(DockerError::Process(msg))
    }

    async fn ps(&self) -> Result<Vec<RuntimeUnit>> {
        let stdout = self
            .run(&["ps", "--all", "--no-trunc", "--format", PS_FORMAT])
            .await?;
        parse_ps(&stdout)
    }
}

/// Parse `docker ps` JSON-lines output. Blank lines are skipped.
pub fn parse_ps(stdout: &str) -> Result<Vec<RuntimeUnit>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str::<PsLine>(line)
                .map(RuntimeUnit::from)
                .map_err(|source| DockerError::Parse {
                    line: line.to_string(),
                    source,
                })
        })
        .collect()
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn list_units(&self) -> std::result::Result<Vec<RuntimeUnit>, RuntimeError> {
        self.ps().await.map_err(DockerError::unavailable)
    }

    async fn start(&self, id: &str) -> std::result::Result<(), RuntimeError> {
        self.run(&["start", id])
            .await
            .map(drop)
            .map_err(|e| e.rejected("start", id))
    }

    async fn stop(&self, id: &str) -> std::result::Result<(), RuntimeError> {
        self.run(&["stop", id])
            .await
            .map(drop)
            .map_err(|e| e.rejected("stop", id))
    }

    async fn restart(&self, id: &str) -> std::result::Result<(), RuntimeError> {
        self.run(&["restart", id])
            .await
            .map(drop)
            .map_err(|e| e.rejected("restart", id))
    }
}
