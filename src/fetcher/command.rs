//! Subprocess-backed metadata fetcher
//!
//! Runs an external program once per work item. The program prints the JSON
//! metadata document on stdout; its stderr is kept as raw output so the
//! classifier can spot auth or rate-limit messages.

use super::http::ID_PLACEHOLDER;
use super::{FetchFailure, MetadataFetcher};
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Fetches metadata by invoking an external command
#[derive(Debug, Clone)]
pub struct CommandMetadataFetcher {
    program: String,
    args: Vec<String>,
}

impl CommandMetadataFetcher {
    /// Build from a command line (`program arg ...`).
    ///
    /// Every `{id}` in the arguments is replaced by the work item id; when no
    /// argument contains it, the id is appended as the last argument.
    pub fn new(command_line: &[String]) -> Result<Self, String> {
        let (program, args) = command_line
            .split_first()
            .ok_or_else(|| "metadata command must not be empty".to_string())?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Arguments for one id
    pub fn args_for(&self, id: &str) -> Vec<String> {
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace(ID_PLACEHOLDER, id))
            .collect();
        if !self.args.iter().any(|arg| arg.contains(ID_PLACEHOLDER)) {
            args.push(id.to_string());
        }
        args
    }
}

#[async_trait]
impl MetadataFetcher for CommandMetadataFetcher {
    async fn fetch(&self, id: &str) -> Result<Value, FetchFailure> {
        let args = self.args_for(id);
        debug!(id = %id, program = %self.program, ?args, "Running metadata command");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FetchFailure::new(format!("failed to run {}: {e}", self.program)))?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(FetchFailure::new(format!(
                "{} exited with {}",
                self.program, output.status
            ))
            .with_raw_output(stderr));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            FetchFailure::new(format!("failed to parse metadata JSON: {e}"))
                .with_raw_output(stderr)
        })
    }
}
