use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// One-shot invocation of an external tool.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub description: String,
    on_failure: fn(String) -> PipelineError,
}

impl ToolCommand {
    /// Create a new command; failures map to configuration errors until
    /// [`ToolCommand::on_failure`] says otherwise.
    pub fn new<S1: Into<String>, S2: Into<String>>(program: S1, description: S2) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            description: description.into(),
            on_failure: PipelineError::Config,
        }
    }

    /// Error variant used when the tool cannot be started or exits non-zero.
    pub fn on_failure(mut self, map: fn(String) -> PipelineError) -> Self {
        self.on_failure = map;
        self
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add a path argument
    pub fn path<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add `--flag value`
    pub fn option<S1: Into<String>, S2: Into<String>>(self, flag: S1, value: S2) -> Self {
        self.arg(flag).arg(value)
    }

    /// Run to completion and return captured stdout.
    pub async fn execute(&self) -> Result<String> {
        debug!("Executing {}: {} {:?}", self.description, self.program, self.args);

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| {
                (self.on_failure)(format!("Failed to execute {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err((self.on_failure)(format!(
                "{} failed ({}): {}",
                self.description,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Probe that a tool can be started, returning its version banner.
pub async fn check_tool_available(program: &str) -> Result<String> {
    let banner = ToolCommand::new(program, format!("{} version check", program))
        .arg("--version")
        .execute()
        .await?;
    Ok(banner.lines().next().unwrap_or_default().trim().to_string())
}
