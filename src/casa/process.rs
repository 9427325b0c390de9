// CASA process invocation
// Writes a script to its cycle-keyed path and runs `casa --nogui -c <script>`

use log::{error, info};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::script::CasaScript;
use crate::error::{Result, SelfcalError};

/// Configuration for the CASA executable
#[derive(Debug, Clone)]
pub struct CasaProcessConfig {
    /// Path to the casa executable
    pub executable: PathBuf,
    /// Extra arguments placed before `-c`
    pub extra_args: Vec<String>,
    /// Environment variables to set
    pub env: Vec<(String, String)>,
}

impl CasaProcessConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            extra_args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Add an extra command-line argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Runs generated scripts through the CASA executable
#[derive(Debug, Clone)]
pub struct CasaProcess {
    config: CasaProcessConfig,
}

impl CasaProcess {
    pub fn new(config: CasaProcessConfig) -> Self {
        Self { config }
    }

    /// Full argument vector for running `script`
    pub fn args_for(&self, script: &Path) -> Vec<String> {
        let mut args = vec!["--nogui".to_string()];
        args.extend(self.config.extra_args.iter().cloned());
        args.push("-c".to_string());
        args.push(script.to_string_lossy().into_owned());
        args
    }

    /// The command line as it would be typed in a shell
    pub fn command_line(&self, script: &Path) -> String {
        let mut parts = vec![self.config.executable.to_string_lossy().into_owned()];
        parts.extend(self.args_for(script));
        parts.join(" ")
    }

    /// Write `script` to `path` and run it, blocking until CASA exits.
    ///
    /// The script is left on disk whatever the outcome. The child is killed
    /// if this future is dropped, so a caller-level timeout stops CASA too.
    pub async fn run(&self, script: &CasaScript, path: &Path) -> Result<()> {
        tokio::fs::write(path, script.render()).await.map_err(|e| {
            SelfcalError::Engine(format!("cannot write script {}: {}", path.display(), e))
        })?;

        let command_line = self.command_line(path);
        info!("Running: {}", command_line);

        let mut cmd = Command::new(&self.config.executable);
        cmd.args(self.args_for(path));
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            error!("Command failed to start: {} ({})", command_line, e);
            SelfcalError::Engine(format!("failed to launch '{}': {}", command_line, e))
        })?;

        let output = child.wait_with_output().await.map_err(|e| {
            error!("Command failed: {} ({})", command_line, e);
            SelfcalError::Engine(format!("failed waiting for '{}': {}", command_line, e))
        })?;

        if output.status.success() {
            return Ok(());
        }

        error!(
            "Command failed: {} (exit code {:?}); script kept at {}",
            command_line,
            output.status.code(),
            path.display()
        );
        let mut msg = format!(
            "'{}' failed with exit code {:?}",
            command_line,
            output.status.code()
        );
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            msg.push_str(&format!("; stderr: {}", stderr));
        }
        Err(SelfcalError::Engine(msg))
    }
}
