// Synchronous external-command execution for script host calls.
// The engine's contract is blocking; asynchronous dispatch is the caller's
// concern, so this is a thin wrapper over std::process with captured output.
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;

use crate::error::{ProcessError, Result};

/// Process execution configuration
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub environment: HashMap<String, String>,
}

impl ProcessConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
            environment: HashMap::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn with_environment(mut self, env: HashMap<String, String>) -> Self {
        self.environment = env;
        self
    }
}

/// Process execution result
#[derive(Debug)]
pub struct ProcessResult {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// Execute a command synchronously, capturing stdout and stderr.
pub fn execute(config: &ProcessConfig) -> Result<ProcessResult> {
    let resolved = which::which(&config.command).map_err(|_| ProcessError::CommandNotFound {
        command: config.command.clone(),
    })?;

    let mut command = Command::new(resolved);
    command.args(&config.args);
    if let Some(dir) = &config.working_dir {
        command.current_dir(dir);
    }
    command.envs(&config.environment);

    tracing::debug!(command = %config.command, args = ?config.args, "executing command");

    let output = command.output().map_err(|e| ProcessError::SpawnFailed {
        command: config.command.clone(),
        error: e.to_string(),
    })?;

    Ok(ProcessResult {
        exit_code: output.status.code(),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Execute a command and return its captured stdout, failing on a non-zero
/// exit. This is the behavior behind the script-visible `execute_command`.
pub fn execute_for_stdout(config: &ProcessConfig) -> Result<String> {
    let result = execute(config)?;
    if !result.success() {
        return Err(ProcessError::ExecutionFailed {
            command: config.command.clone(),
            exit_code: result.exit_code,
            stderr: result.stderr(),
        }
        .into());
    }
    Ok(result.stdout())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_command_is_reported() {
        let config = ProcessConfig::new("labelscript-no-such-command");
        let error = execute(&config).unwrap_err();
        assert!(error.to_string().contains("Command not found"));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_stdout() {
        let config = ProcessConfig::new("echo").with_args(vec!["hello"]);
        let stdout = execute_for_stdout(&config).unwrap();
        assert_eq!(stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_fails() {
        let config = ProcessConfig::new("false");
        assert!(execute_for_stdout(&config).is_err());
    }
}
