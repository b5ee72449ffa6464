//! # Executor
//!
//! Spawns external commands for the `exec` task.

use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command as StdCommand, ExitStatus, Stdio};
use thiserror::Error;

/// Represents failures to run an external command.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Unbalanced quotes in the command line.
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
    /// The command line was blank.
    #[error("No command specified to run.")]
    EmptyCommand,
    /// The process could not be spawned.
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, std::io::Error),
    /// The process exited unsuccessfully.
    #[error("Command '{0}' exited with a non-zero error code.")]
    NonZeroExitStatus(String),
    /// Captured output could not be decoded.
    #[error("Command '{command}' produced output that was not valid UTF-8")]
    InvalidUtf8Output {
        /// The command line that was run.
        command: String,
        /// The decoding error.
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// Splits `command_line` with shell quoting rules into a program and its arguments.
fn split_command(command_line: &str) -> Result<(String, Vec<String>), ExecutionError> {
    let trimmed_command = command_line.trim();
    let mut parts = shlex::split(trimmed_command)
        .ok_or_else(|| ExecutionError::CommandParse(trimmed_command.to_string()))?
        .into_iter();
    let program = parts.next().ok_or(ExecutionError::EmptyCommand)?;
    Ok((program, parts.collect()))
}

fn finish(command_line: &str, status: ExitStatus, fail_on_error: bool) -> Result<(), ExecutionError> {
    if !status.success() && fail_on_error {
        return Err(ExecutionError::NonZeroExitStatus(command_line.to_string()));
    }
    if !status.success() {
        log::warn!("Command '{}' failed with {}; ignoring.", command_line, status);
    }
    Ok(())
}

/// Executes a command directly (no shell), waiting for it to finish.
///
/// Output streams are inherited. A non-zero exit status is an error only when
/// `fail_on_error` is set.
pub fn execute_command(
    command_line: &str,
    cwd: &Path,
    fail_on_error: bool,
) -> Result<(), ExecutionError> {
    let (program, args) = split_command(command_line)?;
    let clean_cwd = dunce::simplified(cwd);

    let mut command = StdCommand::new(&program);
    command
        .args(&args)
        .current_dir(clean_cwd)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    // Fallback logic for Windows built-in commands like `echo`.
    // We try to spawn directly first. If it fails with `NotFound`, we try with `cmd /C`.
    let status = match command.status() {
        Ok(status) => status,
        Err(e) if e.kind() == ErrorKind::NotFound && cfg!(target_os = "windows") => {
            log::debug!("Command '{}' not found. Retrying with cmd /C.", program);
            shell_command(command_line)
                .current_dir(clean_cwd)
                .status()
                .map_err(|e| ExecutionError::CommandFailed(command_line.to_string(), e))?
        }
        Err(e) => return Err(ExecutionError::CommandFailed(command_line.to_string(), e)),
    };

    finish(command_line.trim(), status, fail_on_error)
}

/// Executes a command line through the platform shell (`sh -c` or `cmd /C`).
pub fn execute_shell(
    command_line: &str,
    cwd: &Path,
    fail_on_error: bool,
) -> Result<(), ExecutionError> {
    if command_line.trim().is_empty() {
        return Err(ExecutionError::EmptyCommand);
    }
    let status = shell_command(command_line)
        .current_dir(dunce::simplified(cwd))
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| ExecutionError::CommandFailed(command_line.to_string(), e))?;
    finish(command_line.trim(), status, fail_on_error)
}

/// Executes a command and captures its standard output.
/// Stderr is passed through to the user's terminal.
pub fn execute_and_capture_output(command_line: &str, cwd: &Path) -> Result<String, ExecutionError> {
    let (program, args) = split_command(command_line)?;
    let trimmed_command = command_line.trim();

    let command_output = StdCommand::new(&program)
        .args(&args)
        .current_dir(dunce::simplified(cwd))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|e| ExecutionError::CommandFailed(trimmed_command.to_string(), e))?;

    if !command_output.status.success() {
        return Err(ExecutionError::NonZeroExitStatus(
            trimmed_command.to_string(),
        ));
    }

    String::from_utf8(command_output.stdout).map_err(|e| ExecutionError::InvalidUtf8Output {
        command: trimmed_command.to_string(),
        source: e,
    })
}

fn shell_command(command_line: &str) -> StdCommand {
    if cfg!(target_os = "windows") {
        let mut command = StdCommand::new("cmd");
        command.arg("/C").arg(command_line);
        command
    } else {
        let mut command = StdCommand::new("sh");
        command.arg("-c").arg(command_line);
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command_honours_quotes() {
        let (program, args) = split_command("git commit -m 'a message'").unwrap();
        assert_eq!(program, "git");
        assert_eq!(args, vec!["commit", "-m", "a message"]);
    }

    #[test]
    fn test_empty_and_unbalanced_commands_are_rejected() {
        assert!(matches!(
            split_command("   "),
            Err(ExecutionError::EmptyCommand)
        ));
        assert!(matches!(
            split_command("echo 'oops"),
            Err(ExecutionError::CommandParse(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_exit_status_is_checked() {
        let cwd = std::env::temp_dir();
        assert!(execute_shell("exit 0", &cwd, true).is_ok());
        assert!(matches!(
            execute_shell("exit 3", &cwd, true),
            Err(ExecutionError::NonZeroExitStatus(_))
        ));
        assert!(execute_shell("exit 3", &cwd, false).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_output() {
        let cwd = std::env::temp_dir();
        let output = execute_and_capture_output("echo hello", &cwd).unwrap();
        assert_eq!(output.trim(), "hello");
    }
}
