//! Asynchronous utilities for use with Tokio.
//!
//! Mostly glue for running external OCR tools without blocking the executor.

use std::process::Output;

use regex::Regex;

use crate::prelude::*;

pub mod io;

/// Report any command failures, and include any error output.
///
/// The output of standard error and standard output will be logged at
/// appropriate levels. And standard error may be optionally checked against a
/// regex to determine if the command failed.
pub fn check_for_command_failure(
    command_name: &str,
    output: &Output,
    error_regex: Option<&Regex>,
) -> Result<()> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    trace!(
        command_name = command_name,
        output = %stdout,
        "Standard output from command"
    );
    if !stderr.trim().is_empty() {
        debug!(
            command_name = command_name,
            output = %stderr,
            "Standard error from command",
        );
    }

    if output.status.success() {
        if let Some(regex) = error_regex
            && regex.is_match(&stderr)
        {
            return Err(anyhow!(
                "{} printed error output:\n{}",
                command_name,
                stderr,
            ));
        }
        Ok(())
    } else if let Some(exit_code) = output.status.code() {
        Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr,
        ))
    } else {
        Err(anyhow!(
            "{} failed with error output:\n{}",
            command_name,
            stderr,
        ))
    }
}

/// Wrapper around [`tokio::task::spawn_blocking`] that propagates panics from
/// the background task.
pub async fn spawn_blocking_propagating_panics<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(err) => std::panic::resume_unwind(err.into_panic()),
    }
}

#[cfg(test)]
mod tests {
    use std::{os::unix::process::ExitStatusExt as _, process::ExitStatus};

    use super::*;

    fn output(code: i32, stderr: &str) -> Output {
        Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: vec![],
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn successful_command_passes() {
        assert!(check_for_command_failure("true", &output(0, ""), None).is_ok());
    }

    #[test]
    fn nonzero_exit_code_fails_with_stderr() {
        let err = check_for_command_failure("tesseract", &output(1, "boom"), None)
            .unwrap_err()
            .to_string();
        assert!(err.contains("exit code 1"));
        assert!(err.contains("boom"));
    }

    #[test]
    fn error_regex_catches_quiet_failures() {
        let out = output(0, "Error opening data file eng.traineddata");
        assert!(check_for_command_failure("tesseract", &out, None).is_ok());
        let regex = Regex::new(r"(?i)error").unwrap();
        assert!(check_for_command_failure("tesseract", &out, Some(&regex)).is_err());
    }
}
