use crate::domain::CommandResult;
use crate::error::{HarnessError, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Synchronous runner for one external CLI. Each invocation is a fresh
/// fork/exec; nothing is pooled or reused. Retrying belongs to the wait
/// engine, never to this layer.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    working_dir: Option<PathBuf>,
    verbose: bool,
}

impl CommandRunner {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            working_dir: None,
            verbose: false,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Echo captured output to the log at `info` regardless of outcome.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run to completion and require exit status zero.
    pub fn run<I, S>(&self, args: I) -> Result<CommandResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (rendered, result) = self.invoke(args)?;

        if !result.success() {
            return Err(HarnessError::Client {
                command: rendered,
                status: result.status,
                stderr: result.stderr,
            });
        }

        Ok(result)
    }

    /// Run to completion and hand back the result for any exit status.
    /// Only a failure to launch the process is an error here.
    pub fn run_unchecked<I, S>(&self, args: I) -> Result<CommandResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (_, result) = self.invoke(args)?;
        Ok(result)
    }

    fn invoke<I, S>(&self, args: I) -> Result<(String, CommandResult)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.as_ref().to_string())
            .collect();
        let rendered = self.render(&args);

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        debug!("running `{rendered}`");

        let output = cmd.output().map_err(|e| HarnessError::Client {
            command: rendered.clone(),
            status: -1,
            stderr: format!("could not launch {}: {e}", self.program),
        })?;

        let result = CommandResult {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if self.verbose {
            info!(
                "`{rendered}` exited {}\n{}{}",
                result.status, result.stdout, result.stderr
            );
        } else {
            debug!("`{rendered}` exited {}", result.status);
        }

        Ok((rendered, result))
    }

    fn render(&self, args: &[String]) -> String {
        let mut rendered = self.program.clone();
        for arg in args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_command_captures_stdout() {
        let result = CommandRunner::new("echo").run(["hello"]).unwrap();
        assert_eq!(result.status, 0);
        assert_eq!(result.stdout.trim(), "hello");
        assert!(result.stderr.is_empty());
    }

    #[test]
    fn test_nonzero_exit_becomes_client_error() {
        let err = CommandRunner::new("false").run::<_, &str>([]).unwrap_err();
        match err {
            HarnessError::Client { command, status, .. } => {
                assert_eq!(command, "false");
                assert_ne!(status, 0);
            }
            other => panic!("expected Client error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_binary_becomes_client_error() {
        let err = CommandRunner::new("definitely-not-a-real-binary")
            .run(["--version"])
            .unwrap_err();
        match err {
            HarnessError::Client { status, stderr, .. } => {
                assert_eq!(status, -1);
                assert!(stderr.contains("could not launch"));
            }
            other => panic!("expected Client error, got {other:?}"),
        }
    }

    #[test]
    fn test_run_unchecked_reports_status_without_error() {
        let result = CommandRunner::new("false").run_unchecked::<_, &str>([]).unwrap();
        assert_ne!(result.status, 0);
    }

    #[test]
    fn test_working_dir_is_honored() {
        let result = CommandRunner::new("pwd")
            .with_working_dir("/tmp")
            .run::<_, &str>([])
            .unwrap();
        assert_eq!(result.stdout.trim(), "/tmp");
    }
}
