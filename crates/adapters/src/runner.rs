// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command execution seam: local host vs sprite (remote VM over ssh).
//!
//! Everything the provisioner and session host do (git worktree
//! operations, tmux commands, file writes) is expressed as commands run
//! through this trait, so a project bound to a sprite gets the identical
//! sequence executed remotely.

use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::subprocess::run_with_timeout;

/// Errors from command execution.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("command timed out: {0}")]
    Timeout(String),
}

/// Executes commands either locally or on a sprite.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Target label for logs: `local` or `sprite:<host>`.
    fn target(&self) -> String;

    /// Run a command to completion and return its output.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<Output, RunnerError>;

    /// Run a command feeding `input` on stdin. Used to write files through
    /// the same seam (`sh -c 'cat > path'`).
    async fn run_with_input(
        &self,
        program: &str,
        args: &[String],
        input: &str,
        timeout: Duration,
    ) -> Result<Output, RunnerError>;
}

/// Runs commands on the local host.
#[derive(Clone, Default)]
pub struct LocalRunner;

impl LocalRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    fn target(&self) -> String {
        "local".to_string()
    }

    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<Output, RunnerError> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        run_with_timeout(cmd, timeout, program)
            .await
            .map_err(map_run_error)
    }

    async fn run_with_input(
        &self,
        program: &str,
        args: &[String],
        input: &str,
        timeout: Duration,
    ) -> Result<Output, RunnerError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        spawn_with_input(cmd, input, timeout, program).await
    }
}

/// Runs commands on a sprite over ssh. The sprite name is an ssh
/// destination (host alias from the user's ssh config).
#[derive(Clone)]
pub struct SshRunner {
    host: String,
}

impl SshRunner {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    fn remote_command(program: &str, args: &[String], cwd: Option<&Path>) -> String {
        let mut parts = Vec::with_capacity(args.len() + 1);
        parts.push(shell_quote(program));
        for arg in args {
            parts.push(shell_quote(arg));
        }
        let command = parts.join(" ");
        match cwd {
            Some(dir) => format!("cd {} && {}", shell_quote(&dir.to_string_lossy()), command),
            None => command,
        }
    }

    fn ssh_args(&self, remote: String) -> Vec<String> {
        vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            self.host.clone(),
            "--".to_string(),
            remote,
        ]
    }
}

#[async_trait]
impl CommandRunner for SshRunner {
    fn target(&self) -> String {
        format!("sprite:{}", self.host)
    }

    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<Output, RunnerError> {
        let remote = Self::remote_command(program, args, cwd);
        let mut cmd = Command::new("ssh");
        cmd.args(self.ssh_args(remote));
        run_with_timeout(cmd, timeout, "ssh")
            .await
            .map_err(map_run_error)
    }

    async fn run_with_input(
        &self,
        program: &str,
        args: &[String],
        input: &str,
        timeout: Duration,
    ) -> Result<Output, RunnerError> {
        let remote = Self::remote_command(program, args, None);
        let mut cmd = Command::new("ssh");
        cmd.args(self.ssh_args(remote))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        spawn_with_input(cmd, input, timeout, "ssh").await
    }
}

async fn spawn_with_input(
    mut cmd: Command,
    input: &str,
    timeout: Duration,
    description: &str,
) -> Result<Output, RunnerError> {
    let mut child = cmd
        .spawn()
        .map_err(|e| RunnerError::Spawn(format!("{description}: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.as_bytes())
            .await
            .map_err(|e| RunnerError::Spawn(format!("{description} stdin: {e}")))?;
        // Close stdin so `cat`-style readers see EOF
        drop(stdin);
    }

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(RunnerError::Spawn(format!("{description}: {e}"))),
        Err(_) => Err(RunnerError::Timeout(format!(
            "{description} after {}s",
            timeout.as_secs()
        ))),
    }
}

fn map_run_error(message: String) -> RunnerError {
    if message.contains("timed out") {
        RunnerError::Timeout(message)
    } else {
        RunnerError::Spawn(message)
    }
}

/// Single-quote a string for POSIX shells.
fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// A recorded runner invocation.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RunnerCall {
        pub program: String,
        pub args: Vec<String>,
        pub cwd: Option<String>,
        pub input: Option<String>,
    }

    impl RunnerCall {
        /// The invocation as one space-joined line, for assertions.
        pub fn line(&self) -> String {
            let mut parts = vec![self.program.clone()];
            parts.extend(self.args.iter().cloned());
            parts.join(" ")
        }
    }

    /// Recording runner for tests. Commands succeed with empty output
    /// unless a failure pattern matches.
    #[derive(Clone, Default)]
    pub struct FakeRunner {
        calls: Arc<Mutex<Vec<RunnerCall>>>,
        fail_patterns: Arc<Mutex<Vec<String>>>,
        stdout_patterns: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Commands whose joined line contains `pattern` exit non-zero.
        pub fn fail_matching(&self, pattern: &str) {
            self.fail_patterns.lock().push(pattern.to_string());
        }

        /// Commands whose joined line contains `pattern` print `stdout`.
        pub fn respond_matching(&self, pattern: &str, stdout: &str) {
            self.stdout_patterns
                .lock()
                .push((pattern.to_string(), stdout.to_string()));
        }

        pub fn calls(&self) -> Vec<RunnerCall> {
            self.calls.lock().clone()
        }

        /// Joined command lines, for sequence assertions.
        pub fn lines(&self) -> Vec<String> {
            self.calls.lock().iter().map(|c| c.line()).collect()
        }

        fn record(&self, call: RunnerCall) -> Output {
            use std::os::unix::process::ExitStatusExt;

            let line = call.line();
            let failed = self.fail_patterns.lock().iter().any(|p| line.contains(p));
            let stdout = self
                .stdout_patterns
                .lock()
                .iter()
                .find(|(p, _)| line.contains(p))
                .map(|(_, out)| out.clone())
                .unwrap_or_default();
            self.calls.lock().push(call);

            Output {
                status: std::process::ExitStatus::from_raw(if failed { 256 } else { 0 }),
                stdout: stdout.into_bytes(),
                stderr: if failed { b"fake failure".to_vec() } else { Vec::new() },
            }
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        fn target(&self) -> String {
            "fake".to_string()
        }

        async fn run(
            &self,
            program: &str,
            args: &[String],
            cwd: Option<&Path>,
            _timeout: Duration,
        ) -> Result<Output, RunnerError> {
            Ok(self.record(RunnerCall {
                program: program.to_string(),
                args: args.to_vec(),
                cwd: cwd.map(|p| p.to_string_lossy().into_owned()),
                input: None,
            }))
        }

        async fn run_with_input(
            &self,
            program: &str,
            args: &[String],
            input: &str,
            _timeout: Duration,
        ) -> Result<Output, RunnerError> {
            Ok(self.record(RunnerCall {
                program: program.to_string(),
                args: args.to_vec(),
                cwd: None,
                input: Some(input.to_string()),
            }))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeRunner, RunnerCall};

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
