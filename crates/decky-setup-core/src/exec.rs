//! External command execution.
//!
//! Every stage that shells out goes through [`CommandRunner`], so tests can
//! swap in [`crate::fakes::ScriptedRunner`] and never touch the host.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// One external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path (first element of argv).
    pub program: String,

    /// Arguments after the program.
    pub args: Vec<String>,

    /// Working directory; inherits ours when `None`.
    pub cwd: Option<PathBuf>,

    /// Extra environment variables.
    pub env: Vec<(String, String)>,

    /// Timeout in seconds; 0 waits forever.
    pub timeout_secs: u64,
}

impl CommandSpec {
    /// Create a spec with no working directory and no timeout.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            env: Vec::new(),
            timeout_secs: 0,
        }
    }

    /// Run inside `dir`.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Bound the runtime.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// `program arg1 arg2 ...`, used for logging and fake matching.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the process reported success.
    pub success: bool,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 0,
            success: true,
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 0,
            success: false,
        }
    }

    /// Whether the command exited 0.
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// Last non-empty line of stderr, or stdout when stderr is empty.
    pub fn tail(&self) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        source
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .trim()
            .to_string()
    }
}

/// Executes external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture output.
    ///
    /// Returns `Err` only when the process could not be started or timed out;
    /// a non-zero exit is an `Ok` with `success == false`.
    async fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput>;
}

/// Runs real processes with `tokio::process`.
///
/// Programs are resolved against `PATH` plus a list of well-known install
/// directories, and those directories are prepended to the child's `PATH`.
/// Tools installed earlier in the same run are therefore visible even though
/// our own environment predates the installer's `PATH` update.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    extra_dirs: Vec<PathBuf>,
}

impl ProcessRunner {
    /// Runner that only searches `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner that also searches `dirs`.
    pub fn with_search_dirs(dirs: Vec<PathBuf>) -> Self {
        Self { extra_dirs: dirs }
    }

    fn search_path(&self) -> OsString {
        let mut paths: Vec<PathBuf> = self.extra_dirs.clone();
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(paths).unwrap_or_else(|_| std::env::var_os("PATH").unwrap_or_default())
    }

    /// Resolve `program` to an executable path, if it can be found.
    pub fn resolve(&self, program: &str) -> Option<PathBuf> {
        if Path::new(program).is_absolute() {
            return Some(PathBuf::from(program));
        }
        let cwd = std::env::current_dir().ok()?;
        which::which_in(program, Some(self.search_path()), cwd).ok()
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
        let start = Instant::now();

        let program = self.resolve(&spec.program).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found on PATH", spec.program),
            )
        })?;

        debug!(command = %spec.display(), resolved = ?program, "Spawning command");

        let mut command = Command::new(&program);
        command
            .args(&spec.args)
            .env("PATH", self.search_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let child = command.spawn()?;

        let output = if spec.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(spec.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!(
                        "{} timed out after {} seconds",
                        spec.program, spec.timeout_secs
                    ),
                )
            })??
        } else {
            child.wait_with_output().await?
        };

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
            success: output.status.success(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_passed() {
        assert!(CommandOutput::ok("v18.18.0").passed());
        assert!(!CommandOutput::failed(1, "boom").passed());
    }

    #[test]
    fn test_tail_prefers_stderr() {
        let mut out = CommandOutput::failed(1, "line one\nERR_PNPM_NO_LOCKFILE\n\n");
        out.stdout = "progress".to_string();
        assert_eq!(out.tail(), "ERR_PNPM_NO_LOCKFILE");

        let out = CommandOutput::ok("first\nlast\n");
        assert_eq!(out.tail(), "last");
    }

    #[test]
    fn test_spec_display() {
        let spec = CommandSpec::new("pnpm", ["run", "build"]).in_dir("/tmp");
        assert_eq!(spec.display(), "pnpm run build");
        assert_eq!(spec.cwd, Some(PathBuf::from("/tmp")));
        assert_eq!(CommandSpec::new("git", Vec::<String>::new()).display(), "git");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_simple_command() {
        let runner = ProcessRunner::new();
        let result = runner
            .run(&CommandSpec::new("echo", ["hello"]).with_timeout(60))
            .await
            .expect("execute failed");
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("hello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_failing_command() {
        let runner = ProcessRunner::new();
        let result = runner
            .run(&CommandSpec::new("false", Vec::<String>::new()))
            .await
            .expect("execute failed");
        assert!(!result.success);
        assert_ne!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn test_missing_program_is_not_found() {
        let runner = ProcessRunner::new();
        let err = runner
            .run(&CommandSpec::new("definitely-not-a-real-tool-7f3a", ["--version"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
