//! Windows shell shortcuts (`.lnk`) written through PowerShell.
//!
//! The shell link format is owned by `WScript.Shell`, so both reading and
//! writing go through it. Paths and arguments travel in environment
//! variables, never spliced into the script text.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Result, SetupError};
use crate::exec::{CommandRunner, CommandSpec};
use crate::host::config_patch::PatchOutcome;

/// Prints the target on the first line and the arguments on the second.
pub const READ_SCRIPT: &str = "$existing = (New-Object -ComObject WScript.Shell).CreateShortcut($env:DECKY_LNK_PATH); \
     Write-Output $existing.TargetPath; Write-Output $existing.Arguments";

/// Creates or overwrites the shortcut.
pub const WRITE_SCRIPT: &str = "$shortcut = (New-Object -ComObject WScript.Shell).CreateShortcut($env:DECKY_LNK_PATH); \
     $shortcut.TargetPath = $env:DECKY_LNK_TARGET; $shortcut.Arguments = $env:DECKY_LNK_ARGS; \
     $shortcut.WorkingDirectory = $env:DECKY_LNK_WORKDIR; $shortcut.Save()";

/// A shortcut that launches `target` with `arguments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortcut {
    pub path: PathBuf,
    pub target: PathBuf,
    pub arguments: String,
}

impl Shortcut {
    pub fn new(path: impl Into<PathBuf>, target: impl Into<PathBuf>, arguments: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            target: target.into(),
            arguments: arguments.into(),
        }
    }

    fn working_dir(&self) -> String {
        self.target
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }

    fn command(&self, script: &str) -> CommandSpec {
        CommandSpec::new(
            "powershell",
            ["-NoProfile", "-NonInteractive", "-Command", script],
        )
        .with_env("DECKY_LNK_PATH", &self.path.display().to_string())
    }

    fn write_failed(&self, reason: impl Into<String>) -> SetupError {
        SetupError::ConfigWriteFailed {
            path: self.path.clone(),
            reason: reason.into(),
            required: false,
        }
    }
}

/// Target and arguments read back from an existing shortcut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutFields {
    pub target: String,
    pub arguments: String,
}

/// Parse [`READ_SCRIPT`] output.
pub fn parse_fields(stdout: &str) -> ShortcutFields {
    let mut lines = stdout.lines().map(str::trim);
    ShortcutFields {
        target: lines.next().unwrap_or_default().to_string(),
        arguments: lines.next().unwrap_or_default().to_string(),
    }
}

/// Reads and writes [`Shortcut`]s through the command seam.
pub struct ShortcutWriter<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> ShortcutWriter<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Fields of the shortcut on disk, `None` when there is none.
    pub async fn read(&self, shortcut: &Shortcut) -> std::result::Result<Option<ShortcutFields>, String> {
        if !shortcut.path.is_file() {
            return Ok(None);
        }
        let output = self
            .runner
            .run(&shortcut.command(READ_SCRIPT))
            .await
            .map_err(|e| format!("cannot run powershell: {}", e))?;
        if !output.passed() {
            return Err(format!("reading shortcut exited with code {}: {}", output.exit_code, output.tail()));
        }
        Ok(Some(parse_fields(&output.stdout)))
    }

    /// Whether the shortcut exists and launches the right target with the
    /// right arguments.
    pub async fn is_current(&self, shortcut: &Shortcut) -> bool {
        match self.read(shortcut).await {
            Ok(Some(fields)) => {
                fields.target.eq_ignore_ascii_case(&shortcut.target.display().to_string())
                    && fields.arguments == shortcut.arguments
            }
            Ok(None) => false,
            Err(e) => {
                debug!(path = ?shortcut.path, error = %e, "Cannot read shortcut");
                false
            }
        }
    }

    /// Write the shortcut unless it is already current.
    pub async fn ensure(&self, shortcut: &Shortcut) -> Result<PatchOutcome> {
        if self.is_current(shortcut).await {
            return Ok(PatchOutcome::AlreadyPresent);
        }
        if let Some(dir) = shortcut.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| shortcut.write_failed(e.to_string()))?;
        }

        let spec = shortcut
            .command(WRITE_SCRIPT)
            .with_env("DECKY_LNK_TARGET", &shortcut.target.display().to_string())
            .with_env("DECKY_LNK_ARGS", &shortcut.arguments)
            .with_env("DECKY_LNK_WORKDIR", &shortcut.working_dir());
        let output = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| shortcut.write_failed(format!("cannot run powershell: {}", e)))?;
        if !output.passed() {
            return Err(shortcut.write_failed(format!(
                "writing shortcut exited with code {}: {}",
                output.exit_code,
                output.tail()
            )));
        }

        info!(path = ?shortcut.path, target = ?shortcut.target, arguments = %shortcut.arguments, "Wrote shortcut");
        Ok(PatchOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use crate::fakes::ScriptedRunner;
    use tempfile::tempdir;

    const READ: &str = "powershell -NoProfile -NonInteractive -Command $existing";
    const WRITE: &str = "powershell -NoProfile -NonInteractive -Command $shortcut";

    fn env<'a>(spec: &'a CommandSpec, key: &str) -> Option<&'a str> {
        spec.env.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_parse_fields() {
        let fields = parse_fields("C:\\Program Files (x86)\\Steam\\steam.exe\r\n-dev\r\n");
        assert_eq!(fields.target, r"C:\Program Files (x86)\Steam\steam.exe");
        assert_eq!(fields.arguments, "-dev");
        assert_eq!(parse_fields("").arguments, "");
    }

    #[tokio::test]
    async fn test_missing_shortcut_is_written_once() {
        let dir = tempdir().unwrap();
        let shortcut = Shortcut::new(dir.path().join("Desktop/Steam.lnk"), dir.path().join("steam/steam.exe"), "-dev");
        let runner = ScriptedRunner::new();
        runner.on_effect(WRITE, CommandOutput::ok(""), |spec| {
            std::fs::write(env(spec, "DECKY_LNK_PATH").unwrap(), "lnk").unwrap();
        });
        runner.on(
            READ,
            CommandOutput::ok(format!("{}\n-dev\n", shortcut.target.display())),
        );

        let writer = ShortcutWriter::new(&runner);
        assert_eq!(writer.ensure(&shortcut).await.unwrap(), PatchOutcome::Applied);
        assert!(shortcut.path.is_file());

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(env(&calls[0], "DECKY_LNK_ARGS"), Some("-dev"));
        assert_eq!(
            env(&calls[0], "DECKY_LNK_WORKDIR"),
            Some(dir.path().join("steam").display().to_string().as_str())
        );

        assert_eq!(writer.ensure(&shortcut).await.unwrap(), PatchOutcome::AlreadyPresent);
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_shortcut_without_flag_is_rewritten() {
        let dir = tempdir().unwrap();
        let shortcut = Shortcut::new(dir.path().join("Steam.lnk"), dir.path().join("steam.exe"), "-dev");
        std::fs::write(&shortcut.path, "old").unwrap();
        let runner = ScriptedRunner::new();
        runner
            .on(READ, CommandOutput::ok(format!("{}\n\n", shortcut.target.display())))
            .on(WRITE, CommandOutput::ok(""));

        let writer = ShortcutWriter::new(&runner);
        assert!(!writer.is_current(&shortcut).await);
        assert_eq!(writer.ensure(&shortcut).await.unwrap(), PatchOutcome::Applied);
        assert!(runner.was_called(WRITE));
    }

    #[tokio::test]
    async fn test_write_failure_is_non_fatal() {
        let dir = tempdir().unwrap();
        let shortcut = Shortcut::new(dir.path().join("Steam.lnk"), dir.path().join("steam.exe"), "-dev");
        let runner = ScriptedRunner::new();
        runner.on_missing("powershell");

        let err = ShortcutWriter::new(&runner).ensure(&shortcut).await.unwrap_err();
        assert_eq!(err.kind(), "config_write_failed");
        assert!(!err.is_fatal());
    }
}
