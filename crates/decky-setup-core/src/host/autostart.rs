//! Per-user autostart registration.

use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::error::{Result, SetupError};
use crate::exec::CommandRunner;
use crate::host::registry::{self, RUN_KEY};

/// When the entry fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerScope {
    UserLogin,
}

/// A program launched at login, keyed by display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutostartEntry {
    pub name: String,
    pub target: PathBuf,
    pub scope: TriggerScope,
}

impl AutostartEntry {
    pub fn at_login(name: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            scope: TriggerScope::UserLogin,
        }
    }

    /// Registry data for the entry: the quoted target path.
    pub fn command_line(&self) -> String {
        format!("\"{}\"", self.target.display())
    }
}

/// Registers [`AutostartEntry`] values in the per-user run key.
///
/// One value per display name, so registering again overwrites rather than
/// duplicating.
pub struct AutostartRegistrar<'a> {
    runner: &'a dyn CommandRunner,
    key: String,
}

impl<'a> AutostartRegistrar<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            key: RUN_KEY.to_string(),
        }
    }

    /// Use a different registry key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Whether the entry already points at its target.
    pub async fn is_registered(&self, entry: &AutostartEntry) -> bool {
        match registry::query_value(self.runner, &self.key, &entry.name).await {
            Ok(Some(value)) => same_command(&value.data, &entry.command_line()),
            _ => false,
        }
    }

    /// Create or overwrite the entry.
    pub async fn register(&self, entry: &AutostartEntry) -> Result<()> {
        registry::set_string(self.runner, &self.key, &entry.name, &entry.command_line())
            .await
            .map_err(|reason| SetupError::AutostartRegisterFailed {
                name: entry.name.clone(),
                reason,
            })?;
        info!(name = %entry.name, target = ?entry.target, "Registered autostart entry");
        Ok(())
    }
}

// Registry paths are case-insensitive on the target platform.
fn same_command(existing: &str, wanted: &str) -> bool {
    existing.trim().eq_ignore_ascii_case(wanted.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use crate::fakes::ScriptedRunner;

    fn entry() -> AutostartEntry {
        AutostartEntry::at_login(
            "PluginLoader",
            r"C:\Users\deck\homebrew\services\PluginLoader_noconsole.exe",
        )
    }

    #[test]
    fn test_command_line_quoted() {
        assert_eq!(
            entry().command_line(),
            r#""C:\Users\deck\homebrew\services\PluginLoader_noconsole.exe""#
        );
    }

    #[tokio::test]
    async fn test_registered_when_value_matches() {
        let runner = ScriptedRunner::new();
        runner.on(
            "reg query",
            CommandOutput::ok(format!(
                "\nHKEY_CURRENT_USER\\Software\\Microsoft\\Windows\\CurrentVersion\\Run\n    PluginLoader    REG_SZ    {}\n",
                entry().command_line().to_lowercase()
            )),
        );
        assert!(AutostartRegistrar::new(&runner).is_registered(&entry()).await);
    }

    #[tokio::test]
    async fn test_register_overwrites_with_force() {
        let runner = ScriptedRunner::new();
        runner.on("reg add", CommandOutput::ok("The operation completed successfully."));

        AutostartRegistrar::new(&runner).register(&entry()).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args.last().map(String::as_str), Some("/f"));
        assert!(calls[0].args.contains(&"PluginLoader".to_string()));
    }

    #[tokio::test]
    async fn test_register_failure_is_non_fatal() {
        let runner = ScriptedRunner::new();
        runner.on_missing("reg");
        let err = AutostartRegistrar::new(&runner).register(&entry()).await.unwrap_err();
        assert_eq!(err.kind(), "autostart_register_failed");
        assert!(!err.is_fatal());
    }
}
