//! Locating the host application (Steam) whose configuration gets patched.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::exec::CommandRunner;
use crate::host::registry;

/// Registry values that may hold the Steam install directory, most specific first.
pub const INSTALL_PATH_VALUES: [(&str, &str); 3] = [
    (r"HKLM\SOFTWARE\WOW6432Node\Valve\Steam", "InstallPath"),
    (r"HKLM\SOFTWARE\Valve\Steam", "InstallPath"),
    (r"HKCU\Software\Valve\Steam", "SteamPath"),
];

/// File whose presence makes Steam expose CEF remote debugging.
pub const CEF_DEBUG_MARKER: &str = ".cef-enable-remote-debugging";

/// Steam client executable inside the install directory.
pub const HOST_APP_EXE: &str = "steam.exe";

/// Launch argument that turns on Steam's developer mode.
pub const DEV_LAUNCH_ARG: &str = "-dev";

/// Find the host application's install directory.
///
/// A configured directory is trusted as-is. Otherwise the registry is
/// consulted, then the default install location.
pub async fn locate_host_app(
    runner: &dyn CommandRunner,
    configured: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(dir) = configured {
        return Some(dir.to_path_buf());
    }

    for (key, name) in INSTALL_PATH_VALUES {
        match registry::query_value(runner, key, name).await {
            Ok(Some(value)) => {
                let dir = PathBuf::from(value.data.trim_matches('"'));
                if dir.is_dir() {
                    debug!(key = %key, dir = ?dir, "Located host application");
                    return Some(dir);
                }
            }
            Ok(None) => {}
            Err(e) => debug!(key = %key, error = %e, "Registry lookup failed"),
        }
    }

    let program_files =
        std::env::var("ProgramFiles(x86)").unwrap_or_else(|_| r"C:\Program Files (x86)".to_string());
    let fallback = PathBuf::from(program_files).join("Steam");
    fallback.is_dir().then_some(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use crate::fakes::ScriptedRunner;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_configured_dir_wins() {
        let runner = ScriptedRunner::new();
        let dir = locate_host_app(&runner, Some(Path::new("/games/steam"))).await;
        assert_eq!(dir, Some(PathBuf::from("/games/steam")));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_registry_value_used_when_dir_exists() {
        let steam = tempdir().unwrap();
        let runner = ScriptedRunner::new();
        runner
            .on(
                r"reg query HKLM\SOFTWARE\WOW6432Node\Valve\Steam",
                CommandOutput::failed(1, "ERROR"),
            )
            .on(
                r"reg query HKLM\SOFTWARE\Valve\Steam",
                CommandOutput::ok(format!(
                    "\nHKEY_LOCAL_MACHINE\\SOFTWARE\\Valve\\Steam\n    InstallPath    REG_SZ    {}\n",
                    steam.path().display()
                )),
            );

        let dir = locate_host_app(&runner, None).await;
        assert_eq!(dir.as_deref(), Some(steam.path()));
    }
}
