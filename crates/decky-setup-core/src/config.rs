//! Run configuration.
//!
//! Defaults are compiled in, `DECKY_SETUP_*` environment variables override
//! them, and the CLI applies its own flags last.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upstream plugin-loader repository.
pub const DEFAULT_REPO_URL: &str = "https://github.com/SteamDeckHomebrew/decky-loader.git";

/// Setup run configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetupConfig {
    /// Branch or tag of the loader to build.
    pub release: String,
    /// Git URL of the loader repository.
    pub repo_url: String,
    /// Tool-owned scratch directory for checkout, staging and packaging.
    pub work_dir: PathBuf,
    /// Loader data root; `~/homebrew` when unset.
    pub data_root: Option<PathBuf>,
    /// Host application install dir; located automatically when unset.
    pub host_app_dir: Option<PathBuf>,
    /// Pause after an installer exits before re-probing.
    pub settle_delay_secs: u64,
    /// Upper bound for any single external command; 0 disables it.
    pub command_timeout_secs: u64,
    /// Display name of the autostart entry.
    pub autostart_name: String,
    /// Whether to register the autostart entry at all.
    pub register_autostart: bool,
    /// Whether failing to write the host debugging flag stops the run.
    pub require_host_patch: bool,
    /// Whether to write a desktop shortcut launching Steam with `-dev`.
    #[serde(default = "default_true")]
    pub create_launch_shortcut: bool,
    /// Where the launch shortcut goes; `~/Desktop` when unset.
    #[serde(default)]
    pub shortcut_dir: Option<PathBuf>,
    /// Rebuild even when the installed loader already matches `release`.
    #[serde(default)]
    pub force_rebuild: bool,
}

impl Default for SetupConfig {
    fn default() -> Self {
        SetupConfig {
            release: "main".to_string(),
            repo_url: DEFAULT_REPO_URL.to_string(),
            work_dir: PathBuf::from("decky-build"),
            data_root: None,
            host_app_dir: None,
            settle_delay_secs: 10,
            command_timeout_secs: 1800,
            autostart_name: "PluginLoader".to_string(),
            register_autostart: true,
            require_host_patch: true,
            create_launch_shortcut: true,
            shortcut_dir: None,
            force_rebuild: false,
        }
    }
}

impl SetupConfig {
    /// Defaults overridden by `DECKY_SETUP_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(release) = std::env::var("DECKY_SETUP_RELEASE") {
            config.release = release;
        }
        if let Ok(url) = std::env::var("DECKY_SETUP_REPO_URL") {
            config.repo_url = url;
        }
        if let Ok(dir) = std::env::var("DECKY_SETUP_WORK_DIR") {
            config.work_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("DECKY_SETUP_DATA_ROOT") {
            config.data_root = Some(PathBuf::from(dir));
        }
        if let Ok(dir) = std::env::var("DECKY_SETUP_HOST_APP_DIR") {
            config.host_app_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = std::env::var("DECKY_SETUP_SETTLE_DELAY_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.settle_delay_secs = secs;
        }
        if let Ok(dir) = std::env::var("DECKY_SETUP_SHORTCUT_DIR") {
            config.shortcut_dir = Some(PathBuf::from(dir));
        }
        if std::env::var("DECKY_SETUP_NO_SHORTCUT").is_ok() {
            config.create_launch_shortcut = false;
        }
        if std::env::var("DECKY_SETUP_NO_AUTOSTART").is_ok() {
            config.register_autostart = false;
        }
        if std::env::var("DECKY_SETUP_FORCE_REBUILD").is_ok() {
            config.force_rebuild = true;
        }

        config
    }

    /// Set the release to build.
    pub fn with_release(mut self, release: &str) -> Self {
        self.release = release.to_string();
        self
    }

    /// Set the scratch directory.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Set the loader data root.
    pub fn with_data_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_root = Some(dir.into());
        self
    }

    /// Pin the host application directory.
    pub fn with_host_app_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.host_app_dir = Some(dir.into());
        self
    }

    /// Put the launch shortcut in `dir`.
    pub fn with_shortcut_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shortcut_dir = Some(dir.into());
        self
    }

    /// Set the post-install settle delay.
    pub fn with_settle_delay(mut self, secs: u64) -> Self {
        self.settle_delay_secs = secs;
        self
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SetupConfig::default();
        assert_eq!(config.release, "main");
        assert_eq!(config.repo_url, DEFAULT_REPO_URL);
        assert_eq!(config.settle_delay_secs, 10);
        assert!(config.register_autostart);
        assert!(config.require_host_patch);
        assert!(config.create_launch_shortcut);
        assert!(config.data_root.is_none());
    }

    #[test]
    fn test_builders() {
        let config = SetupConfig::default()
            .with_release("v3.0.0")
            .with_work_dir("/tmp/work")
            .with_data_root("/tmp/homebrew")
            .with_settle_delay(0);
        assert_eq!(config.release, "v3.0.0");
        assert_eq!(config.work_dir, PathBuf::from("/tmp/work"));
        assert_eq!(config.data_root, Some(PathBuf::from("/tmp/homebrew")));
        assert_eq!(config.settle_delay_secs, 0);
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = SetupConfig::default().with_release("v2.10.0");
        let json = serde_json::to_string(&config).unwrap();
        let back: SetupConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
