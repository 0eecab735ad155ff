//! Filesystem layout derived from [`SetupConfig`].

use crate::config::SetupConfig;
use std::path::{Path, PathBuf};

/// Subdirectories the loader expects under its data root.
pub const DATA_SUBDIRS: [&str; 6] = ["data", "logs", "plugins", "services", "settings", "themes"];

/// Version marker written next to the loader.
pub const VERSION_FILE: &str = ".loader.version";

/// Record of the installed build, see `host::provision::InstallManifest`.
pub const MANIFEST_FILE: &str = ".loader.manifest.json";

/// Every path the pipeline reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    /// Tool-owned scratch root.
    pub work_dir: PathBuf,
    /// Git checkout of the loader sources.
    pub checkout_dir: PathBuf,
    /// Backend staging directory fed to the packager.
    pub staging_dir: PathBuf,
    /// Packager output directory.
    pub dist_dir: PathBuf,
    /// Packager intermediate files.
    pub package_work_dir: PathBuf,
    /// Loader data root (`~/homebrew`).
    pub data_root: PathBuf,
    /// Directory the Steam launch shortcut is written to (`~/Desktop`).
    pub shortcut_dir: PathBuf,
}

impl HostLayout {
    /// Derive the layout; `home` is used when no data root is configured.
    ///
    /// Relative roots are resolved against the current directory so that
    /// commands run with a different working directory see the same paths.
    pub fn new(config: &SetupConfig, home: &Path) -> Self {
        let work_dir = absolute(&config.work_dir);
        let data_root = absolute(
            &config
                .data_root
                .clone()
                .unwrap_or_else(|| home.join("homebrew")),
        );
        let shortcut_dir = absolute(
            &config
                .shortcut_dir
                .clone()
                .unwrap_or_else(|| home.join("Desktop")),
        );

        HostLayout {
            checkout_dir: work_dir.join("app"),
            staging_dir: work_dir.join("src"),
            dist_dir: work_dir.join("dist"),
            package_work_dir: work_dir.join("pyinstaller"),
            work_dir,
            data_root,
            shortcut_dir,
        }
    }

    /// Resolve against the current user's home directory.
    pub fn for_current_user(config: &SetupConfig) -> Option<Self> {
        let home = dirs::home_dir()?;
        Some(Self::new(config, &home))
    }

    /// Directory the installed executables live in.
    pub fn services_dir(&self) -> PathBuf {
        self.data_root.join("services")
    }

    /// Directory holding loader settings files.
    pub fn settings_dir(&self) -> PathBuf {
        self.data_root.join("settings")
    }

    /// The loader's own settings document.
    pub fn loader_settings_file(&self) -> PathBuf {
        self.settings_dir().join("loader.json")
    }

    /// Installed version marker.
    pub fn installed_version_file(&self) -> PathBuf {
        self.data_root.join(VERSION_FILE)
    }

    /// Installed build manifest.
    pub fn install_manifest_file(&self) -> PathBuf {
        self.data_root.join(MANIFEST_FILE)
    }

    /// The Steam launch shortcut.
    pub fn launch_shortcut_file(&self) -> PathBuf {
        self.shortcut_dir.join("Steam.lnk")
    }

    /// Data root followed by each expected subdirectory, in creation order.
    pub fn data_directories(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.data_root.clone()];
        dirs.extend(DATA_SUBDIRS.iter().map(|d| self.data_root.join(d)));
        dirs
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
