//! Directory provisioning and artifact installation under the data root.
//!
//! Nothing here deletes or truncates existing user data: directories are
//! created only when absent, and installed files are replaced atomically.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{Result, SetupError};

/// Ordered set of directories to ensure, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectorySpec {
    paths: Vec<PathBuf>,
}

impl DirectorySpec {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut spec = Self::default();
        for path in paths {
            spec.push(path);
        }
        spec
    }

    /// Append `path` unless it is already present.
    pub fn push(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Whether every directory already exists.
    pub fn is_satisfied(&self) -> bool {
        self.paths.iter().all(|p| p.is_dir())
    }
}

/// Result of installing a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallOutcome {
    Installed,
    AlreadyPresent,
}

/// Create every directory in `spec` that does not exist yet.
///
/// Returns the directories that were created by this call.
pub fn ensure_directories(spec: &DirectorySpec) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();

    for path in spec.paths() {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => continue,
            Ok(_) => {
                return Err(SetupError::DirectoryCreateFailed {
                    path: path.clone(),
                    reason: "exists but is not a directory".to_string(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(SetupError::DirectoryCreateFailed {
                    path: path.clone(),
                    reason: e.to_string(),
                })
            }
        }

        std::fs::create_dir_all(path).map_err(|e| SetupError::DirectoryCreateFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        debug!(path = ?path, "Created directory");
        created.push(path.clone());
    }

    if !created.is_empty() {
        info!(count = created.len(), "Provisioned directories");
    }
    Ok(created)
}

/// Hex sha256 of a file's contents.
pub fn file_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Whether `dest` exists with exactly the contents of `src`.
pub fn is_installed(src: &Path, dest: &Path) -> bool {
    if !dest.is_file() {
        return false;
    }
    match (file_sha256(src), file_sha256(dest)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Copy `src` over `dest` through a temp file in the destination directory.
///
/// Skipped when the destination already has the same digest.
pub fn install_file(src: &Path, dest: &Path) -> Result<InstallOutcome> {
    let failed = |reason: String| SetupError::ArtifactInstallFailed {
        path: dest.to_path_buf(),
        reason,
    };

    if is_installed(src, dest) {
        debug!(dest = ?dest, "Installed copy already up to date");
        return Ok(InstallOutcome::AlreadyPresent);
    }

    let bytes = std::fs::read(src).map_err(|e| failed(format!("cannot read {}: {}", src.display(), e)))?;
    let dir = dest
        .parent()
        .ok_or_else(|| failed("destination has no parent directory".to_string()))?;
    std::fs::create_dir_all(dir).map_err(|e| failed(e.to_string()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| failed(e.to_string()))?;
    tmp.write_all(&bytes).map_err(|e| failed(e.to_string()))?;
    tmp.as_file().sync_all().map_err(|e| failed(e.to_string()))?;

    #[cfg(unix)]
    if let Ok(meta) = std::fs::metadata(src) {
        let _ = std::fs::set_permissions(tmp.path(), meta.permissions());
    }

    tmp.persist(dest).map_err(|e| failed(e.error.to_string()))?;
    info!(src = ?src, dest = ?dest, "Installed file");
    Ok(InstallOutcome::Installed)
}

/// Record of one complete install: the release, the build that produced it
/// and the digest of every installed file.
///
/// Written only after every file is in place and removed before any of them
/// is replaced, so a present manifest always describes a consistent set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallManifest {
    pub release: String,
    pub build_id: String,
    /// File name under the install directory to hex sha256.
    pub files: BTreeMap<String, String>,
}

impl InstallManifest {
    pub fn new(release: impl Into<String>, build_id: impl Into<String>) -> Self {
        Self {
            release: release.into(),
            build_id: build_id.into(),
            files: BTreeMap::new(),
        }
    }

    /// Record `name` with the digest of `source`.
    pub fn with_file(mut self, name: impl Into<String>, source: &Path) -> std::io::Result<Self> {
        self.files.insert(name.into(), file_sha256(source)?);
        Ok(self)
    }

    /// The manifest at `path`, if one exists and parses.
    pub fn read(path: &Path) -> Option<Self> {
        let raw = std::fs::read(path).ok()?;
        serde_json::from_slice(&raw).ok()
    }

    /// Whether every recorded file sits in `dir` with its recorded digest.
    pub fn matches_dir(&self, dir: &Path) -> bool {
        !self.files.is_empty()
            && self
                .files
                .iter()
                .all(|(name, digest)| file_sha256(&dir.join(name)).is_ok_and(|d| d == *digest))
    }

    /// Write the manifest to `path` unless the same content is already there.
    pub fn write(&self, path: &Path) -> Result<InstallOutcome> {
        let failed = |reason: String| SetupError::ArtifactInstallFailed {
            path: path.to_path_buf(),
            reason,
        };
        if Self::read(path).as_ref() == Some(self) {
            return Ok(InstallOutcome::AlreadyPresent);
        }

        let bytes = serde_json::to_vec_pretty(self).map_err(|e| failed(e.to_string()))?;
        let dir = path
            .parent()
            .ok_or_else(|| failed("destination has no parent directory".to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| failed(e.to_string()))?;
        tmp.write_all(&bytes).map_err(|e| failed(e.to_string()))?;
        tmp.as_file().sync_all().map_err(|e| failed(e.to_string()))?;
        tmp.persist(path).map_err(|e| failed(e.error.to_string()))?;
        debug!(path = ?path, build_id = %self.build_id, "Wrote install manifest");
        Ok(InstallOutcome::Installed)
    }

    /// Remove the manifest at `path`; a missing one is fine.
    pub fn invalidate(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SetupError::ArtifactInstallFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }
}
