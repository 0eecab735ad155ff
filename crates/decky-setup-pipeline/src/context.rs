//! Per-run state shared between stages.

use std::path::PathBuf;
use std::sync::Arc;

use decky_setup_core::host::provision::InstallManifest;
use decky_setup_core::{CommandRunner, HostLayout, SetupConfig};
use toolchain_manager::{Assessment, Downloader, InstallationPlan, ToolchainCatalog};

use crate::build::BuildOutput;
use crate::package::{ArtifactKind, BuildArtifact};
use crate::spec::BuildSpec;

/// Everything one pipeline run reads and produces.
///
/// Owned by the controller for the duration of a run and never persisted.
pub struct RunContext {
    pub run_id: String,
    pub config: SetupConfig,
    pub layout: HostLayout,
    pub catalog: ToolchainCatalog,
    pub build_spec: BuildSpec,
    pub runner: Arc<dyn CommandRunner>,
    pub downloader: Arc<dyn Downloader>,

    /// Filled by probing.
    pub assessments: Vec<Assessment>,
    pub plan: InstallationPlan,

    /// Filled by building.
    pub build: Option<BuildOutput>,

    /// Filled by packaging.
    pub artifacts: Vec<BuildArtifact>,
}

impl RunContext {
    pub fn new(
        config: SetupConfig,
        layout: HostLayout,
        catalog: ToolchainCatalog,
        runner: Arc<dyn CommandRunner>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        let build_spec = BuildSpec::new(&config.release, &config.repo_url);
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            config,
            layout,
            catalog,
            build_spec,
            runner,
            downloader,
            assessments: Vec::new(),
            plan: InstallationPlan::default(),
            build: None,
            artifacts: Vec::new(),
        }
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    /// Where an artifact kind is installed under the data root.
    pub fn installed_path(&self, kind: ArtifactKind) -> PathBuf {
        self.layout.services_dir().join(kind.file_name())
    }

    /// Whether the installed loader already matches the requested release.
    ///
    /// True when the version marker and the install manifest both name
    /// `release`, the manifest covers both executables and every installed
    /// file still has the digest the manifest recorded. Always false when a
    /// rebuild was forced.
    pub fn installed_release_is_current(&self) -> bool {
        if self.config.force_rebuild {
            return false;
        }
        let marker = match std::fs::read_to_string(self.layout.installed_version_file()) {
            Ok(marker) => marker,
            Err(_) => return false,
        };
        let Some(manifest) = InstallManifest::read(&self.layout.install_manifest_file()) else {
            return false;
        };
        marker.trim() == self.config.release
            && manifest.release == self.config.release
            && ArtifactKind::ALL
                .iter()
                .all(|kind| manifest.files.contains_key(&kind.file_name()))
            && manifest.matches_dir(&self.layout.services_dir())
    }
}
