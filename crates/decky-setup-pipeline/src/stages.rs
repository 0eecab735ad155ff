//! The concrete pipeline stages.
//!
//! Each stage re-checks host state in `is_already_satisfied` instead of
//! trusting a previous run, so a rerun after any failure converges.

use std::time::Duration;

use async_trait::async_trait;
use decky_setup_core::host::{
    autostart::{AutostartEntry, AutostartRegistrar},
    config_patch::{self, ConfigPatch, PatchOutcome},
    host_app::{locate_host_app, CEF_DEBUG_MARKER, DEV_LAUNCH_ARG, HOST_APP_EXE},
    provision::{self, DirectorySpec, InstallManifest, InstallOutcome},
    shortcut::{Shortcut, ShortcutWriter},
};
use decky_setup_core::layout::{MANIFEST_FILE, VERSION_FILE};
use decky_setup_core::{CommandRunner, SetupError};
use serde_json::Value;
use toolchain_manager::{Acquirer, Bootstrapper, InstallationPlan, VersionProber};
use tracing::warn;

use crate::build::BuildOrchestrator;
use crate::context::RunContext;
use crate::package::{ArtifactKind, Packager};
use crate::stage::{Outcome, Stage, StageKind};

/// The standard stage list, in execution order.
pub fn default_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(ProbeStage),
        Box::new(AcquireStage),
        Box::new(BootstrapStage),
        Box::new(BuildStage),
        Box::new(PackageStage),
        Box::new(ConfigureHostStage),
        Box::new(ProvisionStage),
        Box::new(AutostartStage),
    ]
}

/// Probes the toolchain and records the installation plan.
pub struct ProbeStage;

#[async_trait]
impl Stage for ProbeStage {
    fn kind(&self) -> StageKind {
        StageKind::Probing
    }

    async fn is_already_satisfied(&self, _ctx: &RunContext) -> bool {
        false
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<Outcome, SetupError> {
        let runner = ctx.runner.clone();
        let assessments = VersionProber::new(runner.as_ref()).probe_all(&ctx.catalog).await;
        let plan = InstallationPlan::from_assessments(&ctx.catalog, &assessments);

        let warnings: Vec<String> = assessments
            .iter()
            .filter_map(|a| a.warning.as_ref().map(ToString::to_string))
            .collect();

        let mut outcome = if plan.is_empty() {
            Outcome::unchanged(format!("all {} toolchain components satisfied", assessments.len()))
        } else {
            Outcome::changed(format!("to acquire: {}", plan.names().join(", ")))
        };
        outcome.warnings = warnings;

        ctx.assessments = assessments;
        ctx.plan = plan;
        Ok(outcome)
    }
}

/// Downloads and installs missing components.
pub struct AcquireStage;

#[async_trait]
impl Stage for AcquireStage {
    fn kind(&self) -> StageKind {
        StageKind::Acquiring
    }

    async fn is_already_satisfied(&self, ctx: &RunContext) -> bool {
        !ctx.plan.needs_acquisition(&ctx.catalog)
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<Outcome, SetupError> {
        let report = Acquirer::new(ctx.runner(), ctx.downloader.as_ref())
            .with_settle_delay(Duration::from_secs(ctx.config.settle_delay_secs))
            .with_install_timeout(ctx.config.command_timeout_secs)
            .acquire(&ctx.catalog, &ctx.plan)
            .await?;

        Ok(Outcome::changed(format!("installed: {}", report.installed.join(", "))).with_warnings(report.warnings))
    }
}

/// Installs secondary package managers and tools through primary ones.
pub struct BootstrapStage;

#[async_trait]
impl Stage for BootstrapStage {
    fn kind(&self) -> StageKind {
        StageKind::Bootstrapping
    }

    async fn is_already_satisfied(&self, ctx: &RunContext) -> bool {
        Bootstrapper::new(ctx.runner()).is_satisfied(&ctx.catalog).await
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<Outcome, SetupError> {
        let installed = Bootstrapper::new(ctx.runner())
            .with_timeout(ctx.config.command_timeout_secs)
            .bootstrap(&ctx.catalog)
            .await?;

        if installed.is_empty() {
            Ok(Outcome::unchanged("nothing to bootstrap"))
        } else {
            Ok(Outcome::changed(format!("bootstrapped: {}", installed.join(", "))))
        }
    }
}

/// Checks out and builds the loader.
pub struct BuildStage;

#[async_trait]
impl Stage for BuildStage {
    fn kind(&self) -> StageKind {
        StageKind::Building
    }

    async fn is_already_satisfied(&self, ctx: &RunContext) -> bool {
        ctx.installed_release_is_current()
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<Outcome, SetupError> {
        let output = BuildOrchestrator::new(ctx.runner(), &ctx.layout, &ctx.build_spec)
            .with_timeout(ctx.config.command_timeout_secs)
            .run()
            .await?;

        let outcome = Outcome::changed(format!(
            "built {} into {}",
            ctx.build_spec.release,
            output.staging_dir.display()
        ))
        .with_warnings(output.warnings.clone());
        ctx.build = Some(output);
        Ok(outcome)
    }
}

/// Produces both executables.
pub struct PackageStage;

#[async_trait]
impl Stage for PackageStage {
    fn kind(&self) -> StageKind {
        StageKind::Packaging
    }

    async fn is_already_satisfied(&self, ctx: &RunContext) -> bool {
        ctx.build.is_none() && ctx.installed_release_is_current()
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<Outcome, SetupError> {
        let build = ctx.build.clone().ok_or_else(|| SetupError::PackagingFailed {
            variant: ArtifactKind::Console.name().to_string(),
            reason: "no build output to package".to_string(),
        })?;

        let artifacts = Packager::new(ctx.runner(), &ctx.layout)
            .with_timeout(ctx.config.command_timeout_secs)
            .package(&build, &ctx.build_spec.release, &ctx.build_spec.build_id())
            .await?;

        let detail = artifacts
            .iter()
            .map(|a| format!("{} {}", a.kind.name(), a.path.display()))
            .collect::<Vec<_>>()
            .join(", ");
        ctx.artifacts = artifacts;
        Ok(Outcome::changed(detail))
    }
}

/// Enables remote debugging and `-dev` launches in the host application and
/// developer mode in the loader settings.
pub struct ConfigureHostStage;

/// The host changes one run wants.
struct HostPatches {
    files: Vec<ConfigPatch>,
    shortcut: Option<Shortcut>,
    missing_host: Option<SetupError>,
}

impl ConfigureHostStage {
    async fn patches(&self, ctx: &RunContext) -> HostPatches {
        let mut files = Vec::new();
        let mut shortcut = None;
        let mut missing_host = None;

        match locate_host_app(ctx.runner(), ctx.config.host_app_dir.as_deref()).await {
            Some(dir) => {
                files.push(
                    ConfigPatch::marker_file(dir.join(CEF_DEBUG_MARKER))
                        .required(ctx.config.require_host_patch)
                        .with_description("enable CEF remote debugging"),
                );
                if ctx.config.create_launch_shortcut {
                    shortcut = Some(Shortcut::new(
                        ctx.layout.launch_shortcut_file(),
                        dir.join(HOST_APP_EXE),
                        DEV_LAUNCH_ARG,
                    ));
                }
            }
            None => {
                missing_host = Some(SetupError::ConfigReadFailed {
                    path: CEF_DEBUG_MARKER.into(),
                    reason: "host application install directory not found".to_string(),
                })
            }
        }

        files.push(
            ConfigPatch::json_key(ctx.layout.loader_settings_file(), ["developer.enabled"], Value::Bool(true))
                .with_description("enable loader developer mode"),
        );
        HostPatches {
            files,
            shortcut,
            missing_host,
        }
    }
}

#[async_trait]
impl Stage for ConfigureHostStage {
    fn kind(&self) -> StageKind {
        StageKind::ConfiguringHost
    }

    async fn is_already_satisfied(&self, ctx: &RunContext) -> bool {
        let patches = self.patches(ctx).await;
        if patches.missing_host.is_some()
            || !patches
                .files
                .iter()
                .all(|p| matches!(config_patch::is_satisfied(p), Ok(true)))
        {
            return false;
        }
        match &patches.shortcut {
            Some(shortcut) => ShortcutWriter::new(ctx.runner()).is_current(shortcut).await,
            None => true,
        }
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<Outcome, SetupError> {
        let patches = self.patches(ctx).await;
        let mut warnings = Vec::new();
        if let Some(err) = patches.missing_host {
            warn!(error = %err, "Skipping host application patch");
            warnings.push(err.to_string());
        }

        let mut applied = Vec::new();
        for patch in &patches.files {
            match config_patch::apply(patch) {
                Ok(PatchOutcome::Applied) => applied.push(patch.description.clone()),
                Ok(PatchOutcome::AlreadyPresent) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(error = %err, "Config patch skipped");
                    warnings.push(err.to_string());
                }
            }
        }

        if let Some(shortcut) = &patches.shortcut {
            match ShortcutWriter::new(ctx.runner()).ensure(shortcut).await {
                Ok(PatchOutcome::Applied) => applied.push(format!("launch shortcut {}", shortcut.path.display())),
                Ok(PatchOutcome::AlreadyPresent) => {}
                Err(err) => {
                    warn!(error = %err, "Launch shortcut skipped");
                    warnings.push(err.to_string());
                }
            }
        }

        let outcome = if applied.is_empty() {
            Outcome::unchanged("host configuration already patched")
        } else {
            Outcome::changed(applied.join(", "))
        };
        Ok(outcome.with_warnings(warnings))
    }
}

/// Creates the data tree and installs the packaged executables.
pub struct ProvisionStage;

impl ProvisionStage {
    fn directories(ctx: &RunContext) -> DirectorySpec {
        DirectorySpec::new(ctx.layout.data_directories())
    }

    /// The manifest describing this run's artifacts.
    fn manifest(ctx: &RunContext) -> std::io::Result<InstallManifest> {
        let build_id = ctx
            .artifacts
            .first()
            .map(|a| a.provenance.build_id.clone())
            .unwrap_or_default();
        ctx.artifacts
            .iter()
            .try_fold(InstallManifest::new(&ctx.build_spec.release, build_id), |manifest, a| {
                manifest.with_file(a.kind.file_name(), &a.path)
            })
    }
}

#[async_trait]
impl Stage for ProvisionStage {
    fn kind(&self) -> StageKind {
        StageKind::Provisioning
    }

    async fn is_already_satisfied(&self, ctx: &RunContext) -> bool {
        if !Self::directories(ctx).is_satisfied() {
            return false;
        }
        if ctx.artifacts.is_empty() {
            return ctx.installed_release_is_current();
        }
        let version_current = ctx
            .build
            .as_ref()
            .is_some_and(|b| provision::is_installed(&b.version_file, &ctx.layout.installed_version_file()));
        let manifest_current = Self::manifest(ctx)
            .is_ok_and(|m| InstallManifest::read(&ctx.layout.install_manifest_file()) == Some(m));
        version_current
            && manifest_current
            && ctx
                .artifacts
                .iter()
                .all(|a| provision::is_installed(&a.path, &ctx.installed_path(a.kind)))
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<Outcome, SetupError> {
        let created = provision::ensure_directories(&Self::directories(ctx))?;
        let manifest_path = ctx.layout.install_manifest_file();

        let mut installed = Vec::new();
        if !ctx.artifacts.is_empty() {
            let manifest = Self::manifest(ctx).map_err(|e| SetupError::ArtifactInstallFailed {
                path: manifest_path.clone(),
                reason: format!("cannot hash packaged executables: {}", e),
            })?;

            // No manifest while the installed set is mixed.
            let replacing = ctx
                .artifacts
                .iter()
                .any(|a| !provision::is_installed(&a.path, &ctx.installed_path(a.kind)));
            if replacing {
                InstallManifest::invalidate(&manifest_path)?;
            }
            for artifact in &ctx.artifacts {
                let dest = ctx.installed_path(artifact.kind);
                if provision::install_file(&artifact.path, &dest)? == InstallOutcome::Installed {
                    installed.push(artifact.kind.file_name());
                }
            }
            if let Some(build) = &ctx.build {
                let dest = ctx.layout.installed_version_file();
                if provision::install_file(&build.version_file, &dest)? == InstallOutcome::Installed {
                    installed.push(VERSION_FILE.to_string());
                }
            }
            if manifest.write(&manifest_path)? == InstallOutcome::Installed {
                installed.push(MANIFEST_FILE.to_string());
            }
        }

        if created.is_empty() && installed.is_empty() {
            return Ok(Outcome::unchanged("data tree and executables already in place"));
        }
        Ok(Outcome::changed(format!(
            "created {} directories, installed {}",
            created.len(),
            if installed.is_empty() {
                "nothing".to_string()
            } else {
                installed.join(", ")
            }
        )))
    }
}

/// Registers the windowed executable to start at login.
pub struct AutostartStage;

impl AutostartStage {
    fn entry(ctx: &RunContext) -> AutostartEntry {
        AutostartEntry::at_login(&ctx.config.autostart_name, ctx.installed_path(ArtifactKind::Windowed))
    }

    fn registrar(runner: &dyn CommandRunner) -> AutostartRegistrar<'_> {
        AutostartRegistrar::new(runner)
    }
}

#[async_trait]
impl Stage for AutostartStage {
    fn kind(&self) -> StageKind {
        StageKind::RegisteringAutostart
    }

    fn is_enabled(&self, ctx: &RunContext) -> bool {
        ctx.config.register_autostart
    }

    async fn is_already_satisfied(&self, ctx: &RunContext) -> bool {
        Self::registrar(ctx.runner()).is_registered(&Self::entry(ctx)).await
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<Outcome, SetupError> {
        let entry = Self::entry(ctx);
        Self::registrar(ctx.runner()).register(&entry).await?;
        Ok(Outcome::changed(format!(
            "{} -> {}",
            entry.name,
            entry.target.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stage_order_matches_state_machine() {
        let kinds: Vec<StageKind> = default_stages().iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, StageKind::ALL.to_vec());
    }
}
