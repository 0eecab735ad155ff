//! Dependency acquirer: downloads and silently installs missing toolchain
//! components.
//!
//! All installers in a plan are fetched concurrently into one scratch
//! directory, then installed one at a time. Each install is followed by a
//! settle delay and a re-probe. The scratch directory is removed on every
//! exit path when its `TempDir` guard drops.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use decky_setup_core::{CommandRunner, SetupError};
use futures::future::try_join_all;
use futures::StreamExt;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::catalog::ToolchainCatalog;
use crate::plan::InstallationPlan;
use crate::probe::VersionProber;
use crate::requirement::{AcquisitionSource, ToolchainRequirement};

/// Windows Installer "success, reboot required".
pub const EXIT_REBOOT_REQUIRED: i32 = 3010;

/// Fetches a URL into a local file.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Write the body of `url` to `dest` and return the byte count.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, String>;
}

/// [`Downloader`] over HTTPS with `reqwest`, streaming to disk.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("decky-setup/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| format!("cannot create {}: {}", dest.display(), e))?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| e.to_string())?;
            file.write_all(&chunk)
                .await
                .map_err(|e| format!("cannot write {}: {}", dest.display(), e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| e.to_string())?;
        Ok(written)
    }
}

/// What an acquisition run did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AcquireReport {
    /// Requirements installed, in install order.
    pub installed: Vec<String>,
    /// Non-fatal notes, such as a pending reboot.
    pub warnings: Vec<String>,
}

struct Download<'r> {
    requirement: &'r ToolchainRequirement,
    url: String,
    path: PathBuf,
}

/// Installs the `Installer` and `Bundled` entries of an [`InstallationPlan`].
pub struct Acquirer<'a> {
    runner: &'a dyn CommandRunner,
    downloader: &'a dyn Downloader,
    settle_delay: Duration,
    install_timeout_secs: u64,
    scratch_parent: Option<PathBuf>,
}

impl<'a> Acquirer<'a> {
    pub fn new(runner: &'a dyn CommandRunner, downloader: &'a dyn Downloader) -> Self {
        Self {
            runner,
            downloader,
            settle_delay: Duration::from_secs(10),
            install_timeout_secs: 1800,
            scratch_parent: None,
        }
    }

    /// Pause between an installer exiting and the verification re-probe.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_install_timeout(mut self, secs: u64) -> Self {
        self.install_timeout_secs = secs;
        self
    }

    /// Create the scratch directory under `dir` instead of the system temp dir.
    pub fn with_scratch_parent(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_parent = Some(dir.into());
        self
    }

    /// Acquire everything in `plan` that comes from an installer.
    pub async fn acquire(
        &self,
        catalog: &ToolchainCatalog,
        plan: &InstallationPlan,
    ) -> Result<AcquireReport, SetupError> {
        let mut report = AcquireReport::default();

        let installers: Vec<&ToolchainRequirement> = plan
            .entries()
            .iter()
            .filter_map(|e| catalog.get(&e.name))
            .filter(|r| r.is_installer())
            .collect();

        if !installers.is_empty() {
            let scratch = self.scratch_dir(installers[0])?;
            let downloads = self.download_all(&installers, scratch.path()).await?;

            for download in &downloads {
                self.install(download, &mut report).await?;
            }
            drop(scratch);
        }

        let prober = VersionProber::new(self.runner);
        for entry in plan.entries() {
            let Some(requirement) = catalog.get(&entry.name) else {
                continue;
            };
            if !requirement.is_bundled() {
                continue;
            }
            let assessment = prober.probe(requirement).await;
            if !assessment.is_satisfied() {
                return Err(SetupError::VerificationFailed {
                    tool: requirement.name.clone(),
                    reason: format!(
                        "bundled component still {} after installing its carrier",
                        describe(&assessment)
                    ),
                });
            }
        }

        Ok(report)
    }

    fn scratch_dir(&self, first: &ToolchainRequirement) -> Result<tempfile::TempDir, SetupError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("decky-setup-");
        let dir = match &self.scratch_parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        };
        dir.map_err(|e| SetupError::DownloadFailed {
            tool: first.name.clone(),
            url: String::new(),
            reason: format!("cannot create scratch directory: {}", e),
        })
    }

    async fn download_all<'r>(
        &self,
        installers: &[&'r ToolchainRequirement],
        scratch: &Path,
    ) -> Result<Vec<Download<'r>>, SetupError> {
        let jobs = installers.iter().copied().filter_map(|requirement| {
            let AcquisitionSource::Installer { url, file_name, .. } = &requirement.source else {
                return None;
            };
            let download = Download {
                requirement,
                url: url.clone(),
                path: scratch.join(file_name),
            };
            Some(async move {
                info!(tool = %download.requirement.name, url = %download.url, "Downloading installer");
                let bytes = self
                    .downloader
                    .download(&download.url, &download.path)
                    .await
                    .map_err(|reason| SetupError::DownloadFailed {
                        tool: download.requirement.name.clone(),
                        url: download.url.clone(),
                        reason,
                    })?;
                info!(tool = %download.requirement.name, bytes, "Downloaded installer");
                Ok::<_, SetupError>(download)
            })
        });

        try_join_all(jobs).await
    }

    async fn install(&self, download: &Download<'_>, report: &mut AcquireReport) -> Result<(), SetupError> {
        let requirement = download.requirement;
        let tool = requirement.name.clone();

        let Some(command) = requirement.source.install_command(&download.path) else {
            return Ok(());
        };
        let command = command.with_timeout(self.install_timeout_secs);

        info!(tool = %tool, command = %command.display(), "Running installer");
        let output = self
            .runner
            .run(&command)
            .await
            .map_err(|e| SetupError::InstallFailed {
                tool: tool.clone(),
                exit_code: None,
                reason: e.to_string(),
            })?;

        match output.exit_code {
            0 => {}
            EXIT_REBOOT_REQUIRED => {
                warn!(tool = %tool, "Installer succeeded but requested a reboot");
                report
                    .warnings
                    .push(format!("{} installed; a reboot is required to finish", tool));
            }
            code => {
                return Err(SetupError::InstallFailed {
                    tool,
                    exit_code: Some(code),
                    reason: output.tail(),
                })
            }
        }

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let assessment = VersionProber::new(self.runner).probe(requirement).await;
        if !assessment.is_satisfied() {
            return Err(SetupError::VerificationFailed {
                tool,
                reason: format!("still {} after install", describe(&assessment)),
            });
        }

        info!(tool = %tool, version = ?assessment.result.version().map(|v| v.to_string()), "Installed");
        report.installed.push(tool);
        Ok(())
    }
}

fn describe(assessment: &crate::probe::Assessment) -> String {
    match assessment.result.version() {
        Some(v) => format!("at {} (need >= {})", v, assessment.minimum),
        None => "not detected".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::StaticDownloader;
    use crate::probe::Assessment;
    use decky_setup_core::fakes::ScriptedRunner;
    use decky_setup_core::CommandOutput;
    use tempfile::tempdir;

    fn node_only_plan(catalog: &ToolchainCatalog) -> InstallationPlan {
        let assessments: Vec<Assessment> = catalog
            .iter()
            .map(|r| Assessment {
                name: r.name.clone(),
                minimum: r.minimum,
                result: if r.name == "node" {
                    crate::probe::ProbeResult::Absent
                } else {
                    crate::probe::ProbeResult::Present {
                        version: crate::version::ToolVersion::new(99, 0, 0),
                    }
                },
                warning: None,
            })
            .collect();
        InstallationPlan::from_assessments(catalog, &assessments)
    }

    #[tokio::test]
    async fn test_reboot_required_counts_as_success() {
        let catalog = ToolchainCatalog::windows_default().unwrap();
        let plan = node_only_plan(&catalog);
        let runner = ScriptedRunner::new();
        runner
            .on("msiexec /i", CommandOutput::failed(EXIT_REBOOT_REQUIRED, ""))
            .on("node --version", CommandOutput::ok("v18.18.0"));
        let downloader = StaticDownloader::new().with_body(crate::catalog::NODE_INSTALLER_URL, b"msi");

        let report = Acquirer::new(&runner, &downloader)
            .with_settle_delay(Duration::ZERO)
            .acquire(&catalog, &plan)
            .await
            .unwrap();

        assert_eq!(report.installed, vec!["node"]);
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_install_cleans_scratch() {
        let catalog = ToolchainCatalog::windows_default().unwrap();
        let plan = node_only_plan(&catalog);
        let scratch_parent = tempdir().unwrap();
        let runner = ScriptedRunner::new();
        runner.on("msiexec /i", CommandOutput::failed(1603, "Fatal error during installation."));
        let downloader = StaticDownloader::new().with_body(crate::catalog::NODE_INSTALLER_URL, b"msi");

        let err = Acquirer::new(&runner, &downloader)
            .with_settle_delay(Duration::ZERO)
            .with_scratch_parent(scratch_parent.path())
            .acquire(&catalog, &plan)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SetupError::InstallFailed {
                tool: "node".to_string(),
                exit_code: Some(1603),
                reason: "Fatal error during installation.".to_string(),
            }
        );
        assert_eq!(std::fs::read_dir(scratch_parent.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_download_failure_is_fatal_and_nothing_installed() {
        let catalog = ToolchainCatalog::windows_default().unwrap();
        let plan = node_only_plan(&catalog);
        let runner = ScriptedRunner::new();
        let downloader = StaticDownloader::new();

        let err = Acquirer::new(&runner, &downloader)
            .with_settle_delay(Duration::ZERO)
            .acquire(&catalog, &plan)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "download_failed");
        assert!(err.is_fatal());
        assert!(!runner.was_called("msiexec"));
    }

    #[tokio::test]
    async fn test_still_missing_after_install_fails_verification() {
        let catalog = ToolchainCatalog::windows_default().unwrap();
        let plan = node_only_plan(&catalog);
        let runner = ScriptedRunner::new();
        runner.on("msiexec /i", CommandOutput::ok(""));
        let downloader = StaticDownloader::new().with_body(crate::catalog::NODE_INSTALLER_URL, b"msi");

        let err = Acquirer::new(&runner, &downloader)
            .with_settle_delay(Duration::ZERO)
            .acquire(&catalog, &plan)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "verification_failed");
    }
}
