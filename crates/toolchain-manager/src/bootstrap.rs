//! Package-manager bootstrapper: installs requirements through another
//! requirement's program (`npm install -g pnpm`, `python -m pip install ...`).

use decky_setup_core::{CommandRunner, CommandSpec, SetupError};
use tracing::{debug, info};

use crate::catalog::ToolchainCatalog;
use crate::probe::VersionProber;
use crate::requirement::AcquisitionSource;

/// Runs `ProvidedBy` edges of the catalog.
pub struct Bootstrapper<'a> {
    runner: &'a dyn CommandRunner,
    timeout_secs: u64,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            timeout_secs: 1800,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Whether every `ProvidedBy` requirement already meets its minimum.
    pub async fn is_satisfied(&self, catalog: &ToolchainCatalog) -> bool {
        let prober = VersionProber::new(self.runner);
        for requirement in catalog.iter().filter(|r| r.is_provided_by()) {
            if !prober.is_satisfied(requirement).await {
                return false;
            }
        }
        true
    }

    /// Bootstrap each unsatisfied `ProvidedBy` requirement in catalog order.
    ///
    /// Returns the names that were installed.
    pub async fn bootstrap(&self, catalog: &ToolchainCatalog) -> Result<Vec<String>, SetupError> {
        let prober = VersionProber::new(self.runner);
        let mut installed = Vec::new();

        for requirement in catalog.iter() {
            let AcquisitionSource::ProvidedBy { provider, args } = &requirement.source else {
                continue;
            };
            let tool = requirement.name.clone();

            if prober.is_satisfied(requirement).await {
                debug!(tool = %tool, "Already satisfied, skipping bootstrap");
                continue;
            }

            let program = catalog.provider_program(requirement).unwrap_or(provider.as_str());
            let command = CommandSpec::new(program, args.clone()).with_timeout(self.timeout_secs);
            info!(tool = %tool, command = %command.display(), "Bootstrapping");

            let output = self
                .runner
                .run(&command)
                .await
                .map_err(|e| SetupError::BootstrapFailed {
                    tool: tool.clone(),
                    reason: format!("cannot run {}: {}", provider, e),
                })?;
            if !output.passed() {
                return Err(SetupError::BootstrapFailed {
                    tool,
                    reason: format!(
                        "`{}` exited with code {}: {}",
                        command.display(),
                        output.exit_code,
                        output.tail()
                    ),
                });
            }

            let assessment = prober.probe(requirement).await;
            if !assessment.is_satisfied() {
                return Err(SetupError::BootstrapFailed {
                    tool,
                    reason: format!("not usable after `{}`", command.display()),
                });
            }

            info!(tool = %tool, "Bootstrapped");
            installed.push(tool);
        }

        Ok(installed)
    }
}
