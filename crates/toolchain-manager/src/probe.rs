//! Version prober: detects which requirements are present and at which version.
//!
//! Probing has no side effects and never fails the run. A tool that cannot
//! be started or exits non-zero is `Absent`; a tool that runs but prints no
//! recognisable version is also `Absent`, with a warning attached.

use decky_setup_core::{CommandRunner, SetupError};
use serde::Serialize;
use tracing::debug;

use crate::catalog::ToolchainCatalog;
use crate::requirement::ToolchainRequirement;
use crate::version::{MinimumVersion, ToolVersion};

/// Outcome of running one probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeResult {
    Absent,
    Present { version: ToolVersion },
}

impl ProbeResult {
    pub fn version(&self) -> Option<&ToolVersion> {
        match self {
            ProbeResult::Absent => None,
            ProbeResult::Present { version } => Some(version),
        }
    }
}

/// A requirement's probe result judged against its minimum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assessment {
    pub name: String,
    pub minimum: MinimumVersion,
    pub result: ProbeResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<SetupError>,
}

impl Assessment {
    pub fn is_satisfied(&self) -> bool {
        self.result
            .version()
            .is_some_and(|v| self.minimum.satisfied_by(v))
    }

    /// Present but below the minimum.
    pub fn is_outdated(&self) -> bool {
        self.result.version().is_some() && !self.is_satisfied()
    }

    /// One line for terminal output, e.g. `node 18.18.0 (>= 18.18) ok`.
    pub fn summary_line(&self) -> String {
        let found = match self.result.version() {
            Some(v) => v.to_string(),
            None => "absent".to_string(),
        };
        let verdict = if self.is_satisfied() {
            "ok"
        } else if self.is_outdated() {
            "outdated"
        } else {
            "missing"
        };
        format!("{:<12} {:<10} (>= {}) {}", self.name, found, self.minimum, verdict)
    }
}

/// Runs requirement probes through a [`CommandRunner`].
pub struct VersionProber<'a> {
    runner: &'a dyn CommandRunner,
    timeout_secs: u64,
}

impl<'a> VersionProber<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            timeout_secs: 60,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Probe one requirement.
    pub async fn probe(&self, requirement: &ToolchainRequirement) -> Assessment {
        let spec = requirement.probe.command().with_timeout(self.timeout_secs);
        let mut assessment = Assessment {
            name: requirement.name.clone(),
            minimum: requirement.minimum,
            result: ProbeResult::Absent,
            warning: None,
        };

        let output = match self.runner.run(&spec).await {
            Ok(output) => output,
            Err(e) => {
                debug!(tool = %requirement.name, error = %e, "Probe could not run");
                return assessment;
            }
        };

        if !output.passed() {
            debug!(tool = %requirement.name, exit_code = output.exit_code, "Probe exited non-zero");
            return assessment;
        }

        let version = ToolVersion::parse_from_output(&output.stdout)
            .or_else(|| ToolVersion::parse_from_output(&output.stderr));

        match version {
            Some(version) => {
                debug!(tool = %requirement.name, version = %version, "Probe found version");
                assessment.result = ProbeResult::Present { version };
            }
            None => {
                assessment.warning = Some(SetupError::DetectionInconclusive {
                    tool: requirement.name.clone(),
                    reason: format!("no version in output of `{}`", spec.display()),
                });
            }
        }
        assessment
    }

    /// Probe every requirement in catalog order.
    pub async fn probe_all(&self, catalog: &ToolchainCatalog) -> Vec<Assessment> {
        let mut assessments = Vec::with_capacity(catalog.requirements().len());
        for requirement in catalog.iter() {
            assessments.push(self.probe(requirement).await);
        }
        assessments
    }

    /// Whether `requirement` currently meets its minimum.
    pub async fn is_satisfied(&self, requirement: &ToolchainRequirement) -> bool {
        self.probe(requirement).await.is_satisfied()
    }
}
