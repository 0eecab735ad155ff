//! Pipeline stage definitions and the uniform `Stage` capability.

use async_trait::async_trait;
use decky_setup_core::SetupError;
use serde::{Deserialize, Serialize};

use crate::context::RunContext;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Detect installed toolchain versions and compute the plan.
    Probing,

    /// Download and silently install missing components.
    Acquiring,

    /// Install secondary package managers through primary ones.
    Bootstrapping,

    /// Check out and build the loader sources.
    Building,

    /// Produce the console and windowed executables.
    Packaging,

    /// Patch host application configuration.
    ConfiguringHost,

    /// Create the data tree and install the executables.
    Provisioning,

    /// Register the windowed executable to start at login.
    RegisteringAutostart,
}

impl StageKind {
    /// Every stage, in execution order.
    pub const ALL: [StageKind; 8] = [
        StageKind::Probing,
        StageKind::Acquiring,
        StageKind::Bootstrapping,
        StageKind::Building,
        StageKind::Packaging,
        StageKind::ConfiguringHost,
        StageKind::Provisioning,
        StageKind::RegisteringAutostart,
    ];

    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Probing => "probing",
            StageKind::Acquiring => "acquiring",
            StageKind::Bootstrapping => "bootstrapping",
            StageKind::Building => "building",
            StageKind::Packaging => "packaging",
            StageKind::ConfiguringHost => "configuring_host",
            StageKind::Provisioning => "provisioning",
            StageKind::RegisteringAutostart => "registering_autostart",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a stage that ran to completion reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// One-line human summary.
    pub detail: String,

    /// Non-fatal problems met along the way.
    pub warnings: Vec<String>,

    /// False when the stage found nothing to change on the host.
    pub changed: bool,
}

impl Outcome {
    /// The stage changed host state.
    pub fn changed(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            warnings: Vec::new(),
            changed: true,
        }
    }

    /// The stage ran but everything was already in place.
    pub fn unchanged(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            warnings: Vec::new(),
            changed: false,
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// One step of the pipeline.
///
/// The controller asks `is_already_satisfied` first and only calls `run`
/// when it returns false. Both must re-check host state rather than trust
/// what an earlier run did.
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Disabled stages are recorded but neither checked nor run.
    fn is_enabled(&self, _ctx: &RunContext) -> bool {
        true
    }

    async fn is_already_satisfied(&self, ctx: &RunContext) -> bool;

    async fn run(&self, ctx: &mut RunContext) -> Result<Outcome, SetupError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(StageKind::Probing.name(), "probing");
        assert_eq!(StageKind::ConfiguringHost.name(), "configuring_host");
        assert_eq!(StageKind::RegisteringAutostart.to_string(), "registering_autostart");
    }

    #[test]
    fn test_serde_name_matches_display() {
        for kind in StageKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.name());
        }
    }

    #[test]
    fn test_outcome_builders() {
        let mut outcome = Outcome::unchanged("nothing to do").with_warnings(vec!["a".to_string()]);
        outcome.warn("b");
        assert!(!outcome.changed);
        assert_eq!(outcome.warnings, vec!["a", "b"]);
        assert!(Outcome::changed("did it").changed);
    }
}
