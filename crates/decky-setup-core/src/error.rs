//! Failure taxonomy shared by every pipeline stage.
//!
//! Variants carry owned strings rather than source errors so that a
//! `SetupError` can be cloned into the run report and serialized as JSON.

use serde::Serialize;
use std::path::PathBuf;

/// Setup pipeline errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SetupError {
    #[error("could not determine version of {tool}: {reason}")]
    DetectionInconclusive { tool: String, reason: String },

    #[error("download of {tool} installer from {url} failed: {reason}")]
    DownloadFailed {
        tool: String,
        url: String,
        reason: String,
    },

    #[error("installer for {tool} failed (exit code {exit_code:?}): {reason}")]
    InstallFailed {
        tool: String,
        exit_code: Option<i32>,
        reason: String,
    },

    #[error("{tool} still not usable after install: {reason}")]
    VerificationFailed { tool: String, reason: String },

    #[error("bootstrap of {tool} failed: {reason}")]
    BootstrapFailed { tool: String, reason: String },

    #[error("build step '{step}' failed: {reason}")]
    BuildStepFailed { step: String, reason: String },

    #[error("packaging of {variant} executable failed: {reason}")]
    PackagingFailed { variant: String, reason: String },

    #[error("cannot read host configuration {path:?}: {reason}")]
    ConfigReadFailed { path: PathBuf, reason: String },

    #[error("cannot write host configuration {path:?}: {reason}")]
    ConfigWriteFailed {
        path: PathBuf,
        reason: String,
        required: bool,
    },

    #[error("cannot create directory {path:?}: {reason}")]
    DirectoryCreateFailed { path: PathBuf, reason: String },

    #[error("cannot install {path:?}: {reason}")]
    ArtifactInstallFailed { path: PathBuf, reason: String },

    #[error("autostart registration '{name}' failed: {reason}")]
    AutostartRegisterFailed { name: String, reason: String },
}

impl SetupError {
    /// Stable snake_case identifier of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SetupError::DetectionInconclusive { .. } => "detection_inconclusive",
            SetupError::DownloadFailed { .. } => "download_failed",
            SetupError::InstallFailed { .. } => "install_failed",
            SetupError::VerificationFailed { .. } => "verification_failed",
            SetupError::BootstrapFailed { .. } => "bootstrap_failed",
            SetupError::BuildStepFailed { .. } => "build_step_failed",
            SetupError::PackagingFailed { .. } => "packaging_failed",
            SetupError::ConfigReadFailed { .. } => "config_read_failed",
            SetupError::ConfigWriteFailed { .. } => "config_write_failed",
            SetupError::DirectoryCreateFailed { .. } => "directory_create_failed",
            SetupError::ArtifactInstallFailed { .. } => "artifact_install_failed",
            SetupError::AutostartRegisterFailed { .. } => "autostart_register_failed",
        }
    }

    /// Whether this error must stop the pipeline.
    ///
    /// A config write failure is fatal only when the patch it belongs to is
    /// required for the loader to work.
    pub fn is_fatal(&self) -> bool {
        match self {
            SetupError::DetectionInconclusive { .. }
            | SetupError::ConfigReadFailed { .. }
            | SetupError::AutostartRegisterFailed { .. } => false,
            SetupError::ConfigWriteFailed { required, .. } => *required,
            SetupError::DownloadFailed { .. }
            | SetupError::InstallFailed { .. }
            | SetupError::VerificationFailed { .. }
            | SetupError::BootstrapFailed { .. }
            | SetupError::BuildStepFailed { .. }
            | SetupError::PackagingFailed { .. }
            | SetupError::DirectoryCreateFailed { .. }
            | SetupError::ArtifactInstallFailed { .. } => true,
        }
    }

    /// Shorthand for a build step failure.
    pub fn build_step(step: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        SetupError::BuildStepFailed {
            step: step.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for setup operations.
pub type Result<T> = std::result::Result<T, SetupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let fatal = SetupError::BuildStepFailed {
            step: "frontend_build".to_string(),
            reason: "exit code 1".to_string(),
        };
        assert!(fatal.is_fatal());

        let read = SetupError::ConfigReadFailed {
            path: PathBuf::from("loader.json"),
            reason: "corrupt".to_string(),
        };
        assert!(!read.is_fatal());

        let autostart = SetupError::AutostartRegisterFailed {
            name: "PluginLoader".to_string(),
            reason: "access denied".to_string(),
        };
        assert!(!autostart.is_fatal());
    }

    #[test]
    fn test_config_write_fatal_only_when_required() {
        let required = SetupError::ConfigWriteFailed {
            path: PathBuf::from("a"),
            reason: "denied".to_string(),
            required: true,
        };
        let optional = SetupError::ConfigWriteFailed {
            path: PathBuf::from("a"),
            reason: "denied".to_string(),
            required: false,
        };
        assert!(required.is_fatal());
        assert!(!optional.is_fatal());
    }

    #[test]
    fn test_display_names_stage_input() {
        let err = SetupError::build_step("checkout", "git exited with code 128");
        let msg = err.to_string();
        assert!(msg.contains("checkout"));
        assert!(msg.contains("128"));
        assert_eq!(err.kind(), "build_step_failed");
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let err = SetupError::DownloadFailed {
            tool: "node".to_string(),
            url: "https://nodejs.org/x.msi".to_string(),
            reason: "404".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "download_failed");
        assert_eq!(json["tool"], "node");
    }
}
