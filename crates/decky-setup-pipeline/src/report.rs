//! Final run report.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use decky_setup_core::SetupError;
use serde::Serialize;

use crate::pipeline::PipelineState;
use crate::stage::StageKind;

/// How a single stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    AlreadySatisfied,
    Failed,
    NotRun,
    Disabled,
}

impl StepStatus {
    pub fn name(&self) -> &'static str {
        match self {
            StepStatus::Succeeded => "succeeded",
            StepStatus::AlreadySatisfied => "already_satisfied",
            StepStatus::Failed => "failed",
            StepStatus::NotRun => "not_run",
            StepStatus::Disabled => "disabled",
        }
    }
}

/// One stage's entry in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub stage: StageKind,
    pub status: StepStatus,
    pub detail: String,
    pub warnings: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SetupError>,

    /// Whether `error` stopped the run.
    pub fatal: bool,
    pub duration_ms: u64,
}

impl StepRecord {
    pub fn new(stage: StageKind, status: StepStatus, detail: impl Into<String>) -> Self {
        Self {
            stage,
            status,
            detail: detail.into(),
            warnings: Vec::new(),
            error: None,
            fatal: false,
            duration_ms: 0,
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_error(mut self, error: SetupError) -> Self {
        self.fatal = error.is_fatal();
        self.error = Some(error);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Per-status step counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepCounts {
    pub succeeded: usize,
    pub already_satisfied: usize,
    pub failed: usize,
    pub not_run: usize,
    pub disabled: usize,
    pub warnings: usize,
}

impl StepCounts {
    fn tally(steps: &[StepRecord]) -> Self {
        let mut counts = Self::default();
        for step in steps {
            match step.status {
                StepStatus::Succeeded => counts.succeeded += 1,
                StepStatus::AlreadySatisfied => counts.already_satisfied += 1,
                StepStatus::Failed => counts.failed += 1,
                StepStatus::NotRun => counts.not_run += 1,
                StepStatus::Disabled => counts.disabled += 1,
            }
            counts.warnings += step.warnings.len();
        }
        counts
    }
}

/// What the operator does after a successful run.
pub const NEXT_STEPS: [&str; 4] = [
    "Close Steam if it is running",
    "Start Steam from the desktop shortcut, which passes -dev",
    "Enter Big Picture mode",
    "Hold the STEAM button and press A to open the Decky menu",
];

/// Summary of one pipeline run, emitted once on `Done` or `Failed`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub release: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub state: PipelineState,
    pub steps: Vec<StepRecord>,
    pub counts: StepCounts,

    /// Empty unless the run finished.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub next_steps: Vec<String>,
}

impl PipelineReport {
    pub fn new(
        run_id: impl Into<String>,
        release: impl Into<String>,
        started_at: DateTime<Utc>,
        state: PipelineState,
        steps: Vec<StepRecord>,
    ) -> Self {
        let counts = StepCounts::tally(&steps);
        let next_steps = if state == PipelineState::Done {
            NEXT_STEPS.iter().map(ToString::to_string).collect()
        } else {
            Vec::new()
        };
        Self {
            run_id: run_id.into(),
            release: release.into(),
            started_at,
            finished_at: Utc::now(),
            state,
            steps,
            counts,
            next_steps,
        }
    }

    pub fn success(&self) -> bool {
        self.state == PipelineState::Done
    }

    /// Process exit code: 0 on `Done`, warnings allowed; 1 on `Failed`.
    pub fn exit_code(&self) -> u8 {
        if self.success() {
            0
        } else {
            1
        }
    }

    pub fn failed_stage(&self) -> Option<StageKind> {
        match &self.state {
            PipelineState::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0) as u64
    }

    /// Every warning in step order, prefixed with its stage.
    pub fn warnings(&self) -> Vec<String> {
        self.steps
            .iter()
            .flat_map(|s| s.warnings.iter().map(move |w| format!("{}: {}", s.stage, w)))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable report for the terminal.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "decky-setup run {} (release {})", self.run_id, self.release);
        for step in &self.steps {
            let _ = write!(out, "  {:<22} {:<18}", step.stage.name(), step.status.name());
            if step.duration_ms > 0 {
                let _ = write!(out, " {:>7}ms", step.duration_ms);
            }
            if !step.detail.is_empty() {
                let _ = write!(out, "  {}", step.detail);
            }
            out.push('\n');
            for warning in &step.warnings {
                let _ = writeln!(out, "      warning: {}", warning);
            }
        }

        let c = &self.counts;
        let _ = writeln!(
            out,
            "{} succeeded, {} already satisfied, {} failed, {} not run, {} disabled, {} warning(s)",
            c.succeeded, c.already_satisfied, c.failed, c.not_run, c.disabled, c.warnings
        );
        match &self.state {
            PipelineState::Failed { stage, error } => {
                let _ = writeln!(out, "FAILED in {}: {}", stage, error);
            }
            _ => {
                let _ = writeln!(out, "DONE in {}ms", self.duration_ms());
            }
        }
        if !self.next_steps.is_empty() {
            let _ = writeln!(out, "\nNext steps:");
            for (i, step) in self.next_steps.iter().enumerate() {
                let _ = writeln!(out, "  {}. {}", i + 1, step);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_report() -> PipelineReport {
        let error = SetupError::BuildStepFailed {
            step: "checkout".to_string(),
            reason: "exit 128".to_string(),
        };
        let steps = vec![
            StepRecord::new(StageKind::Probing, StepStatus::Succeeded, "ok")
                .with_warnings(vec!["python version unreadable".to_string()]),
            StepRecord::new(StageKind::Building, StepStatus::Failed, "").with_error(error.clone()),
            StepRecord::new(StageKind::Packaging, StepStatus::NotRun, ""),
        ];
        PipelineReport::new(
            "run-1",
            "main",
            Utc::now(),
            PipelineState::Failed {
                stage: StageKind::Building,
                error,
            },
            steps,
        )
    }

    #[test]
    fn test_counts_and_exit_code() {
        let report = failed_report();
        assert_eq!(report.counts.succeeded, 1);
        assert_eq!(report.counts.failed, 1);
        assert_eq!(report.counts.not_run, 1);
        assert_eq!(report.counts.warnings, 1);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.failed_stage(), Some(StageKind::Building));
        assert_eq!(report.warnings(), vec!["probing: python version unreadable"]);
    }

    #[test]
    fn test_render_text_names_failed_stage() {
        let text = failed_report().render_text();
        assert!(text.contains("FAILED in building"));
        assert!(text.contains("not_run"));
        assert!(text.contains("warning: python version unreadable"));
        assert!(!text.contains("Next steps"));
        assert!(failed_report().next_steps.is_empty());
    }

    #[test]
    fn test_done_report_exits_zero() {
        let report = PipelineReport::new(
            "run-2",
            "main",
            Utc::now(),
            PipelineState::Done,
            vec![StepRecord::new(StageKind::Probing, StepStatus::AlreadySatisfied, "")],
        );
        assert!(report.success());
        assert_eq!(report.exit_code(), 0);
        assert!(report.failed_stage().is_none());
        let text = report.render_text();
        assert!(text.contains("DONE"));
        assert!(text.contains("Next steps:\n  1. Close Steam if it is running"));
        assert!(text.contains("4. Hold the STEAM button and press A"));
        assert_eq!(report.next_steps.len(), NEXT_STEPS.len());
    }
}
