//! Pipeline controller: drives the stage state machine and emits the report.

use std::time::Instant;

use chrono::Utc;
use decky_setup_core::{obs, SetupError};
use serde::Serialize;
use tracing::{debug, info, Instrument};

use crate::context::RunContext;
use crate::report::{PipelineReport, StepRecord, StepStatus};
use crate::stage::{Stage, StageKind};
use crate::stages::default_stages;

/// Controller state.
///
/// `Running(stage)` follows the stage order; `Failed` is reachable from any
/// non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Running { stage: StageKind },
    Done,
    Failed { stage: StageKind, error: SetupError },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineState::Running { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Running { stage } => stage.name(),
            PipelineState::Done => "done",
            PipelineState::Failed { .. } => "failed",
        }
    }
}

/// Runs stages in order, skipping those already satisfied.
pub struct PipelineController {
    stages: Vec<Box<dyn Stage>>,
}

impl PipelineController {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn with_default_stages() -> Self {
        Self::new(default_stages())
    }

    pub fn stages(&self) -> impl Iterator<Item = StageKind> + '_ {
        self.stages.iter().map(|s| s.kind())
    }

    /// Execute the pipeline against `ctx`.
    ///
    /// Never returns an error: every failure ends up in the report.
    pub async fn run(&self, ctx: &mut RunContext) -> PipelineReport {
        let span = obs::run_span(&ctx.run_id);
        self.execute(ctx).instrument(span).await
    }

    async fn execute(&self, ctx: &mut RunContext) -> PipelineReport {
        let started_at = Utc::now();
        let start = Instant::now();
        obs::emit_run_started(&ctx.run_id, &ctx.config.release);

        let mut steps = Vec::with_capacity(self.stages.len());
        let mut failure: Option<(StageKind, SetupError)> = None;

        for stage in &self.stages {
            let kind = stage.kind();

            if failure.is_some() {
                steps.push(StepRecord::new(kind, StepStatus::NotRun, ""));
                continue;
            }

            if !stage.is_enabled(ctx) {
                obs::emit_stage_skipped(kind.name(), "disabled");
                steps.push(StepRecord::new(kind, StepStatus::Disabled, "disabled by configuration"));
                continue;
            }

            if stage.is_already_satisfied(ctx).await {
                obs::emit_stage_skipped(kind.name(), "already_satisfied");
                steps.push(StepRecord::new(kind, StepStatus::AlreadySatisfied, ""));
                continue;
            }

            debug!(state = ?PipelineState::Running { stage: kind }, "Entering state");
            obs::emit_stage_started(kind.name());
            let stage_start = Instant::now();
            let result = stage.run(ctx).await;
            let duration_ms = stage_start.elapsed().as_millis() as u64;

            match result {
                Ok(outcome) => {
                    obs::emit_stage_finished(kind.name(), duration_ms, outcome.warnings.len());
                    let status = if outcome.changed {
                        StepStatus::Succeeded
                    } else {
                        StepStatus::AlreadySatisfied
                    };
                    steps.push(
                        StepRecord::new(kind, status, outcome.detail)
                            .with_warnings(outcome.warnings)
                            .with_duration(duration_ms),
                    );
                }
                Err(error) => {
                    obs::emit_stage_failed(kind.name(), &error);
                    let fatal = error.is_fatal();
                    let warnings = if fatal { Vec::new() } else { vec![error.to_string()] };
                    steps.push(
                        StepRecord::new(kind, StepStatus::Failed, "")
                            .with_warnings(warnings)
                            .with_error(error.clone())
                            .with_duration(duration_ms),
                    );
                    if fatal {
                        failure = Some((kind, error));
                    }
                }
            }
        }

        let state = match failure {
            Some((stage, error)) => PipelineState::Failed { stage, error },
            None => PipelineState::Done,
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_run_finished(&ctx.run_id, state.name(), duration_ms, state == PipelineState::Done);
        info!(run_id = %ctx.run_id, state = state.name(), "Setup pipeline finished");

        PipelineReport::new(ctx.run_id.clone(), ctx.config.release.clone(), started_at, state, steps)
    }
}
