//! Structured observability hooks for setup run lifecycle events.
//!
//! All events carry an `event` field so log pipelines can filter on it:
//! `run.started`, `stage.started`, `stage.skipped`, `stage.finished`,
//! `stage.failed` and `run.finished`.

use tracing::{info, warn};

use crate::error::SetupError;

/// Span that tags every event of one run with its `run_id`.
///
/// ```ignore
/// run_stages(ctx).instrument(obs::run_span(&ctx.run_id)).await
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("decky_setup.run", run_id = %run_id)
}

/// Emit event: run started for a release.
pub fn emit_run_started(run_id: &str, release: &str) {
    info!(event = "run.started", run_id = %run_id, release = %release);
}

/// Emit event: a stage begins executing.
pub fn emit_stage_started(stage: &str) {
    info!(event = "stage.started", stage = %stage);
}

/// Emit event: a stage was skipped, e.g. `already_satisfied` or `disabled`.
pub fn emit_stage_skipped(stage: &str, reason: &str) {
    info!(event = "stage.skipped", stage = %stage, reason = %reason);
}

/// Emit event: a stage finished, with the number of non-fatal warnings.
pub fn emit_stage_finished(stage: &str, duration_ms: u64, warnings: usize) {
    info!(
        event = "stage.finished",
        stage = %stage,
        duration_ms = duration_ms,
        warnings = warnings,
    );
}

/// Emit event: a stage failed (warning level, fatal or not).
pub fn emit_stage_failed(stage: &str, error: &SetupError) {
    warn!(
        event = "stage.failed",
        stage = %stage,
        kind = error.kind(),
        fatal = error.is_fatal(),
        error = %error,
    );
}

/// Emit event: run finished in its terminal state.
pub fn emit_run_finished(run_id: &str, state: &str, duration_ms: u64, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        state = %state,
        duration_ms = duration_ms,
        success = success,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _entered = run_span("test-run-id").entered();
        emit_stage_started("probing");
        emit_stage_skipped("acquiring", "already_satisfied");
    }
}
