//! decky-setup-pipeline: the staged build and install pipeline
//!
//! Provides the pipeline controller that:
//! - Probes and acquires the toolchain, then bootstraps package managers
//! - Builds the loader and packages console and windowed executables
//! - Patches host configuration, provisions the data tree and registers autostart
//! - Skips every stage whose effect is already present on the host

pub mod build;
pub mod context;
pub mod package;
pub mod pipeline;
pub mod report;
pub mod spec;
pub mod stage;
pub mod stages;

// Re-export key types
pub use build::{BuildOrchestrator, BuildOutput};
pub use context::RunContext;
pub use package::{ArtifactKind, BuildArtifact, Packager, Provenance};
pub use pipeline::{PipelineController, PipelineState};
pub use report::{PipelineReport, StepCounts, StepRecord, StepStatus};
pub use spec::{BuildSpec, BuildStep};
pub use stage::{Outcome, Stage, StageKind};
pub use stages::default_stages;
