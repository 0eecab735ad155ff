//! decky-setup-core: shared building blocks for the Decky Loader setup pipeline
//!
//! This crate holds the error taxonomy, run configuration and filesystem
//! layout, the external command seam and its test fake, tracing setup, and
//! the host mutation modules (config patches, provisioning, autostart).

pub mod config;
pub mod error;
pub mod exec;
pub mod fakes;
pub mod host;
pub mod layout;
pub mod obs;
pub mod telemetry;

pub use config::SetupConfig;
pub use error::{Result, SetupError};
pub use exec::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use layout::HostLayout;
pub use telemetry::init_tracing;
