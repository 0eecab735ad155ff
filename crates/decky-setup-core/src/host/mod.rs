//! Host mutation: configuration patches, shortcuts, provisioning, autostart
//! and the registry/host-application lookups they depend on.

pub mod autostart;
pub mod config_patch;
pub mod host_app;
pub mod provision;
pub mod registry;
pub mod shortcut;

pub use autostart::{AutostartEntry, AutostartRegistrar, TriggerScope};
pub use config_patch::{ConfigPatch, PatchOutcome, PatchTarget};
pub use host_app::{locate_host_app, CEF_DEBUG_MARKER, DEV_LAUNCH_ARG, HOST_APP_EXE};
pub use provision::{DirectorySpec, InstallManifest, InstallOutcome};
pub use shortcut::{Shortcut, ShortcutWriter};
