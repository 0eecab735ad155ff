//! toolchain-manager: the toolchain layer of decky-setup
//!
//! Declares what the build needs on the host ([`ToolchainCatalog`]), finds out
//! what is there ([`VersionProber`]), decides what is missing
//! ([`InstallationPlan`]) and fills the gaps, either from vendor installers
//! ([`Acquirer`]) or through a package manager that is already present
//! ([`Bootstrapper`]).

pub mod acquire;
pub mod bootstrap;
pub mod catalog;
pub mod error;
pub mod fakes;
pub mod plan;
pub mod probe;
pub mod requirement;
pub mod version;

pub use acquire::{AcquireReport, Acquirer, Downloader, HttpDownloader, EXIT_REBOOT_REQUIRED};
pub use bootstrap::Bootstrapper;
pub use catalog::ToolchainCatalog;
pub use error::{CatalogError, Result};
pub use plan::{InstallationPlan, PlanReason, PlannedInstall};
pub use probe::{Assessment, ProbeResult, VersionProber};
pub use requirement::{AcquisitionSource, InstallerKind, ProbeSpec, ToolchainRequirement};
pub use version::{MinimumVersion, ToolVersion};
