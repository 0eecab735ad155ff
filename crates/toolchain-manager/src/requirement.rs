//! Toolchain requirements and how each one is detected and acquired.

use std::path::Path;

use decky_setup_core::CommandSpec;
use serde::Serialize;

use crate::version::MinimumVersion;

/// Command whose output reveals a tool's version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl ProbeSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn command(&self) -> CommandSpec {
        CommandSpec::new(self.program.clone(), self.args.clone())
    }
}

/// Installer package format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallerKind {
    /// Windows Installer package, run through `msiexec`.
    Msi,
    /// Self-contained setup executable.
    Exe,
}

/// Where a missing requirement comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AcquisitionSource {
    /// Downloaded from a fixed, versioned URL and installed silently.
    Installer {
        url: String,
        file_name: String,
        kind: InstallerKind,
        silent_args: Vec<String>,
    },
    /// Installed by running another requirement's program with `args`.
    ProvidedBy { provider: String, args: Vec<String> },
    /// Shipped inside another requirement's installer.
    Bundled { with: String },
}

impl AcquisitionSource {
    /// The requirement this one depends on, if any.
    pub fn depends_on(&self) -> Option<&str> {
        match self {
            AcquisitionSource::Installer { .. } => None,
            AcquisitionSource::ProvidedBy { provider, .. } => Some(provider),
            AcquisitionSource::Bundled { with } => Some(with),
        }
    }

    /// Command that runs a downloaded installer silently.
    ///
    /// `None` for sources that are not installers.
    pub fn install_command(&self, installer: &Path) -> Option<CommandSpec> {
        let AcquisitionSource::Installer {
            kind, silent_args, ..
        } = self
        else {
            return None;
        };

        let path = installer.to_string_lossy().to_string();
        let spec = match kind {
            InstallerKind::Msi => {
                let mut args = vec!["/i".to_string(), path, "/qn".to_string(), "/norestart".to_string()];
                args.extend(silent_args.iter().cloned());
                CommandSpec::new("msiexec", args)
            }
            InstallerKind::Exe => CommandSpec::new(path, silent_args.clone()),
        };
        Some(spec)
    }
}

/// One component the pipeline needs on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainRequirement {
    pub name: String,
    pub minimum: MinimumVersion,
    pub probe: ProbeSpec,
    pub source: AcquisitionSource,
}

impl ToolchainRequirement {
    pub fn new(
        name: impl Into<String>,
        minimum: MinimumVersion,
        probe: ProbeSpec,
        source: AcquisitionSource,
    ) -> Self {
        Self {
            name: name.into(),
            minimum,
            probe,
            source,
        }
    }

    pub fn is_installer(&self) -> bool {
        matches!(self.source, AcquisitionSource::Installer { .. })
    }

    pub fn is_provided_by(&self) -> bool {
        matches!(self.source, AcquisitionSource::ProvidedBy { .. })
    }

    pub fn is_bundled(&self) -> bool {
        matches!(self.source, AcquisitionSource::Bundled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_msi_install_command() {
        let source = AcquisitionSource::Installer {
            url: "https://nodejs.org/dist/v18.18.0/node-v18.18.0-x64.msi".to_string(),
            file_name: "node-v18.18.0-x64.msi".to_string(),
            kind: InstallerKind::Msi,
            silent_args: vec!["ALLUSERS=1".to_string()],
        };
        let cmd = source
            .install_command(&PathBuf::from("/tmp/x/node-v18.18.0-x64.msi"))
            .unwrap();
        assert_eq!(cmd.program, "msiexec");
        assert_eq!(
            cmd.args,
            vec!["/i", "/tmp/x/node-v18.18.0-x64.msi", "/qn", "/norestart", "ALLUSERS=1"]
        );
    }

    #[test]
    fn test_exe_install_command_runs_installer_itself() {
        let source = AcquisitionSource::Installer {
            url: "https://example.invalid/setup.exe".to_string(),
            file_name: "setup.exe".to_string(),
            kind: InstallerKind::Exe,
            silent_args: vec!["/quiet".to_string()],
        };
        let cmd = source.install_command(&PathBuf::from("/tmp/setup.exe")).unwrap();
        assert_eq!(cmd.display(), "/tmp/setup.exe /quiet");
    }

    #[test]
    fn test_non_installer_has_no_install_command() {
        let source = AcquisitionSource::Bundled {
            with: "node".to_string(),
        };
        assert!(source.install_command(&PathBuf::from("x")).is_none());
        assert_eq!(source.depends_on(), Some("node"));
    }
}
