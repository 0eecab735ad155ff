//! The set of toolchain requirements and the dependency edges between them.
//!
//! `ProvidedBy` and `Bundled` sources are edges `provider -> requirement`.
//! They must form a DAG; the catalog stores requirements in a stable
//! topological order (Kahn's algorithm, ties broken by declaration order) so
//! every consumer can simply iterate.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use serde::Serialize;

use crate::error::{CatalogError, Result};
use crate::requirement::{AcquisitionSource, InstallerKind, ProbeSpec, ToolchainRequirement};
use crate::version::MinimumVersion;

pub const NODE_INSTALLER_URL: &str = "https://nodejs.org/dist/v18.18.0/node-v18.18.0-x64.msi";
pub const PYTHON_INSTALLER_URL: &str = "https://www.python.org/ftp/python/3.11.9/python-3.11.9-amd64.exe";
pub const GIT_INSTALLER_URL: &str =
    "https://github.com/git-for-windows/git/releases/download/v2.44.0.windows.1/Git-2.44.0-64-bit.exe";

/// Validated, topologically ordered requirements.
#[derive(Debug, Clone, Serialize)]
pub struct ToolchainCatalog {
    requirements: Vec<ToolchainRequirement>,
    well_known_dirs: Vec<PathBuf>,
}

impl ToolchainCatalog {
    /// Validate and order `requirements`.
    pub fn new(requirements: Vec<ToolchainRequirement>) -> Result<Self> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, req) in requirements.iter().enumerate() {
            if index.insert(req.name.as_str(), i).is_some() {
                return Err(CatalogError::DuplicateRequirement(req.name.clone()));
            }
        }

        // downstream[provider] = requirements that need it
        let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); requirements.len()];
        let mut in_degree = vec![0usize; requirements.len()];
        for (i, req) in requirements.iter().enumerate() {
            if let Some(provider) = req.source.depends_on() {
                let p = *index
                    .get(provider)
                    .ok_or_else(|| CatalogError::UnknownProvider {
                        requirement: req.name.clone(),
                        provider: provider.to_string(),
                    })?;
                downstream[p].push(i);
                in_degree[i] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..requirements.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(requirements.len());

        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &d in &downstream[i] {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    ready.insert(d);
                }
            }
        }

        if order.len() != requirements.len() {
            let members = (0..requirements.len())
                .filter(|i| !order.contains(i))
                .map(|i| requirements[i].name.clone())
                .collect();
            return Err(CatalogError::Cycle { members });
        }

        let mut slots: Vec<Option<ToolchainRequirement>> = requirements.into_iter().map(Some).collect();
        let requirements = order.into_iter().filter_map(|i| slots[i].take()).collect();

        Ok(Self {
            requirements,
            well_known_dirs: Vec::new(),
        })
    }

    /// Extra directories where freshly installed tools land.
    pub fn with_well_known_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.well_known_dirs = dirs;
        self
    }

    /// The toolchain needed to build Decky Loader on a Windows desktop.
    pub fn windows_default() -> Result<Self> {
        let catalog = Self::new(vec![
            ToolchainRequirement::new(
                "git",
                MinimumVersion::new(2, 30),
                ProbeSpec::new("git", ["--version"]),
                AcquisitionSource::Installer {
                    url: GIT_INSTALLER_URL.to_string(),
                    file_name: "Git-2.44.0-64-bit.exe".to_string(),
                    kind: InstallerKind::Exe,
                    silent_args: to_strings(&[
                        "/VERYSILENT",
                        "/NORESTART",
                        "/NOCANCEL",
                        "/SP-",
                        "/SUPPRESSMSGBOXES",
                        "/COMPONENTS=gitlfs,assoc",
                    ]),
                },
            ),
            ToolchainRequirement::new(
                "node",
                MinimumVersion::new(18, 18),
                ProbeSpec::new("node", ["--version"]),
                AcquisitionSource::Installer {
                    url: NODE_INSTALLER_URL.to_string(),
                    file_name: "node-v18.18.0-x64.msi".to_string(),
                    kind: InstallerKind::Msi,
                    silent_args: to_strings(&["ALLUSERS=1", "ADDLOCAL=NodeRuntime,npm,EnvironmentPathNode,EnvironmentPathNpmModules"]),
                },
            ),
            ToolchainRequirement::new(
                "npm",
                MinimumVersion::new(9, 0),
                ProbeSpec::new("npm", ["--version"]),
                AcquisitionSource::Bundled {
                    with: "node".to_string(),
                },
            ),
            ToolchainRequirement::new(
                "pnpm",
                MinimumVersion::new(8, 0),
                ProbeSpec::new("pnpm", ["--version"]),
                AcquisitionSource::ProvidedBy {
                    provider: "npm".to_string(),
                    args: to_strings(&["install", "-g", "pnpm"]),
                },
            ),
            ToolchainRequirement::new(
                "python",
                MinimumVersion::new(3, 10),
                ProbeSpec::new("python", ["--version"]),
                AcquisitionSource::Installer {
                    url: PYTHON_INSTALLER_URL.to_string(),
                    file_name: "python-3.11.9-amd64.exe".to_string(),
                    kind: InstallerKind::Exe,
                    silent_args: to_strings(&[
                        "/quiet",
                        "InstallAllUsers=1",
                        "PrependPath=1",
                        "Include_test=0",
                        "Include_doc=0",
                    ]),
                },
            ),
            ToolchainRequirement::new(
                "pyinstaller",
                MinimumVersion::new(6, 0),
                ProbeSpec::new("python", ["-m", "PyInstaller", "--version"]),
                AcquisitionSource::ProvidedBy {
                    provider: "python".to_string(),
                    args: to_strings(&["-m", "pip", "install", "--upgrade", "pyinstaller"]),
                },
            ),
        ])?;

        Ok(catalog.with_well_known_dirs(windows_install_dirs()))
    }

    pub fn requirements(&self) -> &[ToolchainRequirement] {
        &self.requirements
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolchainRequirement> {
        self.requirements.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ToolchainRequirement> {
        self.requirements.iter().find(|r| r.name == name)
    }

    pub fn well_known_dirs(&self) -> &[PathBuf] {
        &self.well_known_dirs
    }

    /// Requirements bundled inside `carrier`'s installer.
    pub fn bundled_with<'a>(&'a self, carrier: &'a str) -> impl Iterator<Item = &'a ToolchainRequirement> + 'a {
        self.requirements
            .iter()
            .filter(move |r| matches!(&r.source, AcquisitionSource::Bundled { with } if with == carrier))
    }

    /// The program a `ProvidedBy` requirement is installed with.
    pub fn provider_program(&self, requirement: &ToolchainRequirement) -> Option<&str> {
        let provider = match &requirement.source {
            AcquisitionSource::ProvidedBy { provider, .. } => provider,
            _ => return None,
        };
        self.get(provider).map(|p| p.probe.program.as_str())
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Default install locations of the catalog's tools on Windows.
///
/// A process started before an installer ran does not see the `PATH` change,
/// so these are searched explicitly.
pub fn windows_install_dirs() -> Vec<PathBuf> {
    let program_files = std::env::var_os("ProgramFiles")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\Program Files"));

    let mut dirs = vec![
        program_files.join("nodejs"),
        program_files.join("Git").join("cmd"),
        program_files.join("Python311"),
        program_files.join("Python311").join("Scripts"),
    ];
    if let Some(roaming) = dirs::data_dir() {
        dirs.push(roaming.join("npm"));
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(name: &str, source: AcquisitionSource) -> ToolchainRequirement {
        ToolchainRequirement::new(name, MinimumVersion::new(1, 0), ProbeSpec::new(name, ["--version"]), source)
    }

    fn provided_by(provider: &str) -> AcquisitionSource {
        AcquisitionSource::ProvidedBy {
            provider: provider.to_string(),
            args: vec![],
        }
    }

    fn installer() -> AcquisitionSource {
        AcquisitionSource::Installer {
            url: "https://example.invalid/x.msi".to_string(),
            file_name: "x.msi".to_string(),
            kind: InstallerKind::Msi,
            silent_args: vec![],
        }
    }

    #[test]
    fn test_default_catalog_is_valid_and_ordered() {
        let catalog = ToolchainCatalog::windows_default().unwrap();
        let names: Vec<&str> = catalog.iter().map(|r| r.name.as_str()).collect();
        let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();

        assert_eq!(names.len(), 6);
        assert!(pos("node") < pos("npm"));
        assert!(pos("npm") < pos("pnpm"));
        assert!(pos("python") < pos("pyinstaller"));
        assert_eq!(catalog.provider_program(catalog.get("pnpm").unwrap()), Some("npm"));
        assert_eq!(catalog.bundled_with("node").count(), 1);
        assert!(!catalog.well_known_dirs().is_empty());
    }

    #[test]
    fn test_provider_declared_later_is_moved_first() {
        let catalog = ToolchainCatalog::new(vec![req("pnpm", provided_by("npm")), req("npm", installer())]).unwrap();
        let names: Vec<&str> = catalog.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["npm", "pnpm"]);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = ToolchainCatalog::new(vec![req("pnpm", provided_by("npm"))]).unwrap_err();
        assert_eq!(
            err,
            CatalogError::UnknownProvider {
                requirement: "pnpm".to_string(),
                provider: "npm".to_string()
            }
        );
    }

    #[test]
    fn test_cycle_rejected() {
        let err = ToolchainCatalog::new(vec![
            req("a", provided_by("b")),
            req("b", provided_by("a")),
            req("c", installer()),
        ])
        .unwrap_err();
        match err {
            CatalogError::Cycle { members } => assert_eq!(members, vec!["a", "b"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = ToolchainCatalog::new(vec![req("git", installer()), req("git", installer())]).unwrap_err();
        assert_eq!(err, CatalogError::DuplicateRequirement("git".to_string()));
    }
}
