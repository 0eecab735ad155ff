//! Executable packager: turns the staged backend into the console and
//! windowed single-file executables with PyInstaller.

use std::path::{Path, PathBuf};

use decky_setup_core::host::provision::file_sha256;
use decky_setup_core::{CommandRunner, CommandSpec, HostLayout, SetupError};
use serde::Serialize;
use tracing::info;

use crate::build::BuildOutput;

/// Data directories bundled into the executable, relative to the staging dir.
const BUNDLED_DATA: [&str; 3] = ["decky_loader/static", "decky_loader/locales", "decky_loader/plugin"];

const HIDDEN_IMPORTS: [&str; 2] = ["logging.handlers", "sqlite3"];

/// Executable variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Shows a console window; used for debugging.
    Console,
    /// No console window; the one registered for autostart.
    Windowed,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 2] = [ArtifactKind::Console, ArtifactKind::Windowed];

    pub fn name(&self) -> &'static str {
        match self {
            ArtifactKind::Console => "console",
            ArtifactKind::Windowed => "windowed",
        }
    }

    /// PyInstaller `--name`.
    pub fn file_stem(&self) -> &'static str {
        match self {
            ArtifactKind::Console => "PluginLoader",
            ArtifactKind::Windowed => "PluginLoader_noconsole",
        }
    }

    /// Output file name on this platform.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.file_stem(), std::env::consts::EXE_SUFFIX)
    }
}

/// Where an artifact came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub stage: String,
    pub release: String,
    pub build_id: String,
    pub sha256: String,
}

/// A packaged executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub provenance: Provenance,
}

/// Runs PyInstaller once per [`ArtifactKind`].
pub struct Packager<'a> {
    runner: &'a dyn CommandRunner,
    layout: &'a HostLayout,
    timeout_secs: u64,
}

impl<'a> Packager<'a> {
    pub fn new(runner: &'a dyn CommandRunner, layout: &'a HostLayout) -> Self {
        Self {
            runner,
            layout,
            timeout_secs: 1800,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Where `kind` is written.
    pub fn output_path(&self, kind: ArtifactKind) -> PathBuf {
        self.layout.dist_dir.join(kind.file_name())
    }

    /// PyInstaller invocation for one variant.
    pub fn command(&self, kind: ArtifactKind, staging: &Path) -> CommandSpec {
        let separator = if cfg!(windows) { ";" } else { ":" };
        let path = |p: &Path| p.to_string_lossy().to_string();

        let mut args: Vec<String> = vec![
            "-m".into(),
            "PyInstaller".into(),
            "--noconfirm".into(),
            "--onefile".into(),
            "--clean".into(),
            "--name".into(),
            kind.file_stem().into(),
            "--distpath".into(),
            path(&self.layout.dist_dir),
            "--workpath".into(),
            path(&self.layout.package_work_dir.join(kind.file_stem())),
            "--specpath".into(),
            path(&self.layout.package_work_dir),
        ];
        if kind == ArtifactKind::Windowed {
            args.push("--noconsole".into());
        }
        for data in BUNDLED_DATA {
            let source = staging.join(data);
            if source.is_dir() {
                args.push("--add-data".into());
                args.push(format!("{}{}{}", path(&source), separator, data));
            }
        }
        for module in HIDDEN_IMPORTS {
            args.push(format!("--hidden-import={}", module));
        }
        args.push(path(&staging.join("main.py")));

        CommandSpec::new("python", args)
            .in_dir(staging)
            .with_env("PYTHONHASHSEED", "0")
            .with_timeout(self.timeout_secs)
    }

    /// Build both variants from the same staged input.
    pub async fn package(
        &self,
        build: &BuildOutput,
        release: &str,
        build_id: &str,
    ) -> Result<Vec<BuildArtifact>, SetupError> {
        let mut artifacts = Vec::with_capacity(ArtifactKind::ALL.len());

        for kind in ArtifactKind::ALL {
            let failed = |reason: String| SetupError::PackagingFailed {
                variant: kind.name().to_string(),
                reason,
            };
            let output_path = self.output_path(kind);

            match std::fs::remove_file(&output_path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    return Err(failed(format!("cannot remove stale {}: {}", output_path.display(), e)))
                }
                _ => {}
            }
            std::fs::create_dir_all(&self.layout.package_work_dir).map_err(|e| failed(e.to_string()))?;

            let command = self.command(kind, &build.staging_dir);
            info!(variant = kind.name(), "Packaging executable");
            let output = self
                .runner
                .run(&command)
                .await
                .map_err(|e| failed(format!("cannot run PyInstaller: {}", e)))?;
            if !output.passed() {
                return Err(failed(format!(
                    "PyInstaller exited with code {}: {}",
                    output.exit_code,
                    output.tail()
                )));
            }
            if !output_path.is_file() {
                return Err(failed(format!("expected output {} was not produced", output_path.display())));
            }

            let sha256 = file_sha256(&output_path).map_err(|e| failed(e.to_string()))?;
            info!(variant = kind.name(), path = ?output_path, sha256 = %sha256, "Packaged executable");
            artifacts.push(BuildArtifact {
                kind,
                path: output_path,
                provenance: Provenance {
                    stage: "packaging".to_string(),
                    release: release.to_string(),
                    build_id: build_id.to_string(),
                    sha256,
                },
            });
        }

        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decky_setup_core::fakes::ScriptedRunner;
    use decky_setup_core::{CommandOutput, SetupConfig};
    use tempfile::tempdir;

    fn fixture(root: &Path) -> (HostLayout, BuildOutput) {
        let config = SetupConfig::default()
            .with_work_dir(root.join("work"))
            .with_data_root(root.join("homebrew"));
        let layout = HostLayout::new(&config, root);
        std::fs::create_dir_all(layout.staging_dir.join("decky_loader/static")).unwrap();
        std::fs::write(layout.staging_dir.join("main.py"), "").unwrap();
        let build = BuildOutput {
            staging_dir: layout.staging_dir.clone(),
            version_file: layout.staging_dir.join(".loader.version"),
            warnings: vec![],
        };
        (layout, build)
    }

    /// Writes `<distpath>/<name><exe>` like PyInstaller would.
    fn emit_output(spec: &CommandSpec) {
        let value = |flag: &str| {
            let i = spec.args.iter().position(|a| a == flag).unwrap();
            spec.args[i + 1].clone()
        };
        let dist = PathBuf::from(value("--distpath"));
        std::fs::create_dir_all(&dist).unwrap();
        let name = format!("{}{}", value("--name"), std::env::consts::EXE_SUFFIX);
        std::fs::write(dist.join(name), spec.args.contains(&"--noconsole".to_string()).to_string()).unwrap();
    }

    #[test]
    fn test_command_shape() {
        let dir = tempdir().unwrap();
        let (layout, build) = fixture(dir.path());
        let runner = ScriptedRunner::new();
        let packager = Packager::new(&runner, &layout);

        let console = packager.command(ArtifactKind::Console, &build.staging_dir);
        let windowed = packager.command(ArtifactKind::Windowed, &build.staging_dir);

        assert_eq!(console.program, "python");
        assert_eq!(&console.args[..5], &["-m", "PyInstaller", "--noconfirm", "--onefile", "--clean"]);
        assert!(!console.args.contains(&"--noconsole".to_string()));
        assert!(windowed.args.contains(&"--noconsole".to_string()));
        assert!(console.args.contains(&"--hidden-import=sqlite3".to_string()));
        assert_eq!(console.env, vec![("PYTHONHASHSEED".to_string(), "0".to_string())]);

        // Only existing data directories are bundled.
        let add_data: Vec<&String> = console
            .args
            .iter()
            .filter(|a| a.ends_with("decky_loader/static") || a.ends_with("decky_loader/locales"))
            .collect();
        assert_eq!(add_data.len(), 1);
    }

    #[tokio::test]
    async fn test_package_produces_both_variants() {
        let dir = tempdir().unwrap();
        let (layout, build) = fixture(dir.path());
        let runner = ScriptedRunner::new();
        runner.on_effect("python -m PyInstaller", CommandOutput::ok(""), emit_output);

        let artifacts = Packager::new(&runner, &layout)
            .package(&build, "v3.0.0", "abc")
            .await
            .unwrap();

        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].kind, ArtifactKind::Console);
        assert_eq!(artifacts[1].kind, ArtifactKind::Windowed);
        assert_ne!(artifacts[0].path, artifacts[1].path);
        assert_eq!(artifacts[0].provenance.build_id, artifacts[1].provenance.build_id);
        assert_ne!(artifacts[0].provenance.sha256, artifacts[1].provenance.sha256);
        assert_eq!(std::fs::read_to_string(&artifacts[1].path).unwrap(), "true");
    }

    #[tokio::test]
    async fn test_missing_output_fails() {
        let dir = tempdir().unwrap();
        let (layout, build) = fixture(dir.path());
        let runner = ScriptedRunner::new();
        runner.on("python -m PyInstaller", CommandOutput::ok(""));

        let err = Packager::new(&runner, &layout)
            .package(&build, "main", "abc")
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::PackagingFailed { ref variant, .. } if variant == "console"));
    }
}
