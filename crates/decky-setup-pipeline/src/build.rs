//! Build orchestrator: checkout, frontend build, backend staging and backend
//! requirements, each as a blocking external step.
//!
//! Any failure aborts with `BuildStepFailed(step)`. Partial output is left
//! in the scratch work dir and discarded by the next run's checkout.

use std::path::{Path, PathBuf};

use decky_setup_core::layout::VERSION_FILE;
use decky_setup_core::{CommandRunner, CommandSpec, HostLayout, SetupError};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::spec::{BuildSpec, BuildStep};

/// What the build leaves for the packager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    /// Backend staging directory containing `main.py` and `decky_loader/`.
    pub staging_dir: PathBuf,

    /// Version marker written into the staging directory.
    pub version_file: PathBuf,

    /// Non-fatal notes from the build.
    pub warnings: Vec<String>,
}

/// Runs the [`BuildSpec`] steps in order.
pub struct BuildOrchestrator<'a> {
    runner: &'a dyn CommandRunner,
    layout: &'a HostLayout,
    spec: &'a BuildSpec,
    timeout_secs: u64,
}

impl<'a> BuildOrchestrator<'a> {
    pub fn new(runner: &'a dyn CommandRunner, layout: &'a HostLayout, spec: &'a BuildSpec) -> Self {
        Self {
            runner,
            layout,
            spec,
            timeout_secs: 1800,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn frontend_dir(&self) -> PathBuf {
        self.layout.checkout_dir.join("frontend")
    }

    fn backend_dir(&self) -> PathBuf {
        self.layout.checkout_dir.join("backend")
    }

    /// Run every step; stops at the first failure.
    pub async fn run(&self) -> Result<BuildOutput, SetupError> {
        let mut warnings = Vec::new();

        for step in &self.spec.steps {
            info!(step = step.name(), "Running build step");
            self.run_step(*step, &mut warnings).await?;
        }

        Ok(BuildOutput {
            staging_dir: self.layout.staging_dir.clone(),
            version_file: self.layout.staging_dir.join(VERSION_FILE),
            warnings,
        })
    }

    async fn run_step(&self, step: BuildStep, warnings: &mut Vec<String>) -> Result<(), SetupError> {
        let name = step.name();
        match step {
            BuildStep::Checkout => {
                remove_dir_if_exists(&self.layout.checkout_dir).map_err(|e| SetupError::build_step(name, e))?;
                std::fs::create_dir_all(&self.layout.work_dir).map_err(|e| SetupError::build_step(name, e))?;

                let checkout = self.layout.checkout_dir.to_string_lossy().to_string();
                let spec = CommandSpec::new(
                    "git",
                    [
                        "clone",
                        "--depth",
                        "1",
                        "--branch",
                        self.spec.release.as_str(),
                        self.spec.repo_url.as_str(),
                        checkout.as_str(),
                    ],
                )
                .in_dir(&self.layout.work_dir);
                self.exec(name, spec).await?;
                require_dir(name, &self.layout.checkout_dir)?;
            }
            BuildStep::FrontendInstall => {
                let frontend = require_dir(name, &self.frontend_dir())?;
                self.exec(name, CommandSpec::new("pnpm", ["install"]).in_dir(frontend))
                    .await?;
            }
            BuildStep::FrontendBuild => {
                let frontend = require_dir(name, &self.frontend_dir())?;
                self.exec(name, CommandSpec::new("pnpm", ["run", "build"]).in_dir(&frontend))
                    .await?;
                write_version(name, &frontend.join(VERSION_FILE), &self.spec.release)?;
            }
            BuildStep::StageBackend => self.stage_backend()?,
            BuildStep::BackendRequirements => {
                let backend = require_dir(name, &self.backend_dir())?;
                let requirements = backend.join("requirements.txt");
                let spec = if requirements.is_file() {
                    let file = requirements.to_string_lossy().to_string();
                    CommandSpec::new("python", ["-m", "pip", "install", "-r", file.as_str()])
                } else if backend.join("pyproject.toml").is_file() {
                    let package = backend.to_string_lossy().to_string();
                    CommandSpec::new("python", ["-m", "pip", "install", package.as_str()])
                } else {
                    warn!("No requirements.txt or pyproject.toml in backend, skipping");
                    warnings.push("backend declares no requirements; nothing installed".to_string());
                    return Ok(());
                };
                self.exec(name, spec.in_dir(&backend)).await?;
            }
        }
        Ok(())
    }

    fn stage_backend(&self) -> Result<(), SetupError> {
        let name = BuildStep::StageBackend.name();
        let backend = require_dir(name, &self.backend_dir())?;
        let staging = &self.layout.staging_dir;

        remove_dir_if_exists(staging).map_err(|e| SetupError::build_step(name, e))?;
        std::fs::create_dir_all(staging).map_err(|e| SetupError::build_step(name, e))?;

        let main = backend.join("main.py");
        if !main.is_file() {
            return Err(SetupError::build_step(name, format!("missing {}", main.display())));
        }
        std::fs::copy(&main, staging.join("main.py")).map_err(|e| SetupError::build_step(name, e))?;

        let package = require_dir(name, &backend.join("decky_loader"))?;
        copy_tree(&package, &staging.join("decky_loader")).map_err(|e| SetupError::build_step(name, e))?;

        let frontend_dist = self.frontend_dir().join("dist");
        if frontend_dist.is_dir() {
            copy_tree(&frontend_dist, &staging.join("decky_loader").join("static"))
                .map_err(|e| SetupError::build_step(name, e))?;
        }

        let plugin = self.layout.checkout_dir.join("plugin");
        if plugin.is_dir() {
            copy_tree(&plugin, &staging.join("decky_loader").join("plugin"))
                .map_err(|e| SetupError::build_step(name, e))?;
        }

        write_version(name, &staging.join(VERSION_FILE), &self.spec.release)
    }

    async fn exec(&self, step: &str, spec: CommandSpec) -> Result<(), SetupError> {
        let spec = spec.with_timeout(self.timeout_secs);
        let output = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| SetupError::build_step(step, format!("cannot run `{}`: {}", spec.display(), e)))?;
        if !output.passed() {
            return Err(SetupError::build_step(
                step,
                format!(
                    "`{}` exited with code {}: {}",
                    spec.display(),
                    output.exit_code,
                    output.tail()
                ),
            ));
        }
        Ok(())
    }
}

fn require_dir(step: &str, dir: &Path) -> Result<PathBuf, SetupError> {
    if dir.is_dir() {
        Ok(dir.to_path_buf())
    } else {
        Err(SetupError::build_step(step, format!("missing {}", dir.display())))
    }
}

fn write_version(step: &str, path: &Path, release: &str) -> Result<(), SetupError> {
    std::fs::write(path, release).map_err(|e| SetupError::build_step(step, e))
}

fn remove_dir_if_exists(dir: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Recursively copy `src` into `dst`, merging with what is already there.
pub(crate) fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
