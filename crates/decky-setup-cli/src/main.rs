//! decky-setup - Decky Loader bootstrap, build and install for Windows
//!
//! Running `decky-setup` with no arguments executes the full pipeline:
//! toolchain probe and acquisition, package-manager bootstrap, loader build,
//! packaging, host configuration (including a desktop shortcut that starts
//! Steam with `-dev`), provisioning and autostart registration.
//!
//! ## Commands
//!
//! - `install` (default): run the pipeline and print the report
//! - `probe`: print the toolchain assessment without changing anything

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use decky_setup_core::{HostLayout, ProcessRunner, SetupConfig};
use decky_setup_pipeline::{PipelineController, PipelineReport, RunContext};
use serde::Serialize;
use toolchain_manager::{Assessment, HttpDownloader, InstallationPlan, ToolchainCatalog, VersionProber};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "decky-setup")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build and install Decky Loader on a Windows desktop", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true, env = "DECKY_SETUP_LOG_JSON")]
    log_json: bool,

    /// Print the report as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    overrides: ConfigArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Flags layered over `SetupConfig::from_env()`.
#[derive(clap::Args, Debug, Default)]
struct ConfigArgs {
    /// Branch or tag of the loader to build
    ///
    /// An install is reused whenever it was built from the same name. A
    /// branch such as `main` is therefore not rebuilt after upstream moves
    /// on; pass --force to pick up new commits.
    #[arg(long, global = true, env = "DECKY_SETUP_RELEASE")]
    release: Option<String>,

    /// Loader git repository
    #[arg(long, global = true, env = "DECKY_SETUP_REPO_URL")]
    repo_url: Option<String>,

    /// Scratch directory for checkout, staging and packaging
    #[arg(long, global = true, env = "DECKY_SETUP_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Loader data root (default: ~/homebrew)
    #[arg(long, global = true, env = "DECKY_SETUP_DATA_ROOT")]
    data_root: Option<PathBuf>,

    /// Steam install directory (default: located through the registry)
    #[arg(long, global = true, env = "DECKY_SETUP_HOST_APP_DIR")]
    host_app_dir: Option<PathBuf>,

    /// Seconds to wait after an installer exits before re-probing
    #[arg(long, global = true, env = "DECKY_SETUP_SETTLE_DELAY_SECS")]
    settle_delay_secs: Option<u64>,

    /// Do not register the loader to start at login
    #[arg(long, global = true)]
    no_autostart: bool,

    /// Rebuild and reinstall even when the installed release matches
    ///
    /// Needed to pick up new commits on a branch release, since the
    /// installed release is compared by name only.
    #[arg(long, global = true)]
    force: bool,

    /// Directory for the Steam launch shortcut (default: ~/Desktop)
    #[arg(long, global = true, env = "DECKY_SETUP_SHORTCUT_DIR")]
    shortcut_dir: Option<PathBuf>,

    /// Do not create the desktop shortcut that starts Steam with -dev
    #[arg(long, global = true)]
    no_shortcut: bool,
}

impl ConfigArgs {
    fn apply(&self, mut config: SetupConfig) -> SetupConfig {
        if let Some(release) = &self.release {
            config.release = release.clone();
        }
        if let Some(url) = &self.repo_url {
            config.repo_url = url.clone();
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
        if let Some(dir) = &self.data_root {
            config.data_root = Some(dir.clone());
        }
        if let Some(dir) = &self.host_app_dir {
            config.host_app_dir = Some(dir.clone());
        }
        if let Some(secs) = self.settle_delay_secs {
            config.settle_delay_secs = secs;
        }
        if let Some(dir) = &self.shortcut_dir {
            config.shortcut_dir = Some(dir.clone());
        }
        if self.no_shortcut {
            config.create_launch_shortcut = false;
        }
        if self.no_autostart {
            config.register_autostart = false;
        }
        if self.force {
            config.force_rebuild = true;
        }
        config
    }
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Run the full setup pipeline (default)
    Install,

    /// Show which toolchain components are present, outdated or missing
    Probe,
}

#[derive(Serialize)]
struct ProbeReport<'a> {
    assessments: &'a [Assessment],
    plan: &'a InstallationPlan,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    decky_setup_core::init_tracing(cli.log_json, level);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let config = cli.overrides.apply(SetupConfig::from_env());

    match cli.command.unwrap_or(Commands::Install) {
        Commands::Install => runtime.block_on(cmd_install(config, cli.json)),
        Commands::Probe => runtime.block_on(cmd_probe(cli.json)),
    }
}

async fn cmd_install(config: SetupConfig, json: bool) -> Result<ExitCode> {
    let layout = HostLayout::for_current_user(&config).context("Failed to determine home directory")?;
    let catalog = ToolchainCatalog::windows_default().context("Invalid toolchain catalog")?;
    let runner = Arc::new(ProcessRunner::with_search_dirs(catalog.well_known_dirs().to_vec()));
    let downloader = Arc::new(
        HttpDownloader::new()
            .map_err(anyhow::Error::msg)
            .context("Failed to create HTTP client")?,
    );

    info!(release = %config.release, data_root = ?layout.data_root, "Starting decky-setup");
    let mut ctx = RunContext::new(config, layout, catalog, runner, downloader);
    let report = PipelineController::with_default_stages().run(&mut ctx).await;

    print_report(&report, json)?;
    Ok(ExitCode::from(report.exit_code()))
}

async fn cmd_probe(json: bool) -> Result<ExitCode> {
    let catalog = ToolchainCatalog::windows_default().context("Invalid toolchain catalog")?;
    let runner = ProcessRunner::with_search_dirs(catalog.well_known_dirs().to_vec());

    let assessments = VersionProber::new(&runner).probe_all(&catalog).await;
    let plan = InstallationPlan::from_assessments(&catalog, &assessments);

    if json {
        let report = ProbeReport {
            assessments: &assessments,
            plan: &plan,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for assessment in &assessments {
            println!("  {}", assessment.summary_line());
            if let Some(warning) = &assessment.warning {
                println!("      warning: {}", warning);
            }
        }
        if plan.is_empty() {
            println!("\nToolchain complete.");
        } else {
            println!("\nTo install: {}", plan.names().join(", "));
        }
    }

    Ok(if plan.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_report(report: &PipelineReport, json: bool) -> Result<()> {
    if json {
        println!("{}", report.to_json().context("Failed to serialize report")?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}
