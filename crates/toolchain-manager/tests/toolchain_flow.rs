//! Probe, plan, acquire and bootstrap against a scripted host.

use std::time::Duration;

use decky_setup_core::fakes::ScriptedRunner;
use decky_setup_core::CommandOutput;
use toolchain_manager::catalog::{GIT_INSTALLER_URL, NODE_INSTALLER_URL, PYTHON_INSTALLER_URL};
use toolchain_manager::fakes::StaticDownloader;
use toolchain_manager::{Acquirer, Bootstrapper, InstallationPlan, ToolchainCatalog, VersionProber};

#[tokio::test]
async fn test_bare_host_converges() {
    let catalog = ToolchainCatalog::windows_default().unwrap();
    let runner = ScriptedRunner::new();

    // Nothing is installed until the installers run.
    for probe in ["git --version", "node --version", "npm --version", "python --version"] {
        runner.on_missing(probe);
    }
    runner
        .on("git --version", CommandOutput::ok("git version 2.44.0.windows.1"))
        .on("node --version", CommandOutput::ok("v18.18.0"))
        .on("npm --version", CommandOutput::ok("9.8.1"))
        .on("python --version", CommandOutput::ok("Python 3.11.9"))
        .on_missing("pnpm --version")
        .on_missing("pnpm --version")
        .on("pnpm --version", CommandOutput::ok("9.1.0"))
        .on_missing("python -m PyInstaller --version")
        .on_missing("python -m PyInstaller --version")
        .on("python -m PyInstaller --version", CommandOutput::ok("6.3.0"))
        .on("msiexec /i", CommandOutput::ok(""))
        .on("npm install -g pnpm", CommandOutput::ok(""))
        .on("python -m pip install --upgrade pyinstaller", CommandOutput::ok(""));

    let downloader = StaticDownloader::new()
        .with_body(GIT_INSTALLER_URL, b"git")
        .with_body(NODE_INSTALLER_URL, b"node")
        .with_body(PYTHON_INSTALLER_URL, b"python");

    // Installer executables are run from the scratch dir by absolute path.
    runner.on("/", CommandOutput::ok("")).on("C:", CommandOutput::ok(""));

    let assessments = VersionProber::new(&runner).probe_all(&catalog).await;
    let plan = InstallationPlan::from_assessments(&catalog, &assessments);
    assert_eq!(plan.names(), vec!["git", "node", "npm", "pnpm", "python", "pyinstaller"]);

    let report = Acquirer::new(&runner, &downloader)
        .with_settle_delay(Duration::ZERO)
        .acquire(&catalog, &plan)
        .await
        .unwrap();
    assert_eq!(report.installed, vec!["git", "node", "python"]);
    assert_eq!(downloader.requested().len(), 3);

    let bootstrapped = Bootstrapper::new(&runner).bootstrap(&catalog).await.unwrap();
    assert_eq!(bootstrapped, vec!["pnpm", "pyinstaller"]);

    let after = VersionProber::new(&runner).probe_all(&catalog).await;
    assert!(after.iter().all(|a| a.is_satisfied()));
    assert!(InstallationPlan::from_assessments(&catalog, &after).is_empty());
}

#[tokio::test]
async fn test_satisfied_host_plans_nothing() {
    let catalog = ToolchainCatalog::windows_default().unwrap();
    let runner = ScriptedRunner::new();
    runner
        .on("git --version", CommandOutput::ok("git version 2.44.0.windows.1"))
        .on("node --version", CommandOutput::ok("v20.11.1"))
        .on("npm --version", CommandOutput::ok("10.2.4"))
        .on("pnpm --version", CommandOutput::ok("9.1.0"))
        .on("python --version", CommandOutput::ok("Python 3.12.2"))
        .on("python -m PyInstaller --version", CommandOutput::ok("6.5.0"));

    let assessments = VersionProber::new(&runner).probe_all(&catalog).await;
    let plan = InstallationPlan::from_assessments(&catalog, &assessments);

    assert!(plan.is_empty());
    assert!(runner.call_lines().iter().all(|l| l.ends_with("--version")));
}
