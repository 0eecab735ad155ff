//! Build specification and identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Build sub-steps, in the order the loader's layout requires.
///
/// The frontend bundle is emitted into the backend package, so the frontend
/// must be built before the backend is staged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuildStep {
    /// git clone --depth 1 --branch <release>
    Checkout,

    /// pnpm install
    FrontendInstall,

    /// pnpm run build
    FrontendBuild,

    /// Copy backend sources into the staging directory.
    StageBackend,

    /// python -m pip install -r requirements.txt
    BackendRequirements,
}

impl BuildStep {
    pub const ALL: [BuildStep; 5] = [
        BuildStep::Checkout,
        BuildStep::FrontendInstall,
        BuildStep::FrontendBuild,
        BuildStep::StageBackend,
        BuildStep::BackendRequirements,
    ];

    /// Get the step name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuildStep::Checkout => "checkout",
            BuildStep::FrontendInstall => "frontend_install",
            BuildStep::FrontendBuild => "frontend_build",
            BuildStep::StageBackend => "stage_backend",
            BuildStep::BackendRequirements => "backend_requirements",
        }
    }
}

/// What to build and the identity of the build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildSpec {
    /// Branch or tag to check out.
    pub release: String,

    /// Repository to clone.
    pub repo_url: String,

    /// Ordered build steps.
    pub steps: Vec<BuildStep>,

    /// SHA-256 digest of ordered step names (deterministic).
    pub steps_digest: String,
}

impl BuildSpec {
    /// Build spec with the standard step sequence.
    pub fn new(release: &str, repo_url: &str) -> Self {
        Self::with_steps(release, repo_url, BuildStep::ALL.to_vec())
    }

    pub fn with_steps(release: &str, repo_url: &str, steps: Vec<BuildStep>) -> Self {
        let names: Vec<String> = steps.iter().map(|s| s.name().to_string()).collect();
        Self {
            release: release.to_string(),
            repo_url: repo_url.to_string(),
            steps,
            steps_digest: compute_steps_digest(&names),
        }
    }

    /// Identity shared by every artifact of this build.
    pub fn build_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.steps_digest.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.release.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Compute deterministic digest of ordered step names.
fn compute_steps_digest(steps: &[String]) -> String {
    let mut hasher = Sha256::new();
    for step in steps {
        hasher.update(step.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_spec_new() {
        let spec = BuildSpec::new("v3.0.0", "https://example.invalid/decky-loader.git");
        assert_eq!(spec.release, "v3.0.0");
        assert_eq!(spec.steps.len(), 5);
        assert_eq!(spec.steps[0], BuildStep::Checkout);
        assert!(!spec.steps_digest.is_empty());
    }

    #[test]
    fn test_steps_digest_order_sensitive() {
        let a = compute_steps_digest(&["frontend_build".to_string(), "stage_backend".to_string()]);
        let b = compute_steps_digest(&["stage_backend".to_string(), "frontend_build".to_string()]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_build_id_depends_on_release() {
        let a = BuildSpec::new("main", "u");
        let b = BuildSpec::new("main", "u");
        let c = BuildSpec::new("v3.0.0", "u");
        assert_eq!(a.build_id(), b.build_id());
        assert_ne!(a.build_id(), c.build_id());
        assert_eq!(a.build_id().len(), 64);
    }
}
