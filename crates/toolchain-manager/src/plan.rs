//! Installation plan: which requirements have to be acquired this run.
//!
//! Recomputed from fresh probe results on every run and never persisted.

use std::collections::HashMap;

use serde::Serialize;

use crate::catalog::ToolchainCatalog;
use crate::probe::Assessment;
use crate::requirement::AcquisitionSource;
use crate::version::ToolVersion;

/// Why a requirement is in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PlanReason {
    Missing,
    Outdated { found: ToolVersion },
    /// Reinstalled because something it bundles is missing.
    Carrier { of: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedInstall {
    pub name: String,
    pub reason: PlanReason,
}

/// Ordered (catalog order) list of requirements to acquire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallationPlan {
    entries: Vec<PlannedInstall>,
}

impl InstallationPlan {
    /// Build the plan from one assessment per catalog requirement.
    pub fn from_assessments(catalog: &ToolchainCatalog, assessments: &[Assessment]) -> Self {
        let by_name: HashMap<&str, &Assessment> =
            assessments.iter().map(|a| (a.name.as_str(), a)).collect();

        let mut reasons: HashMap<String, PlanReason> = HashMap::new();
        for requirement in catalog.iter() {
            let Some(assessment) = by_name.get(requirement.name.as_str()) else {
                continue;
            };
            if assessment.is_satisfied() {
                continue;
            }
            let reason = match assessment.result.version() {
                Some(found) => PlanReason::Outdated {
                    found: found.clone(),
                },
                None => PlanReason::Missing,
            };
            reasons.insert(requirement.name.clone(), reason);

            if let AcquisitionSource::Bundled { with } = &requirement.source {
                reasons.entry(with.clone()).or_insert_with(|| PlanReason::Carrier {
                    of: requirement.name.clone(),
                });
            }
        }

        let entries = catalog
            .iter()
            .filter_map(|r| {
                reasons.remove(&r.name).map(|reason| PlannedInstall {
                    name: r.name.clone(),
                    reason,
                })
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[PlannedInstall] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Entries the acquirer handles: installers and bundled components.
    pub fn needs_acquisition(&self, catalog: &ToolchainCatalog) -> bool {
        self.entries.iter().any(|e| {
            catalog
                .get(&e.name)
                .is_some_and(|r| r.is_installer() || r.is_bundled())
        })
    }

    /// Entries the bootstrapper handles.
    pub fn needs_bootstrap(&self, catalog: &ToolchainCatalog) -> bool {
        self.entries
            .iter()
            .any(|e| catalog.get(&e.name).is_some_and(|r| r.is_provided_by()))
    }
}
