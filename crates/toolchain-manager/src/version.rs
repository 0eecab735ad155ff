//! Tool versions as reported by `--version` style probes, and the
//! minimum-version gate applied to them.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Serialize, Serializer};

use crate::error::CatalogError;

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").expect("version pattern is valid")
    })
}

/// A detected tool version.
///
/// Only the numeric `major.minor[.patch]` core is kept; pre-release and build
/// suffixes such as `.windows.1` are dropped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ToolVersion(semver::Version);

impl ToolVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    /// Extract the first `N.N[.N]` token from probe output.
    ///
    /// Handles `v18.18.0`, `Python 3.11.9`, `git version 2.44.0.windows.1`.
    pub fn parse_from_output(text: &str) -> Option<Self> {
        let caps = version_pattern().captures(text)?;
        let major = caps.get(1)?.as_str().parse().ok()?;
        let minor = caps.get(2)?.as_str().parse().ok()?;
        let patch = match caps.get(3) {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        Some(Self::new(major, minor, patch))
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn as_semver(&self) -> &semver::Version {
        &self.0
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ToolVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Lowest acceptable `major.minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MinimumVersion {
    pub major: u64,
    pub minor: u64,
}

impl MinimumVersion {
    pub const fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }

    /// Numeric `(major, minor)` comparison; patch is ignored.
    pub fn satisfied_by(&self, version: &ToolVersion) -> bool {
        (version.major(), version.minor()) >= (self.major, self.minor)
    }
}

impl FromStr for MinimumVersion {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CatalogError::InvalidVersion(s.to_string());
        let mut parts = s.trim().trim_start_matches('v').split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let minor = match parts.next() {
            Some(p) => p.parse().map_err(|_| invalid())?,
            None => 0,
        };
        Ok(Self { major, minor })
    }
}

impl fmt::Display for MinimumVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Serialize for MinimumVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> ToolVersion {
        ToolVersion::parse_from_output(text).unwrap()
    }

    #[test]
    fn test_version_gate_is_numeric() {
        let min: MinimumVersion = "3.12".parse().unwrap();
        assert!(!min.satisfied_by(&v("3.11.9")));
        assert!(min.satisfied_by(&v("3.12.0")));
        assert!(min.satisfied_by(&v("3.13.2")));
        assert!(min.satisfied_by(&v("4.0.0")));
        assert!(!min.satisfied_by(&v("3.9")));
    }

    #[test]
    fn test_parse_probe_outputs() {
        assert_eq!(v("v18.18.0\n"), ToolVersion::new(18, 18, 0));
        assert_eq!(v("Python 3.11.9"), ToolVersion::new(3, 11, 9));
        assert_eq!(v("git version 2.44.0.windows.1"), ToolVersion::new(2, 44, 0));
        assert_eq!(v("9.1"), ToolVersion::new(9, 1, 0));
    }

    #[test]
    fn test_unparseable_output() {
        assert!(ToolVersion::parse_from_output("Python was not found; run without arguments").is_none());
        assert!(ToolVersion::parse_from_output("").is_none());
    }

    #[test]
    fn test_minimum_parse_and_display() {
        assert_eq!("18.18".parse::<MinimumVersion>().unwrap(), MinimumVersion::new(18, 18));
        assert_eq!("v6".parse::<MinimumVersion>().unwrap(), MinimumVersion::new(6, 0));
        assert_eq!("3.10.4".parse::<MinimumVersion>().unwrap().to_string(), "3.10");
        assert!("three".parse::<MinimumVersion>().is_err());
    }

    #[test]
    fn test_serialize_as_string() {
        assert_eq!(serde_json::to_value(ToolVersion::new(3, 12, 1)).unwrap(), "3.12.1");
        assert_eq!(serde_json::to_value(MinimumVersion::new(3, 12)).unwrap(), "3.12");
    }
}
