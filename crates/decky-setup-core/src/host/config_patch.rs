//! Idempotent patches to host application configuration.
//!
//! A patch either sets a nested key in a JSON document or ensures a flag file
//! exists. Applying a patch that already holds is a no-op, so reruns never
//! rewrite files they do not need to.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{Result, SetupError};

/// What a patch changes in its target file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatchTarget {
    /// Set `key_path` (outermost key first) to `value` in a JSON object.
    JsonKey { key_path: Vec<String>, value: Value },
    /// Ensure the file exists; its content is irrelevant.
    MarkerFile,
}

/// A single desired change to a host configuration file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigPatch {
    pub file: PathBuf,
    pub target: PatchTarget,
    /// A failed write stops the run only when set.
    pub required: bool,
    pub description: String,
}

/// What [`apply`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOutcome {
    Applied,
    AlreadyPresent,
}

impl ConfigPatch {
    pub fn json_key<I, S>(file: impl Into<PathBuf>, key_path: I, value: Value) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let file = file.into();
        let key_path: Vec<String> = key_path.into_iter().map(Into::into).collect();
        Self {
            description: format!("set {} in {}", key_path.join(" > "), file.display()),
            file,
            target: PatchTarget::JsonKey { key_path, value },
            required: false,
        }
    }

    pub fn marker_file(file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        Self {
            description: format!("create {}", file.display()),
            file,
            target: PatchTarget::MarkerFile,
            required: false,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn read_failed(&self, reason: impl std::fmt::Display) -> SetupError {
        SetupError::ConfigReadFailed {
            path: self.file.clone(),
            reason: reason.to_string(),
        }
    }

    fn write_failed(&self, reason: impl std::fmt::Display) -> SetupError {
        SetupError::ConfigWriteFailed {
            path: self.file.clone(),
            reason: reason.to_string(),
            required: self.required,
        }
    }
}

/// Whether the file already reflects the patch.
///
/// A missing file, or a marker path taken by something other than a file,
/// is simply unsatisfied. Unreadable or wrong-shaped content is a
/// `ConfigReadFailed`.
pub fn is_satisfied(patch: &ConfigPatch) -> Result<bool> {
    match &patch.target {
        PatchTarget::MarkerFile => match std::fs::metadata(&patch.file) {
            // Anything other than a regular file is left for `apply` to fail on.
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(patch.read_failed(e)),
        },
        PatchTarget::JsonKey { key_path, value } => {
            let Some(doc) = read_document(patch)? else {
                return Ok(false);
            };
            Ok(lookup(&doc, key_path, patch)? == Some(value))
        }
    }
}

/// Apply the patch unless it already holds.
///
/// JSON documents are rewritten through a temp file in the same directory
/// and renamed into place. Key order and unrelated values are preserved.
pub fn apply(patch: &ConfigPatch) -> Result<PatchOutcome> {
    if is_satisfied(patch)? {
        debug!(file = ?patch.file, "Config patch already present");
        return Ok(PatchOutcome::AlreadyPresent);
    }

    ensure_parent(patch)?;

    match &patch.target {
        PatchTarget::MarkerFile => {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&patch.file)
                .map_err(|e| patch.write_failed(e))?;
        }
        PatchTarget::JsonKey { key_path, value } => {
            let mut doc = read_document(patch)?.unwrap_or_else(|| Value::Object(Map::new()));
            set_key(&mut doc, key_path, value.clone(), patch)?;
            write_document(patch, &doc)?;
        }
    }

    info!(file = ?patch.file, description = %patch.description, "Applied config patch");
    Ok(PatchOutcome::Applied)
}

fn read_document(patch: &ConfigPatch) -> Result<Option<Value>> {
    let raw = match std::fs::read_to_string(&patch.file) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(patch.read_failed(e)),
    };
    if raw.trim().is_empty() {
        return Ok(Some(Value::Object(Map::new())));
    }
    let doc: Value = serde_json::from_str(&raw).map_err(|e| patch.read_failed(e))?;
    if !doc.is_object() {
        return Err(patch.read_failed("top-level value is not an object"));
    }
    Ok(Some(doc))
}

fn lookup<'a>(doc: &'a Value, key_path: &[String], patch: &ConfigPatch) -> Result<Option<&'a Value>> {
    let mut current = doc;
    for key in key_path {
        let Some(object) = current.as_object() else {
            return Err(patch.read_failed(format!("'{}' is nested under a non-object", key)));
        };
        match object.get(key) {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

fn set_key(doc: &mut Value, key_path: &[String], value: Value, patch: &ConfigPatch) -> Result<()> {
    let Some((last, parents)) = key_path.split_last() else {
        return Err(patch.read_failed("empty key path"));
    };

    let mut current = doc;
    for key in parents {
        let object = current
            .as_object_mut()
            .ok_or_else(|| patch.read_failed(format!("'{}' is nested under a non-object", key)))?;
        current = object
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let object = current
        .as_object_mut()
        .ok_or_else(|| patch.read_failed(format!("'{}' is nested under a non-object", last)))?;
    object.insert(last.clone(), value);
    Ok(())
}

fn write_document(patch: &ConfigPatch, doc: &Value) -> Result<()> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    doc.serialize(&mut ser).map_err(|e| patch.write_failed(e))?;
    buf.push(b'\n');

    let dir = parent_of(&patch.file);
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| patch.write_failed(e))?;
    tmp.write_all(&buf).map_err(|e| patch.write_failed(e))?;
    tmp.as_file().sync_all().map_err(|e| patch.write_failed(e))?;
    tmp.persist(&patch.file)
        .map_err(|e| patch.write_failed(e.error))?;
    Ok(())
}

fn ensure_parent(patch: &ConfigPatch) -> Result<()> {
    std::fs::create_dir_all(parent_of(&patch.file)).map_err(|e| patch.write_failed(e))
}

fn parent_of(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
