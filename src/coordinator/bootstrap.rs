//! Bootstrap manifest
//!
//! A manifest is a `.json` file holding an array of session specs. File-level
//! problems abort startup; a bad entry only fails that entry.

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::domain::{SessionId, SessionSpec};
use crate::error::{Result, VigilError};

/// Parsed manifest, entries kept raw so each can fail on its own
#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: Option<PathBuf>,
    pub entries: Vec<JsonValue>,
}

impl Manifest {
    /// Read and parse a manifest file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if !is_json {
            return Err(VigilError::Bootstrap(format!(
                "{} is not a .json manifest",
                path.display()
            )));
        }

        let raw = std::fs::read_to_string(path).map_err(|e| {
            VigilError::Bootstrap(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut manifest = Self::parse(&raw)?;
        manifest.path = Some(path.to_path_buf());

        info!(
            "Loaded bootstrap manifest {} with {} entries",
            path.display(),
            manifest.entries.len()
        );
        Ok(manifest)
    }

    /// Parse manifest text; the document must be a JSON array
    pub fn parse(raw: &str) -> Result<Self> {
        let document: JsonValue = serde_json::from_str(raw)
            .map_err(|e| VigilError::Bootstrap(format!("manifest is not valid JSON: {}", e)))?;

        match document {
            JsonValue::Array(entries) => Ok(Self {
                path: None,
                entries,
            }),
            other => Err(VigilError::Bootstrap(format!(
                "manifest must be a JSON array of sessions, found {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode every entry independently, preserving manifest order
    pub fn specs(&self) -> Vec<Result<SessionSpec>> {
        self.entries
            .iter()
            .map(|entry| {
                serde_json::from_value::<SessionSpec>(entry.clone())
                    .map_err(|e| VigilError::InvalidSpec(format!("malformed entry: {}", e)))
            })
            .collect()
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// A manifest entry that became a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapCreated {
    pub index: usize,
    pub session_id: SessionId,
}

/// A manifest entry that was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapFailure {
    pub index: usize,
    pub error: String,
}

/// Outcome of applying a manifest; entries are listed in manifest order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub created: Vec<BootstrapCreated>,
    pub failures: Vec<BootstrapFailure>,
}

impl BootstrapReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total(&self) -> usize {
        self.created.len() + self.failures.len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.created.iter().map(|c| c.session_id).collect()
    }
}
