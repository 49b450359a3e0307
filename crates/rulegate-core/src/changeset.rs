//! Staged change-set model.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GateError, Result};

/// How an artifact is staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    /// Staged but not readable by the caller (typo'd or vanished path).
    /// Never scanned; surfaced as a run warning instead of silence.
    Missing,
}

/// One staged artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedArtifact {
    pub path: PathBuf,
    pub kind: ChangeKind,
    /// Staged content, when the caller supplies it directly. When absent
    /// the scanner reads the file from disk.
    pub content: Option<String>,
}

impl ChangedArtifact {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Ordered set of staged artifacts for one validation run.
///
/// Construction applies the configured deny-list; excluded paths never
/// enter the pipeline. Input order is preserved.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    artifacts: Vec<ChangedArtifact>,
    excluded: usize,
}

impl ChangeSet {
    /// Build a change-set, dropping artifacts matching the deny-list globs.
    pub fn from_entries(entries: Vec<ChangedArtifact>, excluded_paths: &[String]) -> Result<Self> {
        let deny = compile_deny_list(excluded_paths)?;
        let before = entries.len();
        let artifacts: Vec<ChangedArtifact> = entries
            .into_iter()
            .filter(|a| !deny.is_match(&a.path))
            .collect();
        let excluded = before - artifacts.len();
        if excluded > 0 {
            debug!(excluded = excluded, "deny-listed artifacts dropped from change-set");
        }
        Ok(Self { artifacts, excluded })
    }

    pub fn artifacts(&self) -> &[ChangedArtifact] {
        &self.artifacts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// How many input artifacts the deny-list removed.
    pub fn excluded_count(&self) -> usize {
        self.excluded
    }

    /// Staged paths the caller could not find on disk.
    pub fn missing_paths(&self) -> Vec<&Path> {
        self.artifacts
            .iter()
            .filter(|a| a.kind == ChangeKind::Missing)
            .map(|a| a.path.as_path())
            .collect()
    }
}

fn compile_deny_list(globs: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in globs {
        let glob = Glob::new(pattern).map_err(|e| {
            GateError::Configuration(format!("excluded path glob '{pattern}' is invalid: {e}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| GateError::Configuration(format!("could not build deny-list: {e}")))
}

/// Whether an artifact is eligible for content scanning.
pub fn is_scannable(path: &Path, allowed_extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| allowed_extensions.iter().any(|a| a == ext))
        .unwrap_or(false)
}
