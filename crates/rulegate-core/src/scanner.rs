//! Forbidden-pattern scanner.
//!
//! Artifacts are scanned concurrently across a bounded worker pool. Each
//! worker owns its own result list; merged output is ordered by the
//! artifact's position in the change-set, so the violation set is identical
//! for any degree of parallelism. A scan error on one artifact becomes a
//! warning and never aborts the rest of the scan.

use std::sync::Arc;

use regex::Regex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::changeset::{is_scannable, ChangeKind, ChangeSet, ChangedArtifact};
use crate::config::{PatternSpec, ScanLimits};
use crate::error::{GateError, Result};
use crate::violation::{Severity, Stage, Violation};

/// A forbidden pattern with its regex compiled.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub id: String,
    pub regex: Regex,
    pub message: String,
    pub remediation: String,
}

/// Result of scanning one change-set.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub violations: Vec<Violation>,
    pub warnings: Vec<String>,
}

impl ScanOutcome {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Stateless scanner over compiled patterns and scannability limits.
pub struct PatternScanner {
    patterns: Arc<Vec<CompiledPattern>>,
    limits: Arc<ScanLimits>,
}

impl PatternScanner {
    pub fn new(specs: &[PatternSpec], limits: ScanLimits) -> Result<Self> {
        let mut patterns = Vec::with_capacity(specs.len());
        for spec in specs {
            let regex = Regex::new(&spec.regex).map_err(|e| {
                GateError::Configuration(format!("pattern '{}' has invalid regex: {e}", spec.id))
            })?;
            patterns.push(CompiledPattern {
                id: spec.id.clone(),
                regex,
                message: spec.message.clone(),
                remediation: spec.remediation.clone(),
            });
        }
        Ok(Self {
            patterns: Arc::new(patterns),
            limits: Arc::new(limits),
        })
    }

    /// Scan every scannable artifact concurrently, bounded by
    /// `limits.max_concurrency` workers.
    pub async fn scan(&self, changeset: &ChangeSet) -> ScanOutcome {
        let semaphore = Arc::new(Semaphore::new(self.limits.max_concurrency));
        let mut tasks: Vec<JoinHandle<(usize, Vec<Violation>, Vec<String>)>> = Vec::new();

        for (index, artifact) in changeset.artifacts().iter().enumerate() {
            if matches!(artifact.kind, ChangeKind::Deleted | ChangeKind::Missing) {
                continue;
            }
            if !is_scannable(&artifact.path, &self.limits.allowed_extensions) {
                continue;
            }

            let artifact = artifact.clone();
            let patterns = Arc::clone(&self.patterns);
            let limits = Arc::clone(&self.limits);
            let semaphore = Arc::clone(&semaphore);

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("scan semaphore closed");
                scan_artifact(index, &artifact, &patterns, &limits).await
            }));
        }

        // Collect per-worker results and normalize by change-set position so
        // the merged set is independent of completion order.
        let mut collected: Vec<(usize, Vec<Violation>, Vec<String>)> = Vec::new();
        let mut warnings = Vec::new();
        for task in tasks {
            match task.await {
                Ok(result) => collected.push(result),
                Err(e) => warnings.push(format!("scan worker panicked: {e}")),
            }
        }
        collected.sort_by_key(|(index, _, _)| *index);

        let mut violations = Vec::new();
        for (_, mut v, mut w) in collected {
            violations.append(&mut v);
            warnings.append(&mut w);
        }

        debug!(
            violations = violations.len(),
            warnings = warnings.len(),
            "pattern scan complete"
        );
        ScanOutcome {
            violations,
            warnings,
        }
    }
}

async fn scan_artifact(
    index: usize,
    artifact: &ChangedArtifact,
    patterns: &[CompiledPattern],
    limits: &ScanLimits,
) -> (usize, Vec<Violation>, Vec<String>) {
    let path_display = artifact.path.display().to_string();
    let mut warnings = Vec::new();

    let content = match &artifact.content {
        Some(content) => content.clone(),
        None => match read_bounded(artifact, limits).await {
            Ok(Some(content)) => content,
            Ok(None) => {
                warnings.push(format!(
                    "{path_display}: skipped, exceeds {} byte scan ceiling",
                    limits.max_file_bytes
                ));
                return (index, Vec::new(), warnings);
            }
            Err(e) => {
                warnings.push(format!("{path_display}: scan error, {e}"));
                return (index, Vec::new(), warnings);
            }
        },
    };

    if content.len() as u64 > limits.max_file_bytes {
        warnings.push(format!(
            "{path_display}: skipped, exceeds {} byte scan ceiling",
            limits.max_file_bytes
        ));
        return (index, Vec::new(), warnings);
    }

    let mut violations = Vec::new();
    for pattern in patterns {
        // First match only; the author fixes the file, not each occurrence.
        for (line_index, line) in content.lines().enumerate() {
            if pattern.regex.is_match(line) {
                violations.push(Violation {
                    artifact: path_display.clone(),
                    stage: Stage::PatternScan,
                    rule_id: pattern.id.clone(),
                    line: Some(line_index + 1),
                    message: pattern.message.clone(),
                    remediation: pattern.remediation.clone(),
                    severity: Severity::Block,
                });
                break;
            }
        }
    }

    (index, violations, warnings)
}

async fn read_bounded(
    artifact: &ChangedArtifact,
    limits: &ScanLimits,
) -> std::io::Result<Option<String>> {
    let metadata = tokio::fs::metadata(&artifact.path).await?;
    if metadata.len() > limits.max_file_bytes {
        return Ok(None);
    }
    let bytes = tokio::fs::read(&artifact.path).await?;
    let content = String::from_utf8(bytes).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, format!("not valid utf-8: {e}"))
    })?;
    Ok(Some(content))
}
