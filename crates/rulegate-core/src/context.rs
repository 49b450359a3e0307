//! Structural context analysis for near-miss hard-coding.
//!
//! Runs only when the pattern scanner is clean. Catches what literal
//! regexes cannot: large inline literal collections bound to rule-like
//! identifiers, and TODO/FIXME markers that reference rules. False
//! positives are an accepted cost; every finding carries a remediation
//! hint.

use regex::Regex;

use crate::changeset::{is_scannable, ChangeKind, ChangeSet, ChangedArtifact};
use crate::config::ScanLimits;
use crate::error::{GateError, Result};
use crate::scanner::ScanOutcome;
use crate::violation::{Severity, Stage, Violation};

/// Identifier fragments that suggest a rule set.
const RULE_TOKENS: &[&str] = &[
    "rule",
    "style",
    "format",
    "schedule",
    "phrase",
    "guideline",
    "checklist",
    "policy",
    "preference",
];

/// Heuristic analyzer over staged artifact content.
pub struct ContextAnalyzer {
    binding_regex: Regex,
    marker_regex: Regex,
    collection_len_threshold: usize,
    limits: ScanLimits,
}

impl ContextAnalyzer {
    pub fn new(collection_len_threshold: usize, limits: ScanLimits) -> Result<Self> {
        let binding_regex = Regex::new(r"(?i)([A-Za-z_][A-Za-z0-9_]*)\s*[:=]\s*[\[{]")
            .map_err(|e| GateError::Configuration(format!("binding regex invalid: {e}")))?;
        let marker_regex = Regex::new(r"(?i)\b(TODO|FIXME|HACK)\b")
            .map_err(|e| GateError::Configuration(format!("marker regex invalid: {e}")))?;
        Ok(Self {
            binding_regex,
            marker_regex,
            collection_len_threshold,
            limits,
        })
    }

    /// Analyze scannable artifacts in change-set order.
    pub async fn analyze(&self, changeset: &ChangeSet) -> ScanOutcome {
        self.run(changeset, false).await
    }

    /// Paranoid pass: markers are checked on the text artifacts the
    /// extension allow-list kept out of the normal pass. Artifacts the
    /// normal pass covered are skipped, so a marker is reported once.
    pub async fn deep_marker_scan(&self, changeset: &ChangeSet) -> ScanOutcome {
        self.run(changeset, true).await
    }

    async fn run(&self, changeset: &ChangeSet, deep: bool) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();

        for artifact in changeset.artifacts() {
            if matches!(artifact.kind, ChangeKind::Deleted | ChangeKind::Missing) {
                continue;
            }
            let scannable = is_scannable(&artifact.path, &self.limits.allowed_extensions);
            // Normal pass takes the scannable artifacts; the deep pass takes
            // exactly the complement.
            if deep == scannable {
                continue;
            }

            let content = match self.load(artifact).await {
                Ok(Some(content)) => content,
                Ok(None) => continue,
                Err(e) => {
                    outcome
                        .warnings
                        .push(format!("{}: scan error, {e}", artifact.path.display()));
                    continue;
                }
            };

            if deep {
                self.flag_markers(artifact, &content, &mut outcome.violations);
            } else {
                self.flag_rule_bindings(artifact, &content, &mut outcome.violations);
                self.flag_markers(artifact, &content, &mut outcome.violations);
            }
        }

        outcome
    }

    async fn load(&self, artifact: &ChangedArtifact) -> std::io::Result<Option<String>> {
        if let Some(content) = &artifact.content {
            return Ok(Some(content.clone()));
        }
        let metadata = tokio::fs::metadata(&artifact.path).await?;
        if metadata.len() > self.limits.max_file_bytes {
            return Ok(None);
        }
        let bytes = tokio::fs::read(&artifact.path).await?;
        Ok(String::from_utf8(bytes).ok())
    }

    /// Large inline literal collections bound to rule-suggestive names.
    fn flag_rule_bindings(
        &self,
        artifact: &ChangedArtifact,
        content: &str,
        violations: &mut Vec<Violation>,
    ) {
        for m in self.binding_regex.captures_iter(content) {
            let identifier = m.get(1).map(|g| g.as_str()).unwrap_or_default();
            if !is_rule_like(identifier) {
                continue;
            }
            let whole = m.get(0).expect("capture 0 always present");
            let open_at = whole.end() - 1;
            let Some(elements) = literal_element_count(content, open_at) else {
                continue;
            };
            if elements < self.collection_len_threshold {
                continue;
            }
            violations.push(Violation {
                artifact: artifact.path.display().to_string(),
                stage: Stage::ContextAnalysis,
                rule_id: "inline-rule-collection".to_string(),
                line: Some(line_of(content, whole.start())),
                message: format!(
                    "identifier '{identifier}' binds an inline collection of {elements} literals"
                ),
                remediation: "replace with a rule-store query; migrate the entries via the \
                              authoring tooling"
                    .to_string(),
                severity: Severity::Block,
            });
        }
    }

    /// TODO/FIXME markers that reference rules are suspicious but
    /// inconclusive: warn only.
    fn flag_markers(
        &self,
        artifact: &ChangedArtifact,
        content: &str,
        violations: &mut Vec<Violation>,
    ) {
        for (line_index, line) in content.lines().enumerate() {
            if self.marker_regex.is_match(line) && is_rule_like(line) {
                violations.push(Violation {
                    artifact: artifact.path.display().to_string(),
                    stage: Stage::ContextAnalysis,
                    rule_id: "rule-marker".to_string(),
                    line: Some(line_index + 1),
                    message: format!("marker references rules: {}", line.trim()),
                    remediation: "resolve the marker by moving the rule into the rule store"
                        .to_string(),
                    severity: Severity::Warn,
                });
            }
        }
    }
}

fn is_rule_like(text: &str) -> bool {
    let lower = text.to_lowercase();
    RULE_TOKENS.iter().any(|t| lower.contains(t))
}

/// Count top-level elements of the bracketed literal opening at `open_at`.
/// Returns None when the literal never closes (malformed or truncated).
fn literal_element_count(content: &str, open_at: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    let open = bytes[open_at];
    let close = match open {
        b'[' => b']',
        b'{' => b'}',
        _ => return None,
    };

    let mut depth = 0usize;
    let mut commas = 0usize;
    let mut saw_element = false;
    let mut in_string: Option<u8> = None;

    for &b in &bytes[open_at..] {
        if let Some(quote) = in_string {
            if b == quote {
                in_string = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' => in_string = Some(b),
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return if saw_element { Some(commas + 1) } else { Some(0) };
                }
            }
            b',' if depth == 1 => commas += 1,
            _ if depth == 1 && !b.is_ascii_whitespace() => saw_element = true,
            _ => {}
        }
    }
    None
}

fn line_of(content: &str, byte_offset: usize) -> usize {
    content[..byte_offset].bytes().filter(|b| *b == b'\n').count() + 1
}
