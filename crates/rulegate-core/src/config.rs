//! Gate configuration: one validated structure, built once at startup.
//!
//! Unknown fields are rejected at deserialization (`deny_unknown_fields`)
//! and [`GateConfig::validate`] must pass before any stage executes. A bad
//! config is fatal: the pipeline refuses to run rather than run with
//! ambiguous settings.

use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};
use crate::violation::ValidationLevel;

/// Environment variable consulted for a level override.
pub const LEVEL_ENV_VAR: &str = "RULEGATE_LEVEL";

/// A forbidden pattern with its diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternSpec {
    /// Stable identifier reported on violations.
    pub id: String,
    /// Regex matched against artifact content, line by line.
    pub regex: String,
    /// What the pattern detects.
    pub message: String,
    /// What the author should do instead.
    pub remediation: String,
}

/// Scannability limits for the pattern scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScanLimits {
    /// File extensions eligible for scanning (no leading dot).
    pub allowed_extensions: Vec<String>,
    /// Artifacts larger than this are skipped with a warning.
    pub max_file_bytes: u64,
    /// Upper bound on concurrent artifact scans.
    pub max_concurrency: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            allowed_extensions: vec![
                "py".to_string(),
                "rs".to_string(),
                "js".to_string(),
                "ts".to_string(),
                "rb".to_string(),
                "go".to_string(),
                "java".to_string(),
                "yaml".to_string(),
                "yml".to_string(),
                "json".to_string(),
                "toml".to_string(),
            ],
            max_file_bytes: 1_048_576,
            max_concurrency: 8,
        }
    }
}

/// The gate's configuration surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GateConfig {
    /// Force the Strict level unless an explicit override wins first.
    pub strict_mode: bool,
    /// Skip health/sourcing checks entirely (their stages emit a warning).
    pub skip_service_checks: bool,
    /// Treat change-set enumeration failures as allowed instead of blocked.
    pub fail_open: bool,
    /// Wall-clock budget for the whole run, in seconds.
    pub max_execution_time_secs: u64,
    /// Glob deny-list of paths excluded from validation.
    pub excluded_paths: Vec<String>,
    /// Forbidden literal patterns.
    pub forbidden_patterns: Vec<PatternSpec>,
    /// Explicit level override; wins over every other signal.
    pub level_override: Option<ValidationLevel>,
    /// Consecutive failures before the circuit breaker opens.
    pub failure_threshold: u32,
    /// Cooldown before the breaker admits a half-open trial call, in seconds.
    pub recovery_timeout_secs: u64,
    /// Hard timeout per guarded dependency call, in milliseconds.
    pub probe_timeout_ms: u64,
    /// Inline-collection length above which the context analyzer flags.
    pub collection_len_threshold: usize,
    pub scan: ScanLimits,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            skip_service_checks: false,
            fail_open: false,
            max_execution_time_secs: 10,
            excluded_paths: vec![
                "tests/**".to_string(),
                "**/*_test.*".to_string(),
                "**/generated/**".to_string(),
                "vendor/**".to_string(),
            ],
            forbidden_patterns: default_patterns(),
            level_override: None,
            failure_threshold: 5,
            recovery_timeout_secs: 60,
            probe_timeout_ms: 2_000,
            collection_len_threshold: 5,
            scan: ScanLimits::default(),
        }
    }
}

fn default_patterns() -> Vec<PatternSpec> {
    vec![
        PatternSpec {
            id: "hardcoded-rule-list".to_string(),
            regex: r#"(?i)(rules?|phrases?|guidelines?|formats?)\s*[:=]\s*[\[{]"#.to_string(),
            message: "literal rule-like collection assigned in code".to_string(),
            remediation: "replace with a rule-store query".to_string(),
        },
        PatternSpec {
            id: "hardcoded-style-check".to_string(),
            regex: r#"(?i)(forbidden|banned|blocked)_(words?|phrases?|terms?)\s*[:=]"#.to_string(),
            message: "hand-coded style enforcement list".to_string(),
            remediation: "move the list into the editorial_rules collection".to_string(),
        },
        PatternSpec {
            id: "hardcoded-schedule".to_string(),
            regex: r#"(?i)(posting|publish)_(schedule|times?|slots?)\s*[:=]\s*[\[{]"#.to_string(),
            message: "hand-coded scheduling table".to_string(),
            remediation: "move the schedule into the scheduling_rules collection".to_string(),
        },
    ]
}

impl GateConfig {
    /// Parse a config from JSON, rejecting unknown fields, then validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: GateConfig = serde_json::from_str(json)
            .map_err(|e| GateError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject impossible or ambiguous settings before any stage executes.
    pub fn validate(&self) -> Result<()> {
        if self.max_execution_time_secs == 0 {
            return Err(GateError::Configuration(
                "max_execution_time_secs must be positive".to_string(),
            ));
        }
        if self.failure_threshold == 0 {
            return Err(GateError::Configuration(
                "failure_threshold must be positive".to_string(),
            ));
        }
        if self.probe_timeout_ms == 0 {
            return Err(GateError::Configuration(
                "probe_timeout_ms must be positive".to_string(),
            ));
        }
        if self.scan.max_concurrency == 0 {
            return Err(GateError::Configuration(
                "scan.max_concurrency must be positive".to_string(),
            ));
        }
        if self.forbidden_patterns.is_empty() {
            return Err(GateError::Configuration(
                "at least one forbidden pattern is required".to_string(),
            ));
        }
        for spec in &self.forbidden_patterns {
            if spec.id.trim().is_empty() {
                return Err(GateError::Configuration(
                    "pattern id must not be empty".to_string(),
                ));
            }
            regex::Regex::new(&spec.regex).map_err(|e| {
                GateError::Configuration(format!("pattern '{}' has invalid regex: {e}", spec.id))
            })?;
        }
        for glob in &self.excluded_paths {
            globset::Glob::new(glob).map_err(|e| {
                GateError::Configuration(format!("excluded path glob '{glob}' is invalid: {e}"))
            })?;
        }
        Ok(())
    }

    /// Resolve the validation level from one total-order precedence list.
    ///
    /// First match wins; later signals never override earlier ones:
    /// 1. explicit override (CLI flag, then config `level_override`)
    /// 2. `RULEGATE_LEVEL` environment variable
    /// 3. `strict_mode` config flag => Strict
    /// 4. `CI` environment variable present => Standard
    /// 5. default => Standard
    pub fn resolve_level(&self, cli_override: Option<ValidationLevel>) -> ValidationLevel {
        if let Some(level) = cli_override {
            return level;
        }
        if let Some(level) = self.level_override {
            return level;
        }
        if let Ok(value) = std::env::var(LEVEL_ENV_VAR) {
            if let Some(level) = ValidationLevel::from_name(&value) {
                return level;
            }
        }
        if self.strict_mode {
            return ValidationLevel::Strict;
        }
        ValidationLevel::Standard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        GateConfig::default().validate().unwrap();
    }

    #[test]
    fn test_unknown_field_is_fatal() {
        let json = r#"{"strict_mode": true, "colour": "blue"}"#;
        let err = GateConfig::from_json(json).unwrap_err();
        assert!(matches!(err, GateError::Configuration(_)));
    }

    #[test]
    fn test_invalid_regex_is_fatal() {
        let mut config = GateConfig::default();
        config.forbidden_patterns[0].regex = "([unclosed".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_glob_is_fatal() {
        let mut config = GateConfig::default();
        config.excluded_paths.push("bad[glob".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_budget_is_fatal() {
        let mut config = GateConfig::default();
        config.max_execution_time_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_level_precedence_cli_beats_config() {
        let mut config = GateConfig::default();
        config.level_override = Some(ValidationLevel::Minimal);
        assert_eq!(
            config.resolve_level(Some(ValidationLevel::Paranoid)),
            ValidationLevel::Paranoid
        );
    }

    #[test]
    fn test_level_precedence_config_beats_strict_mode() {
        let mut config = GateConfig::default();
        config.level_override = Some(ValidationLevel::Minimal);
        config.strict_mode = true;
        assert_eq!(config.resolve_level(None), ValidationLevel::Minimal);
    }

    #[test]
    fn test_strict_mode_wins_over_default() {
        let mut config = GateConfig::default();
        config.strict_mode = true;
        assert_eq!(config.resolve_level(None), ValidationLevel::Strict);
    }

    #[test]
    fn test_default_pattern_catches_literal_rule_list() {
        let config = GateConfig::default();
        let re = regex::Regex::new(&config.forbidden_patterns[0].regex).unwrap();
        assert!(re.is_match(r#"forbidden_rules = ["a", "b"]"#));
        assert!(re.is_match(r#"phrases: ["x"]"#));
        assert!(!re.is_match("let total = items.len();"));
    }
}
