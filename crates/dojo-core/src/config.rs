//! Grading options: the configuration bag shared by every question.
//!
//! Options deserialize from camelCase JSON. Older option names are accepted as
//! aliases so existing question banks keep working.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::{ConfigError, Result};

pub const DEFAULT_TIMEOUT_MS: u64 = 500;

pub const ENV_TIMEOUT_MS: &str = "DOJO_TIMEOUT_MS";
pub const ENV_RETURN_ALL_DIAGNOSTICS: &str = "DOJO_RETURN_ALL_DIAGNOSTICS";
pub const ENV_RETURN_DETAILED_MESSAGES: &str = "DOJO_RETURN_DETAILED_MESSAGES";

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Free-form settings handed to the analyzers of each content type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerSettings {
    #[serde(default, alias = "jshint")]
    pub script_lint: serde_json::Value,

    #[serde(default, alias = "jscs")]
    pub script_style: serde_json::Value,

    #[serde(default, alias = "csslint")]
    pub stylesheet_lint: serde_json::Value,

    #[serde(default)]
    pub markup_lint: serde_json::Value,
}

/// Options recognised by every grading pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GradingOptions {
    /// Emit every dynamic-test failure instead of only the first.
    #[serde(default, alias = "returnAllTestErrors")]
    pub return_all_diagnostics: bool,

    /// Append the underlying assertion message to `Failure` diagnostics.
    #[serde(default, alias = "returnFailureMessages", alias = "returnErrorMessages")]
    pub return_detailed_messages: bool,

    /// Dynamic-test deadline in milliseconds.
    #[serde(default = "default_timeout_ms", alias = "timeout")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub analyzers: AnalyzerSettings,
}

impl Default for GradingOptions {
    fn default() -> Self {
        Self {
            return_all_diagnostics: false,
            return_detailed_messages: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            analyzers: AnalyzerSettings::default(),
        }
    }
}

impl GradingOptions {
    /// Parse and validate options from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Apply `DOJO_*` environment variables on top of these options.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            self.timeout_ms = raw.trim().parse().map_err(|_| ConfigError::InvalidOption {
                key: ENV_TIMEOUT_MS.to_string(),
                reason: format!("expected milliseconds, got {raw:?}"),
            })?;
        }
        if let Some(raw) = lookup(ENV_RETURN_ALL_DIAGNOSTICS) {
            self.return_all_diagnostics = parse_flag(ENV_RETURN_ALL_DIAGNOSTICS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RETURN_DETAILED_MESSAGES) {
            self.return_detailed_messages = parse_flag(ENV_RETURN_DETAILED_MESSAGES, &raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidOption {
                key: "timeoutMs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// These options with a question's overrides applied.
    pub fn merged(&self, overrides: &OptionOverrides) -> Result<Self> {
        let merged = Self {
            return_all_diagnostics: overrides
                .return_all_diagnostics
                .unwrap_or(self.return_all_diagnostics),
            return_detailed_messages: overrides
                .return_detailed_messages
                .unwrap_or(self.return_detailed_messages),
            timeout_ms: overrides.timeout_ms.unwrap_or(self.timeout_ms),
            analyzers: overrides
                .analyzers
                .clone()
                .unwrap_or_else(|| self.analyzers.clone()),
        };
        merged.validate()?;
        Ok(merged)
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidOption {
            key: key.to_string(),
            reason: format!("expected a boolean, got {raw:?}"),
        }),
    }
}

/// Per-question option overrides; unset keys inherit the global options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OptionOverrides {
    #[serde(default, alias = "returnAllTestErrors")]
    pub return_all_diagnostics: Option<bool>,

    #[serde(default, alias = "returnFailureMessages", alias = "returnErrorMessages")]
    pub return_detailed_messages: Option<bool>,

    #[serde(default, alias = "timeout")]
    pub timeout_ms: Option<u64>,

    #[serde(default)]
    pub analyzers: Option<AnalyzerSettings>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let options = GradingOptions::default();
        assert!(!options.return_all_diagnostics);
        assert!(!options.return_detailed_messages);
        assert_eq!(options.timeout_ms, 500);
        assert_eq!(options.timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_from_json_camel_case() {
        let options = GradingOptions::from_json_str(
            r#"{"returnAllDiagnostics": true, "timeoutMs": 250, "analyzers": {"scriptLint": {"esversion": 6}}}"#,
        )
        .unwrap();
        assert!(options.return_all_diagnostics);
        assert_eq!(options.timeout_ms, 250);
        assert_eq!(options.analyzers.script_lint["esversion"], 6);
    }

    #[test]
    fn test_from_json_legacy_aliases() {
        let options = GradingOptions::from_json_str(
            r#"{"returnAllTestErrors": true, "returnFailureMessages": true, "timeout": 900, "analyzers": {"jscs": {"preset": "google"}}}"#,
        )
        .unwrap();
        assert!(options.return_all_diagnostics);
        assert!(options.return_detailed_messages);
        assert_eq!(options.timeout_ms, 900);
        assert_eq!(options.analyzers.script_style["preset"], "google");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = GradingOptions::from_json_str(r#"{"timeoutMs": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { ref key, .. } if key == "timeoutMs"));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let err = GradingOptions::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Serialization(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_TIMEOUT_MS, "75"),
            (ENV_RETURN_ALL_DIAGNOSTICS, "yes"),
            (ENV_RETURN_DETAILED_MESSAGES, "0"),
        ]
        .into_iter()
        .collect();

        let options = GradingOptions::default()
            .with_overrides_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(options.timeout_ms, 75);
        assert!(options.return_all_diagnostics);
        assert!(!options.return_detailed_messages);
    }

    #[test]
    fn test_env_override_invalid_flag() {
        let err = GradingOptions::default()
            .with_overrides_from(|k| (k == ENV_RETURN_ALL_DIAGNOSTICS).then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("expected a boolean"));
    }

    #[test]
    fn test_merged_overrides() {
        let global = GradingOptions {
            return_detailed_messages: true,
            ..GradingOptions::default()
        };
        let overrides = OptionOverrides {
            timeout_ms: Some(50),
            ..OptionOverrides::default()
        };
        let merged = global.merged(&overrides).unwrap();
        assert_eq!(merged.timeout_ms, 50);
        assert!(merged.return_detailed_messages);
        assert!(!merged.return_all_diagnostics);
    }

    #[test]
    fn test_merged_rejects_zero_timeout() {
        let overrides = OptionOverrides {
            timeout_ms: Some(0),
            ..OptionOverrides::default()
        };
        assert!(GradingOptions::default().merged(&overrides).is_err());
    }
}
