//! Layered configuration for the federation handle: compiled-in defaults,
//! overridden by an optional TOML file, overridden by environment
//! variables — in that order, matching how the teacher workspace layers
//! its own configuration sources.

use std::path::Path;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: String },
    #[error("failed to parse config file: {reason}")]
    ParseError { reason: String },
    #[error("invalid configuration: {}", .reasons.join("; "))]
    ValidationError { reasons: Vec<String> },
}

/// The outbox retry schedule: exponential backoff with jitter, capped at a
/// maximum attempt count and total elapsed time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RetrySchedule {
    #[serde(with = "duration_millis")]
    #[schemars(with = "u64")]
    pub base_delay: Duration,
    pub factor: f64,
    /// Jitter as a fraction of the computed delay, e.g. `0.2` for ±20%.
    pub jitter: f64,
    pub max_attempts: u32,
    #[serde(with = "duration_millis")]
    #[schemars(with = "u64")]
    pub max_elapsed: Duration,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            factor: 2.0,
            jitter: 0.2,
            max_attempts: 8,
            max_elapsed: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl RetrySchedule {
    fn validate(&self, reasons: &mut Vec<String>) {
        if self.factor <= 1.0 {
            reasons.push("retry.factor must be greater than 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            reasons.push("retry.jitter must be between 0.0 and 1.0".to_string());
        }
        if self.max_attempts == 0 {
            reasons.push("retry.max_attempts must be at least 1".to_string());
        }
    }
}

/// Policy knobs for the federation handle: retry schedule, user-agent,
/// signature key-cache TTL, and related timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FederationSettings {
    pub user_agent: String,
    #[serde(with = "duration_millis")]
    #[schemars(with = "u64")]
    pub request_timeout: Duration,
    /// The `Date` header skew window for signature verification (§9, Open
    /// Question ii): default 30s, surfaced as a configuration knob rather
    /// than hardcoded.
    #[serde(with = "duration_millis")]
    #[schemars(with = "u64")]
    pub signature_skew: Duration,
    #[serde(with = "duration_millis")]
    #[schemars(with = "u64")]
    pub key_cache_ttl: Duration,
    #[serde(with = "duration_millis")]
    #[schemars(with = "u64")]
    pub idempotency_ttl: Duration,
    pub retry: RetrySchedule,
    pub worker_count: u32,
    pub prefer_shared_inbox: bool,
}

impl Default for FederationSettings {
    fn default() -> Self {
        Self {
            user_agent: concat!("apfed/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(30),
            signature_skew: Duration::from_secs(30),
            key_cache_ttl: Duration::from_secs(60 * 60),
            idempotency_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            retry: RetrySchedule::default(),
            worker_count: 16,
            prefer_shared_inbox: true,
        }
    }
}

impl FederationSettings {
    /// Loads defaults, overridden by `path` (if it exists), overridden by
    /// `APFED_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseError {
            reason: e.to_string(),
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(ua) = std::env::var("APFED_USER_AGENT") {
            self.user_agent = ua;
        }
        if let Some(ms) = env_u64("APFED_REQUEST_TIMEOUT_MS") {
            self.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("APFED_SIGNATURE_SKEW_MS") {
            self.signature_skew = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("APFED_KEY_CACHE_TTL_MS") {
            self.key_cache_ttl = Duration::from_millis(ms);
        }
        if let Some(workers) = env_u64("APFED_WORKER_COUNT") {
            self.worker_count = workers as u32;
        }
        if let Ok(prefer) = std::env::var("APFED_PREFER_SHARED_INBOX") {
            self.prefer_shared_inbox = prefer == "1" || prefer.eq_ignore_ascii_case("true");
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut reasons = Vec::new();
        if self.user_agent.trim().is_empty() {
            reasons.push("user_agent must not be empty".to_string());
        }
        if self.worker_count == 0 {
            reasons.push("worker_count must be at least 1".to_string());
        }
        self.retry.validate(&mut reasons);
        if !reasons.is_empty() {
            return Err(ConfigError::ValidationError { reasons });
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_retry_schedule_from_outbox_design() {
        let settings = FederationSettings::default();
        assert_eq!(settings.retry.base_delay, Duration::from_secs(60));
        assert_eq!(settings.retry.factor, 2.0);
        assert_eq!(settings.retry.jitter, 0.2);
        assert_eq!(settings.retry.max_attempts, 8);
        assert_eq!(settings.retry.max_elapsed, Duration::from_secs(86400));
        assert_eq!(settings.signature_skew, Duration::from_secs(30));
    }

    #[test]
    fn settings_serialize_to_json_with_millis_durations() {
        let settings = FederationSettings::default();
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["signature_skew"], 30_000);
        assert_eq!(json["retry"]["base_delay"], 60_000);
    }

    #[test]
    fn validate_rejects_zero_worker_count() {
        let mut settings = FederationSettings::default();
        settings.worker_count = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_retry_factor() {
        let mut settings = FederationSettings::default();
        settings.retry.factor = 1.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn from_file_reports_missing_file() {
        let err = FederationSettings::from_file(Path::new("/nonexistent/apfed.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }
}
