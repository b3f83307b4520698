//! Run configuration.
//!
//! Loaded from a JSON settings file when one is given. Without a file, or when
//! the file cannot be read, defaults come from environment variables:
//! - `HARMONIZER_DEFAULT_USERS` - seats assumed when no invoice declares any
//! - `HARMONIZER_QUOTA_BUDGET` - live lookups allowed per window
//! - `HARMONIZER_QUOTA_WINDOW_SECS` - rolling window length; unset means per run
//! - `HARMONIZER_PRICE_MIN` / `HARMONIZER_PRICE_MAX` - plausible price band
//! - `HARMONIZER_TIE_EPSILON` - fraction under which prices count as equal
//! - `HARMONIZER_TIMEOUT_SECS` - run deadline
//! - `HARMONIZER_TOP_K` - snippets requested per search
//! - `HARMONIZER_CONCURRENCY` - worker pool and lookup concurrency

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compose::ComposePolicy;
use crate::pricing::{PriceBand, QuotaWindow, ResolverSettings};
use crate::retry::RetryConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_user_count: u32,
    pub quota_budget: u64,
    pub quota_window: QuotaWindow,
    pub price_band: PriceBand,
    pub tie_break_epsilon: f64,
    /// Whole-run deadline in seconds.
    pub result_timeout_secs: u64,
    pub search_top_k: usize,
    pub max_concurrency: usize,
    pub lookup_max_retries: u32,
    /// First backoff delay; doubles per retry.
    pub lookup_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_user_count: 100,
            quota_budget: 20,
            quota_window: QuotaWindow::PerRun,
            price_band: PriceBand::default(),
            tie_break_epsilon: 0.01,
            result_timeout_secs: 60,
            search_top_k: 5,
            max_concurrency: 4,
            lookup_max_retries: 2,
            lookup_backoff_ms: 250,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("price band is inverted or not finite: min {min}, max {max}")]
    InvalidPriceBand { min: f64, max: f64 },
    #[error("tie-break epsilon must be a non-negative number, got {0}")]
    InvalidEpsilon(f64),
    #[error("max_concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("default_user_count must be at least 1")]
    ZeroDefaultUsers,
}

impl Config {
    /// Load from `path` if given, otherwise from the environment.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::from_env();
        };
        match Self::load_from_path(path) {
            Ok(config) => {
                tracing::info!("Loaded settings from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to load settings from {}: {}, using environment defaults",
                    path.display(),
                    e
                );
                Self::from_env()
            }
        }
    }

    fn load_from_path(path: &Path) -> Result<Self, std::io::Error> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Defaults, overridden by any `HARMONIZER_*` variables that parse.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            let raw = get(key)?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("Ignoring {}={:?}: not a valid value", key, raw);
                    None
                }
            }
        }

        let mut config = Self::default();
        if let Some(v) = parsed(&get, "HARMONIZER_DEFAULT_USERS") {
            config.default_user_count = v;
        }
        if let Some(v) = parsed(&get, "HARMONIZER_QUOTA_BUDGET") {
            config.quota_budget = v;
        }
        if let Some(period_secs) = parsed(&get, "HARMONIZER_QUOTA_WINDOW_SECS") {
            config.quota_window = QuotaWindow::Rolling { period_secs };
        }
        if let Some(v) = parsed(&get, "HARMONIZER_PRICE_MIN") {
            config.price_band.min = v;
        }
        if let Some(v) = parsed(&get, "HARMONIZER_PRICE_MAX") {
            config.price_band.max = v;
        }
        if let Some(v) = parsed(&get, "HARMONIZER_TIE_EPSILON") {
            config.tie_break_epsilon = v;
        }
        if let Some(v) = parsed(&get, "HARMONIZER_TIMEOUT_SECS") {
            config.result_timeout_secs = v;
        }
        if let Some(v) = parsed(&get, "HARMONIZER_TOP_K") {
            config.search_top_k = v;
        }
        if let Some(v) = parsed(&get, "HARMONIZER_CONCURRENCY") {
            config.max_concurrency = v;
        }
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let band = self.price_band;
        if !band.min.is_finite() || !band.max.is_finite() || band.min > band.max {
            return Err(ConfigError::InvalidPriceBand {
                min: band.min,
                max: band.max,
            });
        }
        if !self.tie_break_epsilon.is_finite() || self.tie_break_epsilon < 0.0 {
            return Err(ConfigError::InvalidEpsilon(self.tie_break_epsilon));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.default_user_count == 0 {
            return Err(ConfigError::ZeroDefaultUsers);
        }
        Ok(())
    }

    pub fn result_timeout(&self) -> Duration {
        Duration::from_secs(self.result_timeout_secs)
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            band: self.price_band,
            top_k: self.search_top_k,
            retry: RetryConfig {
                max_retries: self.lookup_max_retries,
                initial_delay: Duration::from_millis(self.lookup_backoff_ms),
                ..RetryConfig::default()
            },
            max_concurrent_lookups: self.max_concurrency,
        }
    }

    pub fn compose_policy(&self) -> ComposePolicy {
        ComposePolicy {
            tie_break_epsilon: self.tie_break_epsilon,
            default_user_count: self.default_user_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn from_vars(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_user_count, 100);
        assert_eq!(config.tie_break_epsilon, 0.01);
        assert_eq!(config.quota_window, QuotaWindow::PerRun);
    }

    #[test]
    fn test_env_overrides() {
        let config = from_vars(&[
            ("HARMONIZER_DEFAULT_USERS", "250"),
            ("HARMONIZER_QUOTA_BUDGET", "0"),
            ("HARMONIZER_QUOTA_WINDOW_SECS", "3600"),
            ("HARMONIZER_PRICE_MAX", "99.5"),
            ("HARMONIZER_CONCURRENCY", "not-a-number"),
        ]);
        assert_eq!(config.default_user_count, 250);
        assert_eq!(config.quota_budget, 0);
        assert_eq!(config.quota_window, QuotaWindow::Rolling { period_secs: 3600 });
        assert_eq!(config.price_band.max, 99.5);
        assert_eq!(config.max_concurrency, 4);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.price_band = PriceBand { min: 50.0, max: 10.0 };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPriceBand { .. })
        ));

        let mut config = Config::default();
        config.tie_break_epsilon = -0.1;
        assert_eq!(config.validate(), Err(ConfigError::InvalidEpsilon(-0.1)));

        let mut config = Config::default();
        config.max_concurrency = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroConcurrency));
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"quota_budget": 3, "quota_window": {{"kind": "rolling", "period_secs": 60}}, "price_band": {{"min": 2.0, "max": 80.0}}}}"#
        )
        .unwrap();

        let config = Config::load(Some(file.path()));
        assert_eq!(config.quota_budget, 3);
        assert_eq!(config.quota_window, QuotaWindow::Rolling { period_secs: 60 });
        assert_eq!(config.price_band, PriceBand { min: 2.0, max: 80.0 });
        assert_eq!(config.default_user_count, 100);
    }

    #[test]
    fn test_currency_key_is_ignored() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"currency": "EUR", "quota_budget": 7}}"#).unwrap();

        let config = Config::load(Some(file.path()));
        assert_eq!(config.quota_budget, 7);
        assert_eq!(config, Config { quota_budget: 7, ..Config::default() });
    }

    #[test]
    fn test_unreadable_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config = Config::load(Some(&path));
        assert_eq!(config.search_top_k, Config::from_env().search_top_k);
    }

    #[test]
    fn test_resolver_settings() {
        let mut config = Config::default();
        config.lookup_backoff_ms = 10;
        config.max_concurrency = 8;
        let settings = config.resolver_settings();
        assert_eq!(settings.retry.initial_delay, Duration::from_millis(10));
        assert_eq!(settings.retry.max_retries, 2);
        assert_eq!(settings.max_concurrent_lookups, 8);
    }
}
