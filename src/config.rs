use crate::{granularity::Granularity, reconcile::EarningPolicy};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path, time::Duration};
use thiserror::Error;

const DEFAULT_CURRENCY: &str = "EUR";
pub(crate) const DEFAULT_UNCATEGORIZED: &str = "uncategorized";
const DEFAULT_QUERY_TIMEOUT_MS: u64 = 10_000;

/// Request-scoped settings handed to the engines.
///
/// Nothing reads these from global state; callers pass a `Config` (or values taken from
/// one) into each computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// ISO 4217 code reported when there are no instances to take a currency from
    pub currency: String,
    pub earning_policy: EarningPolicy,
    pub granularity: Granularity,
    /// Category reported for instances with a blank category
    pub uncategorized_label: String,
    /// Per sub-query timeout for the fetch orchestrator
    pub query_timeout_ms: u64,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file")]
    Io(#[from] io::Error),
    #[error("could not parse config")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            currency: DEFAULT_CURRENCY.into(),
            earning_policy: EarningPolicy::default(),
            granularity: Granularity::default(),
            uncategorized_label: DEFAULT_UNCATEGORIZED.into(),
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
        }
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;

        debug!("loaded config: {:?}", config);

        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Config::from_json_str(&json)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.currency.trim().is_empty() {
            return Err(ConfigError::Invalid("currency must not be empty"));
        }
        if self.uncategorized_label.trim().is_empty() {
            return Err(ConfigError::Invalid("uncategorizedLabel must not be empty"));
        }
        if self.query_timeout_ms == 0 {
            return Err(ConfigError::Invalid("queryTimeoutMs must be greater than zero"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        assert_eq!(Config::from_json_str("{}").unwrap(), Config::default());
    }

    #[test]
    fn partial_override() {
        let config =
            Config::from_json_str(r#"{"currency":"AUD","earningPolicy":"binary","granularity":"week"}"#)
                .unwrap();
        assert_eq!(config.currency, "AUD");
        assert_eq!(config.earning_policy, EarningPolicy::Binary);
        assert_eq!(config.granularity, Granularity::Week);
        assert_eq!(config.query_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let result = Config::from_json_str(r#"{"queryTimeoutMs":0}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn blank_currency_is_invalid() {
        let result = Config::from_json_str(r#"{"currency":"  "}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_json() {
        assert!(matches!(
            Config::from_json_str("{"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            Config::from_path("/nonexistent/budget-analytics.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
