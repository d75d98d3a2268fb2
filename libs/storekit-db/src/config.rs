//! Store configuration: DSN, pool knobs, retry policy and command timeout.
//!
//! Loaded from the `database` section of a figment stack, e.g.
//!
//! ```yaml
//! database:
//!   dsn: "postgres://app@localhost/app"
//!   command_timeout: 30s
//!   pool:
//!     max_conns: 20
//!     acquire_timeout: 5s
//!   retry:
//!     max_retries: 5
//!     base_backoff: 50ms
//! ```
//!
//! Environment overrides use `STOREKIT__DATABASE__<FIELD>`, nested with `__`.

use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::{DbError, Result};

const SECTION: &str = "database";
const ENV_PREFIX: &str = "STOREKIT__";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub dsn: String,
    pub pool: PoolCfg,
    pub retry: RetryCfg,
    /// Upper bound for raw SQL statements and procedure calls.
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dsn: "sqlite::memory:".to_owned(),
            pool: PoolCfg::default(),
            retry: RetryCfg::default(),
            command_timeout: Duration::from_secs(300),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            ..Self::default()
        }
    }

    /// Read the `database` section of `figment`; missing keys take defaults.
    ///
    /// # Errors
    /// `DbError::InvalidConfig` when the section has unknown keys or bad values.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        if !figment.contains(SECTION) {
            return Ok(Self::default());
        }
        figment
            .extract_inner(SECTION)
            .map_err(|e| DbError::InvalidConfig(e.to_string()))
    }

    /// Defaults, then the optional YAML file, then `STOREKIT__*` env vars.
    ///
    /// # Errors
    /// `DbError::InvalidConfig` when a layer fails to parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::default(SECTION, Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(&figment)
    }
}

/// Connection pool knobs; `None` keeps the driver default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolCfg {
    pub max_conns: Option<u32>,
    pub min_conns: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub max_lifetime: Option<Duration>,
    pub test_before_acquire: bool,
}

impl Default for PoolCfg {
    fn default() -> Self {
        Self {
            max_conns: Some(10),
            min_conns: None,
            acquire_timeout: Some(Duration::from_secs(30)),
            idle_timeout: None,
            max_lifetime: None,
            test_before_acquire: false,
        }
    }
}

/// Retry policy for `UnitOfWork::execute_with_retry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryCfg {
    /// Retries after the first attempt.
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub base_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for RetryCfg {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_section() {
        let cfg = StoreConfig::from_figment(&Figment::new()).unwrap();
        assert_eq!(cfg, StoreConfig::default());
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.command_timeout, Duration::from_secs(300));
    }

    #[test]
    fn humantime_durations_and_partial_sections() {
        let figment = Figment::new().merge(Serialized::defaults(serde_json::json!({
            "database": {
                "dsn": "sqlite://orders.db",
                "command_timeout": "30s",
                "retry": { "base_backoff": "250ms" },
                "pool": { "max_conns": 4, "idle_timeout": "5m" }
            }
        })));
        let cfg = StoreConfig::from_figment(&figment).unwrap();
        assert_eq!(cfg.dsn, "sqlite://orders.db");
        assert_eq!(cfg.command_timeout, Duration::from_secs(30));
        assert_eq!(cfg.retry.base_backoff, Duration::from_millis(250));
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.pool.max_conns, Some(4));
        assert_eq!(cfg.pool.idle_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let figment = Figment::new().merge(Serialized::defaults(serde_json::json!({
            "database": { "dsn": "sqlite::memory:", "timeout": "1s" }
        })));
        let err = StoreConfig::from_figment(&figment).unwrap_err();
        assert!(matches!(err, DbError::InvalidConfig(_)), "{err}");
    }

    #[test]
    fn load_merges_yaml_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database:\n  dsn: \"sqlite://data/app.db\"\n  retry:\n    max_retries: 7").unwrap();
        let cfg = StoreConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.dsn, "sqlite://data/app.db");
        assert_eq!(cfg.retry.max_retries, 7);
        assert_eq!(cfg.retry.max_backoff, Duration::from_secs(5));
    }
}
