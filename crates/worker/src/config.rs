use std::time::Duration;

use atelier_engine::config::parse_var;
use atelier_engine::{ConfigError, OutboxConfig};

/// Worker process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// How long shutdown waits for an in-flight drain before giving up.
    pub shutdown_timeout: Duration,
    pub outbox: OutboxConfig,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                    | Default    |
    /// |----------------------------|------------|
    /// | `DATABASE_URL`             | (required) |
    /// | `DATABASE_MAX_CONNECTIONS` | `20`       |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `10`       |
    ///
    /// plus the outbox variables read by [`OutboxConfig::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let max_connections: u32 = parse_var(&lookup, "DATABASE_MAX_CONNECTIONS", 20)?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "DATABASE_MAX_CONNECTIONS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        let shutdown_secs: u64 = parse_var(&lookup, "SHUTDOWN_TIMEOUT_SECS", 10)?;

        Ok(Self {
            database_url,
            max_connections,
            shutdown_timeout: Duration::from_secs(shutdown_secs),
            outbox: OutboxConfig::from_lookup(&lookup)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn database_url_is_required() {
        let err = WorkerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn defaults_apply() {
        let config =
            WorkerConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/atelier")]))
                .unwrap();
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(config.outbox, OutboxConfig::default());
    }

    #[test]
    fn outbox_settings_are_read_from_the_same_source() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/atelier"),
            ("OUTBOX_BATCH_SIZE", "25"),
        ]))
        .unwrap();
        assert_eq!(config.outbox.batch_size, 25);
    }

    #[test]
    fn zero_connections_is_rejected() {
        let err = WorkerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/atelier"),
            ("DATABASE_MAX_CONNECTIONS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "DATABASE_MAX_CONNECTIONS", .. }));
    }
}
