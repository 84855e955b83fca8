//! Engine configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use atelier_core::batch::MAX_BATCH_SIZE;

/// Default outbox poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default number of outbox rows claimed per poll.
pub const DEFAULT_OUTBOX_BATCH_SIZE: i64 = 100;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Parse `var` from `lookup`, falling back to `default` when unset.
pub fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value,
            reason: e.to_string(),
        }),
    }
}

fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Settings for the mutation services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Largest accepted batch. Never above [`MAX_BATCH_SIZE`].
    pub batch_max_targets: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_max_targets: MAX_BATCH_SIZE,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var             | Default |
    /// |---------------------|---------|
    /// | `BATCH_MAX_TARGETS` | `100`   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let batch_max_targets: usize = parse_var(&lookup, "BATCH_MAX_TARGETS", MAX_BATCH_SIZE)?;
        if batch_max_targets == 0 || batch_max_targets > MAX_BATCH_SIZE {
            return Err(ConfigError::Invalid {
                var: "BATCH_MAX_TARGETS",
                value: batch_max_targets.to_string(),
                reason: format!("must be between 1 and {MAX_BATCH_SIZE}"),
            });
        }
        Ok(Self { batch_max_targets })
    }
}

// ---------------------------------------------------------------------------
// OutboxConfig
// ---------------------------------------------------------------------------

/// Settings for the audit outbox drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            batch_size: DEFAULT_OUTBOX_BATCH_SIZE,
        }
    }
}

impl OutboxConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `OUTBOX_POLL_INTERVAL_MS` | `1000`  |
    /// | `OUTBOX_BATCH_SIZE`       | `100`   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let poll_ms: u64 = parse_var(&lookup, "OUTBOX_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?;
        if poll_ms == 0 {
            return Err(ConfigError::Invalid {
                var: "OUTBOX_POLL_INTERVAL_MS",
                value: poll_ms.to_string(),
                reason: "must be positive".into(),
            });
        }
        let batch_size: i64 = parse_var(&lookup, "OUTBOX_BATCH_SIZE", DEFAULT_OUTBOX_BATCH_SIZE)?;
        if batch_size <= 0 {
            return Err(ConfigError::Invalid {
                var: "OUTBOX_BATCH_SIZE",
                value: batch_size.to_string(),
                reason: "must be positive".into(),
            });
        }
        Ok(Self {
            poll_interval: Duration::from_millis(poll_ms),
            batch_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        assert_eq!(EngineConfig::from_lookup(vars(&[])).unwrap(), EngineConfig::default());
        assert_eq!(OutboxConfig::from_lookup(vars(&[])).unwrap(), OutboxConfig::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let outbox = OutboxConfig::from_lookup(vars(&[
            ("OUTBOX_POLL_INTERVAL_MS", "250"),
            ("OUTBOX_BATCH_SIZE", " 10 "),
        ]))
        .unwrap();
        assert_eq!(outbox.poll_interval, Duration::from_millis(250));
        assert_eq!(outbox.batch_size, 10);

        let engine = EngineConfig::from_lookup(vars(&[("BATCH_MAX_TARGETS", "25")])).unwrap();
        assert_eq!(engine.batch_max_targets, 25);
    }

    #[test]
    fn batch_cap_cannot_exceed_hard_ceiling() {
        assert_matches!(
            EngineConfig::from_lookup(vars(&[("BATCH_MAX_TARGETS", "101")])),
            Err(ConfigError::Invalid { var: "BATCH_MAX_TARGETS", .. })
        );
    }

    #[test]
    fn garbage_is_an_error_not_a_panic() {
        assert_matches!(
            OutboxConfig::from_lookup(vars(&[("OUTBOX_BATCH_SIZE", "lots")])),
            Err(ConfigError::Invalid { var: "OUTBOX_BATCH_SIZE", .. })
        );
        assert_matches!(
            OutboxConfig::from_lookup(vars(&[("OUTBOX_POLL_INTERVAL_MS", "0")])),
            Err(ConfigError::Invalid { .. })
        );
    }
}
