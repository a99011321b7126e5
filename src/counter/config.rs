/*!
 * Counter Configuration
 *
 * Delays and lock policy for the guarded counter, with environment overrides
 */

use crate::core::errors::{ConfigError, ConfigResult};
use crate::core::sync::{FairnessPolicy, LockConfig};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_INITIAL: &str = "COUNTER_INITIAL";
pub const ENV_READ_DELAY_MS: &str = "COUNTER_READ_DELAY_MS";
pub const ENV_WRITE_DELAY_MS: &str = "COUNTER_WRITE_DELAY_MS";
pub const ENV_FAIRNESS: &str = "COUNTER_FAIRNESS";

/// Guarded counter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    /// Starting value
    pub initial: i64,
    /// Simulated read cost, spent while holding shared access
    #[serde(with = "duration_ms")]
    pub read_delay: Duration,
    /// Simulated write cost, spent while holding exclusive access
    #[serde(with = "duration_ms")]
    pub write_delay: Duration,
    pub lock: LockConfig,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            initial: 0,
            read_delay: Duration::from_millis(50),
            write_delay: Duration::from_millis(250),
            lock: LockConfig::default(),
        }
    }
}

impl CounterConfig {
    /// No simulated cost at all
    pub const fn instant() -> Self {
        Self {
            initial: 0,
            read_delay: Duration::ZERO,
            write_delay: Duration::ZERO,
            lock: LockConfig::writer_preferring(),
        }
    }

    pub fn with_initial(mut self, initial: i64) -> Self {
        self.initial = initial;
        self
    }

    pub fn with_delays(mut self, read_delay: Duration, write_delay: Duration) -> Self {
        self.read_delay = read_delay;
        self.write_delay = write_delay;
        self
    }

    pub fn with_policy(mut self, policy: FairnessPolicy) -> Self {
        self.lock.policy = policy;
        self
    }

    /// Defaults overridden by `COUNTER_*` environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `COUNTER_*` keys
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(initial) = parse_key::<i64, _>(&lookup, ENV_INITIAL)? {
            config.initial = initial;
        }
        if let Some(ms) = parse_key::<u64, _>(&lookup, ENV_READ_DELAY_MS)? {
            config.read_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_key::<u64, _>(&lookup, ENV_WRITE_DELAY_MS)? {
            config.write_delay = Duration::from_millis(ms);
        }
        if let Some(policy) = parse_key::<FairnessPolicy, _>(&lookup, ENV_FAIRNESS)? {
            config.lock.policy = policy;
        }

        Ok(config)
    }
}

fn parse_key<T, F>(lookup: &F, key: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

/// Durations as whole milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_simulated_costs() {
        let config = CounterConfig::default();
        assert_eq!(config.initial, 0);
        assert_eq!(config.read_delay, Duration::from_millis(50));
        assert_eq!(config.write_delay, Duration::from_millis(250));
        assert_eq!(config.lock.policy, FairnessPolicy::WriterPreferring);
    }

    #[test]
    fn test_env_overrides() {
        let config = CounterConfig::from_lookup(lookup(&[
            (ENV_INITIAL, "-7"),
            (ENV_READ_DELAY_MS, "5"),
            (ENV_WRITE_DELAY_MS, " 12 "),
            (ENV_FAIRNESS, "fifo"),
        ]))
        .unwrap();

        assert_eq!(config.initial, -7);
        assert_eq!(config.read_delay, Duration::from_millis(5));
        assert_eq!(config.write_delay, Duration::from_millis(12));
        assert_eq!(config.lock.policy, FairnessPolicy::Fifo);
    }

    #[test]
    fn test_empty_values_are_ignored() {
        let config = CounterConfig::from_lookup(lookup(&[(ENV_INITIAL, "  ")])).unwrap();
        assert_eq!(config, CounterConfig::default());
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let err = CounterConfig::from_lookup(lookup(&[(ENV_READ_DELAY_MS, "soon")])).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value, .. } => {
                assert_eq!(key, ENV_READ_DELAY_MS);
                assert_eq!(value, "soon");
            }
        }
    }

    #[test]
    fn test_serde_uses_milliseconds() {
        let json = serde_json::to_value(CounterConfig::default()).unwrap();
        assert_eq!(json["read_delay"], 50);
        assert_eq!(json["lock"]["policy"], "writer_preferring");

        let parsed: CounterConfig =
            serde_json::from_str(r#"{"initial": 3, "write_delay": 1}"#).unwrap();
        assert_eq!(parsed.initial, 3);
        assert_eq!(parsed.write_delay, Duration::from_millis(1));
        assert_eq!(parsed.read_delay, Duration::from_millis(50));
    }
}
