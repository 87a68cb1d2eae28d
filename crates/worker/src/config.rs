use std::str::FromStr;
use std::time::Duration;

use guildhall_events::DispatcherConfig;

/// Upper bound on `RETENTION_DAYS`, about a century.
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Worker configuration loaded from environment variables.
///
/// | Env Var                    | Default  |
/// |----------------------------|----------|
/// | `DATABASE_URL`             | required |
/// | `DB_MAX_CONNECTIONS`       | `10`     |
/// | `RETENTION_DAYS`           | `90`     |
/// | `COMPACTION_INTERVAL_SECS` | `3600`   |
/// | `PROBE_TIMEOUT_MS`         | `250`    |
/// | `STRICT_REFERENCES`        | `false`  |
/// | `LOG_FORMAT`               | `text`   |
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    /// How long an inactive notification is kept before compaction removes it.
    pub retention_days: i64,
    pub compaction_interval: Duration,
    pub probe_timeout: Duration,
    pub strict_references: bool,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected `text` or `json`, got {other:?}")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let db_max_connections: u32 = parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?;
        if db_max_connections == 0 {
            return Err(invalid("DB_MAX_CONNECTIONS", "0", "must be at least 1"));
        }

        let retention_days: i64 = parse_or(&lookup, "RETENTION_DAYS", 90)?;
        if !(1..=MAX_RETENTION_DAYS).contains(&retention_days) {
            return Err(invalid(
                "RETENTION_DAYS",
                &retention_days.to_string(),
                format!("must be between 1 and {MAX_RETENTION_DAYS}"),
            ));
        }

        let interval_secs: u64 = parse_or(&lookup, "COMPACTION_INTERVAL_SECS", 3600)?;
        if interval_secs == 0 {
            return Err(invalid("COMPACTION_INTERVAL_SECS", "0", "must be at least 1"));
        }

        let probe_timeout_ms: u64 = parse_or(&lookup, "PROBE_TIMEOUT_MS", 250)?;
        let strict_references = parse_bool(&lookup, "STRICT_REFERENCES", false)?;
        let log_format: LogFormat = parse_or(&lookup, "LOG_FORMAT", LogFormat::Text)?;

        Ok(Self {
            database_url,
            db_max_connections,
            retention_days,
            compaction_interval: Duration::from_secs(interval_secs),
            probe_timeout: Duration::from_millis(probe_timeout_ms),
            strict_references,
            log_format,
        })
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::try_days(self.retention_days.min(MAX_RETENTION_DAYS))
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            strict_references: self.strict_references,
            probe_timeout: self.probe_timeout,
        }
    }
}

fn invalid(key: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| invalid(key, &raw, e)),
    }
}

fn parse_bool<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1" | "true" | "TRUE" | "yes") => Ok(true),
        Some("0" | "false" | "FALSE" | "no") => Ok(false),
        Some(other) => Err(invalid(key, other, "expected true or false")),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    const URL: (&str, &str) = ("DATABASE_URL", "postgres://localhost/guildhall");

    #[test]
    fn defaults_apply() {
        let config = load(&[URL]).unwrap();
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.retention_days, 90);
        assert_eq!(config.compaction_interval, Duration::from_secs(3600));
        assert_eq!(config.probe_timeout, Duration::from_millis(250));
        assert!(!config.strict_references);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.dispatcher_config(), DispatcherConfig::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            URL,
            ("DB_MAX_CONNECTIONS", "4"),
            ("RETENTION_DAYS", "30"),
            ("COMPACTION_INTERVAL_SECS", "60"),
            ("PROBE_TIMEOUT_MS", "100"),
            ("STRICT_REFERENCES", "true"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();
        assert_eq!(config.db_max_connections, 4);
        assert_eq!(config.retention(), chrono::Duration::days(30));
        assert_eq!(config.compaction_interval, Duration::from_secs(60));
        assert_eq!(config.log_format, LogFormat::Json);

        let dispatcher = config.dispatcher_config();
        assert!(dispatcher.strict_references);
        assert_eq!(dispatcher.probe_timeout, Duration::from_millis(100));
    }

    #[test]
    fn missing_database_url_is_an_error() {
        assert_matches!(load(&[]), Err(ConfigError::Missing("DATABASE_URL")));
        assert_matches!(
            load(&[("DATABASE_URL", "  ")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
    }

    #[test]
    fn invalid_values_are_errors() {
        assert_matches!(
            load(&[URL, ("DB_MAX_CONNECTIONS", "lots")]),
            Err(ConfigError::Invalid { key: "DB_MAX_CONNECTIONS", .. })
        );
        assert_matches!(
            load(&[URL, ("RETENTION_DAYS", "0")]),
            Err(ConfigError::Invalid { key: "RETENTION_DAYS", .. })
        );
        assert_matches!(
            load(&[URL, ("RETENTION_DAYS", "-5")]),
            Err(ConfigError::Invalid { key: "RETENTION_DAYS", .. })
        );
        assert_matches!(
            load(&[URL, ("COMPACTION_INTERVAL_SECS", "0")]),
            Err(ConfigError::Invalid { key: "COMPACTION_INTERVAL_SECS", .. })
        );
        assert_matches!(
            load(&[URL, ("STRICT_REFERENCES", "maybe")]),
            Err(ConfigError::Invalid { key: "STRICT_REFERENCES", .. })
        );
        assert_matches!(
            load(&[URL, ("LOG_FORMAT", "xml")]),
            Err(ConfigError::Invalid { key: "LOG_FORMAT", .. })
        );
    }

    #[test]
    fn retention_days_are_capped() {
        let config = load(&[URL, ("RETENTION_DAYS", "36500")]).unwrap();
        assert_eq!(config.retention(), chrono::Duration::days(MAX_RETENTION_DAYS));

        assert_matches!(
            load(&[URL, ("RETENTION_DAYS", "36501")]),
            Err(ConfigError::Invalid { key: "RETENTION_DAYS", .. })
        );
        assert_matches!(
            load(&[URL, ("RETENTION_DAYS", "200000000000")]),
            Err(ConfigError::Invalid { key: "RETENTION_DAYS", .. })
        );
        assert_matches!(
            load(&[URL, ("RETENTION_DAYS", "9223372036854775807")]),
            Err(ConfigError::Invalid { key: "RETENTION_DAYS", .. })
        );
    }
}
