//! Environment configuration

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub media_list_concurrency: usize,
    pub media_acquire_timeout: Duration,
    pub cache_ttl: Duration,
    pub default_currency: String,
    pub low_stock_threshold: i32,
    pub nats_url: Option<String>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let currency = lookup("DEFAULT_CURRENCY").unwrap_or_else(|| "RUB".to_string());
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Invalid { key: "DEFAULT_CURRENCY", value: currency });
        }

        Ok(Self {
            database_url,
            port: parse_or(&lookup, "PORT", 8083)?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            media_list_concurrency: parse_or(&lookup, "MEDIA_LIST_CONCURRENCY", 4)?,
            media_acquire_timeout: Duration::from_millis(parse_or(&lookup, "MEDIA_ACQUIRE_TIMEOUT_MS", 2000)?),
            cache_ttl: Duration::from_secs(parse_or(&lookup, "CACHE_TTL_SECS", 60)?),
            default_currency: currency.to_uppercase(),
            low_stock_threshold: parse_or(&lookup, "LOW_STOCK_THRESHOLD", 5)?,
            nats_url: lookup("NATS_URL").filter(|s| !s.trim().is_empty()),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://localhost/shop")])).unwrap();
        assert_eq!(cfg.port, 8083);
        assert_eq!(cfg.db_max_connections, 10);
        assert_eq!(cfg.media_list_concurrency, 4);
        assert_eq!(cfg.media_acquire_timeout, Duration::from_millis(2000));
        assert_eq!(cfg.default_currency, "RUB");
        assert!(cfg.nats_url.is_none());
    }

    #[test]
    fn test_missing_database_url() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_invalid_number() {
        let err = Config::from_lookup(lookup_from(&[("DATABASE_URL", "x"), ("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    #[test]
    fn test_overrides() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "x"),
            ("PORT", "9000"),
            ("DEFAULT_CURRENCY", "eur"),
            ("NATS_URL", "nats://localhost:4222"),
        ]))
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.default_currency, "EUR");
        assert_eq!(cfg.nats_url.as_deref(), Some("nats://localhost:4222"));
    }
}
