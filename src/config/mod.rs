use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub aggregation: AggregationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed to call the API
    pub allow_origin: Vec<String>,
    /// Mirror the request's `Origin` instead of using the list
    pub auto_origin: bool,
}

/// Knobs of the aggregation engine. Resolved once at startup and passed
/// down; nothing re-reads the environment afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Deadline for a single aggregation call
    pub ttl: Duration,
    /// Trailing window in which a session counts as active
    pub active_window: Duration,
    /// Default number of ranked entries, "others" included
    pub rank_limit: usize,
    /// Length cap of the new and recent value lists
    pub entries_limit: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            active_window: Duration::from_secs(5 * 60),
            rank_limit: 10,
            entries_limit: 30,
        }
    }
}

fn parse_var<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{name} must be a valid number, got '{value}'")),
        _ => Ok(None),
    }
}

fn is_true(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

impl AggregationConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let ttl = parse_var::<u64>("FIKRA_TTL")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.ttl);
        let active_window = parse_var::<u64>("FIKRA_ACTIVE_WINDOW_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.active_window);
        let rank_limit = parse_var::<usize>("FIKRA_RANK_LIMIT")?.unwrap_or(defaults.rank_limit);
        let entries_limit =
            parse_var::<usize>("FIKRA_ENTRIES_LIMIT")?.unwrap_or(defaults.entries_limit);

        let config = Self {
            ttl,
            active_window,
            rank_limit,
            entries_limit,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ttl.is_zero() {
            bail!("FIKRA_TTL must be greater than zero");
        }
        if self.active_window.is_zero() {
            bail!("FIKRA_ACTIVE_WINDOW_SECS must be greater than zero");
        }
        if self.rank_limit == 0 {
            bail!("FIKRA_RANK_LIMIT must be at least 1");
        }
        if self.entries_limit == 0 {
            bail!("FIKRA_ENTRIES_LIMIT must be at least 1");
        }
        Ok(())
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("FIKRA_DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "sqlite" => DatabaseBackend::Sqlite,
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            "memory" => DatabaseBackend::Memory,
            other => {
                tracing::warn!(
                    "Unknown FIKRA_DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, postgres, memory"
                );
                DatabaseBackend::Sqlite
            }
        };

        let database_url = std::env::var("FIKRA_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .unwrap_or_else(|_| "sqlite://./fikra.db?mode=rwc".to_string());

        let max_connections = parse_var::<u32>("FIKRA_MAX_CONNECTIONS")?.unwrap_or(5);

        let host = std::env::var("FIKRA_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = match parse_var::<u16>("FIKRA_PORT")? {
            Some(port) => port,
            None => parse_var::<u16>("PORT")?.unwrap_or(3000),
        };

        let allow_origin = std::env::var("FIKRA_ALLOW_ORIGIN")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            server: ServerConfig { host, port },
            cors: CorsConfig {
                allow_origin,
                auto_origin: is_true("FIKRA_AUTO_ORIGIN"),
            },
            aggregation: AggregationConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AggregationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.active_window, Duration::from_secs(300));
        assert_eq!(config.rank_limit, 10);
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        let config = AggregationConfig {
            rank_limit: 0,
            ..AggregationConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AggregationConfig {
            active_window: Duration::ZERO,
            ..AggregationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_var_reports_the_variable() {
        // unique name so parallel tests cannot interfere
        std::env::set_var("FIKRA_TEST_PARSE_VAR", "ten");
        let err = parse_var::<u64>("FIKRA_TEST_PARSE_VAR").unwrap_err();
        assert!(err.to_string().contains("FIKRA_TEST_PARSE_VAR"));

        std::env::set_var("FIKRA_TEST_PARSE_VAR", " 12 ");
        assert_eq!(parse_var::<u64>("FIKRA_TEST_PARSE_VAR").unwrap(), Some(12));

        std::env::remove_var("FIKRA_TEST_PARSE_VAR");
        assert_eq!(parse_var::<u64>("FIKRA_TEST_PARSE_VAR").unwrap(), None);
    }
}
