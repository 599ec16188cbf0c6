use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub namespace: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub metrics: MetricsConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: parse_var("DB_MAX_CONNECTIONS", 10)?,
            acquire_timeout_secs: parse_var("DB_ACQUIRE_TIMEOUT_SECS", 60)?,
        };
        let metrics = MetricsConfig {
            enabled: parse_var("METRICS_ENABLED", true)?,
            namespace: std::env::var("METRICS_NAMESPACE")
                .unwrap_or_else(|_| "MyProject/API".into()),
            region: std::env::var("METRICS_REGION")
                .or_else(|_| std::env::var("AWS_REGION"))
                .unwrap_or_else(|_| "us-east-1".into()),
            endpoint: std::env::var("METRICS_ENDPOINT")
                .ok()
                .filter(|v| !v.is_empty()),
            queue_capacity: parse_var("METRICS_QUEUE_CAPACITY", 1024)?,
        };
        Ok(Self {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parse_var("APP_PORT", DEFAULT_PORT)?,
            database,
            metrics,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {v:?}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_falls_back_to_default_when_unset() {
        let v: u32 = parse_var("USERDATA_TEST_UNSET_VAR", 7).unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn parse_var_reports_garbage() {
        std::env::set_var("USERDATA_TEST_BAD_PORT", "not-a-port");
        let err = parse_var::<u16>("USERDATA_TEST_BAD_PORT", 1).unwrap_err();
        assert!(err.to_string().contains("USERDATA_TEST_BAD_PORT"));
    }

    #[test]
    fn parse_var_reads_bool() {
        std::env::set_var("USERDATA_TEST_FLAG", "false");
        assert!(!parse_var("USERDATA_TEST_FLAG", true).unwrap());
    }
}
