use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_HTTP_BIND: &str = "127.0.0.1:9102";
const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
const DEFAULT_DB_POOL_SIZE: u32 = 5;
const DEFAULT_USER_AGENT: &str = concat!("live-power/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default, Deserialize)]
struct SetupConfigOverrides {
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default)]
    poll_interval_ms: Option<u64>,
    #[serde(default)]
    http_bind: Option<String>,
}

fn load_setup_config_overrides(path: &Path) -> Option<SetupConfigOverrides> {
    if !path.exists() {
        return None;
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "live-power failed to read setup config; using env defaults"
            );
            return None;
        }
    };
    let mut bytes = contents.into_bytes();
    match simd_json::serde::from_slice(&mut bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "live-power failed to parse setup config; using env defaults"
            );
            None
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_pool_size: u32,
    pub http_bind: SocketAddr,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub user_agent: String,
    pub otlp_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. Blank values
    /// count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let setup_overrides = var("LIVE_SETUP_CONFIG_PATH")
            .map(PathBuf::from)
            .and_then(|path| load_setup_config_overrides(&path))
            .unwrap_or_default();
        let from_setup = |value: Option<&String>| {
            value
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let database_url = var("LIVE_DATABASE_URL")
            .or_else(|| var("DATABASE_URL"))
            .or_else(|| from_setup(setup_overrides.database_url.as_ref()))
            .context("LIVE_DATABASE_URL or DATABASE_URL is required (or present as database_url in the setup config)")?;
        let database_url = normalize_database_url(database_url);

        let db_pool_size = parse_var(&var, "LIVE_DB_POOL_SIZE")?.unwrap_or(DEFAULT_DB_POOL_SIZE);

        let http_bind = match var("LIVE_HTTP_BIND") {
            Some(value) => value
                .parse::<SocketAddr>()
                .with_context(|| format!("LIVE_HTTP_BIND is not a socket address: {value}"))?,
            None => from_setup(setup_overrides.http_bind.as_ref())
                .unwrap_or_else(|| DEFAULT_HTTP_BIND.to_string())
                .parse::<SocketAddr>()
                .context("setup config http_bind is not a socket address")?,
        };

        let poll_interval_ms = parse_var(&var, "LIVE_POLL_INTERVAL_MS")?
            .or(setup_overrides.poll_interval_ms.filter(|v| *v != 0))
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        let request_timeout_ms = parse_var(&var, "LIVE_REQUEST_TIMEOUT_MS")?
            .filter(|v| *v != 0)
            .unwrap_or(poll_interval_ms.max(1));

        let user_agent = var("LIVE_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let otlp_endpoint = var("OTEL_EXPORTER_OTLP_ENDPOINT");

        Ok(Self {
            database_url,
            db_pool_size,
            http_bind,
            poll_interval_ms,
            request_timeout_ms,
            user_agent,
            otlp_endpoint,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(key)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("{key} is not a valid number: {value}"))
        })
        .transpose()
}

fn normalize_database_url(url: String) -> String {
    if let Some(stripped) = url.strip_prefix("postgresql+psycopg://") {
        return format!("postgresql://{stripped}");
    }
    if let Some(stripped) = url.strip_prefix("postgresql+asyncpg://") {
        return format!("postgresql://{stripped}");
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgresql://db/power")])).unwrap();
        assert_eq!(config.database_url, "postgresql://db/power");
        assert_eq!(config.db_pool_size, 5);
        assert_eq!(config.http_bind, "127.0.0.1:9102".parse().unwrap());
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert!(config.user_agent.starts_with("live-power/"));
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn live_database_url_wins_and_driver_prefix_is_stripped() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgresql://fallback/db"),
            ("LIVE_DATABASE_URL", "postgresql+asyncpg://user@host/power"),
            ("LIVE_POLL_INTERVAL_MS", "2500"),
            ("LIVE_REQUEST_TIMEOUT_MS", "1000"),
            ("LIVE_HTTP_BIND", "0.0.0.0:8080"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", " http://collector:4318 "),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "postgresql://user@host/power");
        assert_eq!(config.poll_interval_ms, 2500);
        assert_eq!(config.request_timeout_ms, 1000);
        assert_eq!(config.http_bind.port(), 8080);
        assert_eq!(config.otlp_endpoint.as_deref(), Some("http://collector:4318"));
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let err = Config::from_lookup(lookup(&[("DATABASE_URL", "   ")])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgresql://db/power"),
            ("LIVE_POLL_INTERVAL_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("LIVE_POLL_INTERVAL_MS"));
    }

    #[test]
    fn setup_file_fills_gaps_left_by_env() {
        let path = std::env::temp_dir().join(format!("live-power-setup-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"database_url":"postgresql+psycopg://setup/db","poll_interval_ms":10000,"http_bind":"127.0.0.1:9200"}"#,
        )
        .unwrap();
        let path_str = path.to_string_lossy().to_string();

        let config = Config::from_lookup(lookup(&[
            ("LIVE_SETUP_CONFIG_PATH", path_str.as_str()),
            ("LIVE_HTTP_BIND", "127.0.0.1:9300"),
        ]))
        .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.database_url, "postgresql://setup/db");
        assert_eq!(config.poll_interval_ms, 10_000);
        assert_eq!(config.http_bind.port(), 9300);
    }

    #[test]
    fn unreadable_setup_file_is_ignored() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgresql://db/power"),
            ("LIVE_SETUP_CONFIG_PATH", "/nonexistent/live-power/config.json"),
        ]))
        .unwrap();
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }
}
