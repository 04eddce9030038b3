use tracing::{info, warn};

/// ClickHouse connection settings, read from the environment.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl StoreConfig {
    pub fn http_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_host: String,
    pub bind_port: u16,
    /// `None` means no store was configured; the process runs in degraded mode.
    pub store: Option<StoreConfig>,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub model: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let store = match std::env::var("CLICKHOUSE_HOST") {
            Ok(host) if !host.is_empty() => {
                let port = std::env::var("CLICKHOUSE_PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(8123);
                Some(StoreConfig {
                    host,
                    port,
                    database: env_or("CLICKHOUSE_DB", "default"),
                    user: env_or("CLICKHOUSE_USER", "default"),
                    password: env_or("CLICKHOUSE_PASSWORD", ""),
                })
            }
            _ => None,
        };

        if let Some(s) = &store {
            info!("ClickHouse configured at {}:{} db={}", s.host, s.port, s.database);
        } else {
            warn!("CLICKHOUSE_HOST not set; starting in degraded mode with fallback data");
        }

        Self {
            bind_host: env_or("CARERADAR_HOST", "0.0.0.0"),
            bind_port: std::env::var("CARERADAR_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            store,
            openai_api_key: env_or("OPENAI_API_KEY", ""),
            openai_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            model: env_or("CARERADAR_MODEL", "gpt-4o"),
        }
    }
}
