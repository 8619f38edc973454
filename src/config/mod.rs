use anyhow::anyhow;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

// Top-level configuration, one section per concern
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub cache: CacheConfig,
    pub jwt: JwtConfig,
    pub orders: OrdersConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: "development".to_string(),
            rust_log: "cinema_booking=debug,tower_http=debug".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: 20,
        }
    }
}

// Redis is optional; without it seat listings are read from the ledger every time
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: 120 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrdersConfig {
    pub timeout_ms: u64,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self { timeout_ms: 5000 }
    }
}

impl OrdersConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("{} must be set", name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} must be valid, got {:?}: {}", name, raw, e)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();

        let config = Config {
            app: AppConfig {
                host: optional("HOST").unwrap_or(defaults.app.host),
                port: parsed_or("PORT", defaults.app.port)?,
                environment: optional("ENVIRONMENT").unwrap_or(defaults.app.environment),
                rust_log: optional("RUST_LOG").unwrap_or(defaults.app.rust_log),
                log_format: parsed_or("LOG_FORMAT", defaults.app.log_format)?,
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                pool_size: parsed_or("DB_POOL_SIZE", defaults.database.pool_size)?,
            },
            redis: RedisConfig {
                url: optional("REDIS_URL"),
            },
            cache: CacheConfig {
                ttl_seconds: parsed_or("CACHE_TTL_SECONDS", defaults.cache.ttl_seconds)?,
            },
            jwt: JwtConfig {
                secret: required("JWT_SECRET")?,
            },
            orders: OrdersConfig {
                timeout_ms: parsed_or("ORDER_TIMEOUT_MS", defaults.orders.timeout_ms)?,
            },
        };

        if config.database.pool_size == 0 {
            return Err(anyhow!("DB_POOL_SIZE must be greater than zero"));
        }
        if config.orders.timeout_ms == 0 {
            return Err(anyhow!("ORDER_TIMEOUT_MS must be greater than zero"));
        }

        Ok(config)
    }
}
