use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEV_TOKEN_SECRET: &str = "student-performance-dev-secret";

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_nonempty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub bind_addr: String,
    pub port: u16,
    pub token_secret: String,
    /// False when the built-in development secret is in use.
    pub token_secret_configured: bool,
    pub token_ttl_days: i64,
    pub google_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_endpoint: String,
    pub ai_timeout: Duration,
    pub cors_allowed_origins: Vec<String>,
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 5,
            bind_addr: "0.0.0.0".to_string(),
            port: 5000,
            token_secret: DEV_TOKEN_SECRET.to_string(),
            token_secret_configured: false,
            token_ttl_days: 7,
            google_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            ai_timeout: Duration::from_millis(20_000),
            cors_allowed_origins: Vec::new(),
            log_json: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let configured_secret = env_nonempty("TOKEN_SECRET").or_else(|| env_nonempty("JWT_SECRET"));
        Self {
            database_url: env_nonempty("DATABASE_URL"),
            database_max_connections: env_u64(
                "DATABASE_MAX_CONNECTIONS",
                u64::from(defaults.database_max_connections),
            )
            .clamp(1, 100) as u32,
            bind_addr: env_nonempty("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: u16::try_from(env_u64("PORT", u64::from(defaults.port)))
                .unwrap_or(defaults.port),
            token_secret_configured: configured_secret.is_some(),
            token_secret: configured_secret.unwrap_or(defaults.token_secret),
            token_ttl_days: env_u64("TOKEN_TTL_DAYS", 7).clamp(1, 365) as i64,
            google_api_key: env_nonempty("GOOGLE_API_KEY"),
            gemini_model: env_nonempty("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_endpoint: env_nonempty("GEMINI_ENDPOINT").unwrap_or(defaults.gemini_endpoint),
            ai_timeout: Duration::from_millis(env_u64("AI_TIMEOUT_MS", 20_000).max(1)),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect(),
            log_json: env_bool("LOG_JSON", defaults.log_json),
        }
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.bind_addr, self.port))
    }

    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a Postgres instance")
    }
}
