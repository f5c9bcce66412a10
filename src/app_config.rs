// Centralized configuration management for HopSync Backend
// Load ALL env vars ONCE at startup; fail fast on missing secrets

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Global application configuration loaded once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    // For tests, load .env file first
    #[cfg(test)]
    dotenv::dotenv().ok();

    AppConfig::from_env().expect("Failed to load configuration")
});

/// Convenience accessor mirroring the lazy static
pub fn config() -> &'static AppConfig {
    &CONFIG
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // Server
    pub bind_address: String,
    pub environment: Environment,
    pub rust_log: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_min_connections: u32,
    pub database_connect_timeout: u64,
    pub database_idle_timeout: u64,
    pub database_max_lifetime: u64,

    // Credential vault
    /// Base64-encoded 32-byte AES-256-GCM key for token encryption at rest.
    /// Absence is a startup error, not a per-request error.
    pub token_encryption_key: String,

    // Provider OAuth apps (used only for refresh-token grants; the
    // authorization-code exchange lives in a separate service)
    pub providers: ProvidersConfig,

    // Transfer tuning
    pub transfer: TransferConfig,
}

/// Environment type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Environment {
    Development,
    Test,
    Staging,
    Production,
}

impl From<String> for Environment {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            "test" => Environment::Test,
            "staging" | "stage" => Environment::Staging,
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// OAuth client settings per provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub drive_client_id: String,
    pub drive_client_secret: String,
    pub drive_token_url: String,
    pub graph_client_id: String,
    pub graph_client_secret: String,
    pub graph_token_url: String,
}

/// Transfer pipeline tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// HTTP timeout for provider calls, seconds
    pub http_timeout_secs: u64,
    /// Minimum interval between cancellation re-checks, seconds
    pub cancel_poll_interval_secs: u64,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let get_required = |key: &str| -> Result<String, ConfigError> {
            env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
        };

        let get_or_default = |key: &str, default: &str| -> String {
            env::var(key).unwrap_or_else(|_| default.to_string())
        };

        let parse_or_default = |key: &str, default: &str| -> Result<u32, ConfigError> {
            get_or_default(key, default).parse().map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "not a valid u32".to_string())
            })
        };

        let parse_u64_or_default = |key: &str, default: &str| -> Result<u64, ConfigError> {
            get_or_default(key, default).parse().map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "not a valid u64".to_string())
            })
        };

        let bind_address = get_or_default("BIND_ADDRESS", "0.0.0.0:8080");
        let environment = Environment::from(get_or_default("ENVIRONMENT", "development"));
        let rust_log = get_or_default("RUST_LOG", "info");

        let database_url = get_required("DATABASE_URL")?;
        let database_max_connections = parse_or_default("DATABASE_MAX_CONNECTIONS", "50")?;
        let database_min_connections = parse_or_default("DATABASE_MIN_CONNECTIONS", "5")?;
        let database_connect_timeout = parse_u64_or_default("DATABASE_CONNECT_TIMEOUT", "30")?;
        let database_idle_timeout = parse_u64_or_default("DATABASE_IDLE_TIMEOUT", "600")?;
        let database_max_lifetime = parse_u64_or_default("DATABASE_MAX_LIFETIME", "1800")?;

        // The vault refuses to start without a key; validate shape here so a
        // bad deploy fails at boot rather than on the first refresh.
        let token_encryption_key = get_required("TOKEN_ENCRYPTION_KEY")?;
        match base64_decoded_len(&token_encryption_key) {
            Some(32) => {},
            _ => {
                return Err(ConfigError::InvalidValue(
                    "TOKEN_ENCRYPTION_KEY".to_string(),
                    "must be base64 of exactly 32 bytes".to_string(),
                ));
            },
        }

        let providers = ProvidersConfig {
            drive_client_id: get_required("DRIVE_CLIENT_ID")?,
            drive_client_secret: get_required("DRIVE_CLIENT_SECRET")?,
            drive_token_url: get_or_default(
                "DRIVE_TOKEN_URL",
                "https://oauth2.googleapis.com/token",
            ),
            graph_client_id: get_required("GRAPH_CLIENT_ID")?,
            graph_client_secret: get_required("GRAPH_CLIENT_SECRET")?,
            graph_token_url: get_or_default(
                "GRAPH_TOKEN_URL",
                "https://login.microsoftonline.com/common/oauth2/v2.0/token",
            ),
        };

        let transfer = TransferConfig {
            http_timeout_secs: parse_u64_or_default("TRANSFER_HTTP_TIMEOUT_SECS", "300")?,
            cancel_poll_interval_secs: parse_u64_or_default("CANCEL_POLL_INTERVAL_SECS", "2")?,
        };

        Ok(AppConfig {
            bind_address,
            environment,
            rust_log,
            database_url,
            database_max_connections,
            database_min_connections,
            database_connect_timeout,
            database_idle_timeout,
            database_max_lifetime,
            token_encryption_key,
            providers,
            transfer,
        })
    }
}

/// Decoded length of a base64 string, None if it does not decode
fn base64_decoded_len(value: &str) -> Option<usize> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .ok()
        .map(|bytes| bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            Environment::from("production".to_string()),
            Environment::Production
        );
        assert_eq!(Environment::from("dev".to_string()), Environment::Development);
        assert_eq!(
            Environment::from("garbage".to_string()),
            Environment::Development
        );
    }

    #[test]
    fn test_base64_key_length_check() {
        use base64::Engine;
        let key = base64::engine::general_purpose::STANDARD.encode([0u8; 32]);
        assert_eq!(base64_decoded_len(&key), Some(32));

        let short = base64::engine::general_purpose::STANDARD.encode([0u8; 16]);
        assert_eq!(base64_decoded_len(&short), Some(16));

        assert_eq!(base64_decoded_len("not base64!!"), None);
    }
}
