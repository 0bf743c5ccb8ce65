//! Application configuration

use std::env;

/// Default chat-completion endpoint (OpenAI-compatible)
pub const DEFAULT_CHAT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Authentication
    pub jwt_secret: String,

    /// Shared secret for the internal billing-events route; the route rejects
    /// every request when unset
    pub billing_events_secret: Option<String>,

    // Chat-completion provider
    pub chat_api_key: Option<String>,
    pub chat_api_url: String,
    pub chat_model: String,
    pub chat_timeout_ms: u64,

    // Logging
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),

            // Authentication
            jwt_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },

            billing_events_secret: match non_empty(env::var("BILLING_EVENTS_SECRET").ok()) {
                Some(secret) if secret.len() < 32 => {
                    return Err(ConfigError::WeakSecret(
                        "BILLING_EVENTS_SECRET must be at least 32 characters",
                    ));
                }
                secret => secret,
            },

            // Chat-completion provider
            chat_api_key: non_empty(env::var("CHAT_API_KEY").ok()),
            chat_api_url: env::var("CHAT_API_URL")
                .unwrap_or_else(|_| DEFAULT_CHAT_API_URL.to_string()),
            chat_model: env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            chat_timeout_ms: env::var("CHAT_TIMEOUT_MS")
                .unwrap_or_else(|_| "60000".to_string())
                .parse()
                .unwrap_or(60000),

            // Logging
            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    /// Helper to set required env vars for testing
    fn setup_minimal_config() {
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
    }

    /// Helper to clear env vars after tests
    fn cleanup_config() {
        for key in [
            "DATABASE_URL",
            "JWT_SECRET",
            "CHAT_API_KEY",
            "CHAT_TIMEOUT_MS",
            "BILLING_EVENTS_SECRET",
            "LOG_FORMAT",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        cleanup_config();
        setup_minimal_config();

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.chat_api_url, DEFAULT_CHAT_API_URL);
        assert_eq!(config.chat_timeout_ms, 60000);
        assert!(config.chat_api_key.is_none());
        assert!(config.billing_events_secret.is_none());
        assert!(!config.log_json);

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_missing_database_url() {
        cleanup_config();
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );

        match Config::from_env() {
            Err(ConfigError::Missing("DATABASE_URL")) => {}
            other => panic!("Expected Missing error for DATABASE_URL, got: {:?}", other),
        }

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_weak_jwt_secret_rejected() {
        cleanup_config();
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var("JWT_SECRET", "short");

        assert!(matches!(Config::from_env(), Err(ConfigError::WeakSecret(_))));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_billing_events_secret() {
        cleanup_config();
        setup_minimal_config();
        env::set_var("BILLING_EVENTS_SECRET", "too-short");
        assert!(matches!(Config::from_env(), Err(ConfigError::WeakSecret(_))));

        env::set_var(
            "BILLING_EVENTS_SECRET",
            "billing-events-secret-at-least-32-characters",
        );
        let config = Config::from_env().unwrap();
        assert_eq!(
            config.billing_events_secret.as_deref(),
            Some("billing-events-secret-at-least-32-characters")
        );

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_blank_chat_key_means_unconfigured() {
        cleanup_config();
        setup_minimal_config();
        env::set_var("CHAT_API_KEY", "   ");
        env::set_var("CHAT_TIMEOUT_MS", "not-a-number");
        env::set_var("LOG_FORMAT", "JSON");

        let config = Config::from_env().unwrap();
        assert!(config.chat_api_key.is_none());
        assert_eq!(config.chat_timeout_ms, 60000);
        assert!(config.log_json);

        cleanup_config();
    }
}
