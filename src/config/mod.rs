/// Configuration management for the Zapflow engine
///
/// Handles server configuration, database location, and the outbound
/// messaging transport settings.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Outbound messaging transport configuration
    pub messaging: MessagingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// SQLite database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding the zapflow.db file (default: "data")
    pub data_dir: String,
}

/// Outbound messaging provider configuration
///
/// The transport posts provider-shaped JSON to {api_base}/{phone_number_id}/messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Provider API base URL
    pub api_base: String,
    /// Bearer token for the provider API
    pub api_token: String,
    /// Provider phone number id the default channel profile sends from
    pub phone_number_id: String,
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("ZAPFLOW_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("ZAPFLOW_PORT")
                    .unwrap_or_else(|_| "3010".to_string())
                    .parse()
                    .unwrap_or(3010),
            },
            database: DatabaseConfig {
                data_dir: std::env::var("ZAPFLOW_DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            },
            messaging: MessagingConfig {
                api_base: std::env::var("ZAPFLOW_MESSAGING_API_BASE")
                    .unwrap_or_else(|_| "https://graph.facebook.com/v19.0".to_string()),
                api_token: std::env::var("ZAPFLOW_MESSAGING_API_TOKEN").unwrap_or_default(),
                phone_number_id: std::env::var("ZAPFLOW_PHONE_NUMBER_ID").unwrap_or_default(),
            },
        }
    }
}
