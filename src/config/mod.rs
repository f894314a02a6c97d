/// Configuration management for the Relayflow engine
///
/// Server address, database locations and engine tuning, all overridable
/// through RELAYFLOW_* environment variables for container deployment.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding the SQLite files (engine.db, datastore.db)
    pub data_dir: String,
}

/// Engine tuning parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker pool size bounding concurrent node handlers across all runs
    pub worker_concurrency: usize,
}

impl Default for Config {
    /// Defaults with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("RELAYFLOW_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("RELAYFLOW_PORT")
                    .unwrap_or_else(|_| "3080".to_string())
                    .parse()
                    .unwrap_or(3080),
            },
            database: DatabaseConfig {
                data_dir: std::env::var("RELAYFLOW_DATA_DIR")
                    .unwrap_or_else(|_| "data".to_string()),
            },
            engine: EngineConfig {
                worker_concurrency: std::env::var("RELAYFLOW_WORKERS")
                    .unwrap_or_else(|_| "8".to_string())
                    .parse()
                    .unwrap_or(8),
            },
        }
    }
}
