//! Configuration loader for the `codemetal-heatgrid` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::env;

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// TCP port the HTTP server binds on all interfaces.
    pub listen_port: u16,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `LISTEN_PORT` – HTTP port (default: 8080)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let listen_port = parse_env_u32!("LISTEN_PORT", 8080);
    let listen_port = u16::try_from(listen_port)
        .map_err(|_| anyhow!("Invalid LISTEN_PORT: {} is not a TCP port", listen_port))?;

    Ok(Config {
        db_url,
        db_pool_max,
        listen_port,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL : {}", self.masked_db_url());
        tracing::info!("  DB_POOL_MAX  : {}", self.db_pool_max);
        tracing::info!("  LISTEN_PORT  : {}", self.listen_port);
    }

    /// Database URL with the password replaced by `****`.
    pub fn masked_db_url(&self) -> String {
        // ---
        let Some(at_pos) = self.db_url.rfind('@') else {
            return self.db_url.clone();
        };
        let userinfo_start = self.db_url.find("://").map_or(0, |i| i + 3);
        if at_pos < userinfo_start {
            return self.db_url.clone();
        }
        match self.db_url[userinfo_start..at_pos].rfind(':') {
            Some(rel) => {
                let colon_pos = userinfo_start + rel;
                format!("{}:****{}", &self.db_url[..colon_pos], &self.db_url[at_pos..])
            }
            None => self.db_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn config_with_url(db_url: &str) -> Config {
        Config {
            db_url: db_url.to_string(),
            db_pool_max: 5,
            listen_port: 8080,
        }
    }

    #[test]
    fn test_password_is_masked() {
        // ---
        let cfg = config_with_url("postgres://heat:secret@db:5432/heatgrid");
        assert_eq!(cfg.masked_db_url(), "postgres://heat:****@db:5432/heatgrid");
    }

    #[test]
    fn test_url_without_credentials_is_unchanged() {
        // ---
        let cfg = config_with_url("postgres://db:5432/heatgrid");
        assert_eq!(cfg.masked_db_url(), "postgres://db:5432/heatgrid");

        let cfg = config_with_url("postgres://heat@db:5432/heatgrid");
        assert_eq!(cfg.masked_db_url(), "postgres://heat@db:5432/heatgrid");
    }
}
