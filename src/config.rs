//! Application configuration loaded from environment variables.

use std::env;

use secrecy::SecretString;

/// Seconds an issued bearer token stays valid.
pub const TOKEN_DURATION_SECS: u64 = 600;

/// Development default values - NEVER use in production.
pub mod defaults {
    pub const DEV_SECRET_KEY: &str = "dev-secret-key-do-not-use-in-production";
    pub const DEV_HOST: &str = "127.0.0.1";
    pub const DEV_PORT: u16 = 5000;
}

/// Runtime environment.
///
/// Production is selected by the presence of `USERV_API_PRODUCTION`;
/// anything else runs with development fallbacks enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Check if this is a development environment.
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    /// Check if this is a production environment.
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Runtime environment
    pub environment: Environment,
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URI
    pub database_uri: String,
    /// Admin username; the only user allowed on /admin endpoints
    pub admin_user: Option<String>,
    /// Admin password, inserted into the user table at startup.
    /// Debug-prints as `[REDACTED]` and zeroizes on drop.
    pub admin_password: Option<SecretString>,
    /// HMAC key for bearer tokens
    pub secret_key: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `USERVICE_DATABASE_URI`: PostgreSQL connection URI - REQUIRED
    /// - `USERVICE_ADMIN_USER`: admin username, bootstrapped at startup
    /// - `USERVICE_ADMIN_PASSWORD`: admin password
    /// - `USERVICE_SECRET_KEY`: token signing key (required in production)
    /// - `USERVICE_HOST`: bind host (default: 127.0.0.1)
    /// - `USERVICE_PORT`: bind port (default: 5000)
    /// - `USERV_API_PRODUCTION`: if set, disables all development fallbacks
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = if env::var("USERV_API_PRODUCTION").is_ok() {
            Environment::Production
        } else {
            Environment::Development
        };

        let database_uri = env::var("USERVICE_DATABASE_URI")
            .map_err(|_| ConfigError::MissingEnvVar("USERVICE_DATABASE_URI"))?;

        let host = env::var("USERVICE_HOST").unwrap_or_else(|_| defaults::DEV_HOST.to_string());

        let port = env::var("USERVICE_PORT")
            .unwrap_or_else(|_| defaults::DEV_PORT.to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidValue("USERVICE_PORT must be a valid port number"))?;

        let admin_user = env::var("USERVICE_ADMIN_USER").ok();
        let admin_password = env::var("USERVICE_ADMIN_PASSWORD")
            .ok()
            .map(SecretString::from);

        let secret_key = if environment.is_development() {
            env::var("USERVICE_SECRET_KEY")
                .unwrap_or_else(|_| defaults::DEV_SECRET_KEY.to_string())
        } else {
            env::var("USERVICE_SECRET_KEY")
                .map_err(|_| ConfigError::MissingEnvVar("USERVICE_SECRET_KEY"))?
        };

        let config = Config {
            environment,
            host,
            port,
            database_uri,
            admin_user,
            admin_password,
            secret_key,
        };

        if environment.is_production() {
            config.validate_production()?;
        }

        Ok(config)
    }

    /// Validate that production configuration does not use development defaults.
    fn validate_production(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.secret_key == defaults::DEV_SECRET_KEY {
            errors.push(
                "USERVICE_SECRET_KEY is using the development default. Set a unique key."
                    .to_string(),
            );
        }

        if self.admin_user.is_none() || self.admin_password.is_none() {
            errors.push(
                "USERVICE_ADMIN_USER and USERVICE_ADMIN_PASSWORD must be set in production."
                    .to_string(),
            );
        }

        if !errors.is_empty() {
            return Err(ConfigError::ProductionValidation(errors));
        }

        Ok(())
    }

    /// Get the server bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode.
    pub fn is_development(&self) -> bool {
        self.environment.is_development()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(&'static str),

    #[error("Production configuration validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    ProductionValidation(Vec<String>),
}
