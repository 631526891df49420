//! Database module providing connection management and query modules.

pub mod jobs;
pub mod projects;
pub mod users;

use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Database connection pool wrapper around the SeaORM connection.
///
/// The only process-wide state in the service; every subsystem receives it
/// as an explicit parameter.
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Connect to PostgreSQL using the configured URI.
    ///
    /// Pool sizing: 30 connections with no overflow, 180 s acquire timeout,
    /// 600 s connection lifetime.
    pub async fn connect(config: &Config) -> AppResult<Self> {
        let mut opts = ConnectOptions::new(config.database_uri.clone());
        opts.max_connections(30)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(180))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opts)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect: {}", e)))?;

        Ok(DbPool { conn })
    }

    /// Wrap an already-established connection (used by tests).
    pub fn from_connection(conn: DatabaseConnection) -> Self {
        DbPool { conn }
    }

    /// Get access to the connection for executing queries.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }
}
