//! Connection settings and per-phase timeouts
//!
//! Settings come from CLI flags or `SQL_SERVER_*` environment variables
//! (loaded via `.env` when present), or from a full ADO.NET connection
//! string. Connection setup follows the usual tiberius recipe: TCP stream
//! with nodelay, then a TDS handshake over the compat adapter.

use std::time::Duration;

use tiberius::{AuthMethod, Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::error::RoutineDiffError;

/// Type alias for the SQL client
pub type SqlClient = Client<Compat<TcpStream>>;

/// How to reach the SQL Server instance.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub user: String,
    pub password: String,
    pub trust_cert: bool,
    /// Full ADO.NET connection string; overrides the individual fields.
    pub ado_string: Option<String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1433,
            database: None,
            user: "sa".to_string(),
            password: String::new(),
            trust_cert: true,
            ado_string: None,
        }
    }
}

impl ConnectionSettings {
    /// Read settings from `SQL_SERVER_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("SQL_SERVER_HOST").unwrap_or(defaults.host),
            port: std::env::var("SQL_SERVER_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            database: std::env::var("SQL_SERVER_DATABASE").ok(),
            user: std::env::var("SQL_SERVER_USER").unwrap_or(defaults.user),
            password: std::env::var("SQL_SERVER_PASSWORD").unwrap_or(defaults.password),
            trust_cert: true,
            ado_string: std::env::var("SQL_SERVER_CONNECTION_STRING").ok(),
        }
    }

    /// Build the tiberius client config.
    pub fn to_config(&self) -> Result<Config, RoutineDiffError> {
        if let Some(ado) = &self.ado_string {
            return Config::from_ado_string(ado).map_err(|e| RoutineDiffError::Configuration {
                message: format!("invalid connection string: {}", e),
            });
        }

        let mut config = Config::new();
        config.host(&self.host);
        config.port(self.port);
        config.authentication(AuthMethod::sql_server(&self.user, &self.password));
        if self.trust_cert {
            config.trust_cert();
        }
        if let Some(db) = &self.database {
            config.database(db);
        }
        Ok(config)
    }
}

/// Open one connection to the configured server.
pub async fn connect(settings: &ConnectionSettings) -> Result<SqlClient, RoutineDiffError> {
    let config = settings.to_config()?;
    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(|source| RoutineDiffError::Connection {
            host: settings.host.clone(),
            port: settings.port,
            source,
        })?;
    tcp.set_nodelay(true)
        .map_err(|source| RoutineDiffError::Connection {
            host: settings.host.clone(),
            port: settings.port,
            source,
        })?;
    let client = Client::connect(config, tcp.compat_write())
        .await
        .map_err(|source| RoutineDiffError::Handshake { source })?;
    Ok(client)
}

/// Per-phase timeouts: one for metadata resolution and the input cursor,
/// one for each routine's execution.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub metadata: Duration,
    pub first_routine: Duration,
    pub second_routine: Duration,
}

impl Timeouts {
    pub fn from_secs(metadata: u64, first_routine: u64, second_routine: u64) -> Self {
        Self {
            metadata: Duration::from_secs(metadata),
            first_routine: Duration::from_secs(first_routine),
            second_routine: Duration::from_secs(second_routine),
        }
    }

    /// Reject zero timeouts before the engine starts.
    pub fn validate(&self) -> Result<(), RoutineDiffError> {
        let phases = [
            ("metadata", self.metadata),
            ("first routine", self.first_routine),
            ("second routine", self.second_routine),
        ];
        for (phase, duration) in phases {
            if duration.is_zero() {
                return Err(RoutineDiffError::Configuration {
                    message: format!("{} timeout must be greater than zero", phase),
                });
            }
        }
        Ok(())
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from_secs(30, 300, 300)
    }
}
