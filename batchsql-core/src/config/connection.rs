//! Database connection configuration.
//!
//! This module provides the `ConnectionConfig` struct describing where a
//! client connects and how long it waits, with safe defaults.

use crate::security::Credentials;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default MySQL port used when none is configured.
pub const DEFAULT_PORT: u16 = 3306;

/// Project name written into audit records when the caller sets none.
pub const DEFAULT_PROJECT_NAME: &str = "MySQLOperation";

/// Table the audit logger creates and writes to.
pub const DEFAULT_AUDIT_TABLE: &str = "abnormal_records";

/// Configuration for one client's database connection.
///
/// # Security
/// This struct intentionally does NOT store passwords.
/// Credentials are held in [`Credentials`] and never logged or serialized.
///
/// # Example
/// ```rust
/// use batchsql_core::config::ConnectionConfig;
///
/// let config = ConnectionConfig::new("localhost".to_string())
///     .with_port(3306)
///     .with_database("inventory".to_string())
///     .with_username("loader".to_string());
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database host address
    pub host: String,
    /// Optional port number
    pub port: Option<u16>,
    /// Optional database name
    pub database: Option<String>,
    /// Optional username (password handled separately)
    pub username: Option<String>,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Per-statement timeout duration
    pub query_timeout: Duration,
    /// Project name recorded by the audit logger
    pub project_name: String,
    /// Name of the audit table
    pub audit_table: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
            database: None,
            username: None,
            connect_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(300),
            project_name: DEFAULT_PROJECT_NAME.to_string(),
            audit_table: DEFAULT_AUDIT_TABLE.to_string(),
        }
    }
}

impl std::fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ConnectionConfig({}{}{})",
            self.host,
            self.port.map_or_else(String::new, |p| format!(":{}", p)),
            self.database
                .as_ref()
                .map_or_else(String::new, |db| format!("/{}", db))
        )
        // Intentionally omit username and never include credentials
    }
}

impl ConnectionConfig {
    /// Validates connection configuration parameters.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid or unsafe
    pub fn validate(&self) -> crate::Result<()> {
        if self.host.is_empty() {
            return Err(crate::error::BatchSqlError::configuration(
                "host cannot be empty",
            ));
        }

        if self.port == Some(0) {
            return Err(crate::error::BatchSqlError::configuration(
                "port must be greater than 0",
            ));
        }

        if let Some(database) = &self.database
            && (database.is_empty() || database.len() > 64)
        {
            return Err(crate::error::BatchSqlError::configuration(format!(
                "Invalid database name length: must be 1-64 characters, got {}",
                database.len()
            )));
        }

        if self.connect_timeout.is_zero() {
            return Err(crate::error::BatchSqlError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.query_timeout.is_zero() {
            return Err(crate::error::BatchSqlError::configuration(
                "query_timeout must be greater than 0",
            ));
        }

        crate::sanitize::check_identifier(&self.audit_table).map_err(|e| {
            crate::error::BatchSqlError::configuration(format!("audit_table: {}", e))
        })?;

        Ok(())
    }

    /// Creates a new connection config with safe defaults.
    pub fn new(host: String) -> Self {
        Self {
            host,
            ..Default::default()
        }
    }

    /// Builder method to set port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Builder method to set database.
    pub fn with_database(mut self, database: String) -> Self {
        self.database = Some(database);
        self
    }

    /// Builder method to set username.
    pub fn with_username(mut self, username: String) -> Self {
        self.username = Some(username);
        self
    }

    /// Builder method to set the per-statement timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Builder method to set the audit project name.
    pub fn with_project_name(mut self, project_name: String) -> Self {
        self.project_name = project_name;
        self
    }

    /// Builder method to set the audit table name.
    pub fn with_audit_table(mut self, audit_table: String) -> Self {
        self.audit_table = audit_table;
        self
    }

    /// Effective port, falling back to [`DEFAULT_PORT`].
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Renders the `Server=..;Database=..;Uid=..;Pwd=..;` connection string.
    ///
    /// `Port=` is emitted only when a non-default port is configured.
    /// The result contains the password: pass it through
    /// [`redact_connection_string`](crate::error::redact_connection_string)
    /// before logging it.
    pub fn connection_string(&self, credentials: &Credentials) -> String {
        let mut rendered = format!("Server={};", self.host);
        if let Some(port) = self.port.filter(|p| *p != DEFAULT_PORT) {
            rendered.push_str(&format!("Port={};", port));
        }
        rendered.push_str(&format!(
            "Database={};Uid={};Pwd={};",
            self.database.as_deref().unwrap_or_default(),
            credentials.username(),
            credentials.password().unwrap_or_default()
        ));
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_config_default() {
        let config = ConnectionConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, None);
        assert_eq!(config.effective_port(), 3306);
        assert_eq!(config.project_name, "MySQLOperation");
        assert_eq!(config.audit_table, "abnormal_records");
    }

    #[test]
    fn test_connection_config_validation() {
        let config = ConnectionConfig::new("localhost".to_string());
        assert!(config.validate().is_ok());

        let config = ConnectionConfig {
            host: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConnectionConfig {
            port: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConnectionConfig {
            query_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConnectionConfig::default().with_audit_table("audit; DROP".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connection_config_builder() {
        let config = ConnectionConfig::new("example.com".to_string())
            .with_port(3307)
            .with_database("testdb".to_string())
            .with_username("admin".to_string())
            .with_project_name("Billing".to_string());

        assert_eq!(config.host, "example.com");
        assert_eq!(config.port, Some(3307));
        assert_eq!(config.database, Some("testdb".to_string()));
        assert_eq!(config.username, Some("admin".to_string()));
        assert_eq!(config.project_name, "Billing");
    }

    #[test]
    fn test_connection_string_shape() {
        let config = ConnectionConfig::new("db.local".to_string()).with_database("app".to_string());
        let creds = Credentials::new("root".to_string(), Some("pw".to_string()));

        assert_eq!(
            config.connection_string(&creds),
            "Server=db.local;Database=app;Uid=root;Pwd=pw;"
        );

        let config = config.with_port(3307);
        assert_eq!(
            config.connection_string(&creds),
            "Server=db.local;Port=3307;Database=app;Uid=root;Pwd=pw;"
        );
    }

    #[test]
    fn test_connection_config_display_no_credentials() {
        let config = ConnectionConfig::new("example.com".to_string())
            .with_port(3306)
            .with_database("testdb".to_string())
            .with_username("testuser".to_string());

        let display = format!("{}", config);

        assert!(display.contains("example.com"));
        assert!(display.contains("3306"));
        assert!(display.contains("testdb"));
        assert!(!display.contains("testuser"));
    }
}
