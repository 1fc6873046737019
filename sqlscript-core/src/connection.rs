//! SQL Server connection management.
//!
//! # Security
//! - The connection string is consumed while building the driver config
//!   and is never stored on the connection
//! - Errors and logs only ever see the redacted form

use std::sync::OnceLock;

use regex::Regex;
use tiberius::{Client, Config, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;
use tracing::{debug, info};

use crate::Result;
use crate::catalog::{self, SqlClient, TableFilter};
use crate::error::{GenerateScriptError, redact_connection_string};
use crate::models::{Database, Table};

/// Open session against one database.
pub struct SqlServerConnection {
    client: SqlClient,
    server: String,
}

impl SqlServerConnection {
    /// Opens a TDS session described by an ADO.NET-style connection string,
    /// e.g. `server=.;database=test_db;user=sa;password=password`.
    ///
    /// Named instances (`server=host\instance`) are resolved through the
    /// SQL Browser service.
    ///
    /// # Errors
    /// Returns a connection error if the string cannot be parsed or the
    /// server cannot be reached or refuses the login.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let redacted = redact_connection_string(connection_string);
        let config = Config::from_ado_string(&normalize_local_server(connection_string))
            .map_err(|e| {
                GenerateScriptError::connection_failed(
                    format!("invalid connection string '{redacted}'"),
                    e,
                )
            })?;
        let server = config.get_addr();
        debug!("Connecting to {}", server);

        let tcp = TcpStream::connect_named(&config).await.map_err(|e| {
            GenerateScriptError::connection_failed(format!("cannot reach server {server}"), e)
        })?;
        tcp.set_nodelay(true).map_err(|e| {
            GenerateScriptError::connection_failed(format!("configuring socket for {server}"), e)
        })?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| {
                GenerateScriptError::connection_failed(format!("login to {server} failed"), e)
            })?;

        info!("Connected to {}", server);
        Ok(Self { client, server })
    }

    /// Name and default collation of the session's database.
    ///
    /// # Errors
    /// Returns a connection error when no database is selected.
    pub async fn resolve_database(&mut self) -> Result<(String, Option<String>)> {
        catalog::current_database(&mut self.client).await
    }

    /// Resolves the database and reads its catalog snapshot.
    ///
    /// # Errors
    /// Connection errors from resolving the database, enumeration errors
    /// from the catalog queries.
    pub async fn load_database(&mut self) -> Result<Database> {
        let (name, collation) = self.resolve_database().await?;
        catalog::load_database(&mut self.client, name, collation).await
    }

    /// Re-reads a single table by object id.
    ///
    /// # Errors
    /// Returns an enumeration error if a catalog query fails.
    pub async fn load_table(&mut self, object_id: i32) -> Result<Option<Table>> {
        let tables =
            catalog::load_tables(&mut self.client, TableFilter::ObjectId(object_id)).await?;
        Ok(tables.into_iter().next())
    }

    pub(crate) fn client(&mut self) -> &mut SqlClient {
        &mut self.client
    }

    /// Closes the session.
    ///
    /// # Errors
    /// Returns a connection error if the server did not acknowledge the close.
    pub async fn disconnect(self) -> Result<()> {
        let server = self.server;
        self.client.close().await.map_err(|e| {
            GenerateScriptError::connection_failed(format!("closing session to {server}"), e)
        })?;
        debug!("Disconnected from {}", server);
        Ok(())
    }
}

/// Maps the local-server shorthands `.` and `(local)` to `localhost`, which
/// the driver can resolve.
fn normalize_local_server(connection_string: &str) -> String {
    static LOCAL: OnceLock<Option<Regex>> = OnceLock::new();

    let pattern = LOCAL.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)(^|;)(\s*(?:server|data source|address|addr|network address)\s*=\s*)",
            r"(?:\.|\(local\))(\s*(?:[\\,;]|$))",
        ))
        .ok()
    });

    match pattern {
        Some(pattern) => pattern
            .replace_all(connection_string, "${1}${2}localhost${3}")
            .into_owned(),
        None => connection_string.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_local_server() {
        assert_eq!(
            normalize_local_server("server=.;database=test_db;user=sa;password=password"),
            "server=localhost;database=test_db;user=sa;password=password"
        );
        assert_eq!(
            normalize_local_server("Data Source=(local)\\SQLEXPRESS;Database=x"),
            "Data Source=localhost\\SQLEXPRESS;Database=x"
        );
        assert_eq!(
            normalize_local_server("database=x;server=."),
            "database=x;server=localhost"
        );
    }

    #[test]
    fn test_normalize_keeps_real_hosts() {
        let original = "server=db01.example.com,1433;database=x;password=.";
        assert_eq!(normalize_local_server(original), original);
    }

    #[tokio::test]
    async fn test_connect_rejects_unparseable_string_without_leaking_password() {
        let result =
            SqlServerConnection::connect("server=tcp:localhost,notaport;password=hunter2").await;
        match result {
            Err(error) => {
                assert!(matches!(error, GenerateScriptError::Connection { .. }));
                assert!(!error.to_string().contains("hunter2"));
            }
            Ok(_) => panic!("connection string should be rejected"),
        }
    }
}
