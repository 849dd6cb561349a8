//! Database Connection Management
//!
//! Resolves SQL Server connection settings and opens `tiberius` clients.

use std::time::Duration;

use tiberius::{AuthMethod, Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use zeroize::Zeroizing;

use super::config::DatabaseConfig;
use crate::shared::errors::{DataPortalError, Result};

/// A connected SQL Server client
pub type SqlClient = Client<Compat<TcpStream>>;

/// Caller supplied connection values; `None` falls back to configuration
#[derive(Debug, Clone, Default)]
pub struct DatabaseOptions {
    pub server: Option<String>,
    pub database: Option<String>,
    pub driver: Option<String>,
    pub trusted_connection: Option<bool>,
    pub timeout: Option<u64>,
}

/// Fully resolved connection settings
#[derive(Clone)]
pub struct DatabaseSettings {
    pub server: String,
    pub database: String,
    /// Kept for parity with ODBC based configuration files; not used by the TDS client
    pub driver: String,
    pub trusted_connection: bool,
    pub timeout: Duration,
    pub username: Option<String>,
    pub password: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("trusted_connection", &self.trusted_connection)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DatabaseSettings {
    /// Merge explicit options over configuration values
    ///
    /// # Errors
    ///
    /// Returns `DataPortalError::DatabaseConnection` when no server or
    /// database name can be found.
    pub fn resolve(options: DatabaseOptions, config: &DatabaseConfig) -> Result<Self> {
        let server = options
            .server
            .or_else(|| config.server.clone())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                DataPortalError::database_connection("Database server not specified")
                    .with_details("Set PSRC_DB_SERVER environment variable or provide server parameter")
            })?;
        let database = options
            .database
            .or_else(|| config.name.clone())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                DataPortalError::database_connection("Database name not specified")
                    .with_details("Set PSRC_DB_NAME environment variable or provide database parameter")
            })?;

        Ok(Self {
            server,
            database,
            driver: options.driver.unwrap_or_else(|| config.driver.clone()),
            trusted_connection: options
                .trusted_connection
                .unwrap_or(config.trusted_connection),
            timeout: Duration::from_secs(options.timeout.unwrap_or(config.timeout)),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// ADO.NET style connection string without credentials
    #[must_use]
    pub fn connection_string(&self) -> String {
        let mut ado = format!(
            "server=tcp:{};database={};TrustServerCertificate=true",
            self.server, self.database
        );
        if self.trusted_connection {
            ado.push_str(";IntegratedSecurity=true");
        }
        ado
    }

    fn tiberius_config(&self) -> Result<Config> {
        let mut config = Config::from_ado_string(&self.connection_string()).map_err(|e| {
            DataPortalError::database_connection("Invalid database connection settings")
                .with_details(e.to_string())
        })?;
        if self.trusted_connection {
            config.authentication(integrated_auth()?);
        } else {
            let username = self.username.as_deref().ok_or_else(|| {
                DataPortalError::database_connection("Database username not specified")
                    .with_details("Set PSRC_DB_USERNAME or use a trusted connection")
            })?;
            let password = self.password.as_deref().map_or("", String::as_str);
            config.authentication(AuthMethod::sql_server(username, password));
        }
        config.application_name("psrc-data-portal");
        Ok(config)
    }
}

#[cfg(any(all(windows, feature = "winauth"), all(unix, feature = "integrated-auth-gssapi")))]
fn integrated_auth() -> Result<AuthMethod> {
    Ok(AuthMethod::Integrated)
}

#[cfg(not(any(all(windows, feature = "winauth"), all(unix, feature = "integrated-auth-gssapi"))))]
fn integrated_auth() -> Result<AuthMethod> {
    Err(
        DataPortalError::database_connection("Trusted connection not supported in this build")
            .with_details(
                "Enable the integrated-auth-gssapi feature, or set trusted_connection: false \
                 with PSRC_DB_USERNAME and PSRC_DB_PASSWORD",
            ),
    )
}

fn connection_error(server: &str, database: &str) -> impl Fn(String) -> DataPortalError {
    let message = format!("Failed to connect to database {database} on server {server}");
    move |details| DataPortalError::database_connection(message.clone()).with_details(details)
}

/// Open a client and check it with `SELECT 1`
///
/// # Errors
///
/// Returns `DataPortalError::DatabaseConnection` if the server cannot be
/// reached within the timeout, rejects the login or fails the test query.
pub async fn connect(settings: &DatabaseSettings) -> Result<SqlClient> {
    let config = settings.tiberius_config()?;
    let fail = &connection_error(&settings.server, &settings.database);

    let attempt = async move {
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| fail(e.to_string()))?;
        tcp.set_nodelay(true).map_err(|e| fail(e.to_string()))?;
        let mut client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| fail(e.to_string()))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| fail(e.to_string()))?
            .into_row()
            .await
            .map_err(|e| fail(e.to_string()))?;
        Ok::<_, DataPortalError>(client)
    };

    let client = tokio::time::timeout(settings.timeout, attempt)
        .await
        .map_err(|_| fail(format!("Timed out after {}s", settings.timeout.as_secs())))??;

    tracing::info!(
        server = %settings.server,
        database = %settings.database,
        trusted = settings.trusted_connection,
        "Connected to database"
    );
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTEGRATED_AUTH: bool = cfg!(any(
        all(windows, feature = "winauth"),
        all(unix, feature = "integrated-auth-gssapi")
    ));

    fn config() -> DatabaseConfig {
        DatabaseConfig {
            server: Some("AWS-PROD-SQL".to_string()),
            name: Some("Elmer".to_string()),
            driver: "ODBC Driver 17 for SQL Server".to_string(),
            trusted_connection: true,
            timeout: 30,
            username: None,
            password: None,
        }
    }

    #[test]
    fn should_prefer_explicit_options() {
        let options = DatabaseOptions {
            server: Some("localhost".to_string()),
            timeout: Some(5),
            ..DatabaseOptions::default()
        };
        let settings = DatabaseSettings::resolve(options, &config()).unwrap();
        assert_eq!(settings.server, "localhost");
        assert_eq!(settings.database, "Elmer");
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert_eq!(settings.driver, "ODBC Driver 17 for SQL Server");
    }

    #[test]
    fn should_name_env_var_when_server_missing() {
        let mut cfg = config();
        cfg.server = None;
        let err = DatabaseSettings::resolve(DatabaseOptions::default(), &cfg).unwrap_err();
        assert_eq!(err.message(), "Database server not specified");
        assert!(err.details().unwrap_or_default().contains("PSRC_DB_SERVER"));
    }

    #[test]
    fn should_reject_blank_database_name() {
        let options = DatabaseOptions {
            database: Some("  ".to_string()),
            ..DatabaseOptions::default()
        };
        let mut cfg = config();
        cfg.name = None;
        let err = DatabaseSettings::resolve(options, &cfg).unwrap_err();
        assert_eq!(err.message(), "Database name not specified");
    }

    #[test]
    fn should_build_integrated_security_string() {
        let settings = DatabaseSettings::resolve(DatabaseOptions::default(), &config()).unwrap();
        assert_eq!(
            settings.connection_string(),
            "server=tcp:AWS-PROD-SQL;database=Elmer;TrustServerCertificate=true;IntegratedSecurity=true"
        );
    }

    #[test]
    fn should_require_username_for_sql_login() {
        let options = DatabaseOptions {
            trusted_connection: Some(false),
            ..DatabaseOptions::default()
        };
        let settings = DatabaseSettings::resolve(options, &config()).unwrap();
        assert!(!settings.connection_string().contains("IntegratedSecurity"));
        let err = settings.tiberius_config().unwrap_err();
        assert_eq!(err.error_code(), "DATABASE_CONNECTION_ERROR");
        assert_eq!(err.message(), "Database username not specified");
    }

    #[test]
    fn should_use_sql_login_when_not_trusted() {
        let mut cfg = config();
        cfg.trusted_connection = false;
        cfg.username = Some("etl_reader".to_string());
        cfg.password = Some(Zeroizing::new("secret".to_string()));
        let settings = DatabaseSettings::resolve(DatabaseOptions::default(), &cfg).unwrap();

        let tiberius = format!("{:?}", settings.tiberius_config().unwrap());

        assert!(tiberius.contains("SqlServer("));
        assert!(tiberius.contains("etl_reader"));
    }

    #[test]
    fn should_never_fall_back_to_empty_sql_login_when_trusted() {
        let settings = DatabaseSettings::resolve(DatabaseOptions::default(), &config()).unwrap();
        assert!(settings.trusted_connection);

        match settings.tiberius_config() {
            Ok(tiberius) => {
                assert!(INTEGRATED_AUTH);
                let tiberius = format!("{tiberius:?}");
                assert!(tiberius.contains("Integrated"));
                assert!(!tiberius.contains("SqlServer("));
            }
            Err(err) => {
                assert!(!INTEGRATED_AUTH);
                assert_eq!(err.message(), "Trusted connection not supported in this build");
            }
        }
    }

    #[test]
    fn should_take_trusted_connection_from_config_unless_given() {
        let mut cfg = config();
        cfg.trusted_connection = false;

        let from_config = DatabaseSettings::resolve(DatabaseOptions::default(), &cfg).unwrap();
        let explicit = DatabaseSettings::resolve(
            DatabaseOptions {
                trusted_connection: Some(true),
                ..DatabaseOptions::default()
            },
            &cfg,
        )
        .unwrap();

        assert!(!from_config.trusted_connection);
        assert!(explicit.trusted_connection);
    }
}
