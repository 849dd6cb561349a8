//! Factory Functions
//!
//! Entry points that resolve configuration and wire concrete adapters into
//! the export use case. Failures are logged before being returned.

use std::sync::Arc;

use serde_json::Value;

use crate::application::use_cases::{ExportSettings, PortalResource};
use crate::domain::gateways::{PortalGateway, SqlGateway};
use crate::infrastructure::driven_adapters::config::{AppConfig, ConfigManager};
use crate::infrastructure::driven_adapters::database::{DatabaseOptions, DatabaseSettings};
use crate::infrastructure::driven_adapters::metadata::MetadataManager;
use crate::infrastructure::driven_adapters::portal::{
    ArcGisPortalConnector, PortalOptions, PortalSettings,
};
use crate::infrastructure::driven_adapters::sql_gateway::SqlServerConnector;
use crate::infrastructure::driven_adapters::workspace::LocalWorkspace;
use crate::shared::errors::Result;
use crate::shared::logging;

fn log_failure<T>(result: Result<T>, message: &str) -> Result<T> {
    if let Err(e) = &result {
        tracing::error!(error = %e, "{message}");
    }
    result
}

/// Export behavior from the `spatial` section
#[must_use]
pub fn export_settings(config: &AppConfig) -> ExportSettings {
    ExportSettings {
        default_srid: config.spatial.default_srid,
        simplify_polygons: config.spatial.simplify_polygons,
        close_holes: config.spatial.close_holes,
        ..ExportSettings::default()
    }
}

/// Connect to SQL Server. Values missing from `options` come from
/// configuration and `PSRC_DB_*` variables.
///
/// # Errors
///
/// Returns `DataPortalError::DatabaseConnection` when the server or database
/// is not configured or the connection fails.
pub async fn create_database_connector(
    config: &ConfigManager,
    options: DatabaseOptions,
) -> Result<SqlServerConnector> {
    let connect = async {
        let settings = DatabaseSettings::resolve(options, &config.database_config())?;
        SqlServerConnector::connect(settings).await
    };
    log_failure(connect.await, "Failed to create database connector")
}

/// Sign in to the portal. Values missing from `options` come from
/// configuration and `PSRC_PORTAL_*` variables.
///
/// # Errors
///
/// Returns `DataPortalError::PortalConnection` when credentials are missing
/// or the portal rejects them.
pub async fn create_portal_connector(
    config: &ConfigManager,
    options: PortalOptions,
) -> Result<ArcGisPortalConnector> {
    let connect = async {
        let settings = PortalSettings::resolve(options, &config.portal_config())?;
        ArcGisPortalConnector::connect(settings).await
    };
    log_failure(connect.await, "Failed to create portal connector")
}

/// Validate a job and bind it to the connectors and the configured
/// workspace.
///
/// # Errors
///
/// Returns `DataPortalError::DataExport` "Failed to initialize portal
/// resource" when the parameters or source are invalid.
pub fn create_portal_resource(
    config: &ConfigManager,
    portal: Arc<dyn PortalGateway>,
    database: Arc<dyn SqlGateway>,
    params: &Value,
    source: &Value,
) -> Result<PortalResource> {
    let settings = config.settings();
    let metadata = MetadataManager::new(
        settings.paths.metadata_template.clone(),
        settings.metadata.clone(),
    );
    let workspace = Arc::new(LocalWorkspace::new(settings.paths.workspace.clone(), metadata));
    log_failure(
        PortalResource::new(
            portal,
            database,
            workspace,
            params,
            source,
            export_settings(settings),
        ),
        "Failed to create portal resource",
    )
}

/// Install logging from the `logging` section. `level` overrides the
/// configured level. If that fails, INFO on stderr is installed instead.
pub fn setup_logging(config: &ConfigManager, level: Option<&str>) {
    let section = &config.settings().logging;
    let level = level.unwrap_or(section.level.as_str());
    if let Err(e) = logging::setup_logging(level, &section.format, section.file.as_deref()) {
        let fallback = logging::setup_logging("info", "full", None);
        tracing::warn!(error = %e, "Failed to configure logging from config");
        if fallback.is_err() {
            eprintln!("Failed to configure logging: {e}");
        }
    }
}

/// Whether every required `PSRC_*` variable is set
#[must_use]
pub fn validate_environment(config: &ConfigManager) -> bool {
    match config.validate_required_env_vars() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Environment validation failed");
            false
        }
    }
}
