//! Application Configuration
//!
//! Layers the built-in defaults, an optional custom YAML file and `PSRC_*`
//! environment variables into one typed configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::{Config, ConfigBuilder, File, FileFormat};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::shared::errors::{DataPortalError, Result};

/// Defaults compiled into the binary
pub const DEFAULT_CONFIG: &str = include_str!("../../../config/default.yaml");

/// Environment variables that override a configuration key
const ENV_OVERRIDES: [(&str, &str); 14] = [
    ("PSRC_DB_SERVER", "database.server"),
    ("PSRC_DB_NAME", "database.name"),
    ("PSRC_DB_DRIVER", "database.driver"),
    ("PSRC_DB_TIMEOUT", "database.timeout"),
    ("PSRC_PORTAL_URL", "portal.default_url"),
    ("PSRC_PORTAL_TIMEOUT", "portal.timeout"),
    ("PSRC_WORKSPACE_PATH", "paths.workspace"),
    ("PSRC_SDE_FOLDER", "paths.sde_folder"),
    ("PSRC_SDE_NAME", "paths.sde_name"),
    ("PSRC_DEFAULT_SRID", "spatial.default_srid"),
    ("PSRC_SDE_INSTANCE", "spatial.sde_instance"),
    ("PSRC_SDE_DATABASE", "spatial.sde_database"),
    ("PSRC_LOG_LEVEL", "logging.level"),
    ("PSRC_LOG_FILE", "logging.file"),
];

/// Keys whose override value must parse as an integer
const INTEGER_KEYS: [&str; 3] = ["database.timeout", "portal.timeout", "spatial.default_srid"];

/// Variables an export cannot run without
pub const REQUIRED_ENV_VARS: [&str; 4] = [
    "PSRC_DB_SERVER",
    "PSRC_DB_NAME",
    "PSRC_PORTAL_USERNAME",
    "PSRC_PORTAL_PASSWORD",
];

/// Source of environment variables
pub trait EnvSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSection {
    pub driver: String,
    pub trusted_connection: bool,
    pub timeout: u64,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortalSection {
    pub default_url: String,
    pub timeout: u64,
    pub token_expiration_minutes: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub workspace: PathBuf,
    pub sde_folder: String,
    pub sde_name: String,
    #[serde(default)]
    pub metadata_template: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpatialSection {
    pub default_srid: i32,
    pub sde_instance: String,
    pub sde_database: String,
    pub simplify_polygons: bool,
    pub close_holes: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportSection {
    pub update_existing: bool,
    /// Accepted for compatibility; nothing retries on it
    pub retry_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    pub level: String,
    pub format: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Organization defaults used when filling metadata documents
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataSection {
    pub organization_name: String,
    pub contact_city: String,
    pub contact_state: String,
    pub contact_zip: String,
    pub website: String,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseSection,
    pub portal: PortalSection,
    pub paths: PathsSection,
    pub spatial: SpatialSection,
    pub export: ExportSection,
    pub logging: LoggingSection,
    pub metadata: MetadataSection,
}

/// Database section plus credentials from the environment
#[derive(Clone)]
pub struct DatabaseConfig {
    pub server: Option<String>,
    pub name: Option<String>,
    pub driver: String,
    pub trusted_connection: bool,
    pub timeout: u64,
    pub username: Option<String>,
    pub password: Option<Zeroizing<String>>,
}

/// Portal section plus credentials from the environment
#[derive(Clone)]
pub struct PortalConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<Zeroizing<String>>,
    pub timeout: u64,
    pub token_expiration_minutes: u32,
}

/// Loaded configuration with access to the environment it came from
#[derive(Clone)]
pub struct ConfigManager {
    config: Config,
    settings: AppConfig,
    env: Arc<dyn EnvSource>,
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn config_error(message: &str, err: &config::ConfigError) -> DataPortalError {
    DataPortalError::configuration(message).with_details(err.to_string())
}

impl ConfigManager {
    /// Load configuration using the process environment
    ///
    /// # Errors
    ///
    /// Returns `DataPortalError::Configuration` if the custom file is missing
    /// or any layer fails to parse.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        Self::load_with_env(config_file, Arc::new(ProcessEnv))
    }

    /// Load configuration reading variables from `env`
    ///
    /// # Errors
    ///
    /// Returns `DataPortalError::Configuration` if the custom file is missing
    /// or any layer fails to parse.
    pub fn load_with_env(config_file: Option<&Path>, env: Arc<dyn EnvSource>) -> Result<Self> {
        let mut builder = Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Yaml));

        if let Some(path) = config_file {
            if !path.exists() {
                return Err(DataPortalError::configuration(format!(
                    "Custom configuration file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(true));
        }

        builder = apply_env_overrides(builder, env.as_ref())?;

        let config = builder
            .build()
            .map_err(|e| config_error("Failed to load configuration", &e))?;
        let settings = config
            .clone()
            .try_deserialize::<AppConfig>()
            .map_err(|e| config_error("Invalid configuration", &e))?;

        Ok(Self {
            config,
            settings,
            env,
        })
    }

    /// Typed lookup of a dot separated key, `None` when absent or mistyped
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config.get::<T>(key).ok()
    }

    #[must_use]
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    #[must_use]
    pub fn settings(&self) -> &AppConfig {
        &self.settings
    }

    /// Read a variable from the environment this configuration was loaded with
    #[must_use]
    pub fn env_var(&self, key: &str) -> Option<String> {
        self.env.var(key).filter(|v| !v.is_empty())
    }

    #[must_use]
    pub fn database_config(&self) -> DatabaseConfig {
        let section = &self.settings.database;
        DatabaseConfig {
            server: self.env_var("PSRC_DB_SERVER").or_else(|| section.server.clone()),
            name: self.env_var("PSRC_DB_NAME").or_else(|| section.name.clone()),
            driver: section.driver.clone(),
            trusted_connection: section.trusted_connection,
            timeout: section.timeout,
            username: self.env_var("PSRC_DB_USERNAME"),
            password: self.env_var("PSRC_DB_PASSWORD").map(Zeroizing::new),
        }
    }

    #[must_use]
    pub fn portal_config(&self) -> PortalConfig {
        let section = &self.settings.portal;
        PortalConfig {
            url: self
                .env_var("PSRC_PORTAL_URL")
                .unwrap_or_else(|| section.default_url.clone()),
            username: self.env_var("PSRC_PORTAL_USERNAME"),
            password: self.env_var("PSRC_PORTAL_PASSWORD").map(Zeroizing::new),
            timeout: section.timeout,
            token_expiration_minutes: section.token_expiration_minutes,
        }
    }

    /// Check that every variable in [`REQUIRED_ENV_VARS`] is set
    ///
    /// # Errors
    ///
    /// Returns `DataPortalError::Configuration` naming the missing variables.
    pub fn validate_required_env_vars(&self) -> Result<()> {
        let missing: Vec<&str> = REQUIRED_ENV_VARS
            .into_iter()
            .filter(|var| self.env_var(var).is_none())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(
            DataPortalError::configuration("Required environment variables are missing")
                .with_details(format!("Missing: {}", missing.join(", "))),
        )
    }
}

fn apply_env_overrides(
    mut builder: ConfigBuilder<config::builder::DefaultState>,
    env: &dyn EnvSource,
) -> Result<ConfigBuilder<config::builder::DefaultState>> {
    for (var, key) in ENV_OVERRIDES {
        let Some(value) = env.var(var) else {
            continue;
        };
        let applied = if INTEGER_KEYS.contains(&key) {
            match value.trim().parse::<i64>() {
                Ok(number) => builder.set_override(key, number),
                Err(_) => {
                    tracing::warn!(var, value = %value, "Invalid integer value, ignoring override");
                    continue;
                }
            }
        } else {
            builder.set_override(key, value)
        };
        builder = applied.map_err(|e| config_error("Failed to apply environment override", &e))?;
        tracing::debug!(var, key, "Applied environment override");
    }
    Ok(builder)
}
