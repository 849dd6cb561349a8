//! Driven Adapters
//!
//! Implementations of gateway traits for external systems:
//! - SQL Server over TDS
//! - ArcGIS Online / Portal for ArcGIS REST
//! - Local export workspace and metadata documents
//! - Configuration

pub mod config;
pub mod database;
pub mod metadata;
pub mod portal;
pub mod sql_gateway;
pub mod workspace;

pub use config::{AppConfig, ConfigManager};
pub use database::{DatabaseOptions, DatabaseSettings};
pub use metadata::MetadataManager;
pub use portal::{ArcGisPortalConnector, PortalOptions, PortalSettings};
pub use sql_gateway::SqlServerConnector;
pub use workspace::LocalWorkspace;
