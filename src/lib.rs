//! PSRC Data Portal
//!
//! Exports tables and spatial layers from PSRC SQL Server databases to
//! ArcGIS Online / Portal for ArcGIS, following Clean/Hexagonal Architecture
//! principles.

pub mod application;
pub mod domain;
pub mod facade;
pub mod infrastructure;
pub mod shared;

pub use facade::{
    create_database_connector, create_portal_connector, create_portal_resource, setup_logging,
    validate_environment,
};
pub use shared::errors::{DataPortalError, Result};
