//! Domain Layer
//!
//! Contains the core export rules, domain models, and gateway traits (ports).
//! This layer has no dependencies on infrastructure.

pub mod gateways;
pub mod models;
pub mod spatial;
pub mod validation;

pub use gateways::{ExportWorkspace, PortalGateway, SqlGateway};
pub use models::{
    CellValue, Dataset, ItemType, PortalItem, ResourceMetadata, ResourceParams, ResourceProperties,
    ShareLevel, SourceConfig,
};
