//! Domain Models
//!
//! Plain values passed between the exporter's layers.

pub mod dataset;
pub mod metadata;
pub mod portal_item;
pub mod resource;
pub mod source;

pub use dataset::{CellValue, ColumnKind, Dataset};
pub use metadata::{build_field_mappings, FieldDescription, FieldMapping, ResourceMetadata};
pub use portal_item::{ItemProperties, ItemType, PortalGroup, PortalItem, PortalUser};
pub use resource::{ResourceParams, ResourceProperties, ShareLevel};
pub use source::SourceConfig;
