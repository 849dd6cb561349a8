//! Use Cases
//!
//! Application-specific workflows built on the gateway traits.

pub mod export_resource;

pub use export_resource::{ExportSettings, PortalResource};
