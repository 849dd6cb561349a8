//! Gateway Traits (Ports)
//!
//! Abstract interfaces defining contracts for external dependencies.
//! These are implemented by driven adapters in the infrastructure layer.

pub mod export_workspace;
pub mod portal_gateway;
pub mod sql_gateway;

pub use export_workspace::ExportWorkspace;
pub use portal_gateway::PortalGateway;
pub use sql_gateway::SqlGateway;
