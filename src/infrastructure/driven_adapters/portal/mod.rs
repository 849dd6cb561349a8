//! Portal Gateway Implementations

mod client;
mod responses;
mod settings;

pub use client::ArcGisPortalConnector;
pub use settings::{PortalOptions, PortalSettings};
