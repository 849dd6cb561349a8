//! Shared Module
//!
//! Cross-cutting utilities and types used across the application.

pub mod errors;
pub mod logging;

pub use errors::{DataPortalError, ErrorContext, Result};
pub use logging::setup_logging;
