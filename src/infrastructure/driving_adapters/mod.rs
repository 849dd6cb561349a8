//! Driving Adapters
//!
//! Entry points that drive the application:
//! - Command line interface and job files

pub mod cli;
