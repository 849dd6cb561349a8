//! Infrastructure Layer
//!
//! Contains all external concerns: driving adapters (command line) and
//! driven adapters (SQL Server, ArcGIS portal, local files, configuration).

pub mod driven_adapters;
pub mod driving_adapters;
