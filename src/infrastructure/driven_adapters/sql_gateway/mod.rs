//! SQL Gateway Implementations

pub mod sql_server;

pub use sql_server::SqlServerConnector;
