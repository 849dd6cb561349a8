//! SQL Gateway
//!
//! Contract for running read-only queries against the source database.

use async_trait::async_trait;

use crate::domain::models::dataset::Dataset;
use crate::shared::errors::Result;

/// Read access to the source database
#[async_trait]
pub trait SqlGateway: Send + Sync {
    /// Run `sql` with positional `@P1..@Pn` string parameters
    async fn query(&self, sql: &str, params: &[&str]) -> Result<Dataset>;

    /// Whether a trivial query currently succeeds
    async fn test_connection(&self) -> bool;
}
