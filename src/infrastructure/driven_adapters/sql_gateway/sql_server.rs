//! SQL Server Gateway Implementation
//!
//! Implements the SqlGateway trait using tiberius over a single TDS
//! connection.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::{ColumnData, FromSql, Row, ToSql};
use tokio::sync::Mutex;

use crate::domain::gateways::SqlGateway;
use crate::domain::models::dataset::{CellValue, Dataset};
use crate::infrastructure::driven_adapters::database::{self, DatabaseSettings, SqlClient};
use crate::shared::errors::{DataPortalError, Result};

/// Convert one TDS value into a dataset cell
fn cell_from_column_data(data: ColumnData<'static>) -> CellValue {
    match data {
        ColumnData::U8(v) => v.map_or(CellValue::Null, |v| CellValue::Integer(i64::from(v))),
        ColumnData::I16(v) => v.map_or(CellValue::Null, |v| CellValue::Integer(i64::from(v))),
        ColumnData::I32(v) => v.map_or(CellValue::Null, |v| CellValue::Integer(i64::from(v))),
        ColumnData::I64(v) => v.map_or(CellValue::Null, CellValue::Integer),
        ColumnData::F32(v) => v.map_or(CellValue::Null, |v| CellValue::Float(f64::from(v))),
        ColumnData::F64(v) => v.map_or(CellValue::Null, CellValue::Float),
        ColumnData::Bit(v) => v.map_or(CellValue::Null, CellValue::Bool),
        ColumnData::String(v) => v.map_or(CellValue::Null, |s| CellValue::Text(s.into_owned())),
        ColumnData::Guid(v) => v.map_or(CellValue::Null, |g| CellValue::Text(g.to_string())),
        ColumnData::Numeric(v) => v.map_or(CellValue::Null, |n| {
            Decimal::try_from_i128_with_scale(n.value(), u32::from(n.scale()))
                .map_or_else(|_| CellValue::Float(f64::from(n)), CellValue::Decimal)
        }),
        other => temporal_cell(&other),
    }
}

/// Date and time columns come in several TDS encodings; let tiberius decode them
fn temporal_cell(data: &ColumnData<'static>) -> CellValue {
    if let Ok(Some(ts)) = NaiveDateTime::from_sql(data) {
        return CellValue::Timestamp(ts);
    }
    if let Ok(Some(date)) = NaiveDate::from_sql(data) {
        return CellValue::Date(date);
    }
    if let Ok(Some(time)) = NaiveTime::from_sql(data) {
        return CellValue::Time(time);
    }
    if let Ok(Some(dt)) = DateTime::<FixedOffset>::from_sql(data) {
        return CellValue::Timestamp(dt.naive_utc());
    }
    CellValue::Null
}

fn cells_from_row(row: Row) -> Vec<CellValue> {
    row.into_iter().map(cell_from_column_data).collect()
}

fn query_error(err: &tiberius::error::Error) -> DataPortalError {
    DataPortalError::data_export("Failed to execute query").with_details(err.to_string())
}

/// SQL Server implementation of SqlGateway
pub struct SqlServerConnector {
    settings: DatabaseSettings,
    client: Mutex<Option<SqlClient>>,
}

impl std::fmt::Debug for SqlServerConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlServerConnector")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SqlServerConnector {
    /// Connect using resolved settings
    ///
    /// # Errors
    ///
    /// Returns `DataPortalError::DatabaseConnection` if the connection fails.
    pub async fn connect(settings: DatabaseSettings) -> Result<Self> {
        let client = database::connect(&settings).await?;
        Ok(Self {
            settings,
            client: Mutex::new(Some(client)),
        })
    }

    #[must_use]
    pub fn server(&self) -> &str {
        &self.settings.server
    }

    #[must_use]
    pub fn database(&self) -> &str {
        &self.settings.database
    }

    /// Drop the current connection and open a new one
    ///
    /// # Errors
    ///
    /// Returns `DataPortalError::DatabaseConnection` if the new connection fails.
    pub async fn reconnect(&self) -> Result<()> {
        tracing::info!(server = %self.settings.server, "Reconnecting to database");
        let mut guard = self.client.lock().await;
        if let Some(old) = guard.take() {
            if let Err(e) = old.close().await {
                tracing::debug!(error = %e, "Ignoring error while closing old connection");
            }
        }
        *guard = Some(database::connect(&self.settings).await?);
        Ok(())
    }

    /// Close the connection; later queries fail until `reconnect`
    pub async fn close(&self) {
        if let Some(client) = self.client.lock().await.take() {
            match client.close().await {
                Ok(()) => tracing::info!(server = %self.settings.server, "Database connection closed"),
                Err(e) => tracing::warn!(error = %e, "Error closing database connection"),
            }
        }
    }
}

#[async_trait]
impl SqlGateway for SqlServerConnector {
    async fn query(&self, sql: &str, params: &[&str]) -> Result<Dataset> {
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| DataPortalError::database_connection("Database connection is closed"))?;

        let bound: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
        let mut stream = client.query(sql, &bound).await.map_err(|e| query_error(&e))?;

        let columns: Vec<String> = stream
            .columns()
            .await
            .map_err(|e| query_error(&e))?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = stream.into_first_result().await.map_err(|e| query_error(&e))?;

        let dataset = Dataset::from_rows(columns, rows.into_iter().map(cells_from_row).collect())?;
        tracing::debug!(
            rows = dataset.row_count(),
            columns = dataset.column_count(),
            "Query returned"
        );
        Ok(dataset)
    }

    async fn test_connection(&self) -> bool {
        let mut guard = self.client.lock().await;
        let Some(client) = guard.as_mut() else {
            return false;
        };
        let result = match client.simple_query("SELECT 1").await {
            Ok(stream) => stream.into_row().await.map(|_| ()),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Database connection test failed");
                false
            }
        }
    }
}
