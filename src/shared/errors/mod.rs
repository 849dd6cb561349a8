//! Error Types
//!
//! One error enum for the whole export pipeline. Every kind carries a message
//! and optional details, and maps to a stable error code and CLI exit code.

use std::fmt;

use thiserror::Error;

/// Message plus optional details shared by every error kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub message: String,
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}. Details: {}", self.message, details),
            None => f.write_str(&self.message),
        }
    }
}

/// Errors raised while configuring, validating, or running an export
#[derive(Debug, Error)]
pub enum DataPortalError {
    #[error("{0}")]
    Configuration(ErrorContext),

    #[error("{0}")]
    DatabaseConnection(ErrorContext),

    #[error("{0}")]
    PortalConnection(ErrorContext),

    #[error("{0}")]
    Validation(ErrorContext),

    #[error("{0}")]
    DataExport(ErrorContext),

    #[error("{0}")]
    SpatialData(ErrorContext),

    #[error("{0}")]
    Metadata(ErrorContext),
}

pub type Result<T, E = DataPortalError> = std::result::Result<T, E>;

impl DataPortalError {
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(ErrorContext::new(message))
    }

    #[must_use]
    pub fn database_connection(message: impl Into<String>) -> Self {
        Self::DatabaseConnection(ErrorContext::new(message))
    }

    #[must_use]
    pub fn portal_connection(message: impl Into<String>) -> Self {
        Self::PortalConnection(ErrorContext::new(message))
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(ErrorContext::new(message))
    }

    #[must_use]
    pub fn data_export(message: impl Into<String>) -> Self {
        Self::DataExport(ErrorContext::new(message))
    }

    #[must_use]
    pub fn spatial_data(message: impl Into<String>) -> Self {
        Self::SpatialData(ErrorContext::new(message))
    }

    #[must_use]
    pub fn metadata(message: impl Into<String>) -> Self {
        Self::Metadata(ErrorContext::new(message))
    }

    /// Attach details to the error, replacing any already present
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.context_mut().details = Some(details.into());
        self
    }

    #[must_use]
    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Configuration(ctx)
            | Self::DatabaseConnection(ctx)
            | Self::PortalConnection(ctx)
            | Self::Validation(ctx)
            | Self::DataExport(ctx)
            | Self::SpatialData(ctx)
            | Self::Metadata(ctx) => ctx,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Configuration(ctx)
            | Self::DatabaseConnection(ctx)
            | Self::PortalConnection(ctx)
            | Self::Validation(ctx)
            | Self::DataExport(ctx)
            | Self::SpatialData(ctx)
            | Self::Metadata(ctx) => ctx,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.context().message
    }

    #[must_use]
    pub fn details(&self) -> Option<&str> {
        self.context().details.as_deref()
    }

    /// Get the error code for this error
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::DatabaseConnection(_) => "DATABASE_CONNECTION_ERROR",
            Self::PortalConnection(_) => "PORTAL_CONNECTION_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::DataExport(_) => "DATA_EXPORT_ERROR",
            Self::SpatialData(_) => "SPATIAL_DATA_ERROR",
            Self::Metadata(_) => "METADATA_ERROR",
        }
    }

    /// Process exit code used by the command line front end
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            Self::Validation(_) => 3,
            Self::DatabaseConnection(_) => 4,
            Self::PortalConnection(_) => 5,
            Self::DataExport(_) => 6,
            Self::SpatialData(_) => 7,
            Self::Metadata(_) => 8,
        }
    }
}

impl From<validator::ValidationErrors> for DataPortalError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = err
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    format!(
                        "{}: {}",
                        field,
                        e.message.as_ref().map_or("invalid", |m| m.as_ref())
                    )
                })
            })
            .collect();
        messages.sort();
        DataPortalError::validation("Validation failed").with_details(messages.join("; "))
    }
}
