//! Job Files
//!
//! ```yaml
//! jobs:
//!   - params:
//!       title: Household Counts
//!       tags: census, households
//!     source:
//!       is_simple: true
//!       table_name: household_counts
//!       feature_dataset: ""
//! ```

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::shared::errors::{DataPortalError, Result};

/// One resource to export. Both maps are validated by the export use case.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportJob {
    pub params: Value,
    pub source: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    pub jobs: Vec<ExportJob>,
}

/// Read a job file
///
/// # Errors
///
/// Returns `DataPortalError::Configuration` if the file is missing, is not
/// valid YAML or has no jobs.
pub fn load_job_file(path: &Path) -> Result<JobFile> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DataPortalError::configuration(format!("Job file not found: {}", path.display()))
            .with_details(e.to_string())
    })?;
    let jobs: JobFile = serde_yaml::from_str(&content).map_err(|e| {
        DataPortalError::configuration(format!("Invalid job file: {}", path.display()))
            .with_details(e.to_string())
    })?;
    if jobs.jobs.is_empty() {
        return Err(DataPortalError::configuration(format!(
            "Job file has no jobs: {}",
            path.display()
        )));
    }
    tracing::debug!(path = %path.display(), count = jobs.jobs.len(), "Loaded job file");
    Ok(jobs)
}
