//! Export Workspace Gateway
//!
//! Contract for the local directory where upload files are staged.

use std::path::PathBuf;

use crate::domain::models::dataset::Dataset;
use crate::domain::models::metadata::ResourceMetadata;
use crate::domain::models::resource::ResourceProperties;
use crate::domain::spatial::Feature;
use crate::shared::errors::Result;

/// Local staging area for export files
pub trait ExportWorkspace: Send + Sync {
    /// Create the workspace, or clear it while keeping saved metadata
    fn prepare(&self) -> Result<PathBuf>;

    /// Write a dataset as `<title>.csv`
    fn write_table(&self, title: &str, dataset: &Dataset) -> Result<PathBuf>;

    /// Write features as `<title>.geojson`
    fn write_features(&self, title: &str, features: &[Feature]) -> Result<PathBuf>;

    /// Fill the metadata document for a resource and return its path
    fn write_metadata(
        &self,
        metadata: &ResourceMetadata,
        properties: &ResourceProperties,
    ) -> Result<PathBuf>;
}
