//! Local Export Workspace
//!
//! Stages CSV, GeoJSON and metadata files in a directory before upload.

use std::fs;
use std::path::{Path, PathBuf};

use super::metadata::MetadataManager;
use crate::domain::gateways::ExportWorkspace;
use crate::domain::models::dataset::Dataset;
use crate::domain::models::metadata::ResourceMetadata;
use crate::domain::models::resource::ResourceProperties;
use crate::domain::spatial::{to_feature_collection, Feature};
use crate::shared::errors::{DataPortalError, Result};

/// Subdirectory that survives `prepare`
const METADATA_DIR: &str = "metadata";
const METADATA_FILE: &str = "metadata.xml";

/// Title made safe for use as a file name
fn file_stem(title: &str) -> String {
    title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Filesystem implementation of ExportWorkspace
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
    metadata: MetadataManager,
}

impl LocalWorkspace {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, metadata: MetadataManager) -> Self {
        Self {
            root: root.into(),
            metadata,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_DIR).join(METADATA_FILE)
    }

    fn clear(&self) -> std::io::Result<()> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_name() == METADATA_DIR {
                continue;
            }
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

impl ExportWorkspace for LocalWorkspace {
    fn prepare(&self) -> Result<PathBuf> {
        let result = if self.root.exists() {
            self.clear()
        } else {
            fs::create_dir_all(&self.root)
        };
        result.map_err(|e| {
            DataPortalError::data_export("Failed to prepare workspace")
                .with_details(format!("{}: {e}", self.root.display()))
        })?;
        tracing::debug!(workspace = %self.root.display(), "Prepared workspace");
        Ok(self.root.clone())
    }

    fn write_table(&self, title: &str, dataset: &Dataset) -> Result<PathBuf> {
        let path = self.root.join(format!("{}.csv", file_stem(title)));
        let fail = |details: String| {
            DataPortalError::data_export("Failed to export tabular data").with_details(details)
        };

        let mut writer = csv::Writer::from_path(&path).map_err(|e| fail(e.to_string()))?;
        writer
            .write_record(dataset.columns())
            .map_err(|e| fail(e.to_string()))?;
        for row in dataset.rows() {
            writer
                .write_record(row.iter().map(ToString::to_string))
                .map_err(|e| fail(e.to_string()))?;
        }
        writer.flush().map_err(|e| fail(e.to_string()))?;

        tracing::info!(path = %path.display(), rows = dataset.row_count(), "Exported table to CSV");
        Ok(path)
    }

    fn write_features(&self, title: &str, features: &[Feature]) -> Result<PathBuf> {
        let path = self.root.join(format!("{}.geojson", file_stem(title)));
        let fail = |details: String| {
            DataPortalError::spatial_data("Failed to export spatial data").with_details(details)
        };

        let collection = to_feature_collection(features);
        let body = serde_json::to_string(&collection).map_err(|e| fail(e.to_string()))?;
        fs::write(&path, body).map_err(|e| fail(format!("{}: {e}", path.display())))?;

        tracing::info!(path = %path.display(), features = features.len(), "Exported features to GeoJSON");
        Ok(path)
    }

    fn write_metadata(
        &self,
        metadata: &ResourceMetadata,
        properties: &ResourceProperties,
    ) -> Result<PathBuf> {
        let path = self.metadata_path();
        self.metadata.update_metadata_xml(&path, metadata, properties)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::dataset::CellValue;
    use crate::infrastructure::driven_adapters::config::MetadataSection;
    use tempfile::TempDir;

    fn workspace(dir: &TempDir) -> LocalWorkspace {
        let defaults = MetadataSection {
            organization_name: "Puget Sound Regional Council".to_string(),
            contact_city: "Seattle".to_string(),
            contact_state: "WA".to_string(),
            contact_zip: "98104".to_string(),
            website: "https://www.psrc.org".to_string(),
        };
        LocalWorkspace::new(dir.path().join("ws"), MetadataManager::new(None, defaults))
    }

    #[test]
    fn should_replace_path_separators_in_titles() {
        assert_eq!(file_stem(" Jobs/Housing: 2020 "), "Jobs_Housing_ 2020");
    }

    #[test]
    fn should_keep_metadata_dir_when_clearing() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(&dir);
        ws.prepare().unwrap();
        fs::create_dir_all(ws.root().join("metadata")).unwrap();
        fs::write(ws.metadata_path(), "<metadata/>").unwrap();
        fs::write(ws.root().join("old.csv"), "a").unwrap();
        fs::create_dir_all(ws.root().join("scratch")).unwrap();

        ws.prepare().unwrap();

        assert!(ws.metadata_path().exists());
        assert!(!ws.root().join("old.csv").exists());
        assert!(!ws.root().join("scratch").exists());
    }

    #[test]
    fn should_write_csv_with_header() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(&dir);
        ws.prepare().unwrap();
        let dataset = Dataset::from_rows(
            vec!["id".into(), "name".into(), "active".into()],
            vec![
                vec![CellValue::Integer(1), CellValue::Text("Seattle, WA".into()), CellValue::Bool(true)],
                vec![CellValue::Integer(2), CellValue::Null, CellValue::Bool(false)],
            ],
        )
        .unwrap();

        let path = ws.write_table("Cities", &dataset).unwrap();

        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("Cities.csv"));
        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content, "id,name,active\n1,\"Seattle, WA\",True\n2,,False\n");
    }
}
