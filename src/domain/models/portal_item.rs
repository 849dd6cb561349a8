//! Portal Item Domain Model
//!
//! Items, users and groups as seen through the portal content API.

use std::fmt;

use crate::domain::models::resource::ResourceProperties;

/// Item types this exporter uploads or publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Csv,
    GeoJson,
    FeatureService,
}

impl ItemType {
    /// Name used by the portal's `type` field
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "CSV",
            Self::GeoJson => "GeoJson",
            Self::FeatureService => "Feature Service",
        }
    }

    /// `filetype` value for the publish call
    #[must_use]
    pub fn publish_file_type(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::GeoJson => "geojson",
            Self::FeatureService => "featureService",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item stored on the portal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalItem {
    pub id: String,
    pub title: String,
    /// Raw type string reported by the portal
    pub item_type: String,
    pub owner: String,
    /// Service URL, present for hosted layers
    pub url: Option<String>,
}

/// Signed-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalUser {
    pub username: String,
    pub groups: Vec<PortalGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalGroup {
    pub id: String,
    pub title: String,
}

/// Properties sent with an add or update call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemProperties {
    pub title: String,
    pub item_type: ItemType,
    pub tags: Vec<String>,
    pub snippet: String,
    pub license_info: String,
}

impl ItemProperties {
    #[must_use]
    pub fn new(properties: &ResourceProperties, item_type: ItemType) -> Self {
        Self {
            title: properties.title.clone(),
            item_type,
            tags: properties.tags.clone(),
            snippet: properties.snippet.clone(),
            license_info: properties.license_info.clone(),
        }
    }
}
