//! Resource Domain Model
//!
//! Validated parameters describing one item to publish on the portal.

use std::fmt;

use crate::domain::models::metadata::ResourceMetadata;

/// Who can see a published item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShareLevel {
    Everyone,
    #[default]
    Org,
    Private,
}

impl ShareLevel {
    pub const ALL: [ShareLevel; 3] = [ShareLevel::Everyone, ShareLevel::Org, ShareLevel::Private];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Everyone => "everyone",
            Self::Org => "org",
            Self::Private => "private",
        }
    }

    /// Parse an already normalized (trimmed, lowercase) level name
    #[must_use]
    pub fn from_normalized(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.as_str() == value)
    }
}

impl fmt::Display for ShareLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource parameters after validation and normalization
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceParams {
    pub title: String,
    pub tags: Vec<String>,
    pub share_level: ShareLevel,
    pub groups: Vec<String>,
    pub spatial_data: bool,
    pub allow_edits: bool,
    pub snippet: String,
    pub license_info: String,
    pub srid: Option<i32>,
    pub metadata: Option<ResourceMetadata>,
}

/// Item properties sent with every add/update call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceProperties {
    pub title: String,
    pub tags: Vec<String>,
    pub snippet: String,
    pub license_info: String,
}

impl From<&ResourceParams> for ResourceProperties {
    fn from(params: &ResourceParams) -> Self {
        Self {
            title: params.title.clone(),
            tags: params.tags.clone(),
            snippet: params.snippet.clone(),
            license_info: params.license_info.clone(),
        }
    }
}
