//! ArcGIS REST response bodies
//!
//! Only the fields the exporter reads are modelled.

use serde::Deserialize;

use crate::domain::models::portal_item::{PortalGroup, PortalItem};

/// `{"error": {...}}` body returned with HTTP 200 on failure
#[derive(Debug, Clone, Deserialize)]
pub struct RestError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Vec<String>,
}

impl RestError {
    /// One line summary suitable for error details
    #[must_use]
    pub fn summary(&self) -> String {
        let mut text = match self.code {
            Some(code) => format!("Error {code}"),
            None => "Error".to_string(),
        };
        if let Some(message) = &self.message {
            text.push_str(": ");
            text.push_str(message);
        }
        if !self.details.is_empty() {
            text.push_str(&format!(" ({})", self.details.join("; ")));
        }
        text
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupEntry {
    pub id: String,
    pub title: String,
}

impl From<GroupEntry> for PortalGroup {
    fn from(entry: GroupEntry) -> Self {
        Self {
            id: entry.id,
            title: entry.title,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SelfResponse {
    pub username: String,
    #[serde(default)]
    pub groups: Vec<GroupEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ItemEntry {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl From<ItemEntry> for PortalItem {
    fn from(entry: ItemEntry) -> Self {
        Self {
            id: entry.id,
            title: entry.title,
            item_type: entry.item_type,
            owner: entry.owner,
            url: entry.url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

/// Body of `addItem` and `update`
#[derive(Debug, Deserialize)]
pub struct ItemResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedService {
    #[serde(default)]
    pub service_item_id: Option<String>,
    #[serde(default, rename = "serviceurl")]
    pub service_url: Option<String>,
    #[serde(default, rename = "type")]
    pub service_type: Option<String>,
    #[serde(default)]
    pub error: Option<RestError>,
}

#[derive(Debug, Deserialize)]
pub struct PublishResponse {
    #[serde(default)]
    pub services: Vec<PublishedService>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResult {
    pub item_id: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub not_shared_with: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShareResponse {
    #[serde(default)]
    pub results: Vec<ShareResult>,
}

#[derive(Debug, Deserialize)]
pub struct SuccessResponse {
    #[serde(default)]
    pub success: bool,
}
