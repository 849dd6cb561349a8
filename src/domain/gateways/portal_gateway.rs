//! Portal Gateway
//!
//! Contract for the hosted GIS content API: finding, uploading, publishing
//! and sharing items.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::models::portal_item::{ItemProperties, PortalItem, PortalUser};
use crate::domain::models::resource::ShareLevel;
use crate::shared::errors::{DataPortalError, Result};

/// Quote `value` as a phrase for portal search queries
#[must_use]
pub fn search_phrase(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Operations on an authenticated portal session
#[async_trait]
pub trait PortalGateway: Send + Sync {
    /// Base URL of the portal
    fn portal_url(&self) -> &str;

    /// The signed-in user with group memberships
    async fn current_user(&self) -> Result<PortalUser>;

    /// Whether the session is still usable
    async fn test_connection(&self) -> bool;

    /// Run a content search query
    async fn search_items(&self, query: &str) -> Result<Vec<PortalItem>>;

    /// Ids of the portal groups whose title is in `titles`
    async fn group_ids_by_titles(&self, titles: &[String]) -> Result<Vec<String>>;

    /// Upload `data` as a new item owned by the signed-in user
    async fn add_item(&self, properties: &ItemProperties, data: &Path) -> Result<PortalItem>;

    /// Replace an item's data file and properties
    async fn update_item(&self, item_id: &str, properties: &ItemProperties, data: &Path) -> Result<()>;

    /// Publish an uploaded file as a hosted layer
    async fn publish_item(
        &self,
        item_id: &str,
        file_type: &str,
        publish_parameters: &Value,
        overwrite: bool,
    ) -> Result<PortalItem>;

    /// Attach an ArcGIS metadata XML document to an item
    async fn update_item_metadata(&self, item_id: &str, metadata: &Path) -> Result<()>;

    /// Share an item at `level` and with the given groups
    async fn share_item(&self, item_id: &str, level: ShareLevel, group_ids: &[String]) -> Result<()>;

    /// Update a hosted feature service definition
    async fn update_service_definition(&self, service_url: &str, definition: &Value) -> Result<()>;

    /// Find an item owned by the signed-in user by exact title, optionally
    /// restricted to types containing `item_type`
    async fn find_by_title(&self, title: &str, item_type: Option<&str>) -> Result<Option<PortalItem>> {
        let user = self.current_user().await?;
        let mut query = format!("title:{}", search_phrase(title));
        if let Some(kind) = item_type {
            query.push_str(&format!(" AND type:{}", search_phrase(kind)));
        }
        query.push_str(&format!(" AND owner:{}", user.username));

        let found = self
            .search_items(&query)
            .await
            .map_err(|e| {
                DataPortalError::portal_connection(format!("Failed to search for item '{title}'"))
                    .with_details(e.to_string())
            })?
            .into_iter()
            .find(|item| {
                item.title == title && item_type.map_or(true, |kind| item.item_type.contains(kind))
            });

        match &found {
            Some(item) => tracing::debug!(title, item_type = %item.item_type, "Found item"),
            None => tracing::debug!(title, "No item found with title"),
        }
        Ok(found)
    }

    /// Find a hosted feature layer owned by the signed-in user by exact title
    async fn find_feature_layer_by_title(&self, title: &str) -> Result<Option<PortalItem>> {
        let user = self.current_user().await?;
        let query = format!("title:{} AND owner:{}", search_phrase(title), user.username);
        Ok(self
            .search_items(&query)
            .await?
            .into_iter()
            .find(|item| item.title == title && item.item_type.contains("Feature")))
    }

    /// Titles of the groups the signed-in user belongs to
    async fn user_groups(&self) -> Result<Vec<String>> {
        let user = self.current_user().await?;
        tracing::debug!(count = user.groups.len(), "Retrieved user groups");
        Ok(user.groups.into_iter().map(|g| g.title).collect())
    }
}
