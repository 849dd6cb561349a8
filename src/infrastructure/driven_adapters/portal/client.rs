//! ArcGIS Portal Gateway Implementation
//!
//! Talks to the ArcGIS sharing REST API of ArcGIS Online or Portal for
//! ArcGIS with a token obtained from `generateToken`.

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use reqwest::multipart::{Form, Part};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use super::responses::{
    GroupEntry, ItemEntry, ItemResponse, PublishResponse, RestError, SearchResponse, SelfResponse,
    ShareResponse, SuccessResponse, TokenResponse,
};
use super::settings::PortalSettings;
use crate::domain::gateways::portal_gateway::search_phrase;
use crate::domain::gateways::PortalGateway;
use crate::domain::models::portal_item::{ItemProperties, ItemType, PortalItem, PortalUser};
use crate::domain::models::resource::ShareLevel;
use crate::shared::errors::{DataPortalError, Result};

const SEARCH_PAGE_SIZE: &str = "100";

#[derive(Clone)]
struct Session {
    token: Zeroizing<String>,
    username: String,
}

fn rest_error(message: impl Into<String>, details: impl Into<String>) -> DataPortalError {
    DataPortalError::portal_connection(message).with_details(details)
}

/// Decode a REST body, turning an `error` envelope into a portal error
fn parse_body<T: DeserializeOwned>(body: &str, action: &str) -> Result<T> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| rest_error(action, format!("Invalid JSON response: {e}")))?;
    if let Some(error) = value.get("error") {
        let summary = serde_json::from_value::<RestError>(error.clone())
            .map_or_else(|_| error.to_string(), |e| e.summary());
        return Err(rest_error(action, summary));
    }
    serde_json::from_value(value).map_err(|e| rest_error(action, format!("Unexpected response: {e}")))
}

/// Hosted service admin endpoint for a service URL
fn admin_service_url(service_url: &str) -> String {
    service_url
        .trim_end_matches('/')
        .replacen("/rest/services/", "/rest/admin/services/", 1)
}

async fn file_part(path: &Path) -> Result<Part> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        DataPortalError::data_export(format!("Failed to read upload file {}", path.display()))
            .with_details(e.to_string())
    })?;
    let name = path
        .file_name()
        .map_or_else(|| "data".to_string(), |n| n.to_string_lossy().into_owned());
    Ok(Part::bytes(bytes).file_name(name))
}

fn item_form(properties: &ItemProperties, token: &str) -> Form {
    Form::new()
        .text("f", "json")
        .text("token", token.to_string())
        .text("title", properties.title.clone())
        .text("type", properties.item_type.as_str())
        .text("tags", properties.tags.join(","))
        .text("snippet", properties.snippet.clone())
        .text("licenseInfo", properties.license_info.clone())
}

/// ArcGIS Online / Portal for ArcGIS implementation of PortalGateway
pub struct ArcGisPortalConnector {
    settings: PortalSettings,
    http: reqwest::Client,
    session: RwLock<Option<Session>>,
}

impl std::fmt::Debug for ArcGisPortalConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArcGisPortalConnector")
            .field("url", &self.settings.url)
            .field("username", &self.settings.username)
            .finish_non_exhaustive()
    }
}

impl ArcGisPortalConnector {
    /// Sign in and verify the session
    ///
    /// # Errors
    ///
    /// Returns `DataPortalError::PortalConnection` if the portal rejects the
    /// credentials or cannot be reached.
    pub async fn connect(settings: PortalSettings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let referer = HeaderValue::from_str(&settings.url).map_err(|e| {
            DataPortalError::portal_connection("Portal URL is not a valid header value")
                .with_details(e.to_string())
        })?;
        headers.insert(REFERER, referer);

        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| {
                DataPortalError::portal_connection("Failed to create HTTP client")
                    .with_details(e.to_string())
            })?;

        let connector = Self {
            settings,
            http,
            session: RwLock::new(None),
        };
        let session = connector.sign_in().await?;
        tracing::info!(
            url = %connector.settings.url,
            username = %session.username,
            "Connected to portal"
        );
        *connector.session.write().await = Some(session);
        Ok(connector)
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.settings.username
    }

    /// Sign in again with the stored credentials
    ///
    /// # Errors
    ///
    /// Returns `DataPortalError::PortalConnection` if signing in fails.
    pub async fn reconnect(&self) -> Result<()> {
        tracing::info!(url = %self.settings.url, "Reconnecting to portal");
        let session = self.sign_in().await?;
        *self.session.write().await = Some(session);
        Ok(())
    }

    /// Forget the token; later calls fail until `reconnect`
    pub async fn close(&self) {
        if self.session.write().await.take().is_some() {
            tracing::info!(url = %self.settings.url, "Portal session closed");
        }
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/sharing/rest/{}", self.settings.url, path)
    }

    fn content_url(&self, username: &str, path: &str) -> String {
        self.rest_url(&format!("content/users/{username}/{path}"))
    }

    async fn sign_in(&self) -> Result<Session> {
        let failed = format!("Failed to connect to portal {}", self.settings.url);
        let expiration = self.settings.token_expiration_minutes.to_string();
        let form = [
            ("username", self.settings.username.as_str()),
            ("password", self.settings.password.as_str()),
            ("client", "referer"),
            ("referer", self.settings.url.as_str()),
            ("expiration", expiration.as_str()),
            ("f", "json"),
        ];
        let token: TokenResponse = self
            .send(self.http.post(self.rest_url("generateToken")).form(&form), &failed)
            .await?;
        let token = Zeroizing::new(token.token);

        let me: SelfResponse = self
            .send(
                self.http
                    .get(self.rest_url("community/self"))
                    .query(&[("f", "json"), ("token", token.as_str())]),
                &failed,
            )
            .await?;

        Ok(Session {
            token,
            username: me.username,
        })
    }

    async fn session(&self) -> Result<Session> {
        self.session.read().await.clone().ok_or_else(|| {
            DataPortalError::portal_connection("Portal session is closed")
                .with_details("Call reconnect to sign in again")
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, action: &str) -> Result<T> {
        let response = request.send().await.map_err(|e| rest_error(action, e.to_string()))?;
        let status = response.status();
        tracing::debug!(url = %response.url().path(), %status, "Portal response");
        let body = response.text().await.map_err(|e| rest_error(action, e.to_string()))?;
        if !status.is_success() {
            return Err(rest_error(action, format!("HTTP {status}: {body}")));
        }
        parse_body(&body, action)
    }
}

#[async_trait]
impl PortalGateway for ArcGisPortalConnector {
    fn portal_url(&self) -> &str {
        &self.settings.url
    }

    async fn current_user(&self) -> Result<PortalUser> {
        let session = self.session().await?;
        let me: SelfResponse = self
            .send(
                self.http
                    .get(self.rest_url("community/self"))
                    .query(&[("f", "json"), ("token", session.token.as_str())]),
                "Failed to get portal user",
            )
            .await?;
        Ok(PortalUser {
            username: me.username,
            groups: me.groups.into_iter().map(Into::into).collect(),
        })
    }

    async fn test_connection(&self) -> bool {
        match self.current_user().await {
            Ok(user) => {
                tracing::debug!(username = %user.username, "Portal connection test passed");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Portal connection test failed");
                false
            }
        }
    }

    async fn search_items(&self, query: &str) -> Result<Vec<PortalItem>> {
        let session = self.session().await?;
        let body: SearchResponse<ItemEntry> = self
            .send(
                self.http.get(self.rest_url("search")).query(&[
                    ("q", query),
                    ("num", SEARCH_PAGE_SIZE),
                    ("f", "json"),
                    ("token", session.token.as_str()),
                ]),
                "Failed to search portal items",
            )
            .await?;
        Ok(body.results.into_iter().map(Into::into).collect())
    }

    async fn group_ids_by_titles(&self, titles: &[String]) -> Result<Vec<String>> {
        if titles.is_empty() {
            return Ok(Vec::new());
        }
        let session = self.session().await?;
        let mut ids = Vec::new();
        for title in titles {
            let query = format!("title:{}", search_phrase(title));
            let body: SearchResponse<GroupEntry> = self
                .send(
                    self.http.get(self.rest_url("community/groups")).query(&[
                        ("q", query.as_str()),
                        ("num", SEARCH_PAGE_SIZE),
                        ("f", "json"),
                        ("token", session.token.as_str()),
                    ]),
                    "Failed to get group IDs",
                )
                .await?;
            let matched: Vec<String> = body
                .results
                .into_iter()
                .filter(|g| &g.title == title)
                .map(|g| g.id)
                .collect();
            if matched.is_empty() {
                tracing::warn!(group = %title, "Group not found on portal");
            }
            for id in matched {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        tracing::debug!(requested = titles.len(), found = ids.len(), "Resolved group IDs");
        Ok(ids)
    }

    async fn add_item(&self, properties: &ItemProperties, data: &Path) -> Result<PortalItem> {
        let session = self.session().await?;
        let action = format!("Failed to add item '{}'", properties.title);
        let form = item_form(properties, &session.token).part("file", file_part(data).await?);
        let body: ItemResponse = self
            .send(
                self.http
                    .post(self.content_url(&session.username, "addItem"))
                    .multipart(form),
                &action,
            )
            .await?;
        let id = body
            .id
            .filter(|_| body.success)
            .ok_or_else(|| rest_error(&action, "Portal did not return an item id"))?;
        tracing::info!(item_id = %id, title = %properties.title, "Added portal item");
        Ok(PortalItem {
            id,
            title: properties.title.clone(),
            item_type: properties.item_type.as_str().to_string(),
            owner: session.username,
            url: None,
        })
    }

    async fn update_item(&self, item_id: &str, properties: &ItemProperties, data: &Path) -> Result<()> {
        let session = self.session().await?;
        let action = format!("Failed to update item {item_id}");
        let form = item_form(properties, &session.token).part("file", file_part(data).await?);
        let body: ItemResponse = self
            .send(
                self.http
                    .post(self.content_url(&session.username, &format!("items/{item_id}/update")))
                    .multipart(form),
                &action,
            )
            .await?;
        if !body.success {
            return Err(rest_error(action, "Portal reported the update as unsuccessful"));
        }
        tracing::info!(item_id, title = %properties.title, "Updated portal item");
        Ok(())
    }

    async fn publish_item(
        &self,
        item_id: &str,
        file_type: &str,
        publish_parameters: &Value,
        overwrite: bool,
    ) -> Result<PortalItem> {
        let session = self.session().await?;
        let action = format!("Failed to publish item {item_id}");
        let parameters = publish_parameters.to_string();
        let overwrite = overwrite.to_string();
        let form = [
            ("itemId", item_id),
            ("filetype", file_type),
            ("publishParameters", parameters.as_str()),
            ("overwrite", overwrite.as_str()),
            ("f", "json"),
            ("token", session.token.as_str()),
        ];
        let body: PublishResponse = self
            .send(
                self.http
                    .post(self.content_url(&session.username, "publish"))
                    .form(&form),
                &action,
            )
            .await?;

        let service = body
            .services
            .into_iter()
            .next()
            .ok_or_else(|| rest_error(&action, "Portal returned no published service"))?;
        if let Some(error) = service.error {
            return Err(rest_error(action, error.summary()));
        }
        let id = service
            .service_item_id
            .ok_or_else(|| rest_error(&action, "Published service has no item id"))?;

        tracing::info!(source_item = item_id, service_item = %id, "Published hosted layer");
        Ok(PortalItem {
            id,
            title: publish_parameters
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            item_type: service
                .service_type
                .unwrap_or_else(|| ItemType::FeatureService.as_str().to_string()),
            owner: session.username,
            url: service.service_url,
        })
    }

    async fn update_item_metadata(&self, item_id: &str, metadata: &Path) -> Result<()> {
        let session = self.session().await?;
        let action = format!("Failed to update metadata for item {item_id}");
        let part = file_part(metadata)
            .await?
            .mime_str("application/xml")
            .map_err(|e| rest_error(&action, e.to_string()))?;
        let form = Form::new()
            .text("f", "json")
            .text("token", session.token.to_string())
            .part("metadata", part);
        let body: ItemResponse = self
            .send(
                self.http
                    .post(self.content_url(&session.username, &format!("items/{item_id}/update")))
                    .multipart(form),
                &action,
            )
            .await?;
        if !body.success {
            return Err(rest_error(action, "Portal reported the update as unsuccessful"));
        }
        tracing::debug!(item_id, "Updated item metadata");
        Ok(())
    }

    async fn share_item(&self, item_id: &str, level: ShareLevel, group_ids: &[String]) -> Result<()> {
        let session = self.session().await?;
        let action = format!("Failed to share item {item_id}");
        let everyone = (level == ShareLevel::Everyone).to_string();
        let org = (level == ShareLevel::Org).to_string();
        let groups = group_ids.join(",");
        let form = [
            ("items", item_id),
            ("everyone", everyone.as_str()),
            ("org", org.as_str()),
            ("groups", groups.as_str()),
            ("f", "json"),
            ("token", session.token.as_str()),
        ];
        let body: ShareResponse = self
            .send(
                self.http
                    .post(self.content_url(&session.username, "shareItems"))
                    .form(&form),
                &action,
            )
            .await?;

        for result in body.results.iter().filter(|r| r.item_id == item_id) {
            if !result.success {
                return Err(rest_error(action, "Portal reported sharing as unsuccessful"));
            }
            if !result.not_shared_with.is_empty() {
                tracing::warn!(
                    item_id,
                    groups = %result.not_shared_with.join(","),
                    "Item not shared with some groups"
                );
            }
        }
        tracing::info!(item_id, level = %level, groups = group_ids.len(), "Applied sharing");
        Ok(())
    }

    async fn update_service_definition(&self, service_url: &str, definition: &Value) -> Result<()> {
        let session = self.session().await?;
        let action = format!("Failed to update service definition for {service_url}");
        let url = format!("{}/updateDefinition", admin_service_url(service_url));
        let definition = definition.to_string();
        let form = [
            ("updateDefinition", definition.as_str()),
            ("f", "json"),
            ("token", session.token.as_str()),
        ];
        let body: SuccessResponse = self.send(self.http.post(url).form(&form), &action).await?;
        if !body.success {
            return Err(rest_error(action, "Portal reported the update as unsuccessful"));
        }
        tracing::debug!(service_url, "Updated service definition");
        Ok(())
    }
}
