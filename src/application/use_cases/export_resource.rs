//! Export Resource Use Case
//!
//! Queries a source table or custom query, stages the rows as CSV or
//! GeoJSON, publishes them to the portal and applies metadata and sharing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::domain::gateways::{ExportWorkspace, PortalGateway, SqlGateway};
use crate::domain::models::dataset::Dataset;
use crate::domain::models::metadata::build_field_mappings;
use crate::domain::models::portal_item::{ItemProperties, ItemType, PortalItem};
use crate::domain::models::resource::{ResourceParams, ResourceProperties, ShareLevel};
use crate::domain::models::source::SourceConfig;
use crate::domain::spatial::{self, SpatialReference, WKT_COLUMN};
use crate::domain::validation;
use crate::shared::errors::{DataPortalError, Result};

/// Columns maintained by the geodatabase that are never exported
const SYSTEM_COLUMNS: [&str; 2] = ["GDB_GEOMATTR_DATA", "SDE_STATE_ID"];

const COLUMNS_QUERY: &str = "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.COLUMNS \
     WHERE TABLE_NAME = @P1 AND TABLE_SCHEMA = @P2 ORDER BY ORDINAL_POSITION";

const EDITABLE_CAPABILITIES: &str = "Create,Delete,Query,Update,Editing";
const READ_ONLY_CAPABILITIES: &str = "Query";

/// Export behavior taken from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    pub default_srid: i32,
    pub simplify_polygons: bool,
    pub close_holes: bool,
    /// Fewest rows a query may return before the export is refused
    pub min_rows: usize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            default_srid: 2285,
            simplify_polygons: true,
            close_holes: true,
            min_rows: 1,
        }
    }
}

/// Log `e` and wrap it as a data export error under `message`
fn wrap_error(message: &'static str) -> impl FnOnce(DataPortalError) -> DataPortalError {
    move |e| {
        tracing::error!(error = %e, "{message}");
        DataPortalError::data_export(message).with_details(e.to_string())
    }
}

/// `SELECT` list for a spatial layer, with the geometry column as WKT
fn columns_clause(columns: &[String]) -> String {
    columns
        .iter()
        .map(|column| {
            if column.eq_ignore_ascii_case("shape") {
                format!("{column}.STAsText() as {WKT_COLUMN}")
            } else {
                column.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// A publishable resource: validated parameters bound to the gateways that
/// move its data
pub struct PortalResource {
    portal: Arc<dyn PortalGateway>,
    database: Arc<dyn SqlGateway>,
    workspace: Arc<dyn ExportWorkspace>,
    settings: ExportSettings,
    params: ResourceParams,
    source: SourceConfig,
    properties: ResourceProperties,
    srid: SpatialReference,
}

impl PortalResource {
    /// Validate job parameters and source configuration
    ///
    /// # Errors
    ///
    /// Returns `DataPortalError::DataExport` "Failed to initialize portal
    /// resource" wrapping the first validation failure.
    pub fn new(
        portal: Arc<dyn PortalGateway>,
        database: Arc<dyn SqlGateway>,
        workspace: Arc<dyn ExportWorkspace>,
        params: &Value,
        source: &Value,
        settings: ExportSettings,
    ) -> Result<Self> {
        let init = || -> Result<(ResourceParams, SourceConfig, SpatialReference)> {
            let params = validation::validate_resource_parameters(params)?;
            let source = validation::validate_source_config(source)?;
            let srid = spatial::validate_spatial_reference(&Value::from(
                params.srid.unwrap_or(settings.default_srid),
            ))?;
            Ok((params, source, srid))
        };
        let (params, source, srid) = init().map_err(wrap_error("Failed to initialize portal resource"))?;

        let properties = ResourceProperties::from(&params);
        tracing::info!(
            title = %params.title,
            spatial = params.spatial_data,
            share_level = %params.share_level,
            "Portal resource initialized"
        );

        Ok(Self {
            portal,
            database,
            workspace,
            settings,
            params,
            source,
            properties,
            srid,
        })
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.params.title
    }

    #[must_use]
    pub fn is_spatial(&self) -> bool {
        self.params.spatial_data
    }

    #[must_use]
    pub fn share_level(&self) -> ShareLevel {
        self.params.share_level
    }

    #[must_use]
    pub fn groups(&self) -> &[String] {
        &self.params.groups
    }

    #[must_use]
    pub fn properties(&self) -> &ResourceProperties {
        &self.properties
    }

    #[must_use]
    pub fn srid(&self) -> SpatialReference {
        self.srid
    }

    fn item_type(&self) -> ItemType {
        if self.is_spatial() {
            ItemType::GeoJson
        } else {
            ItemType::Csv
        }
    }

    /// SQL that produces the rows to export
    ///
    /// # Errors
    ///
    /// Returns `DataPortalError::DataExport` "Failed to build SQL query" when
    /// the source has neither a custom query nor a simple table, or the
    /// layer's columns cannot be read.
    pub async fn build_sql_query(&self) -> Result<String> {
        let build = async {
            if let Some(query) = &self.source.sql_query {
                return Ok(query.clone());
            }
            let (true, Some(table)) = (self.source.is_simple, self.source.table_name.as_deref())
            else {
                return Err(DataPortalError::data_export("No valid source configuration found"));
            };
            let qualified = format!("{}.{}", self.source.schema, table);
            if !self.is_spatial() {
                return Ok(format!("SELECT * FROM {qualified}"));
            }
            let columns = self.layer_columns(table).await?;
            Ok(format!("SELECT {} FROM {qualified}", columns_clause(&columns)))
        };
        build.await.map_err(wrap_error("Failed to build SQL query"))
    }

    async fn layer_columns(&self, table: &str) -> Result<Vec<String>> {
        let dataset = self
            .database
            .query(COLUMNS_QUERY, &[table, self.source.schema.as_str()])
            .await
            .map_err(wrap_error("Failed to get layer columns"))?;

        let columns: Vec<String> = dataset
            .column_values(0)
            .filter_map(|cell| cell.as_text())
            .filter(|name| !SYSTEM_COLUMNS.contains(name))
            .filter(|name| {
                !self
                    .source
                    .fields_to_exclude
                    .iter()
                    .any(|excluded| excluded.eq_ignore_ascii_case(name))
            })
            .map(ToString::to_string)
            .collect();

        if columns.is_empty() {
            return Err(DataPortalError::data_export(format!(
                "No columns found for {}.{table}",
                self.source.schema
            )));
        }
        tracing::debug!(table, count = columns.len(), "Retrieved layer columns");
        Ok(columns)
    }

    async fn fetch_dataset(&self) -> Result<Dataset> {
        let sql = self.build_sql_query().await?;
        tracing::debug!(query = %sql.chars().take(100).collect::<String>(), "Executing query");
        let dataset = self
            .database
            .query(&sql, &[])
            .await?
            .without_columns(&self.source.fields_to_exclude);
        validation::validate_dataset(&dataset, self.settings.min_rows)?;
        Ok(dataset)
    }

    async fn export_tabular_data(&self) -> Result<(Dataset, PathBuf)> {
        let export = async {
            let dataset = self.fetch_dataset().await?;
            self.workspace.prepare()?;
            let path = self.workspace.write_table(self.title(), &dataset)?;
            Ok::<_, DataPortalError>((dataset, path))
        };
        export.await.map_err(wrap_error("Failed to export tabular data"))
    }

    async fn export_spatial_data(&self) -> Result<PathBuf> {
        let export = async {
            let dataset = self.fetch_dataset().await?;
            let mut features = spatial::create_features_from_wkt(&dataset, WKT_COLUMN)?;
            if self.settings.simplify_polygons {
                features = spatial::simplify_features(features, self.settings.close_holes);
            }
            tracing::debug!(
                geometry_type = spatial::geometry_type(&features).unwrap_or("none"),
                bounds = ?spatial::calculate_bounds(&features),
                "Prepared features"
            );
            self.workspace.prepare()?;
            self.workspace.write_features(self.title(), &features)
        };
        export.await.map_err(|e| {
            tracing::error!(error = %e, "Failed to export spatial data");
            DataPortalError::spatial_data("Failed to export spatial data").with_details(e.to_string())
        })
    }

    /// Parameters for the publish call
    fn publish_parameters(&self, dataset: Option<&Dataset>) -> Value {
        if self.is_spatial() {
            return json!({
                "name": self.title(),
                "targetSR": self.srid,
            });
        }
        let mut parameters = json!({
            "name": self.title(),
            "type": "csv",
            "locationType": "none",
        });
        if let Some(dataset) = dataset {
            parameters["layerInfo"] = json!({ "fields": build_field_mappings(dataset) });
        }
        parameters
    }

    async fn publish_new_item(&self, data: &Path, dataset: Option<&Dataset>) -> Result<PortalItem> {
        let publish = async {
            let item_type = self.item_type();
            let item = self
                .portal
                .add_item(&ItemProperties::new(&self.properties, item_type), data)
                .await?;
            let published = self
                .portal
                .publish_item(
                    &item.id,
                    item_type.publish_file_type(),
                    &self.publish_parameters(dataset),
                    false,
                )
                .await?;
            tracing::info!(title = %self.title(), item_id = %published.id, "Published new item");
            Ok::<_, DataPortalError>(published)
        };
        publish.await.map_err(wrap_error("Failed to publish new item"))
    }

    async fn update_existing_item(&self, data: &Path, dataset: Option<&Dataset>) -> Result<PortalItem> {
        let update = async {
            let item_type = self.item_type();
            let existing = self
                .portal
                .find_by_title(self.title(), Some(item_type.as_str()))
                .await?
                .ok_or_else(|| {
                    DataPortalError::data_export(format!("Existing item not found: {}", self.title()))
                })?;

            self.portal
                .update_item(&existing.id, &ItemProperties::new(&self.properties, item_type), data)
                .await?;
            let published = self
                .portal
                .publish_item(
                    &existing.id,
                    item_type.publish_file_type(),
                    &self.publish_parameters(dataset),
                    true,
                )
                .await?;
            tracing::info!(title = %self.title(), item_id = %published.id, "Updated existing item");
            Ok::<_, DataPortalError>(published)
        };
        update.await.map_err(wrap_error("Failed to update existing item"))
    }

    async fn apply_sharing_and_metadata(&self, item: &PortalItem) -> Result<()> {
        let apply = async {
            if let Some(metadata) = self.params.metadata.as_ref().filter(|m| !m.is_empty()) {
                let path = self.workspace.write_metadata(metadata, &self.properties)?;
                self.portal.update_item_metadata(&item.id, &path).await?;
            }

            let group_ids = if self.params.groups.is_empty() {
                Vec::new()
            } else {
                self.portal.group_ids_by_titles(&self.params.groups).await?
            };
            self.portal
                .share_item(&item.id, self.params.share_level, &group_ids)
                .await?;

            if self.is_spatial() {
                self.set_layer_editability(item).await;
            }
            tracing::debug!(title = %self.title(), "Applied sharing and metadata");
            Ok::<_, DataPortalError>(())
        };
        apply.await.map_err(wrap_error("Failed to apply sharing and metadata"))
    }

    /// Failures are logged only; the layer is already published
    async fn set_layer_editability(&self, item: &PortalItem) {
        let Some(url) = item.url.as_deref() else {
            tracing::error!(item_id = %item.id, "Failed to set layer editability: item has no service URL");
            return;
        };
        let capabilities = if self.params.allow_edits {
            EDITABLE_CAPABILITIES
        } else {
            READ_ONLY_CAPABILITIES
        };
        let definition = json!({
            "capabilities": capabilities,
            "syncEnabled": false,
        });
        match self.portal.update_service_definition(url, &definition).await {
            Ok(()) => tracing::debug!(title = %self.title(), capabilities, "Set layer editability"),
            Err(e) => tracing::error!(error = %e, "Failed to set layer editability"),
        }
    }

    /// Run the export.
    ///
    /// With `update_existing` the item already on the portal is replaced
    /// and republished; when that fails a new item is published instead.
    ///
    /// # Errors
    ///
    /// Returns `DataPortalError::DataExport` "Failed to export resource"
    /// wrapping the failing step.
    pub async fn export(&self, update_existing: bool) -> Result<PortalItem> {
        let run = async {
            tracing::info!(title = %self.title(), spatial = self.is_spatial(), "Starting export");

            let (dataset, data) = if self.is_spatial() {
                (None, self.export_spatial_data().await?)
            } else {
                let (dataset, path) = self.export_tabular_data().await?;
                (Some(dataset), path)
            };

            let item = if update_existing {
                match self.update_existing_item(&data, dataset.as_ref()).await {
                    Ok(item) => item,
                    Err(_) => {
                        tracing::info!(title = %self.title(), "Update failed, creating new item");
                        self.publish_new_item(&data, dataset.as_ref()).await?
                    }
                }
            } else {
                self.publish_new_item(&data, dataset.as_ref()).await?
            };

            self.apply_sharing_and_metadata(&item).await?;
            tracing::info!(title = %self.title(), item_id = %item.id, "Successfully exported");
            Ok::<_, DataPortalError>(item)
        };
        run.await.map_err(wrap_error("Failed to export resource"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::dataset::CellValue;
    use crate::domain::models::metadata::ResourceMetadata;
    use crate::domain::models::portal_item::PortalUser;
    use crate::domain::spatial::Feature;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct MockSqlGateway {
        results: Mutex<VecDeque<Result<Dataset>>>,
        queries: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl MockSqlGateway {
        fn new() -> Self {
            Self {
                results: Mutex::new(VecDeque::new()),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn with_result(self, result: Result<Dataset>) -> Self {
            self.results.lock().unwrap().push_back(result);
            self
        }

        fn queries(&self) -> Vec<(String, Vec<String>)> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SqlGateway for MockSqlGateway {
        async fn query(&self, sql: &str, params: &[&str]) -> Result<Dataset> {
            self.queries.lock().unwrap().push((
                sql.to_string(),
                params.iter().map(ToString::to_string).collect(),
            ));
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Dataset::default()))
        }

        async fn test_connection(&self) -> bool {
            true
        }
    }

    struct MockPortalGateway {
        search_result: Mutex<Option<Result<Vec<PortalItem>>>>,
        update_result: Mutex<Option<Result<()>>>,
        publish_result: Mutex<Option<Result<PortalItem>>>,
        definition_result: Mutex<Option<Result<()>>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockPortalGateway {
        fn new() -> Self {
            Self {
                search_result: Mutex::new(None),
                update_result: Mutex::new(None),
                publish_result: Mutex::new(None),
                definition_result: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_search(self, result: Result<Vec<PortalItem>>) -> Self {
            *self.search_result.lock().unwrap() = Some(result);
            self
        }

        fn with_update(self, result: Result<()>) -> Self {
            *self.update_result.lock().unwrap() = Some(result);
            self
        }

        fn with_publish(self, result: Result<PortalItem>) -> Self {
            *self.publish_result.lock().unwrap() = Some(result);
            self
        }

        fn with_definition(self, result: Result<()>) -> Self {
            *self.definition_result.lock().unwrap() = Some(result);
            self
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PortalGateway for MockPortalGateway {
        fn portal_url(&self) -> &str {
            "https://www.arcgis.com"
        }

        async fn current_user(&self) -> Result<PortalUser> {
            Ok(PortalUser {
                username: "publisher".to_string(),
                groups: vec![],
            })
        }

        async fn test_connection(&self) -> bool {
            true
        }

        async fn search_items(&self, query: &str) -> Result<Vec<PortalItem>> {
            self.record(format!("search:{query}"));
            self.search_result.lock().unwrap().take().unwrap_or_else(|| Ok(vec![]))
        }

        async fn group_ids_by_titles(&self, titles: &[String]) -> Result<Vec<String>> {
            self.record(format!("groups:{}", titles.join(";")));
            Ok(titles.iter().map(|t| format!("id-{t}")).collect())
        }

        async fn add_item(&self, properties: &ItemProperties, _data: &Path) -> Result<PortalItem> {
            self.record(format!("add:{}:{}", properties.title, properties.item_type));
            Ok(item("new-item", &properties.title, properties.item_type.as_str(), None))
        }

        async fn update_item(&self, item_id: &str, _properties: &ItemProperties, _data: &Path) -> Result<()> {
            self.record(format!("update:{item_id}"));
            self.update_result.lock().unwrap().take().unwrap_or(Ok(()))
        }

        async fn publish_item(
            &self,
            item_id: &str,
            file_type: &str,
            publish_parameters: &Value,
            overwrite: bool,
        ) -> Result<PortalItem> {
            self.record(format!("publish:{item_id}:{file_type}:{overwrite}:{publish_parameters}"));
            self.publish_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(item("svc", "Service", "Feature Service", None)))
        }

        async fn update_item_metadata(&self, item_id: &str, metadata: &Path) -> Result<()> {
            self.record(format!("metadata:{item_id}:{}", metadata.display()));
            Ok(())
        }

        async fn share_item(&self, item_id: &str, level: ShareLevel, group_ids: &[String]) -> Result<()> {
            self.record(format!("share:{item_id}:{level}:{}", group_ids.join(",")));
            Ok(())
        }

        async fn update_service_definition(&self, service_url: &str, definition: &Value) -> Result<()> {
            self.record(format!("definition:{service_url}:{definition}"));
            self.definition_result.lock().unwrap().take().unwrap_or(Ok(()))
        }
    }

    struct MockWorkspace {
        writes: Mutex<Vec<String>>,
    }

    impl MockWorkspace {
        fn new() -> Self {
            Self {
                writes: Mutex::new(Vec::new()),
            }
        }

        fn writes(&self) -> Vec<String> {
            self.writes.lock().unwrap().clone()
        }
    }

    impl ExportWorkspace for MockWorkspace {
        fn prepare(&self) -> Result<PathBuf> {
            Ok(PathBuf::from("ws"))
        }

        fn write_table(&self, title: &str, dataset: &Dataset) -> Result<PathBuf> {
            self.writes
                .lock()
                .unwrap()
                .push(format!("table:{title}:{}", dataset.columns().join(",")));
            Ok(PathBuf::from(format!("ws/{title}.csv")))
        }

        fn write_features(&self, title: &str, features: &[Feature]) -> Result<PathBuf> {
            self.writes
                .lock()
                .unwrap()
                .push(format!("features:{title}:{}", features.len()));
            Ok(PathBuf::from(format!("ws/{title}.geojson")))
        }

        fn write_metadata(
            &self,
            _metadata: &ResourceMetadata,
            properties: &ResourceProperties,
        ) -> Result<PathBuf> {
            self.writes
                .lock()
                .unwrap()
                .push(format!("metadata:{}", properties.title));
            Ok(PathBuf::from("ws/metadata/metadata.xml"))
        }
    }

    fn item(id: &str, title: &str, item_type: &str, url: Option<&str>) -> PortalItem {
        PortalItem {
            id: id.to_string(),
            title: title.to_string(),
            item_type: item_type.to_string(),
            owner: "publisher".to_string(),
            url: url.map(ToString::to_string),
        }
    }

    fn rows() -> Dataset {
        Dataset::from_rows(
            vec!["id".into(), "name".into(), "internal_note".into()],
            vec![vec![
                CellValue::Integer(1),
                CellValue::Text("Seattle".into()),
                CellValue::Text("x".into()),
            ]],
        )
        .unwrap()
    }

    fn column_names(names: &[&str]) -> Dataset {
        Dataset::from_rows(
            vec!["COLUMN_NAME".into()],
            names.iter().map(|n| vec![CellValue::Text((*n).to_string())]).collect(),
        )
        .unwrap()
    }

    fn tabular_params() -> Value {
        json!({"title": "City Population", "tags": "census, population"})
    }

    fn simple_source() -> Value {
        json!({
            "is_simple": true,
            "table_name": "cities",
            "feature_dataset": "",
            "fields_to_exclude": "internal_note"
        })
    }

    fn resource(
        portal: Arc<MockPortalGateway>,
        database: Arc<MockSqlGateway>,
        workspace: Arc<MockWorkspace>,
        params: &Value,
        source: &Value,
    ) -> Result<PortalResource> {
        PortalResource::new(portal, database, workspace, params, source, ExportSettings::default())
    }

    #[test]
    fn should_rewrite_shape_column_as_wkt() {
        let columns = vec!["OBJECTID".to_string(), "SHAPE".to_string()];
        assert_eq!(columns_clause(&columns), "OBJECTID, SHAPE.STAsText() as Shape_wkt");
    }

    #[test]
    fn should_wrap_invalid_params_as_initialization_error() {
        let result = resource(
            Arc::new(MockPortalGateway::new()),
            Arc::new(MockSqlGateway::new()),
            Arc::new(MockWorkspace::new()),
            &json!({"title": "No tags"}),
            &simple_source(),
        );

        let err = result.err().unwrap();
        assert_eq!(err.error_code(), "DATA_EXPORT_ERROR");
        assert_eq!(err.message(), "Failed to initialize portal resource");
        assert!(err.details().unwrap_or_default().contains("Required parameters validation failed"));
    }

    #[test]
    fn should_use_default_srid_and_org_sharing() {
        let resource = resource(
            Arc::new(MockPortalGateway::new()),
            Arc::new(MockSqlGateway::new()),
            Arc::new(MockWorkspace::new()),
            &tabular_params(),
            &simple_source(),
        )
        .unwrap();

        assert_eq!(resource.srid(), SpatialReference { wkid: 2285 });
        assert_eq!(resource.share_level(), ShareLevel::Org);
        assert_eq!(resource.properties().tags, vec!["census", "population"]);
        assert!(!resource.is_spatial());
    }

    #[tokio::test]
    async fn should_build_select_star_for_simple_table() {
        let resource = resource(
            Arc::new(MockPortalGateway::new()),
            Arc::new(MockSqlGateway::new()),
            Arc::new(MockWorkspace::new()),
            &tabular_params(),
            &simple_source(),
        )
        .unwrap();

        assert_eq!(resource.build_sql_query().await.unwrap(), "SELECT * FROM dbo.cities");
    }

    #[tokio::test]
    async fn should_prefer_custom_query() {
        let resource = resource(
            Arc::new(MockPortalGateway::new()),
            Arc::new(MockSqlGateway::new()),
            Arc::new(MockWorkspace::new()),
            &tabular_params(),
            &json!({"sql_query": "  SELECT id FROM dbo.cities  "}),
        )
        .unwrap();

        assert_eq!(resource.build_sql_query().await.unwrap(), "SELECT id FROM dbo.cities");
    }

    #[tokio::test]
    async fn should_reject_source_without_query_or_table() {
        let resource = resource(
            Arc::new(MockPortalGateway::new()),
            Arc::new(MockSqlGateway::new()),
            Arc::new(MockWorkspace::new()),
            &tabular_params(),
            &json!({"is_simple": false}),
        )
        .unwrap();

        let err = resource.build_sql_query().await.unwrap_err();
        assert_eq!(err.message(), "Failed to build SQL query");
        assert!(err.details().unwrap_or_default().contains("No valid source configuration found"));
    }

    #[tokio::test]
    async fn should_build_spatial_column_list() {
        let database = Arc::new(MockSqlGateway::new().with_result(Ok(column_names(&[
            "OBJECTID",
            "Shape",
            "GDB_GEOMATTR_DATA",
            "SDE_STATE_ID",
            "internal_note",
        ]))));
        let resource = resource(
            Arc::new(MockPortalGateway::new()),
            database.clone(),
            Arc::new(MockWorkspace::new()),
            &json!({"title": "Parcels", "tags": "parcels", "spatial_data": true}),
            &json!({
                "is_simple": true,
                "table_name": "parcels",
                "feature_dataset": "land",
                "schema": "gis",
                "fields_to_exclude": ["internal_note"]
            }),
        )
        .unwrap();

        let sql = resource.build_sql_query().await.unwrap();

        assert_eq!(sql, "SELECT OBJECTID, Shape.STAsText() as Shape_wkt FROM gis.parcels");
        let queries = database.queries();
        assert_eq!(queries[0].1, vec!["parcels".to_string(), "gis".to_string()]);
    }

    #[tokio::test]
    async fn should_update_existing_item_and_republish() {
        let portal = Arc::new(
            MockPortalGateway::new()
                .with_search(Ok(vec![item("csv-1", "City Population", "CSV", None)]))
                .with_publish(Ok(item("svc-1", "City Population", "Feature Service", None))),
        );
        let workspace = Arc::new(MockWorkspace::new());
        let resource = resource(
            portal.clone(),
            Arc::new(MockSqlGateway::new().with_result(Ok(rows()))),
            workspace.clone(),
            &tabular_params(),
            &simple_source(),
        )
        .unwrap();

        let published = resource.export(true).await.unwrap();

        assert_eq!(published.id, "svc-1");
        assert_eq!(workspace.writes(), vec!["table:City Population:id,name"]);
        let calls = portal.calls();
        assert!(calls[0].starts_with("search:title:\"City Population\" AND type:\"CSV\""));
        assert_eq!(calls[1], "update:csv-1");
        assert!(calls[2].starts_with("publish:csv-1:csv:true:"));
        assert!(calls[2].contains("esriFieldTypeInteger"));
        assert_eq!(calls[3], "share:svc-1:org:");
        assert_eq!(calls.len(), 4);
    }

    #[tokio::test]
    async fn should_publish_new_item_when_none_exists() {
        let portal = Arc::new(MockPortalGateway::new().with_search(Ok(vec![])));
        let resource = resource(
            portal.clone(),
            Arc::new(MockSqlGateway::new().with_result(Ok(rows()))),
            Arc::new(MockWorkspace::new()),
            &json!({
                "title": "City Population",
                "tags": ["census"],
                "share_level": "Everyone",
                "groups": "Regional Data; Planning"
            }),
            &simple_source(),
        )
        .unwrap();

        resource.export(true).await.unwrap();

        let calls = portal.calls();
        assert_eq!(calls[1], "add:City Population:CSV");
        assert!(calls[2].starts_with("publish:new-item:csv:false:"));
        assert_eq!(calls[3], "groups:Regional Data;Planning");
        assert_eq!(calls[4], "share:svc:everyone:id-Regional Data,id-Planning");
    }

    #[tokio::test]
    async fn should_fall_back_to_new_item_when_update_fails() {
        let portal = Arc::new(
            MockPortalGateway::new()
                .with_search(Ok(vec![item("csv-1", "City Population", "CSV", None)]))
                .with_update(Err(DataPortalError::portal_connection("Failed to update item csv-1"))),
        );
        let resource = resource(
            portal.clone(),
            Arc::new(MockSqlGateway::new().with_result(Ok(rows()))),
            Arc::new(MockWorkspace::new()),
            &tabular_params(),
            &simple_source(),
        )
        .unwrap();

        resource.export(true).await.unwrap();

        let calls = portal.calls();
        assert_eq!(calls[1], "update:csv-1");
        assert_eq!(calls[2], "add:City Population:CSV");
    }

    #[tokio::test]
    async fn should_skip_search_when_creating_new() {
        let portal = Arc::new(MockPortalGateway::new());
        let resource = resource(
            portal.clone(),
            Arc::new(MockSqlGateway::new().with_result(Ok(rows()))),
            Arc::new(MockWorkspace::new()),
            &tabular_params(),
            &simple_source(),
        )
        .unwrap();

        resource.export(false).await.unwrap();

        assert!(portal.calls().iter().all(|c| !c.starts_with("search:")));
    }

    #[tokio::test]
    async fn should_refuse_empty_dataset() {
        let portal = Arc::new(MockPortalGateway::new());
        let resource = resource(
            portal.clone(),
            Arc::new(MockSqlGateway::new().with_result(Ok(Dataset::new(vec!["id".into()])))),
            Arc::new(MockWorkspace::new()),
            &tabular_params(),
            &simple_source(),
        )
        .unwrap();

        let err = resource.export(true).await.unwrap_err();

        assert_eq!(err.message(), "Failed to export resource");
        assert!(err.details().unwrap_or_default().contains("Dataset is empty"));
        assert!(portal.calls().is_empty());
    }

    #[tokio::test]
    async fn should_export_spatial_layer_with_metadata_and_editability() {
        let database = Arc::new(
            MockSqlGateway::new()
                .with_result(Ok(column_names(&["OBJECTID", "Shape"])))
                .with_result(Ok(Dataset::from_rows(
                    vec!["OBJECTID".into(), "Shape_wkt".into()],
                    vec![
                        vec![
                            CellValue::Integer(1),
                            CellValue::Text("MULTIPOLYGON(((0 0,1 0,1 1,0 0)),((5 5,6 5,6 6,5 5)))".into()),
                        ],
                        vec![
                            CellValue::Integer(2),
                            CellValue::Text("POLYGON((10 10,11 10,11 11,10 10))".into()),
                        ],
                    ],
                )
                .unwrap())),
        );
        let portal = Arc::new(
            MockPortalGateway::new()
                .with_search(Ok(vec![]))
                .with_publish(Ok(item(
                    "svc-2",
                    "Parcels",
                    "Feature Service",
                    Some("https://services.arcgis.com/o/arcgis/rest/services/Parcels/FeatureServer"),
                )))
                .with_definition(Err(DataPortalError::portal_connection("denied"))),
        );
        let workspace = Arc::new(MockWorkspace::new());
        let resource = resource(
            portal.clone(),
            database,
            workspace.clone(),
            &json!({
                "title": "Parcels",
                "tags": "parcels",
                "spatial_data": true,
                "allow_edits": true,
                "srid": "4326",
                "metadata": {
                    "contact_name": "Jane Analyst",
                    "contact_email": "jane@psrc.org",
                    "organization_name": "PSRC"
                }
            }),
            &json!({"is_simple": true, "table_name": "parcels", "feature_dataset": "land"}),
        )
        .unwrap();

        let published = resource.export(true).await.unwrap();

        assert_eq!(published.id, "svc-2");
        assert_eq!(
            workspace.writes(),
            vec!["features:Parcels:3", "metadata:Parcels"]
        );
        let calls = portal.calls();
        assert!(calls[0].contains("type:\"GeoJson\""));
        assert_eq!(calls[1], "add:Parcels:GeoJson");
        assert!(calls[2].starts_with("publish:new-item:geojson:false:"));
        assert!(calls[2].contains("\"wkid\":4326"));
        assert_eq!(calls[3], "metadata:svc-2:ws/metadata/metadata.xml");
        assert_eq!(calls[4], "share:svc-2:org:");
        assert!(calls[5].starts_with("definition:https://services.arcgis.com/"));
        assert!(calls[5].contains("Create,Delete,Query,Update,Editing"));
    }
}
