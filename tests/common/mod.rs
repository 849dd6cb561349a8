//! Common test utilities for integration tests
//!
//! Provides a mock ArcGIS portal backed by wiremock, an in-memory SQL
//! gateway and configuration built from an explicit environment map.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zeroize::Zeroizing;

use psrc_data_portal::domain::gateways::SqlGateway;
use psrc_data_portal::domain::models::dataset::{CellValue, Dataset};
use psrc_data_portal::infrastructure::driven_adapters::config::ConfigManager;
use psrc_data_portal::infrastructure::driven_adapters::portal::{
    ArcGisPortalConnector, PortalSettings,
};
use psrc_data_portal::shared::errors::Result;

pub const USERNAME: &str = "psrc_publisher";
pub const TOKEN: &str = "test-portal-token";

/// Path of a user content endpoint on the mock portal
pub fn content_path(endpoint: &str) -> String {
    format!("/sharing/rest/content/users/{USERNAME}/{endpoint}")
}

/// Start a mock portal that accepts the test credentials
pub async fn portal_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sharing/rest/generateToken"))
        .and(body_string_contains(format!("username={USERNAME}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": TOKEN,
            "expires": 1_760_000_000_000_i64,
            "ssl": true
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/sharing/rest/community/self"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "username": USERNAME,
            "groups": [
                { "id": "grp-data", "title": "Data Portal" },
                { "id": "grp-staff", "title": "PSRC Staff" }
            ]
        })))
        .mount(&server)
        .await;

    server
}

pub fn portal_settings(server: &MockServer) -> PortalSettings {
    PortalSettings {
        url: server.uri(),
        username: USERNAME.to_string(),
        password: Zeroizing::new("secret".to_string()),
        timeout: Duration::from_secs(5),
        token_expiration_minutes: 60,
    }
}

pub async fn connect(server: &MockServer) -> ArcGisPortalConnector {
    ArcGisPortalConnector::connect(portal_settings(server))
        .await
        .expect("Failed to connect to mock portal")
}

/// Configuration with only the given variables in the environment
pub fn config(vars: &[(&str, &str)]) -> ConfigManager {
    let env: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    ConfigManager::load_with_env(None, Arc::new(env)).expect("Failed to load test configuration")
}

/// SQL gateway answering queries from a queue of prepared datasets
#[derive(Default)]
pub struct MockSqlGateway {
    results: Mutex<VecDeque<Result<Dataset>>>,
    queries: Mutex<Vec<String>>,
}

impl MockSqlGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(self, dataset: Dataset) -> Self {
        self.results.lock().unwrap().push_back(Ok(dataset));
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlGateway for MockSqlGateway {
    async fn query(&self, sql: &str, _params: &[&str]) -> Result<Dataset> {
        self.queries.lock().unwrap().push(sql.to_string());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Dataset::new(Vec::new())))
    }

    async fn test_connection(&self) -> bool {
        true
    }
}

fn text(value: &str) -> CellValue {
    CellValue::Text(value.to_string())
}

/// Household counts by county
pub fn household_counts() -> Dataset {
    Dataset::from_rows(
        vec!["county".into(), "households".into(), "data_year".into()],
        vec![
            vec![text("King"), CellValue::Integer(943_254), CellValue::Integer(2023)],
            vec![text("Kitsap"), CellValue::Integer(110_720), CellValue::Integer(2023)],
            vec![text("Pierce"), CellValue::Integer(352_418), CellValue::Integer(2023)],
            vec![text("Snohomish"), CellValue::Integer(312_011), CellValue::Integer(2023)],
        ],
    )
    .expect("valid dataset")
}

/// Column listing returned by INFORMATION_SCHEMA for a parks layer
pub fn park_columns() -> Dataset {
    Dataset::from_rows(
        vec!["COLUMN_NAME".into()],
        ["OBJECTID", "park_name", "acres", "Shape", "GDB_GEOMATTR_DATA"]
            .into_iter()
            .map(|c| vec![text(c)])
            .collect(),
    )
    .expect("valid dataset")
}

/// Park polygons with geometry as WKT
pub fn parks() -> Dataset {
    Dataset::from_rows(
        vec!["OBJECTID".into(), "park_name".into(), "acres".into(), "Shape_wkt".into()],
        vec![
            vec![
                CellValue::Integer(1),
                text("Discovery Park"),
                CellValue::Float(534.0),
                text("POLYGON ((1260000 240000, 1262000 240000, 1262000 242000, 1260000 242000, 1260000 240000))"),
            ],
            vec![
                CellValue::Integer(2),
                text("Seward Park"),
                CellValue::Float(300.0),
                text("POLYGON ((1290000 200000, 1291000 200000, 1291000 201000, 1290000 201000, 1290000 200000))"),
            ],
        ],
    )
    .expect("valid dataset")
}
