//! Integration tests for the ArcGIS portal connector
//!
//! These tests run the connector against a wiremock server that mimics the
//! ArcGIS sharing REST API.

mod common;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use psrc_data_portal::domain::gateways::PortalGateway;
use psrc_data_portal::domain::models::portal_item::{ItemProperties, ItemType};
use psrc_data_portal::domain::models::resource::ShareLevel;
use psrc_data_portal::infrastructure::driven_adapters::portal::ArcGisPortalConnector;

use common::{connect, content_path, portal_server, portal_settings, TOKEN, USERNAME};

fn csv_properties() -> ItemProperties {
    ItemProperties {
        title: "Household Counts".to_string(),
        item_type: ItemType::Csv,
        tags: vec!["census".to_string(), "households".to_string()],
        snippet: "Households by county".to_string(),
        license_info: "Public domain".to_string(),
    }
}

// ============================================================================
// Sign in
// ============================================================================

#[tokio::test]
async fn should_sign_in_and_load_user_groups() {
    let server = portal_server().await;
    let portal = connect(&server).await;

    let user = portal.current_user().await.unwrap();

    assert_eq!(portal.username(), USERNAME);
    assert_eq!(user.username, USERNAME);
    assert_eq!(
        portal.user_groups().await.unwrap(),
        vec!["Data Portal".to_string(), "PSRC Staff".to_string()]
    );
    assert!(portal.test_connection().await);
}

#[tokio::test]
async fn should_report_rejected_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sharing/rest/generateToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "Unable to generate token.",
                "details": ["Invalid username or password."]
            }
        })))
        .mount(&server)
        .await;

    let err = ArcGisPortalConnector::connect(portal_settings(&server))
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "PORTAL_CONNECTION_ERROR");
    assert_eq!(
        err.message(),
        format!("Failed to connect to portal {}", server.uri())
    );
    assert_eq!(
        err.details(),
        Some("Error 400: Unable to generate token. (Invalid username or password.)")
    );
}

#[tokio::test]
async fn should_report_http_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sharing/rest/generateToken"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let err = ArcGisPortalConnector::connect(portal_settings(&server))
        .await
        .unwrap_err();

    assert!(err.details().unwrap_or_default().starts_with("HTTP 503"));
}

#[tokio::test]
async fn should_refuse_calls_after_close() {
    let server = portal_server().await;
    let portal = connect(&server).await;

    portal.close().await;
    let err = portal.current_user().await.unwrap_err();
    assert_eq!(err.message(), "Portal session is closed");
    assert!(!portal.test_connection().await);

    portal.reconnect().await.unwrap();
    assert!(portal.test_connection().await);
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn should_find_item_with_exact_title() {
    let server = portal_server().await;
    Mock::given(method("GET"))
        .and(path("/sharing/rest/search"))
        .and(query_param(
            "q",
            format!("title:\"Parcels\" AND type:\"CSV\" AND owner:{USERNAME}"),
        ))
        .and(query_param("token", TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 2,
            "results": [
                { "id": "item-2020", "title": "Parcels 2020", "type": "CSV", "owner": USERNAME },
                { "id": "item-parcels", "title": "Parcels", "type": "CSV", "owner": USERNAME }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let portal = connect(&server).await;

    let item = portal
        .find_by_title("Parcels", Some("CSV"))
        .await
        .unwrap()
        .expect("item should be found");

    assert_eq!(item.id, "item-parcels");
    assert_eq!(item.owner, USERNAME);
}

#[tokio::test]
async fn should_escape_quotes_in_searched_title() {
    let server = portal_server().await;
    Mock::given(method("GET"))
        .and(path("/sharing/rest/search"))
        .and(query_param(
            "q",
            format!(r#"title:"The \"Big\" Layer" AND owner:{USERNAME}"#),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "id": "fs-big", "title": "The \"Big\" Layer", "type": "Feature Service" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let portal = connect(&server).await;

    let item = portal
        .find_feature_layer_by_title(r#"The "Big" Layer"#)
        .await
        .unwrap()
        .expect("layer should be found");

    assert_eq!(item.id, "fs-big");
}

#[tokio::test]
async fn should_return_none_when_no_title_matches() {
    let server = portal_server().await;
    Mock::given(method("GET"))
        .and(path("/sharing/rest/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "id": "item-1", "title": "Parcels (archived)", "type": "Feature Service" }
            ]
        })))
        .mount(&server)
        .await;
    let portal = connect(&server).await;

    assert!(portal.find_by_title("Parcels", None).await.unwrap().is_none());
    assert!(portal
        .find_feature_layer_by_title("Parcels")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn should_resolve_only_exact_group_titles() {
    let server = portal_server().await;
    Mock::given(method("GET"))
        .and(path("/sharing/rest/community/groups"))
        .and(query_param("q", "title:\"Data Portal\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "id": "grp-data", "title": "Data Portal" },
                { "id": "grp-archive", "title": "Data Portal Archive" }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sharing/rest/community/groups"))
        .and(query_param("q", "title:\"Missing Group\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .mount(&server)
        .await;
    let portal = connect(&server).await;

    let ids = portal
        .group_ids_by_titles(&["Data Portal".to_string(), "Missing Group".to_string()])
        .await
        .unwrap();

    assert_eq!(ids, vec!["grp-data".to_string()]);
}

// ============================================================================
// Content
// ============================================================================

#[tokio::test]
async fn should_add_item_and_publish_it() {
    let server = portal_server().await;
    Mock::given(method("POST"))
        .and(path(content_path("addItem")))
        .and(body_string_contains("Household Counts"))
        .and(body_string_contains("county,households"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "id": "csv-item",
            "folder": null
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(content_path("publish")))
        .and(body_string_contains("itemId=csv-item"))
        .and(body_string_contains("filetype=csv"))
        .and(body_string_contains("overwrite=false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "services": [{
                "type": "Feature Service",
                "serviceurl": "https://services.arcgis.com/psrc/arcgis/rest/services/Household_Counts/FeatureServer",
                "serviceItemId": "fs-item",
                "jobId": "job-1"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("Household Counts.csv");
    std::fs::write(&data, "county,households\nKing,943254\n").unwrap();
    let portal = connect(&server).await;

    let item = portal.add_item(&csv_properties(), &data).await.unwrap();
    let published = portal
        .publish_item(&item.id, "csv", &json!({ "name": "Household Counts" }), false)
        .await
        .unwrap();

    assert_eq!(item.id, "csv-item");
    assert_eq!(item.item_type, "CSV");
    assert_eq!(published.id, "fs-item");
    assert_eq!(published.title, "Household Counts");
    assert_eq!(published.item_type, "Feature Service");
    assert!(published.url.unwrap().ends_with("/Household_Counts/FeatureServer"));
}

#[tokio::test]
async fn should_surface_publish_job_errors() {
    let server = portal_server().await;
    Mock::given(method("POST"))
        .and(path(content_path("publish")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "services": [{
                "success": false,
                "error": { "code": 409, "message": "Service name already exists." }
            }]
        })))
        .mount(&server)
        .await;
    let portal = connect(&server).await;

    let err = portal
        .publish_item("csv-item", "csv", &json!({ "name": "Household Counts" }), false)
        .await
        .unwrap_err();

    assert_eq!(err.message(), "Failed to publish item csv-item");
    assert_eq!(err.details(), Some("Error 409: Service name already exists."));
}

#[tokio::test]
async fn should_upload_metadata_as_xml_part() {
    let server = portal_server().await;
    Mock::given(method("POST"))
        .and(path(content_path("items/fs-item/update")))
        .and(body_string_contains("name=\"metadata\""))
        .and(body_string_contains("application/xml"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "id": "fs-item"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let metadata = dir.path().join("metadata.xml");
    std::fs::write(&metadata, "<metadata><Esri/></metadata>").unwrap();
    let portal = connect(&server).await;

    portal.update_item_metadata("fs-item", &metadata).await.unwrap();
}

#[tokio::test]
async fn should_share_with_organization_and_groups() {
    let server = portal_server().await;
    Mock::given(method("POST"))
        .and(path(content_path("shareItems")))
        .and(body_string_contains("items=fs-item"))
        .and(body_string_contains("everyone=false"))
        .and(body_string_contains("org=true"))
        .and(body_string_contains("groups=grp-data%2Cgrp-staff"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "itemId": "fs-item", "success": true, "notSharedWith": [] }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let portal = connect(&server).await;

    portal
        .share_item(
            "fs-item",
            ShareLevel::Org,
            &["grp-data".to_string(), "grp-staff".to_string()],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn should_update_definition_on_admin_endpoint() {
    let server = portal_server().await;
    Mock::given(method("POST"))
        .and(path("/arcgis/rest/admin/services/Parks/FeatureServer/updateDefinition"))
        .and(body_string_contains("capabilities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;
    let portal = connect(&server).await;
    let service_url = format!("{}/arcgis/rest/services/Parks/FeatureServer", server.uri());

    portal
        .update_service_definition(&service_url, &json!({ "capabilities": "Query" }))
        .await
        .unwrap();
}
