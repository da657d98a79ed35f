//! Integration tests for the CRM adapter against a mock server.

use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tasklink_connector::traits::SourceSystem;
use tasklink_connector::ConnectorError;
use tasklink_connector_crm::{CrmClient, CrmConfig};
use tasklink_core::types::SourceObjectType;

fn client_for(server: &MockServer) -> CrmClient {
    let config = CrmConfig::new(server.uri(), "test-token", "https://app.crm.example.com");
    CrmClient::new(config).unwrap()
}

#[tokio::test]
async fn fetch_object_returns_properties_and_company() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/objects/tickets/T1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "T1",
            "properties": {
                "subject": "Printer on fire",
                "priority": "HIGH",
                "owner_id": null
            },
            "associations": {
                "companies": { "results": [{ "id": "C9" }] }
            }
        })))
        .mount(&server)
        .await;

    let object = client_for(&server)
        .fetch_object("T1", SourceObjectType::Ticket)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(object.id, "T1");
    assert_eq!(object.property("subject"), Some("Printer on fire"));
    assert_eq!(object.property("owner_id"), None);
    assert_eq!(object.company_id.as_deref(), Some("C9"));
}

#[tokio::test]
async fn missing_object_is_none_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/objects/tasks/GONE"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .fetch_object("GONE", SourceObjectType::Task)
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn server_failure_is_a_transient_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/objects/tickets/T1"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .fetch_object("T1", SourceObjectType::Ticket)
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::ApiError { status: 503, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn property_history_is_parsed_per_property() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/objects/tickets/T1"))
        .and(query_param("propertiesWithHistory", "pipeline_stage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "T1",
            "propertiesWithHistory": {
                "pipeline_stage": [
                    { "timestamp": "2026-08-05T10:00:00Z", "value": "4" },
                    { "timestamp": "2026-08-01T09:00:00Z", "value": "1" }
                ]
            }
        })))
        .mount(&server)
        .await;

    let history = client_for(&server)
        .fetch_property_history("T1", SourceObjectType::Ticket, "pipeline_stage")
        .await
        .unwrap();

    assert_eq!(history.len(), 2);
    assert_eq!(history[0].value, json!("4"));
}

#[tokio::test]
async fn owner_email_resolution_is_case_insensitive() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/owners"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "id": "101", "email": "Ana.Reyes@example.com" },
                { "id": "102", "email": null }
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(
        client
            .resolve_owner_id_by_email("ana.reyes@EXAMPLE.com")
            .await
            .unwrap()
            .as_deref(),
        Some("101")
    );
    assert_eq!(
        client
            .resolve_email_by_owner_id("101")
            .await
            .unwrap()
            .as_deref(),
        Some("Ana.Reyes@example.com")
    );
    assert_eq!(client.resolve_email_by_owner_id("102").await.unwrap(), None);
}

#[tokio::test]
async fn update_object_field_patches_property_bag() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/objects/tasks/A7"))
        .and(body_json(json!({ "properties": { "task_status": "COMPLETED" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "A7" })))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .update_object_field(
            "A7",
            SourceObjectType::Task,
            "task_status",
            &json!("COMPLETED"),
        )
        .await
        .unwrap();
}

#[test]
fn record_url_embeds_type_and_id() {
    let config = CrmConfig::new(
        "https://crm.example.com/api",
        "tok",
        "https://app.crm.example.com",
    );
    let client = CrmClient::new(config).unwrap();
    assert_eq!(
        client.record_url("T1", SourceObjectType::Ticket),
        "https://app.crm.example.com/record/ticket/T1"
    );
}
