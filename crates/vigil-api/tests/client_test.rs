#![allow(clippy::unwrap_used)]
// Integration tests for `ApiClient` using wiremock.

use std::sync::Arc;

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vigil_api::{ApiClient, Error, TokenCell};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, ApiClient) {
    let server = MockServer::start().await;
    let token = Arc::new(TokenCell::with_token(SecretString::from("t0ken")));
    let client = ApiClient::from_reqwest(&server.uri(), reqwest::Client::new(), token).unwrap();
    (server, client)
}

// ── Version ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_version() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/sync/version"))
        .and(header("authorization", "Bearer t0ken"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "version": "v2", "userVersion": null })),
        )
        .mount(&server)
        .await;

    let version = client.version().await.unwrap();
    assert_eq!(version.version.as_deref(), Some("v2"));
    assert_eq!(version.user_version, None);
}

// ── Bulk endpoints ──────────────────────────────────────────────────

#[tokio::test]
async fn test_groups_bare_array() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "g1", "name": "Boiler house" },
            { "id": "g2", "name": "Cooling", "parentId": "g1" }
        ])))
        .mount(&server)
        .await;

    let groups = client.groups().await.unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[1].parent_id.as_deref(), Some("g1"));
}

#[tokio::test]
async fn test_items_wrapped_with_orphans() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/items"))
        .and(query_param("showOrphans", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "id": "i1", "name": "TT-101", "groupId": "g1", "unit": "degC" },
                { "id": "i2", "name": "Spare input" }
            ]
        })))
        .mount(&server)
        .await;

    let items = client.items(true).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].group_id.as_deref(), Some("g1"));
    assert!(items[1].group_id.is_none());
}

#[tokio::test]
async fn test_alarms_scoped_to_items() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/alarms/query"))
        .and(body_json(json!({ "itemIds": ["i1", "i2"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "a1", "itemId": "i1", "severity": "high" }
        ])))
        .mount(&server)
        .await;

    let ids = vec!["i1".to_string(), "i2".to_string()];
    let alarms = client.alarms(&ids).await.unwrap();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].item_id, "i1");
}

#[tokio::test]
async fn test_active_alarms_unscoped_sends_empty_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/alarms/active"))
        .and(body_json(json!({})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "x1", "itemId": "i1" },
            { "id": "x2", "itemId": "i2", "raisedAt": 1760000000000_i64 }
        ])))
        .mount(&server)
        .await;

    let active = client.active_alarms(&[]).await.unwrap();
    assert_eq!(active.len(), 2);
    assert_eq!(active[1].raised_at, Some(1_760_000_000_000));
}

// ── Errors ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_maps_to_authentication() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/groups"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "token expired" })))
        .mount(&server)
        .await;

    let result = client.groups().await;
    match result {
        Err(Error::Authentication { message }) => assert_eq!(message, "token expired"),
        other => panic!("expected Authentication error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/sync/version"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client.version().await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 503, .. }), "got: {err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_body_keeps_raw_text() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
        .mount(&server)
        .await;

    match client.groups().await {
        Err(Error::Deserialization { body, .. }) => assert!(body.contains("proxy error")),
        other => panic!("expected Deserialization error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_token_fails_before_request() {
    let server = MockServer::start().await;
    let client =
        ApiClient::from_reqwest(&server.uri(), reqwest::Client::new(), Arc::new(TokenCell::new()))
            .unwrap();

    let err = client.groups().await.unwrap_err();
    assert!(matches!(err, Error::MissingCredential));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_token_refresh_applies_to_next_request() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/sync/version"))
        .and(header("authorization", "Bearer rotated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "version": "v9" })))
        .mount(&server)
        .await;

    client.token().set(SecretString::from("rotated"));
    let version = client.version().await.unwrap();
    assert_eq!(version.version.as_deref(), Some("v9"));
}
