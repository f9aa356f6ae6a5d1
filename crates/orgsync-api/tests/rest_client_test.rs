#![allow(clippy::unwrap_used)]
// Integration tests for `RestClient` using wiremock.

use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use orgsync_api::{
    EntityId, Error, NewStaff, OfficeApi, Organization, OrganizationPatch, ResourceApi,
    RestClient, Staff, StaffRole, TlsMode, TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RestClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&format!("{}/api", server.uri())).unwrap();
    let client = RestClient::with_client(reqwest::Client::new(), base_url);
    (server, client)
}

fn org_json(id: &str, name: &str) -> serde_json::Value {
    json!({
        "_id": id,
        "name": name,
        "email": format!("hello@{}.test", name.to_lowercase()),
        "createdAt": "2024-03-01T09:00:00.000Z",
        "updatedAt": "2024-03-02T09:00:00.000Z",
        "__v": 0
    })
}

// ── Organization tests ──────────────────────────────────────────────

#[tokio::test]
async fn test_read_all_organizations() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/organizations"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([org_json("o1", "Acme"), org_json("o2", "Globex")])),
        )
        .mount(&server)
        .await;

    let orgs: Vec<Organization> = client.read_all().await.unwrap();
    assert_eq!(orgs.len(), 2);
    assert_eq!(orgs[0].id.as_str(), "o1");
    assert_eq!(orgs[1].name, "Globex");
    assert_eq!(orgs[0].email.as_deref(), Some("hello@acme.test"));
    assert!(orgs[0].created_at.is_some());
}

#[tokio::test]
async fn test_update_organization_sends_only_changed_fields() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/api/organizations/o1"))
        .and(body_json(json!({"phone": "555-0100"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(org_json("o1", "Acme")))
        .expect(1)
        .mount(&server)
        .await;

    let patch = OrganizationPatch {
        phone: Some("555-0100".into()),
        ..OrganizationPatch::default()
    };
    let updated: Organization =
        ResourceApi::<Organization>::update(&client, &EntityId::from("o1"), &patch)
            .await
            .unwrap();
    assert_eq!(updated.id.as_str(), "o1");
}

#[tokio::test]
async fn test_delete_organization() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/api/organizations/o1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "deleted"})))
        .expect(1)
        .mount(&server)
        .await;

    ResourceApi::<Organization>::delete(&client, &EntityId::from("o1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_organization_options() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/organizations/dropdown"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"_id": "o1", "name": "Acme"},
            {"_id": "o2", "name": "Globex"}
        ])))
        .mount(&server)
        .await;

    let options = client.organization_options().await.unwrap();
    assert_eq!(options.len(), 2);
    assert_eq!(options[1].name, "Globex");
}

// ── Staff tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_staff_with_populated_organization() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/staff"))
        .and(body_json(json!({
            "firstName": "Ada",
            "lastName": "Lovelace",
            "email": "ada@acme.test",
            "phone": "555-0101",
            "organization": "o1",
            "role": "Developer"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "_id": "s1",
            "firstName": "Ada",
            "lastName": "Lovelace",
            "email": "ada@acme.test",
            "phone": "555-0101",
            "organization": org_json("o1", "Acme"),
            "role": "Developer"
        })))
        .mount(&server)
        .await;

    let draft = NewStaff {
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        email: "ada@acme.test".into(),
        phone: "555-0101".into(),
        organization: EntityId::from("o1"),
        role: StaffRole::Developer,
    };
    let created: Staff = client.create(&draft).await.unwrap();
    assert_eq!(created.full_name(), "Ada Lovelace");
    assert_eq!(created.organization.id().as_str(), "o1");
    assert_eq!(created.organization.name(), Some("Acme"));
}

#[tokio::test]
async fn test_staff_for_organization_filters_by_query() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/staff"))
        .and(query_param("organization", "o2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "_id": "s9",
            "firstName": "Grace",
            "lastName": "Hopper",
            "email": "grace@globex.test",
            "organization": "o2",
            "role": "Manager"
        }])))
        .mount(&server)
        .await;

    let staff = client
        .staff_for_organization(&EntityId::from("o2"))
        .await
        .unwrap();
    assert_eq!(staff.len(), 1);
    assert_eq!(staff[0].role, StaffRole::Manager);
    assert_eq!(staff[0].organization.name(), None);
}

// ── Error tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_server_message_is_surfaced() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/staff/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"message": "Staff member not found"})),
        )
        .mount(&server)
        .await;

    let result = ResourceApi::<Staff>::fetch(&client, &EntityId::from("missing")).await;
    let err = result.unwrap_err();
    assert!(err.is_not_found(), "expected not-found, got: {err:?}");
    assert_eq!(err.to_string(), "Staff member not found");
}

#[tokio::test]
async fn test_status_code_fallback_message() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/organizations"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let result: Result<Vec<Organization>, Error> = client.read_all().await;
    let err = result.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.to_string(), "Error Code: 502");
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/organizations"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let result: Result<Vec<Organization>, Error> = client.read_all().await;
    assert!(
        matches!(result, Err(Error::Deserialization { ref body, .. }) if body.contains("oops")),
        "expected Deserialization error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_slow_server_reports_configured_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/organizations"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let transport = TransportConfig {
        tls: TlsMode::DangerAcceptInvalid,
        timeout: Duration::from_secs(1),
        ..TransportConfig::default()
    };
    let base_url = Url::parse(&format!("{}/api", server.uri())).unwrap();
    let client = RestClient::new(base_url, &transport).unwrap();

    let result: Result<Vec<Organization>, Error> = client.read_all().await;
    assert!(
        matches!(result, Err(Error::Timeout { timeout_secs: 1 })),
        "expected Timeout error, got: {result:?}"
    );
}
