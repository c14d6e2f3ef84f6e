//! Shared scaffolding: a mock provider with an identity endpoint whose
//! catalog points every service back at the mock server.

#![allow(dead_code)]

use serde_json::json;
use std::time::Duration;
use stratus_sdk::Account;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const STORAGE_BASE: &str = "/v1/MossoCloudFS_abc";
pub const CDN_BASE: &str = "/v1/MossoCloudCDN_abc";
pub const COMPUTE_BASE: &str = "/compute/v2/acct";
pub const IDENTITY_BASE: &str = "/v2.0";

pub fn identity_body(server_uri: &str, token: &str) -> serde_json::Value {
    json!({
        "access": {
            "token": {"id": token},
            "serviceCatalog": [
                {"name": "cloudFiles", "endpoints": [
                    {"region": "ORD", "publicURL": format!("{server_uri}{STORAGE_BASE}")}
                ]},
                {"name": "cloudFilesCDN", "endpoints": [
                    {"region": "ORD", "publicURL": format!("{server_uri}{CDN_BASE}")}
                ]},
                {"name": "cloudServersOpenStack", "endpoints": [
                    {"region": "ORD", "publicURL": format!("{server_uri}{COMPUTE_BASE}")}
                ]},
                {"name": "identity", "endpoints": [
                    {"publicURL": format!("{server_uri}{IDENTITY_BASE}")}
                ]}
            ]
        }
    })
}

/// Mount the identity exchange, serving `token`, expecting exactly `times`
/// exchanges over the test.
pub async fn mount_identity(server: &MockServer, token: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/v2.0/tokens"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(identity_body(&server.uri(), token)),
        )
        .expect(times)
        .mount(server)
        .await;
}

/// An account wired to the mock server, with retry backoff disabled.
pub fn account(server: &MockServer) -> Account {
    Account::builder()
        .username("fred")
        .api_key("api-key")
        .identity_endpoint(server.uri())
        .retry_delay(Duration::ZERO)
        .build()
}

/// Same, but with a short per-attempt timeout for the timeout-retry tests.
pub fn flaky_network_account(server: &MockServer) -> Account {
    Account::builder()
        .username("fred")
        .api_key("api-key")
        .identity_endpoint(server.uri())
        .read_timeout(Duration::from_millis(50))
        .retry_delay(Duration::ZERO)
        .build()
}
