mod common;

use common::{COMPUTE_BASE, account, mount_identity};
use base64::{Engine, engine::general_purpose};
use serde_json::json;
use stratus_sdk::Error;
use stratus_sdk::servers::Servers;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn servers(server: &MockServer) -> Servers {
    mount_identity(server, "tok-1", 1).await;
    account(server).servers("ORD").await.unwrap()
}

async fn mount_flavors_and_images(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("{COMPUTE_BASE}/flavors")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"flavors": [
            {"id": 2, "name": "512MB Standard Instance"},
            {"id": 3, "name": "1GB Standard Instance"}
        ]})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{COMPUTE_BASE}/images")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"images": [
            {"id": "img-ubuntu", "name": "Ubuntu 10.04 LTS"},
            {"id": "img-debian", "name": "Debian 7"}
        ]})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn create_resolves_flavor_and_image_names() {
    let server = MockServer::start().await;
    let servers = servers(&server).await;
    mount_flavors_and_images(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{COMPUTE_BASE}/servers")))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(json!({"server": {"id": "srv-1", "name": "web-1"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let created = servers
        .create(
            "web-1",
            "512mb",
            "ubuntu",
            &[("/root/.ssh/authorized_keys", b"ssh-rsa AAAA".as_slice())],
        )
        .await
        .unwrap();
    assert_eq!(created.server_id(), "srv-1");

    let post = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.method.to_string() == "POST" && r.url.path().ends_with("/servers"))
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&post.body).unwrap();
    assert_eq!(body["server"]["name"], "web-1");
    assert_eq!(body["server"]["flavorRef"], "2");
    assert_eq!(body["server"]["imageRef"], "img-ubuntu");
    assert_eq!(
        body["server"]["personality"][0]["contents"],
        general_purpose::STANDARD.encode(b"ssh-rsa AAAA")
    );
}

#[tokio::test]
async fn create_with_unknown_flavor_lists_valid_options() {
    let server = MockServer::start().await;
    let servers = servers(&server).await;
    mount_flavors_and_images(&server).await;

    let err = servers
        .create("web-1", "8GB", "ubuntu", &[])
        .await
        .unwrap_err();
    match err {
        Error::InvalidArgument(msg) => {
            assert!(msg.contains("512MB Standard Instance"));
            assert!(msg.contains("1GB Standard Instance"));
        }
        other => panic!("expected InvalidArgument, got {other:?}"),
    }
}

#[tokio::test]
async fn get_finds_servers_by_name() {
    let server = MockServer::start().await;
    let servers = servers(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{COMPUTE_BASE}/servers")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"servers": [
            {"id": "srv-1", "name": "web-1"},
            {"id": "srv-2", "name": "db-1"}
        ]})))
        .mount(&server)
        .await;

    let found = servers.get("db-1").await.unwrap().unwrap();
    assert_eq!(found.server_id(), "srv-2");

    assert!(servers.get("no-such-server").await.unwrap().is_none());
}

#[tokio::test]
async fn details_addresses_and_delete() {
    let server = MockServer::start().await;
    let servers = servers(&server).await;
    let handle = servers.by_id("srv-1");

    Mock::given(method("GET"))
        .and(path(format!("{COMPUTE_BASE}/servers/srv-1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"server": {
            "id": "srv-1",
            "name": "web-1",
            "status": "ACTIVE",
            "addresses": {
                "public": [{"addr": "203.0.113.10"}, {"addr": "2001:db8::1"}],
                "private": [{"addr": "10.0.0.4"}]
            }
        }})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{COMPUTE_BASE}/servers/srv-1")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let details = handle.details().await.unwrap();
    assert_eq!(details.status, "ACTIVE");

    assert_eq!(
        handle.public_addresses().await.unwrap(),
        vec!["203.0.113.10", "2001:db8::1"]
    );
    assert_eq!(handle.private_addresses().await.unwrap(), vec!["10.0.0.4"]);

    handle.delete().await.unwrap();
}

#[tokio::test]
async fn wait_for_active_polls_until_active() {
    let server = MockServer::start().await;
    let servers = servers(&server).await;
    let handle = servers.by_id("srv-1");

    let building = json!({"server": {"id": "srv-1", "name": "web-1", "status": "BUILD"}});
    let active = json!({"server": {"id": "srv-1", "name": "web-1", "status": "ACTIVE"}});
    Mock::given(method("GET"))
        .and(path(format!("{COMPUTE_BASE}/servers/srv-1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(building))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{COMPUTE_BASE}/servers/srv-1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(active))
        .expect(1)
        .mount(&server)
        .await;

    handle
        .wait_for_active(Some(std::time::Duration::ZERO))
        .await
        .unwrap();
}
