//! Compute: create, inspect and delete cloud servers.
//!
//! Server creation takes human-friendly flavor and image names and resolves
//! them to provider ids; unknown names fail with the list of valid options.

use crate::error::Error;
use crate::http_client::HttpClient;
use crate::identity::Account;
use crate::utils::string_or_number;
use base64::{Engine, engine::general_purpose};
use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const COMPUTE_SERVICE: &str = "cloudServersOpenStack";
const ACTIVE_STATUS: &str = "ACTIVE";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

/// Summary row from `GET /servers`.
#[derive(Clone, Debug, Deserialize)]
pub struct ServerSummary {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
}

/// One IP address entry; can be v4 or v6.
#[derive(Clone, Debug, Deserialize)]
pub struct Address {
    pub addr: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Addresses {
    #[serde(default)]
    pub public: Vec<Address>,
    #[serde(default)]
    pub private: Vec<Address>,
}

/// Full server record from `GET /servers/<id>`.
#[derive(Clone, Debug, Deserialize)]
pub struct ServerDetail {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub addresses: Addresses,
}

#[derive(Clone, Debug, Deserialize)]
struct NamedRef {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct ServersEnvelope {
    servers: Vec<ServerSummary>,
}

#[derive(Deserialize)]
struct ServerEnvelope {
    server: ServerDetail,
}

#[derive(Deserialize)]
struct FlavorsEnvelope {
    flavors: Vec<NamedRef>,
}

#[derive(Deserialize)]
struct ImagesEnvelope {
    images: Vec<NamedRef>,
}

/// The server collection for one region.
pub struct Servers {
    client: HttpClient,
    region: String,
}

impl Servers {
    pub(crate) async fn new(account: &Account, region: &str) -> Result<Self, Error> {
        Ok(Self {
            client: account.http_client(COMPUTE_SERVICE, Some(region)).await?,
            region: region.to_owned(),
        })
    }

    fn servers_path(&self) -> String {
        format!("{}/servers", self.client.base_path())
    }

    /// All servers in this region.
    pub async fn list(&self) -> Result<Vec<ServerSummary>, Error> {
        let resp = self.client.get(&self.servers_path(), json_headers()).await?;
        let envelope: ServersEnvelope = serde_json::from_str(&resp.text().await?)?;
        Ok(envelope.servers)
    }

    /// Look a server up by its display name. `None` when no server matches.
    pub async fn get(&self, server_name: &str) -> Result<Option<Server>, Error> {
        let found = self
            .list()
            .await?
            .into_iter()
            .find(|row| row.name == server_name);
        Ok(found.map(|row| Server::new(self.client.clone(), &self.region, &row.id)))
    }

    /// A handle on a server whose id is already known. No network call.
    pub fn by_id(&self, server_id: &str) -> Server {
        Server::new(self.client.clone(), &self.region, server_id)
    }

    /// Create a new server.
    ///
    /// `flavor_name` and `image_name` are matched case-insensitively as
    /// substrings against the provider's flavor/image names. `files` places
    /// content on the new server's disk (path, contents).
    pub async fn create(
        &self,
        server_name: &str,
        flavor_name: &str,
        image_name: &str,
        files: &[(&str, &[u8])],
    ) -> Result<Server, Error> {
        let flavor_ref = self.flavor_name_to_id(flavor_name).await?;
        let image_ref = self.image_name_to_id(image_name).await?;

        let mut server = serde_json::json!({
            "name": server_name,
            "imageRef": image_ref,
            "flavorRef": flavor_ref,
        });
        if !files.is_empty() {
            let personality: Vec<serde_json::Value> = files
                .iter()
                .map(|(path, contents)| {
                    serde_json::json!({
                        "path": path,
                        "contents": general_purpose::STANDARD.encode(contents),
                    })
                })
                .collect();
            server["personality"] = personality.into();
        }
        let body = serde_json::to_vec(&serde_json::json!({ "server": server }))?;

        debug!(server_name, region = self.region, "creating server");
        let resp = self
            .client
            .post(&self.servers_path(), Some(Bytes::from(body)), json_headers())
            .await?;
        let envelope: ServerEnvelope = serde_json::from_str(&resp.text().await?)?;
        Ok(Server::new(self.client.clone(), &self.region, &envelope.server.id))
    }

    async fn flavors(&self) -> Result<Vec<NamedRef>, Error> {
        let path = format!("{}/flavors", self.client.base_path());
        let resp = self.client.get(&path, json_headers()).await?;
        let envelope: FlavorsEnvelope = serde_json::from_str(&resp.text().await?)?;
        Ok(envelope.flavors)
    }

    async fn images(&self) -> Result<Vec<NamedRef>, Error> {
        let path = format!("{}/images", self.client.base_path());
        let resp = self.client.get(&path, json_headers()).await?;
        let envelope: ImagesEnvelope = serde_json::from_str(&resp.text().await?)?;
        Ok(envelope.images)
    }

    async fn flavor_name_to_id(&self, name: &str) -> Result<String, Error> {
        let flavors = self.flavors().await?;
        match_named_ref(flavors, name, "flavors")
    }

    async fn image_name_to_id(&self, name: &str) -> Result<String, Error> {
        let images = self.images().await?;
        match_named_ref(images, name, "images")
    }
}

fn match_named_ref(rows: Vec<NamedRef>, wanted: &str, what: &str) -> Result<String, Error> {
    let wanted_lower = wanted.to_lowercase();
    if let Some(row) = rows
        .iter()
        .find(|row| row.name.to_lowercase().contains(&wanted_lower))
    {
        return Ok(row.id.clone());
    }
    let valid: Vec<&str> = rows.iter().map(|row| row.name.as_str()).collect();
    Err(Error::InvalidArgument(format!(
        "valid {what} are: {}",
        valid.join(", ")
    )))
}

/// Handle on one server.
pub struct Server {
    client: HttpClient,
    region: String,
    server_id: String,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("region", &self.region)
            .field("server_id", &self.server_id)
            .finish_non_exhaustive()
    }
}

impl Server {
    fn new(client: HttpClient, region: &str, server_id: &str) -> Self {
        Self {
            client,
            region: region.to_owned(),
            server_id: server_id.to_owned(),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn server_path(&self) -> String {
        format!("{}/servers/{}", self.client.base_path(), self.server_id)
    }

    pub async fn details(&self) -> Result<ServerDetail, Error> {
        let resp = self.client.get(&self.server_path(), json_headers()).await?;
        let envelope: ServerEnvelope = serde_json::from_str(&resp.text().await?)?;
        Ok(envelope.server)
    }

    pub async fn delete(&self) -> Result<(), Error> {
        debug!(server_id = self.server_id, "deleting server");
        self.client.delete(&self.server_path(), json_headers()).await?;
        Ok(())
    }

    /// Poll until the server reaches ACTIVE. Useful after creation.
    pub async fn wait_for_active(&self, poll_interval: Option<Duration>) -> Result<(), Error> {
        let interval = poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL);
        loop {
            if self.details().await?.status == ACTIVE_STATUS {
                return Ok(());
            }
            debug!(server_id = self.server_id, "not online yet, waiting");
            tokio::time::sleep(interval).await;
        }
    }

    pub async fn public_addresses(&self) -> Result<Vec<String>, Error> {
        Ok(extract_addrs(self.details().await?.addresses.public))
    }

    pub async fn private_addresses(&self) -> Result<Vec<String>, Error> {
        Ok(extract_addrs(self.details().await?.addresses.private))
    }
}

fn extract_addrs(addrs: Vec<Address>) -> Vec<String> {
    addrs.into_iter().map(|a| a.addr).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs() -> Vec<NamedRef> {
        vec![
            NamedRef {
                id: "2".to_owned(),
                name: "512MB Standard Instance".to_owned(),
            },
            NamedRef {
                id: "3".to_owned(),
                name: "1GB Standard Instance".to_owned(),
            },
        ]
    }

    #[test]
    fn match_named_ref_test() {
        // case-insensitive substring match
        assert_eq!(match_named_ref(refs(), "512mb", "flavors").unwrap(), "2");
        assert_eq!(match_named_ref(refs(), "1GB", "flavors").unwrap(), "3");

        let err = match_named_ref(refs(), "8GB", "flavors").unwrap_err();
        match err {
            Error::InvalidArgument(msg) => {
                assert!(msg.contains("512MB Standard Instance"));
                assert!(msg.contains("1GB Standard Instance"));
            }
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
    }

    #[test]
    fn server_detail_numeric_id_test() {
        let body = serde_json::json!({
            "server": {"id": 12345, "name": "web-1", "status": "BUILD"}
        });
        let envelope: ServerEnvelope = serde_json::from_value(body).unwrap();
        assert_eq!(envelope.server.id, "12345");
        assert!(envelope.server.addresses.public.is_empty());
    }
}
