//! Object storage: containers, objects, CDN enablement and temp URLs.

mod container;
mod types;

pub use container::{Container, LARGE_FILE_SEGMENT_SIZE, LARGE_FILE_THRESHOLD, UploadSource};
pub use types::{
    AccountMetadata, CdnMetadata, ContainerMetadata, ListOptions, ObjectDetail, ObjectMetadata,
};

use crate::error::Error;
use crate::http_client::HttpClient;
use crate::identity::Account;
use reqwest::Response;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::debug;

const STORAGE_SERVICE: &str = "cloudFiles";
const CDN_SERVICE: &str = "cloudFilesCDN";

/// The container collection for one region. Mostly a factory for
/// [`Container`] handles, plus the handful of account-wide operations.
pub struct Containers {
    storage_client: HttpClient,
    cdn_client: HttpClient,
    region: String,
}

impl Containers {
    pub(crate) async fn new(account: &Account, region: &str) -> Result<Self, Error> {
        Ok(Self {
            storage_client: account.http_client(STORAGE_SERVICE, Some(region)).await?,
            cdn_client: account.http_client(CDN_SERVICE, Some(region)).await?,
            region: region.to_owned(),
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// A handle on one container. Validates the name before any network
    /// call: `/` would make object paths ambiguous.
    pub fn get(&self, container_name: &str) -> Result<Container, Error> {
        if container_name.contains('/') {
            return Err(Error::InvalidArgument(
                "the container name must not contain '/'".to_owned(),
            ));
        }
        Ok(Container::new(
            self.storage_client.clone(),
            self.cdn_client.clone(),
            container_name,
        ))
    }

    /// Account-wide storage counters.
    pub async fn metadata(&self) -> Result<AccountMetadata, Error> {
        let path = self.storage_client.base_path().to_owned();
        debug!(path, "retrieving account storage metadata");
        let resp = self.storage_client.head(&path, HeaderMap::new()).await?;
        Ok(AccountMetadata {
            containers: header_u64(&resp, "X-Account-Container-Count"),
            objects: header_u64(&resp, "X-Account-Object-Count"),
            bytes: header_u64(&resp, "X-Account-Bytes-Used"),
        })
    }

    /// Set the account-wide secret used to sign temp URLs.
    ///
    /// This invalidates every previously generated temp URL for the whole
    /// account.
    pub async fn set_temp_url_key(&self, secret: &str) -> Result<(), Error> {
        let path = self.storage_client.base_path().to_owned();
        debug!(path, "setting account temp URL key");
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Account-Meta-Temp-Url-Key",
            HeaderValue::from_str(secret)
                .map_err(|_| Error::InvalidArgument("temp URL key is not a valid header value".to_owned()))?,
        );
        self.storage_client.post(&path, None, headers).await?;
        Ok(())
    }
}

pub(crate) fn header_u64(resp: &Response, name: &str) -> u64 {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

pub(crate) fn header_string(resp: &Response, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}
