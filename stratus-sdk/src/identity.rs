//! Account handle: credentials, identity exchange and the service catalog.
//!
//! The identity API trades a username/API-key pair for a short-lived auth
//! token plus a catalog of regional service endpoints. Both are cached so we
//! don't burn an exchange on every request; see [`crate::cache`].

use crate::cache::{MemoryCache, TokenCache};
use crate::error::Error;
use crate::http_client::{HttpClient, transaction_id};
use crate::servers::Servers;
use crate::storage::Containers;
use crate::users::Users;
use bon::bon;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const DEFAULT_IDENTITY_ENDPOINT: &str = "https://identity.api.rackspacecloud.com";
const TOKENS_PATH: &str = "/v2.0/tokens";
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(70);
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// One regional API endpoint for a service. `region` is `None` for services
/// that are not regional (e.g. identity itself).
#[derive(Clone, Debug)]
pub struct RegionEndpoint {
    pub region: Option<String>,
    pub public_url: String,
}

/// The cached result of an identity exchange. Replaced wholesale on every
/// refresh, never merged.
#[derive(Clone, Debug, Default)]
pub struct IdentityRecord {
    pub auth_token: String,
    pub service_catalog: HashMap<String, Vec<RegionEndpoint>>,
}

// region:    --- identity wire envelope
#[derive(Deserialize)]
struct TokensResponse {
    access: Access,
}

#[derive(Deserialize)]
struct Access {
    token: Token,
    // a missing or empty catalog is an empty map, not an error
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<CatalogService>,
}

#[derive(Deserialize)]
struct Token {
    id: String,
}

#[derive(Deserialize)]
struct CatalogService {
    name: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Deserialize)]
struct CatalogEndpoint {
    #[serde(default)]
    region: Option<String>,
    #[serde(rename = "publicURL")]
    public_url: String,
}
// endregion: --- identity wire envelope

impl From<TokensResponse> for IdentityRecord {
    fn from(resp: TokensResponse) -> Self {
        let mut service_catalog: HashMap<String, Vec<RegionEndpoint>> = HashMap::new();
        for service in resp.access.service_catalog {
            let endpoints = service.endpoints.into_iter().map(|e| RegionEndpoint {
                region: e.region,
                public_url: e.public_url,
            });
            service_catalog
                .entry(service.name)
                .or_default()
                .extend(endpoints);
        }
        IdentityRecord {
            auth_token: resp.access.token.id,
            service_catalog,
        }
    }
}

/// scheme+host vs path of a resolved public URL. Recomputed on demand from
/// the catalog, never cached itself.
#[derive(Clone, Debug)]
pub struct EndpointTarget {
    origin: String,
    base_path: String,
}

impl EndpointTarget {
    pub(crate) fn parse(public_url: &str) -> Result<Self, Error> {
        let url = Url::parse(public_url)
            .map_err(|e| Error::UnexpectedResponse(format!("bad endpoint URL {public_url}: {e}")))?;
        if !url.has_host() {
            return Err(Error::UnexpectedResponse(format!(
                "endpoint URL has no host: {public_url}"
            )));
        }
        Ok(EndpointTarget {
            origin: url.origin().ascii_serialization(),
            base_path: url.path().trim_end_matches('/').to_owned(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}

struct AccountInner {
    username: String,
    api_key: String,
    cache: Arc<dyn TokenCache>,
    identity_endpoint: String,
    retry_delay: Duration,
    http_client: reqwest::Client,
}

/// Handle on one provider account. Cheap to clone; clones share the same
/// credential cache and HTTP connection pool.
#[derive(Clone)]
pub struct Account {
    inner: Arc<AccountInner>,
}

#[bon]
impl Account {
    /// - `cache`: backing store for identity records, defaults to an
    ///   in-process [`MemoryCache`]. Inject a shared store to let several
    ///   handles for the same account reuse one token.
    /// - `identity_endpoint`: override the well-known identity host, mainly
    ///   for talking to a test double.
    /// - `read_timeout`: per-attempt HTTP timeout (default 70s).
    /// - `retry_delay`: backoff unit between timeout retries (default 5s,
    ///   set to zero in tests/CI).
    #[builder(on(String, into))]
    pub fn new(
        username: String,
        api_key: String,
        cache: Option<Arc<dyn TokenCache>>,
        identity_endpoint: Option<String>,
        read_timeout: Option<Duration>,
        retry_delay: Option<Duration>,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT))
            .user_agent(concat!("stratus-sdk ", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("default TLS backend unavailable");
        Self {
            inner: Arc::new(AccountInner {
                username,
                api_key,
                cache: cache.unwrap_or_else(|| Arc::new(MemoryCache::new())),
                identity_endpoint: identity_endpoint
                    .unwrap_or_else(|| DEFAULT_IDENTITY_ENDPOINT.to_owned()),
                retry_delay: retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
                http_client,
            }),
        }
    }
}

impl Account {
    pub fn username(&self) -> &str {
        &self.inner.username
    }

    // keyed off the username only, so repeated handles share one slot
    fn cache_key(&self) -> String {
        format!("stratus-{}", self.inner.username)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http_client
    }

    pub(crate) fn retry_delay(&self) -> Duration {
        self.inner.retry_delay
    }

    /// The current auth token, performing an identity exchange if nothing is
    /// cached yet.
    pub async fn auth_token(&self) -> Result<String, Error> {
        Ok(self.identity().await?.auth_token)
    }

    pub(crate) async fn identity(&self) -> Result<IdentityRecord, Error> {
        if let Some(record) = self.inner.cache.read(&self.cache_key()) {
            return Ok(record);
        }
        self.refresh().await
    }

    /// Perform the identity exchange and replace the cached record.
    ///
    /// This call never retries on 401: a fresh exchange rejected with 401
    /// means the credentials themselves are bad.
    pub async fn refresh(&self) -> Result<IdentityRecord, Error> {
        debug!(username = %self.inner.username, "requesting fresh identity token");
        let payload = serde_json::json!({
            "auth": {
                "RAX-KSKEY:apiKeyCredentials": {
                    "username": self.inner.username,
                    "apiKey": self.inner.api_key,
                }
            }
        });
        let url = format!("{}{}", self.inner.identity_endpoint, TOKENS_PATH);
        let resp = self.inner.http_client.post(&url).json(&payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::from_status(status, transaction_id(&resp)));
        }
        let tokens: TokensResponse = resp.json().await?;
        let record = IdentityRecord::from(tokens);
        self.inner.cache.write(&self.cache_key(), record.clone());
        Ok(record)
    }

    /// Resolve the public base URL for `service` in `region`.
    pub async fn public_endpoint(
        &self,
        service: &str,
        region: Option<&str>,
    ) -> Result<String, Error> {
        let record = self.identity().await?;
        resolve_endpoint(&record, service, region)
    }

    /// All service names present in the catalog, for introspection.
    pub async fn service_names(&self) -> Result<BTreeSet<String>, Error> {
        let record = self.identity().await?;
        Ok(record.service_catalog.keys().cloned().collect())
    }

    /// An authenticated HTTP client bound to the resolved endpoint for
    /// `service`. Most callers want the typed facades instead.
    pub async fn http_client(
        &self,
        service: &str,
        region: Option<&str>,
    ) -> Result<HttpClient, Error> {
        let url = self.public_endpoint(service, region).await?;
        let target = EndpointTarget::parse(&url)?;
        Ok(HttpClient::new(self.clone(), target))
    }

    /// The cloud-files container collection for one region.
    pub async fn containers(&self, region: &str) -> Result<Containers, Error> {
        Containers::new(self, region).await
    }

    /// The cloud-servers collection for one region.
    pub async fn servers(&self, region: &str) -> Result<Servers, Error> {
        Servers::new(self, region).await
    }

    /// The user collection for this account.
    pub async fn users(&self) -> Result<Users, Error> {
        Users::new(self).await
    }
}

/// Catalog resolution. Failures are hard errors; callers must never proceed
/// with an empty base URL.
fn resolve_endpoint(
    record: &IdentityRecord,
    service: &str,
    region: Option<&str>,
) -> Result<String, Error> {
    let endpoints = record
        .service_catalog
        .get(service)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| Error::UnknownService(service.to_owned()))?;

    // a lone endpoint wins whether or not a region was asked for, which also
    // covers non-regional services
    if let [only] = endpoints.as_slice() {
        return Ok(only.public_url.clone());
    }

    match region {
        Some(region) => {
            let wanted = region.to_ascii_uppercase();
            endpoints
                .iter()
                .find(|e| {
                    e.region
                        .as_deref()
                        .is_some_and(|r| r.eq_ignore_ascii_case(&wanted))
                })
                .map(|e| e.public_url.clone())
                .ok_or_else(|| Error::UnknownService(format!("{service} ({wanted})")))
        }
        None => Err(Error::AmbiguousRegion {
            service: service.to_owned(),
            regions: endpoints
                .iter()
                .filter_map(|e| e.region.as_deref())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}
