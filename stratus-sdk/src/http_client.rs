//! The authenticated request pipeline.
//!
//! Every typed operation in the SDK funnels through [`HttpClient::request`]:
//! it attaches the current auth token, refreshes-and-retries exactly once on
//! a 401, retries a bounded number of times on transport timeouts, and turns
//! any other non-2xx response into a typed [`Error`].

use crate::error::Error;
use crate::identity::{Account, EndpointTarget};
use bytes::Bytes;
use md5::{Digest, Md5};
use reqwest::header::{CONTENT_LENGTH, HeaderMap};
use reqwest::{Body, Method, Response, StatusCode};
use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

// retries after the first attempt, so 4 attempts total
const TIMEOUT_RETRIES: u32 = 3;

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const TRANSACTION_ID_HEADER: &str = "X-Trans-Id";

/// A request body that can be rebuilt for a retried attempt.
///
/// reqwest consumes its `Body`, so retries (the 401 refresh cycle, timeout
/// retries) need a description they can replay. `FileWindow` re-opens and
/// re-seeks on every attempt, which is the rewind contract large uploads
/// rely on.
#[derive(Clone, Debug)]
pub enum RequestBody {
    Empty,
    Bytes(Bytes),
    /// `len` bytes of the file at `path`, starting at `offset`.
    FileWindow {
        path: PathBuf,
        offset: u64,
        len: u64,
    },
}

impl RequestBody {
    pub fn len(&self) -> u64 {
        match self {
            RequestBody::Empty => 0,
            RequestBody::Bytes(bytes) => bytes.len() as u64,
            RequestBody::FileWindow { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn to_body(&self) -> Result<Body, Error> {
        match self {
            RequestBody::Empty => Ok(Body::from(Bytes::new())),
            RequestBody::Bytes(bytes) => Ok(Body::from(bytes.clone())),
            RequestBody::FileWindow { path, offset, len } => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(*offset)).await?;
                let window = file.take(*len);
                Ok(Body::wrap_stream(ReaderStream::new(window)))
            }
        }
    }

    /// Hex MD5 of the body, used as the upload `ETag` header. Files are
    /// digested in 64KB chunks rather than slurped.
    pub(crate) async fn md5_hex(&self) -> Result<String, Error> {
        match self {
            RequestBody::Empty => Ok(stratus_common::helper::md5_hex(b"")),
            RequestBody::Bytes(bytes) => Ok(stratus_common::helper::md5_hex(bytes)),
            RequestBody::FileWindow { path, offset, len } => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(*offset)).await?;
                let mut window = file.take(*len);
                let mut hasher = Md5::new();
                let mut buf = vec![0u8; 64 * 1024];
                loop {
                    let n = window.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(hex::encode(hasher.finalize()))
            }
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Bytes(bytes.into())
    }
}

/// HTTP client bound to one resolved service endpoint.
///
/// Paths passed to the verb methods are absolute (including the endpoint's
/// base path); use [`HttpClient::base_path`] when building them.
#[derive(Clone)]
pub struct HttpClient {
    account: Account,
    endpoint: EndpointTarget,
}

impl HttpClient {
    pub(crate) fn new(account: Account, endpoint: EndpointTarget) -> Self {
        Self { account, endpoint }
    }

    pub fn base_path(&self) -> &str {
        self.endpoint.base_path()
    }

    pub fn origin(&self) -> &str {
        self.endpoint.origin()
    }

    pub async fn get(&self, path: &str, headers: HeaderMap) -> Result<Response, Error> {
        self.request(Method::GET, path, RequestBody::Empty, headers)
            .await
    }

    pub async fn head(&self, path: &str, headers: HeaderMap) -> Result<Response, Error> {
        self.request(Method::HEAD, path, RequestBody::Empty, headers)
            .await
    }

    pub async fn delete(&self, path: &str, headers: HeaderMap) -> Result<Response, Error> {
        self.request(Method::DELETE, path, RequestBody::Empty, headers)
            .await
    }

    pub async fn put(&self, path: &str, headers: HeaderMap) -> Result<Response, Error> {
        self.request(Method::PUT, path, RequestBody::Empty, headers)
            .await
    }

    pub async fn post(
        &self,
        path: &str,
        body: Option<Bytes>,
        headers: HeaderMap,
    ) -> Result<Response, Error> {
        let body = body.map_or(RequestBody::Empty, RequestBody::Bytes);
        self.request(Method::POST, path, body, headers).await
    }

    /// PUT with an explicit content length, for bodies streamed from disk.
    pub async fn streaming_put(
        &self,
        path: &str,
        body: RequestBody,
        byte_count: u64,
        mut headers: HeaderMap,
    ) -> Result<Response, Error> {
        headers.insert(CONTENT_LENGTH, byte_count.into());
        self.request(Method::PUT, path, body, headers).await
    }

    /// One logical request. Retries are strictly sequential: never more than
    /// one attempt in flight.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        headers: HeaderMap,
    ) -> Result<Response, Error> {
        let url = format!("{}{}", self.endpoint.origin(), path);
        let mut refreshed = false;
        let mut timeouts = 0u32;
        loop {
            let token = self.account.auth_token().await?;
            let attempt = self
                .account
                .http()
                .request(method.clone(), &url)
                .headers(headers.clone())
                .header(AUTH_TOKEN_HEADER, &token)
                .body(body.to_body().await?)
                .send()
                .await;
            match attempt {
                Err(e) if e.is_timeout() => {
                    timeouts += 1;
                    if timeouts > TIMEOUT_RETRIES {
                        return Err(Error::Timeout {
                            method: method.to_string(),
                            path: path.to_owned(),
                        });
                    }
                    let delay = self.account.retry_delay() * timeouts;
                    warn!(%method, path, attempt = timeouts, ?delay, "request timed out, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
                Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED && !refreshed => {
                    // refresh exactly once, then re-issue the same request
                    debug!(%method, path, "provider returned HTTP 401, refreshing auth before retrying");
                    self.account.refresh().await?;
                    refreshed = true;
                }
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => return Err(Error::from_status(resp.status(), transaction_id(&resp))),
            }
        }
    }
}

pub(crate) fn transaction_id(resp: &Response) -> Option<String> {
    resp.headers()
        .get(TRANSACTION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}
