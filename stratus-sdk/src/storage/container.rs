//! A single cloud-files container: uploads (including segmented large-object
//! uploads), downloads, listings, CDN controls and temp URLs.

use super::types::{
    CdnMetadata, ContainerMetadata, ListOptions, ObjectDetail, ObjectMetadata, SegmentRecord,
};
use super::{header_string, header_u64};
use crate::error::Error;
use crate::http_client::{HttpClient, RequestBody};
use crate::utils::{content_type_needs_cors, extension_content_type, url_encode};
use bytes::Bytes;
use reqwest::Response;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use std::path::{Path, PathBuf};
use stratus_common::helper::sign_hmac_sha1_hex;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Payloads above this are split into segments plus a manifest (5 GiB).
pub const LARGE_FILE_THRESHOLD: u64 = 5_368_709_120;
/// Fixed segment size for large uploads (100 MiB); the final segment may be
/// shorter.
pub const LARGE_FILE_SEGMENT_SIZE: u64 = 104_857_600;
/// Provider ceiling on items per listing request.
pub const MAX_ITEMS_PER_LIST: u64 = 10_000;

const DEFAULT_CDN_TTL: u64 = 259_200; // 72 hours

/// Where an upload's bytes come from. Both variants can be replayed from the
/// start, so a 401-triggered retry can rewind mid-upload, and both can be
/// windowed for segmenting.
#[derive(Clone, Debug)]
pub enum UploadSource {
    Bytes(Bytes),
    File(PathBuf),
}

impl UploadSource {
    async fn byte_count(&self) -> Result<u64, Error> {
        match self {
            UploadSource::Bytes(bytes) => Ok(bytes.len() as u64),
            UploadSource::File(path) => Ok(tokio::fs::metadata(path).await?.len()),
        }
    }

    fn window(&self, offset: u64, len: u64) -> RequestBody {
        match self {
            UploadSource::Bytes(bytes) => {
                let start = (offset as usize).min(bytes.len());
                let end = ((offset + len) as usize).min(bytes.len());
                RequestBody::Bytes(bytes.slice(start..end))
            }
            UploadSource::File(path) => RequestBody::FileWindow {
                path: path.clone(),
                offset,
                len,
            },
        }
    }

    // content-type fallback for file sources whose key has no extension
    fn path_hint(&self) -> Option<&str> {
        match self {
            UploadSource::Bytes(_) => None,
            UploadSource::File(path) => path.to_str(),
        }
    }
}

impl From<Bytes> for UploadSource {
    fn from(bytes: Bytes) -> Self {
        UploadSource::Bytes(bytes)
    }
}

impl From<Vec<u8>> for UploadSource {
    fn from(bytes: Vec<u8>) -> Self {
        UploadSource::Bytes(bytes.into())
    }
}

impl From<String> for UploadSource {
    fn from(s: String) -> Self {
        UploadSource::Bytes(s.into())
    }
}

impl From<&Path> for UploadSource {
    fn from(path: &Path) -> Self {
        UploadSource::File(path.to_path_buf())
    }
}

impl From<PathBuf> for UploadSource {
    fn from(path: PathBuf) -> Self {
        UploadSource::File(path)
    }
}

/// Handle on one container. Obtained from [`super::Containers::get`].
pub struct Container {
    storage_client: HttpClient,
    cdn_client: HttpClient,
    name: String,
    large_file_threshold: u64,
    segment_size: u64,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name)
            .field("large_file_threshold", &self.large_file_threshold)
            .field("segment_size", &self.segment_size)
            .finish_non_exhaustive()
    }
}

impl Container {
    pub(crate) fn new(storage_client: HttpClient, cdn_client: HttpClient, name: &str) -> Self {
        Self {
            storage_client,
            cdn_client,
            name: name.to_owned(),
            large_file_threshold: LARGE_FILE_THRESHOLD,
            segment_size: LARGE_FILE_SEGMENT_SIZE,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tune the segmenting constants, e.g. for tests or slow links. Sizes
    /// must be non-zero.
    pub fn with_segmenting(
        mut self,
        large_file_threshold: u64,
        segment_size: u64,
    ) -> Result<Self, Error> {
        if large_file_threshold == 0 || segment_size == 0 {
            return Err(Error::InvalidArgument(
                "segmenting sizes must be non-zero".to_owned(),
            ));
        }
        self.large_file_threshold = large_file_threshold;
        self.segment_size = segment_size;
        Ok(self)
    }

    fn container_path(&self) -> String {
        format!(
            "{}/{}",
            self.storage_client.base_path(),
            url_encode(&self.name)
        )
    }

    fn cdn_container_path(&self) -> String {
        format!("{}/{}", self.cdn_client.base_path(), url_encode(&self.name))
    }

    fn object_path(&self, key: &str) -> String {
        format!("{}/{}", self.container_path(), url_encode(key))
    }

    /// Upload `source` as `key`, returning the provider's ETag.
    ///
    /// Extra headers (content type, content disposition, ...) are passed
    /// through; a content type is otherwise inferred from the key's
    /// extension. Payloads over the large-file threshold are uploaded as
    /// fixed-size segments finalized by a manifest.
    pub async fn upload(
        &self,
        key: &str,
        source: impl Into<UploadSource>,
        headers: HeaderMap,
    ) -> Result<String, Error> {
        let source = source.into();
        let byte_count = source.byte_count().await?;
        if byte_count <= self.large_file_threshold {
            self.upload_single(key, &source, 0, byte_count, headers)
                .await
        } else {
            self.upload_segmented(key, &source, byte_count, headers)
                .await
        }
    }

    async fn upload_single(
        &self,
        key: &str,
        source: &UploadSource,
        offset: u64,
        byte_count: u64,
        mut headers: HeaderMap,
    ) -> Result<String, Error> {
        let body = source.window(offset, byte_count);
        if !headers.contains_key(CONTENT_TYPE) {
            let inferred = extension_content_type(key)
                .or_else(|| source.path_hint().and_then(extension_content_type))
                .unwrap_or("application/octet-stream");
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(inferred));
        }
        let md5 = body.md5_hex().await?;
        headers.insert("ETag", HeaderValue::from_str(&md5).unwrap());
        if content_type_needs_cors(key) {
            headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
        }

        let full_path = self.object_path(key);
        debug!(bytes = byte_count, path = full_path, "uploading object");
        let resp = self
            .storage_client
            .streaming_put(&full_path, body, byte_count, headers)
            .await?;
        etag_header(&resp)
    }

    // Segments go up in strictly increasing index order, each waiting for
    // the previous response: the manifest needs the exact per-segment etag
    // and size. Any failure aborts the whole upload; already-uploaded
    // segments are left behind for the provider to reconcile.
    async fn upload_segmented(
        &self,
        key: &str,
        source: &UploadSource,
        byte_count: u64,
        headers: HeaderMap,
    ) -> Result<String, Error> {
        let segment_count = byte_count.div_ceil(self.segment_size);
        debug!(
            bytes = byte_count,
            segments = segment_count,
            key,
            "uploading large object in segments"
        );
        let mut segments: Vec<SegmentRecord> = Vec::with_capacity(segment_count as usize);
        for index in 0..segment_count {
            let offset = index * self.segment_size;
            let len = self.segment_size.min(byte_count - offset);
            let segment_key = format!("{key}.{index:03}");
            let etag = self
                .upload_single(&segment_key, source, offset, len, headers.clone())
                .await?;
            segments.push(SegmentRecord {
                path: format!("{}/{}", self.name, segment_key),
                etag,
                size_bytes: len,
            });
        }

        let manifest = serde_json::to_vec(&segments)?;
        let manifest_len = manifest.len() as u64;
        let manifest_path = format!("{}?multipart-manifest=put", self.object_path(key));
        let resp = self
            .storage_client
            .streaming_put(
                &manifest_path,
                RequestBody::Bytes(manifest.into()),
                manifest_len,
                HeaderMap::new(),
            )
            .await?;
        etag_header(&resp)
    }

    /// Download the object at `key` into a local file, returning the number
    /// of bytes written.
    pub async fn download(&self, key: &str, filepath: &Path) -> Result<u64, Error> {
        let object_path = self.object_path(key);
        debug!(path = object_path, "downloading object");
        let mut resp = self.storage_client.get(&object_path, HeaderMap::new()).await?;
        let mut file = tokio::fs::File::create(filepath).await?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    /// Delete `key`. If the container is CDN enabled the object is served
    /// from the edge until its TTL expires.
    pub async fn delete(&self, key: &str) -> Result<(), Error> {
        let object_path = self.object_path(key);
        debug!(path = object_path, "deleting object");
        self.storage_client
            .delete(&object_path, HeaderMap::new())
            .await?;
        Ok(())
    }

    /// Evict `key` from the CDN edge caches without deleting it from the
    /// container. Expensive on the provider side; use sparingly.
    pub async fn purge_from_akamai(&self, key: &str, email_address: &str) -> Result<(), Error> {
        let object_path = format!("{}/{}", self.cdn_container_path(), url_encode(key));
        debug!(path = object_path, "requesting CDN purge");
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Purge-Email",
            HeaderValue::from_str(email_address)
                .map_err(|_| Error::InvalidArgument("invalid purge email address".to_owned()))?,
        );
        self.cdn_client.delete(&object_path, headers).await?;
        Ok(())
    }

    /// Metadata for a single object.
    pub async fn object_metadata(&self, key: &str) -> Result<ObjectMetadata, Error> {
        let object_path = self.object_path(key);
        debug!(path = object_path, "requesting object metadata");
        let resp = self.storage_client.head(&object_path, HeaderMap::new()).await?;
        Ok(ObjectMetadata {
            content_type: header_string(&resp, "Content-Type"),
            bytes: header_u64(&resp, "Content-Length"),
        })
    }

    /// Object count and byte usage for this container.
    pub async fn metadata(&self) -> Result<ContainerMetadata, Error> {
        let path = self.container_path();
        debug!(path, "requesting container metadata");
        let resp = self.storage_client.head(&path, HeaderMap::new()).await?;
        Ok(ContainerMetadata {
            objects: header_u64(&resp, "X-Container-Object-Count"),
            bytes: header_u64(&resp, "X-Container-Bytes-Used"),
        })
    }

    /// CDN details for this container. Callable on non-CDN containers, but
    /// the answers won't mean much.
    pub async fn cdn_metadata(&self) -> Result<CdnMetadata, Error> {
        let path = self.cdn_container_path();
        debug!(path, "requesting container CDN metadata");
        let resp = self.cdn_client.head(&path, HeaderMap::new()).await?;
        Ok(CdnMetadata {
            cdn_enabled: header_string(&resp, "X-CDN-Enabled").as_deref() == Some("True"),
            host: header_string(&resp, "X-CDN-URI"),
            ssl_host: header_string(&resp, "X-CDN-SSL-URI"),
            streaming_host: header_string(&resp, "X-CDN-STREAMING-URI"),
            ttl: header_u64(&resp, "X-TTL"),
            log_retention: header_string(&resp, "X-Log-Retention").as_deref() == Some("True"),
        })
    }

    /// Make every object in this container publicly available through the
    /// CDN for `ttl` seconds (default 72 hours).
    pub async fn cdn_enable(&self, ttl: Option<u64>) -> Result<(), Error> {
        let ttl = ttl.unwrap_or(DEFAULT_CDN_TTL);
        let path = self.cdn_container_path();
        debug!(path, ttl, "enabling CDN access");
        let mut headers = HeaderMap::new();
        headers.insert("X-TTL", ttl.into());
        self.cdn_client.put(&path, headers).await?;
        Ok(())
    }

    /// List object keys, following continuation markers until `max` items
    /// are collected or the server runs out of data.
    pub async fn list(&self, options: ListOptions) -> Result<Vec<String>, Error> {
        let mut max = options.max.unwrap_or(u64::MAX);
        let mut marker = options.marker.clone();
        let mut items: Vec<String> = Vec::new();
        loop {
            let limit = max.min(MAX_ITEMS_PER_LIST);
            let path = self.list_request_path(marker.as_deref(), options.prefix.as_deref(), false, limit);
            debug!(path, "retrieving container listing page");
            let body = self
                .storage_client
                .get(&path, HeaderMap::new())
                .await?
                .text()
                .await?;
            let page: Vec<String> = body.lines().map(str::to_owned).collect();
            let got = page.len() as u64;
            items.extend(page);
            // continue only on an exactly-full page: a short page means
            // end-of-data, an over-full page means a misbehaving server;
            // max <= limit means we asked for everything we still wanted
            if max <= limit || got != limit {
                return Ok(items);
            }
            marker = items.last().cloned();
            max -= got;
        }
    }

    /// Like [`Container::list`] but returns size/hash/content-type records
    /// instead of bare keys.
    pub async fn list_detailed(&self, options: ListOptions) -> Result<Vec<ObjectDetail>, Error> {
        let mut max = options.max.unwrap_or(u64::MAX);
        let mut marker = options.marker.clone();
        let mut items: Vec<ObjectDetail> = Vec::new();
        loop {
            let limit = max.min(MAX_ITEMS_PER_LIST);
            let path = self.list_request_path(marker.as_deref(), options.prefix.as_deref(), true, limit);
            debug!(path, "retrieving detailed container listing page");
            let body = self
                .storage_client
                .get(&path, HeaderMap::new())
                .await?
                .text()
                .await?;
            let page: Vec<ObjectDetail> = serde_json::from_str(&body)?;
            let got = page.len() as u64;
            items.extend(page);
            if max <= limit || got != limit {
                return Ok(items);
            }
            marker = items.last().map(|d| d.name.clone());
            max -= got;
        }
    }

    /// Object keys starting with `prefix`; sugar over [`Container::list`].
    pub async fn search(&self, prefix: &str) -> Result<Vec<String>, Error> {
        self.list(ListOptions::builder().prefix(prefix).build()).await
    }

    /// A time-limited signed URL granting access to one otherwise-private
    /// object. `temp_url_key` is the account secret set via
    /// [`super::Containers::set_temp_url_key`]; `expires_at` is a Unix
    /// timestamp.
    pub fn temp_url(&self, object_key: &str, temp_url_key: &str, expires_at: u64) -> String {
        // the signature covers the unencoded path
        let path = format!("{}/{}", self.container_path(), object_key);
        let encoded_path = self.object_path(object_key);
        let data = format!("GET\n{expires_at}\n{path}");
        let sig = sign_hmac_sha1_hex(temp_url_key, &data);
        format!(
            "{}{}?temp_url_sig={}&temp_url_expires={}",
            self.storage_client.origin(),
            encoded_path,
            sig,
            expires_at
        )
    }

    fn list_request_path(
        &self,
        marker: Option<&str>,
        prefix: Option<&str>,
        details: bool,
        limit: u64,
    ) -> String {
        let mut path = format!("{}?limit={}", self.container_path(), limit);
        if let Some(marker) = marker {
            path.push_str("&marker=");
            path.push_str(&url_encode(marker));
        }
        if let Some(prefix) = prefix {
            path.push_str("&prefix=");
            path.push_str(&url_encode(prefix));
        }
        if details {
            path.push_str("&format=json");
        }
        path
    }
}

fn etag_header(resp: &Response) -> Result<String, Error> {
    header_string(resp, "ETag")
        .ok_or_else(|| Error::UnexpectedResponse("upload response missing ETag header".to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_record_manifest_shape() {
        let records = vec![
            SegmentRecord {
                path: "assets/big.iso.000".to_owned(),
                etag: "aaa".to_owned(),
                size_bytes: 100,
            },
            SegmentRecord {
                path: "assets/big.iso.001".to_owned(),
                etag: "bbb".to_owned(),
                size_bytes: 50,
            },
        ];
        let json = serde_json::to_value(&records).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"path": "assets/big.iso.000", "etag": "aaa", "size_bytes": 100},
                {"path": "assets/big.iso.001", "etag": "bbb", "size_bytes": 50}
            ])
        );
    }

    #[test]
    fn upload_source_window_test() {
        let source = UploadSource::from(b"0123456789".to_vec());
        assert_eq!(source.window(0, 4).len(), 4);
        assert_eq!(source.window(8, 4).len(), 2); // clamped at the end
        match source.window(3, 3) {
            RequestBody::Bytes(b) => assert_eq!(&b[..], b"345"),
            other => panic!("expected bytes window, got {other:?}"),
        }
    }

    #[test]
    fn segment_key_format_test() {
        let key = "backup.tar";
        assert_eq!(format!("{key}.{:03}", 0u64), "backup.tar.000");
        assert_eq!(format!("{key}.{:03}", 12u64), "backup.tar.012");
        assert_eq!(format!("{key}.{:03}", 1234u64), "backup.tar.1234");
    }
}
