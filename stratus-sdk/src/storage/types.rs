use bon::Builder;
use serde::{Deserialize, Serialize};

/// One record from a detailed (`format=json`) container listing.
#[derive(Clone, Debug, Deserialize)]
pub struct ObjectDetail {
    pub name: String,
    #[serde(default)]
    pub bytes: u64,
    /// MD5 of the object contents as stored by the provider.
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

/// Options for [`super::Container::list`].
#[derive(Builder, Clone, Debug, Default)]
#[builder(on(String, into))]
pub struct ListOptions {
    /// Maximum number of items wanted in total. Unbounded by default.
    pub max: Option<u64>,
    /// Resume the listing alphabetically after this key.
    pub marker: Option<String>,
    /// Only return keys starting with this string.
    pub prefix: Option<String>,
}

/// Per-segment manifest entry for a large-object upload. The manifest body
/// is the JSON array of these, in segment index order.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct SegmentRecord {
    pub path: String,
    pub etag: String,
    pub size_bytes: u64,
}

/// Metadata for a single object, from a HEAD request.
#[derive(Clone, Debug)]
pub struct ObjectMetadata {
    pub content_type: Option<String>,
    pub bytes: u64,
}

/// Container-level counters, from a HEAD on the container.
#[derive(Clone, Copy, Debug)]
pub struct ContainerMetadata {
    pub objects: u64,
    pub bytes: u64,
}

/// Account-level counters, from a HEAD on the storage base path.
#[derive(Clone, Copy, Debug)]
pub struct AccountMetadata {
    pub containers: u64,
    pub objects: u64,
    pub bytes: u64,
}

/// CDN state of a container. Meaningful only after CDN enablement.
#[derive(Clone, Debug)]
pub struct CdnMetadata {
    pub cdn_enabled: bool,
    pub host: Option<String>,
    pub ssl_host: Option<String>,
    pub streaming_host: Option<String>,
    pub ttl: u64,
    pub log_retention: bool,
}
