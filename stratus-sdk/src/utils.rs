use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Deserializer};

// Everything outside [a-zA-Z0-9_./-] is escaped as uppercase %XX, one group
// per byte. `/` stays literal so object keys keep their pseudo-directory
// structure inside request paths.
const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'/')
    .remove(b'-');

/// Percent-encode a path segment, object key or query value.
pub fn url_encode(s: &str) -> String {
    utf8_percent_encode(s, PATH_ENCODE_SET).to_string()
}

/// Content type guessed from the file extension of `path`, for uploads that
/// don't specify one.
pub(crate) fn extension_content_type(path: &str) -> Option<&'static str> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let ext = file_name.rsplit_once('.').map(|(_, ext)| ext)?;
    match ext {
        "css" => Some("text/css"),
        "eot" => Some("application/vnd.ms-fontobject"),
        "html" => Some("text/html"),
        "js" => Some("application/javascript"),
        "png" => Some("image/png"),
        "jpg" => Some("image/jpeg"),
        "txt" => Some("text/plain"),
        "woff" => Some("font/woff"),
        "zip" => Some("application/zip"),
        _ => None,
    }
}

// Fonts need CORS headers to load cross-origin in IE and Firefox.
pub(crate) fn content_type_needs_cors(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    matches!(
        file_name.rsplit_once('.').map(|(_, ext)| ext),
        Some("eot") | Some("ttf") | Some("woff")
    )
}

// First-gen compute resources use numeric ids, next-gen use uuid strings.
// Normalize both to String.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(i64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
    })
}
