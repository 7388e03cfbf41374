//! Cache keys and backing file names

use sha1::{Digest, Sha1};

/// Stable cache key for a request: SHA-1 of the URL followed by the body
/// with all whitespace removed
pub fn cache_key(url: &str, body: Option<&str>) -> String {
    let mut hasher = Sha1::new();
    hasher.update(url.as_bytes());
    if let Some(body) = body {
        let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
        hasher.update(compact.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// File name under the cache root that holds the record for `key`
pub fn file_name_for_key(key: &str) -> String {
    format!("{:x}", Sha1::digest(key.as_bytes()))
}
