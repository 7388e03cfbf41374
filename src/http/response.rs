//! Raw network responses and header helpers

use std::collections::HashMap;

use crate::cache::CacheRecord;

/// Response headers by name, as received
pub type Headers = HashMap<String, String>;

/// Charset assumed for text bodies that do not declare one
pub const DEFAULT_CONTENT_CHARSET: &str = "ISO-8859-1";

/// Look up a header, ignoring the ASCII case of its name
pub fn header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Charset parameter of the `Content-Type` header, or `default`
pub fn parse_charset<'a>(headers: &'a Headers, default: &'a str) -> &'a str {
    let Some(content_type) = header(headers, "Content-Type") else {
        return default;
    };

    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches('"'))
        .unwrap_or(default)
}

/// What came back from the network collaborator for one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Headers,
    /// Raw body bytes
    pub data: Vec<u8>,
    /// Whether the server answered 304 Not Modified
    pub not_modified: bool,
}

impl NetworkResponse {
    pub fn new(status: u16, headers: Headers, data: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            data,
            not_modified: status == 304,
        }
    }

    /// Rebuild a response from a cached record, for parsing cache hits
    pub fn from_record(record: &CacheRecord) -> Self {
        Self {
            status: 200,
            headers: record.response_headers.clone(),
            data: record.data.clone(),
            not_modified: false,
        }
    }

    /// Answer a 304 from the cached record it revalidated
    ///
    /// Headers from the 304 override the cached ones.
    pub fn revalidated(record: &CacheRecord, not_modified: &NetworkResponse) -> Self {
        let mut headers = record.response_headers.clone();
        for (name, value) in &not_modified.headers {
            headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
            headers.insert(name.clone(), value.clone());
        }

        Self {
            status: 200,
            headers,
            data: record.data.clone(),
            not_modified: true,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, used for error messages
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}
