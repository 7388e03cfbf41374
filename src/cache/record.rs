//! Cache record types

use crate::http::{CacheMetadata, Headers, NetworkResponse};

/// A cached response with its freshness metadata
///
/// Records handed out by the store are copies; changing one does not touch
/// what is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheRecord {
    /// Key the record is stored under
    pub key: String,
    /// Response body
    pub data: Vec<u8>,
    /// Validator for conditional requests
    pub etag: Option<String>,
    /// Server `Date`, epoch millis
    pub server_date: i64,
    /// `Last-Modified`, epoch millis
    pub last_modified: i64,
    /// Hard expiry, epoch millis
    pub ttl: i64,
    /// Soft expiry, epoch millis
    pub soft_ttl: i64,
    /// Headers of the response this record came from
    pub response_headers: Headers,
}

impl CacheRecord {
    /// Build an unkeyed record from a response and its evaluated metadata
    ///
    /// The key is filled in when the record is stored.
    pub fn from_response(response: &NetworkResponse, metadata: CacheMetadata) -> Self {
        Self {
            key: String::new(),
            data: response.data.clone(),
            etag: metadata.etag,
            server_date: metadata.server_date,
            last_modified: metadata.last_modified,
            ttl: metadata.ttl,
            soft_ttl: metadata.soft_ttl,
            response_headers: response.headers.clone(),
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Past the hard expiry
    pub fn is_expired(&self, now: i64) -> bool {
        self.ttl < now
    }

    /// Past the soft expiry
    pub fn refresh_needed(&self, now: i64) -> bool {
        self.soft_ttl < now
    }
}

/// In-memory index entry for a stored record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheIndexEntry {
    pub key: String,
    /// Payload size in bytes
    pub size: u64,
    /// Discovery / insertion order; lower is older
    pub seq: u64,
}
