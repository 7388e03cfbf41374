//! Response parsers
//!
//! A parser turns a raw [`NetworkResponse`] into a typed value and, when the
//! response may be cached, the [`CacheRecord`] to store for it.

use std::io::Read;
use std::marker::PhantomData;

use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;

use super::errors::RequestError;
use crate::cache::CacheRecord;
use crate::http::response::DEFAULT_CONTENT_CHARSET;
use crate::http::{parse_charset, FreshnessMode, NetworkResponse};

/// Result of a successful parse
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub value: T,
    /// Record to store, or `None` if the response is not cacheable
    pub cache_record: Option<CacheRecord>,
}

/// Parser collaborator
pub trait Parser: Send + Sync {
    type Output: Clone + Send + 'static;

    fn parse(&self, response: &NetworkResponse, now: i64) -> Result<Parsed<Self::Output>, RequestError>;
}

fn record_for(response: &NetworkResponse, mode: FreshnessMode, now: i64) -> Option<CacheRecord> {
    mode.evaluate(&response.headers, now)
        .map(|metadata| CacheRecord::from_response(response, metadata))
}

/// Raw body bytes
#[derive(Debug, Clone, Default)]
pub struct BytesParser {
    pub freshness: FreshnessMode,
}

impl BytesParser {
    pub fn new(freshness: FreshnessMode) -> Self {
        Self { freshness }
    }
}

impl Parser for BytesParser {
    type Output = Vec<u8>;

    fn parse(&self, response: &NetworkResponse, now: i64) -> Result<Parsed<Vec<u8>>, RequestError> {
        Ok(Parsed {
            value: response.data.clone(),
            cache_record: record_for(response, self.freshness, now),
        })
    }
}

/// Body decoded with the `Content-Type` charset
///
/// UTF-8 and ISO-8859-1 (and US-ASCII) are decoded exactly; any other
/// charset is decoded as lossy UTF-8.
#[derive(Debug, Clone, Default)]
pub struct StringParser {
    pub freshness: FreshnessMode,
}

impl StringParser {
    pub fn new(freshness: FreshnessMode) -> Self {
        Self { freshness }
    }
}

fn decode(data: &[u8], charset: &str) -> String {
    match charset.to_ascii_lowercase().as_str() {
        "iso-8859-1" | "latin1" | "latin-1" | "us-ascii" | "ascii" => {
            data.iter().map(|&b| b as char).collect()
        }
        _ => String::from_utf8_lossy(data).into_owned(),
    }
}

impl Parser for StringParser {
    type Output = String;

    fn parse(&self, response: &NetworkResponse, now: i64) -> Result<Parsed<String>, RequestError> {
        let charset = parse_charset(&response.headers, DEFAULT_CONTENT_CHARSET);
        Ok(Parsed {
            value: decode(&response.data, charset),
            cache_record: record_for(response, self.freshness, now),
        })
    }
}

/// Gzip-compressed body, inflated then decoded like [`StringParser`]
///
/// The cache record keeps the compressed bytes as received.
#[derive(Debug, Clone, Default)]
pub struct GzipStringParser {
    pub freshness: FreshnessMode,
}

impl GzipStringParser {
    pub fn new(freshness: FreshnessMode) -> Self {
        Self { freshness }
    }
}

impl Parser for GzipStringParser {
    type Output = String;

    fn parse(&self, response: &NetworkResponse, now: i64) -> Result<Parsed<String>, RequestError> {
        let mut inflated = Vec::new();
        GzDecoder::new(response.data.as_slice())
            .read_to_end(&mut inflated)
            .map_err(|e| RequestError::Parse(format!("gzip: {}", e)))?;

        let charset = parse_charset(&response.headers, DEFAULT_CONTENT_CHARSET);
        Ok(Parsed {
            value: decode(&inflated, charset),
            cache_record: record_for(response, self.freshness, now),
        })
    }
}

/// JSON body deserialized into `T`
#[derive(Debug, Clone)]
pub struct JsonParser<T> {
    pub freshness: FreshnessMode,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonParser<T> {
    pub fn new(freshness: FreshnessMode) -> Self {
        Self {
            freshness,
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonParser<T> {
    fn default() -> Self {
        Self::new(FreshnessMode::default())
    }
}

impl<T> Parser for JsonParser<T>
where
    T: DeserializeOwned + Clone + Send + 'static,
{
    type Output = T;

    fn parse(&self, response: &NetworkResponse, now: i64) -> Result<Parsed<T>, RequestError> {
        let value = serde_json::from_slice(&response.data)
            .map_err(|e| RequestError::Parse(e.to_string()))?;
        Ok(Parsed {
            value,
            cache_record: record_for(response, self.freshness, now),
        })
    }
}
