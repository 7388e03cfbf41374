//! Request descriptors
//!
//! A [`Request`] describes one logical fetch: what to send, which cache key
//! it maps to, and the per-request flags the dispatcher and runner consult
//! (cancellation, whether a response was already delivered, the cached
//! record used for revalidation).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::{cache_key, CacheRecord};
use crate::http::{format_http_date, Headers};

/// HTTP method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Head,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a request combines the cache and the network
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Answer from cache only; a miss is an error
    CacheOnly,
    /// Skip the cache read; the result is still cached
    NetworkOnly,
    /// Deliver any cached entry, then always fetch
    #[default]
    CacheThenNetwork,
    /// Deliver any cached entry; fetch only if it needs a refresh
    CacheThenNetworkWhenExpired,
}

/// Shared cancellation flag
///
/// Clones observe the same flag, so one can be handed to another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One logical request
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: String,
    headers: Headers,
    body: Option<Vec<u8>>,
    cache_key: String,
    should_cache: bool,
    canceled: CancelHandle,
    delivered: AtomicBool,
    cache_entry: Mutex<Option<CacheRecord>>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            method,
            cache_key: cache_key(&url, None),
            url,
            headers: Headers::new(),
            body: None,
            should_cache: true,
            canceled: CancelHandle::default(),
            delivered: AtomicBool::new(false),
            cache_entry: Mutex::new(None),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Attach a body. The default cache key then covers the body too.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        self.cache_key = cache_key(&self.url, Some(String::from_utf8_lossy(&body).as_ref()));
        self.body = Some(body);
        self
    }

    /// Override the derived cache key
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = key.into();
        self
    }

    pub fn with_should_cache(mut self, should_cache: bool) -> Self {
        self.should_cache = should_cache;
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Whether network results are written to the cache
    pub fn should_cache(&self) -> bool {
        self.should_cache
    }

    /// Suppress any further delivery for this request
    pub fn cancel(&self) {
        self.canceled.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.is_canceled()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.canceled.clone()
    }

    pub fn mark_delivered(&self) {
        self.delivered.store(true, Ordering::SeqCst);
    }

    pub fn has_had_response_delivered(&self) -> bool {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Forget the delivery and cached record of an earlier dispatch
    pub(crate) fn reset(&self) {
        self.delivered.store(false, Ordering::SeqCst);
        *self.cache_entry.lock() = None;
    }

    /// Remember the cached record this request may revalidate
    pub fn set_cache_entry(&self, record: CacheRecord) {
        *self.cache_entry.lock() = Some(record);
    }

    pub fn cache_entry(&self) -> Option<CacheRecord> {
        self.cache_entry.lock().clone()
    }

    /// Validators for the attached cache entry, if any
    pub fn conditional_headers(&self) -> Headers {
        let mut headers = Headers::new();
        let entry = self.cache_entry.lock();
        let Some(record) = entry.as_ref() else {
            return headers;
        };

        if let Some(etag) = &record.etag {
            headers.insert("If-None-Match".to_string(), etag.clone());
        }
        if record.last_modified > 0 {
            if let Some(date) = format_http_date(record.last_modified) {
                headers.insert("If-Modified-Since".to_string(), date);
            }
        }
        headers
    }
}
