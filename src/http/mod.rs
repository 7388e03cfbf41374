//! HTTP response metadata
//!
//! Raw network responses, header lookup, date handling and the freshness
//! rules that turn response headers into cache expiry metadata.

pub mod date;
pub mod freshness;
pub mod response;

pub use date::{format_http_date, parse_http_date};
pub use freshness::{
    evaluate, evaluate_ignoring_headers, evaluate_with_durations, evaluate_with_fallback,
    CacheMetadata, FreshnessMode,
};
pub use response::{header, parse_charset, Headers, NetworkResponse};
