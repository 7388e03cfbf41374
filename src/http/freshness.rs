//! Freshness evaluation
//!
//! Turns response headers plus the current time into the expiry metadata a
//! cached record carries. All instants are epoch milliseconds.
//!
//! `Cache-Control` always wins over `Expires`, even when `Expires` would be
//! more restrictive.

use std::time::Duration;

use super::date::parse_http_date;
use super::response::{header, Headers};

/// Soft expiry used when server headers are ignored
const IGNORED_HEADERS_SOFT_TTL: Duration = Duration::from_secs(3 * 60);

/// Hard expiry used when server headers are ignored
const IGNORED_HEADERS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Expiry metadata derived from a response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetadata {
    /// Validator for conditional requests (`None` when absent or empty)
    pub etag: Option<String>,
    /// `Date` header as epoch millis, `0` if absent
    pub server_date: i64,
    /// `Last-Modified` header as epoch millis, `0` if absent
    pub last_modified: i64,
    /// Hard expiry instant
    pub ttl: i64,
    /// Soft expiry instant
    pub soft_ttl: i64,
}

impl CacheMetadata {
    /// Metadata that carries the server validators but no expiry yet
    fn from_validators(headers: &Headers) -> Self {
        Self {
            etag: header(headers, "ETag")
                .filter(|etag| !etag.is_empty())
                .map(str::to_string),
            server_date: header(headers, "Date").map(parse_http_date).unwrap_or(0),
            last_modified: header(headers, "Last-Modified")
                .map(parse_http_date)
                .unwrap_or(0),
            ttl: 0,
            soft_ttl: 0,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.ttl < now
    }

    pub fn refresh_needed(&self, now: i64) -> bool {
        self.soft_ttl < now
    }
}

/// Directives we understand from `Cache-Control`
#[derive(Debug, Default, PartialEq, Eq)]
struct CacheControl {
    has_directive: bool,
    max_age: i64,
    stale_while_revalidate: i64,
}

fn parse_cache_control(value: &str) -> CacheControl {
    let mut cc = CacheControl::default();

    for token in value.split(',').map(str::trim) {
        if token == "no-cache" || token == "no-store" {
            cc.has_directive = false;
        } else if let Some(secs) = token.strip_prefix("max-age=") {
            // an unparsable value still counts as a directive
            cc.has_directive = true;
            if let Ok(secs) = secs.trim().parse() {
                cc.max_age = secs;
            }
        } else if let Some(secs) = token.strip_prefix("stale-while-revalidate=") {
            if let Ok(secs) = secs.trim().parse() {
                cc.stale_while_revalidate = secs;
            }
        } else if token == "must-revalidate" || token == "proxy-revalidate" {
            cc.max_age = 0;
        }
    }

    cc
}

/// Evaluate freshness from `Cache-Control`, `Expires` and `Date`
pub fn evaluate(headers: &Headers, now: i64) -> CacheMetadata {
    let mut metadata = CacheMetadata::from_validators(headers);

    let cc = header(headers, "Cache-Control")
        .map(parse_cache_control)
        .unwrap_or_default();
    let expires = header(headers, "Expires").map(parse_http_date).unwrap_or(0);

    if cc.has_directive {
        metadata.soft_ttl = now.saturating_add(cc.max_age.saturating_mul(1000));
        metadata.ttl = metadata
            .soft_ttl
            .saturating_add(cc.stale_while_revalidate.saturating_mul(1000));
    } else if metadata.server_date > 0 && expires >= metadata.server_date {
        metadata.soft_ttl = now + (expires - metadata.server_date);
        metadata.ttl = metadata.soft_ttl;
    }

    metadata
}

/// Ignore server caching headers: soft expiry in 3 minutes, hard in 24 hours
pub fn evaluate_ignoring_headers(headers: &Headers, now: i64) -> CacheMetadata {
    evaluate_with_durations(headers, now, IGNORED_HEADERS_SOFT_TTL, IGNORED_HEADERS_TTL)
}

/// Ignore server caching headers and use explicit soft and hard durations
///
/// The soft expiry never lands after the hard one.
pub fn evaluate_with_durations(
    headers: &Headers,
    now: i64,
    soft: Duration,
    hard: Duration,
) -> CacheMetadata {
    let mut metadata = CacheMetadata::from_validators(headers);
    metadata.ttl = now + hard.as_millis() as i64;
    metadata.soft_ttl = (now + soft.as_millis() as i64).min(metadata.ttl);
    metadata
}

/// Evaluate normally, but force a fallback lifetime when the server gives
/// no usable caching information
///
/// A response without an ETag, or one that is already stale, is cached for
/// `fallback` instead.
pub fn evaluate_with_fallback(headers: &Headers, now: i64, fallback: Duration) -> CacheMetadata {
    let mut metadata = evaluate(headers, now);
    if metadata.etag.is_none() || metadata.is_expired(now) || metadata.refresh_needed(now) {
        metadata.soft_ttl = now + fallback.as_millis() as i64;
        metadata.ttl = metadata.soft_ttl;
    }
    metadata
}

/// Which freshness rule a parser applies to responses it caches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FreshnessMode {
    /// Honor `Cache-Control` / `Expires`
    #[default]
    Headers,
    /// Fixed 3 minute soft and 24 hour hard expiry
    IgnoreHeaders,
    /// Fixed soft and hard expiry
    Fixed { soft: Duration, hard: Duration },
    /// Honor headers, falling back to the given lifetime
    Fallback(Duration),
    /// Do not produce cache records
    Never,
}

impl FreshnessMode {
    pub fn evaluate(&self, headers: &Headers, now: i64) -> Option<CacheMetadata> {
        match *self {
            FreshnessMode::Headers => Some(evaluate(headers, now)),
            FreshnessMode::IgnoreHeaders => Some(evaluate_ignoring_headers(headers, now)),
            FreshnessMode::Fixed { soft, hard } => {
                Some(evaluate_with_durations(headers, now, soft, hard))
            }
            FreshnessMode::Fallback(fallback) => {
                Some(evaluate_with_fallback(headers, now, fallback))
            }
            FreshnessMode::Never => None,
        }
    }
}
