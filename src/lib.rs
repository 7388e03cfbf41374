//! reqcache - client-side HTTP response cache and request execution core
//!
//! Persists fetched responses in a size-bounded disk cache, turns response
//! headers into freshness metadata, and decides per request whether to answer
//! from cache, from network, or both, with ordered delivery and bounded retry.

pub mod cache;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod http;
pub mod logging;
pub mod net;
pub mod request;

pub use cache::{cache_key, CacheIndexEntry, CacheRecord, DiskCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, Config};
pub use delivery::{
    ChannelDelivery, Delivery, DeliveryEvent, DeliveryReceiver, ExecutorDelivery, ResponseListener,
};
pub use http::{CacheMetadata, FreshnessMode, Headers, NetworkResponse};
pub use net::{HttpNetwork, Network};
pub use request::{
    BytesParser, CachePolicy, CancelHandle, DispatchOutcome, Dispatcher, GzipStringParser, JsonParser,
    Method, Parsed, Parser, Request, RequestError, RequestRunner, Response, ResponseSource, RetryPolicy,
    RetryState, StringParser,
};
