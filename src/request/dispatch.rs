//! Dispatcher
//!
//! Single entry point for callers. Applies a [`CachePolicy`]: reads the
//! cache, delivers cached values, and hands the request to the runner when
//! the policy calls for the network. For combined policies the cached
//! delivery returns before the network attempt starts.

use std::sync::Arc;

use tracing::debug;

use super::descriptor::{CachePolicy, Request};
use super::errors::RequestError;
use super::outcome::{DispatchOutcome, Response};
use super::parser::Parser;
use super::retry::RetryPolicy;
use super::runner::RequestRunner;
use crate::cache::{CacheRecord, DiskCache};
use crate::clock::Clock;
use crate::delivery::Delivery;
use crate::http::NetworkResponse;
use crate::net::Network;

/// Dispatches requests over one cache and one network
#[derive(Clone)]
pub struct Dispatcher {
    cache: DiskCache,
    clock: Arc<dyn Clock>,
    runner: RequestRunner,
}

impl Dispatcher {
    pub fn new(cache: DiskCache, network: Arc<dyn Network>, clock: Arc<dyn Clock>) -> Self {
        let runner = RequestRunner::new(network, cache.clone(), Arc::clone(&clock));
        Self { cache, clock, runner }
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    pub fn runner(&self) -> &RequestRunner {
        &self.runner
    }

    /// Dispatch `request` under `policy`
    ///
    /// Blocks until every delivery for this call has been posted. A request
    /// may be dispatched again; each call starts without the delivery flag or
    /// cached record of the previous one.
    pub fn dispatch<P: Parser>(
        &self,
        request: &Request,
        parser: &P,
        delivery: &dyn Delivery<P::Output>,
        policy: CachePolicy,
        retry: &RetryPolicy,
    ) -> DispatchOutcome<P::Output> {
        if request.is_canceled() {
            debug!(url = request.url(), "Request canceled before dispatch");
            return DispatchOutcome::Canceled;
        }
        request.reset();

        match policy {
            CachePolicy::NetworkOnly => self.runner.run(request, parser, delivery, retry),
            CachePolicy::CacheOnly => match self.cached(request, parser) {
                Some((_, value)) => self.deliver_cached(request, delivery, value, false),
                None => {
                    debug!(url = request.url(), key = request.cache_key(), "Cache-only miss");
                    if request.is_canceled() {
                        return DispatchOutcome::Canceled;
                    }
                    delivery.post_error(request, RequestError::CacheMiss);
                    DispatchOutcome::FatalError(RequestError::CacheMiss)
                }
            },
            CachePolicy::CacheThenNetwork => {
                let cached = self
                    .cached(request, parser)
                    .map(|(record, value)| self.deliver_intermediate(request, delivery, record, value));
                self.finish(self.runner.run(request, parser, delivery, retry), cached)
            }
            CachePolicy::CacheThenNetworkWhenExpired => {
                let now = self.clock.now_millis();
                match self.cached(request, parser) {
                    Some((record, value)) if !record.refresh_needed(now) => {
                        self.deliver_cached(request, delivery, value, false)
                    }
                    Some((record, value)) => {
                        let cached = self.deliver_intermediate(request, delivery, record, value);
                        self.finish(self.runner.run(request, parser, delivery, retry), Some(cached))
                    }
                    None => self.runner.run(request, parser, delivery, retry),
                }
            }
        }
    }

    /// Read and parse the cached record for `request`
    ///
    /// A record the parser rejects is removed and treated as a miss.
    fn cached<P: Parser>(&self, request: &Request, parser: &P) -> Option<(CacheRecord, P::Output)> {
        let key = request.cache_key();
        let record = self.cache.get(key)?;

        match parser.parse(&NetworkResponse::from_record(&record), self.clock.now_millis()) {
            Ok(parsed) => Some((record, parsed.value)),
            Err(e) => {
                debug!(key = key, error = %e, "Dropping cached record the parser rejected");
                self.cache.remove(key);
                None
            }
        }
    }

    fn deliver_cached<T: Clone>(
        &self,
        request: &Request,
        delivery: &dyn Delivery<T>,
        value: T,
        intermediate: bool,
    ) -> DispatchOutcome<T> {
        if request.is_canceled() {
            return DispatchOutcome::Canceled;
        }
        request.mark_delivered();
        delivery.post_response(request, Response::from_cache(value.clone(), intermediate));
        DispatchOutcome::Success(value)
    }

    /// Deliver a cached value ahead of a network attempt that revalidates it
    fn deliver_intermediate<T: Clone>(
        &self,
        request: &Request,
        delivery: &dyn Delivery<T>,
        record: CacheRecord,
        value: T,
    ) -> T {
        request.set_cache_entry(record);
        self.deliver_cached(request, delivery, value.clone(), true);
        value
    }

    /// A de-duplicated 304 succeeds with the value already delivered from cache
    fn finish<T>(&self, outcome: DispatchOutcome<T>, cached: Option<T>) -> DispatchOutcome<T> {
        match (outcome, cached) {
            (DispatchOutcome::NotModified, Some(value)) => DispatchOutcome::Success(value),
            (outcome, _) => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::delivery::{ChannelDelivery, DeliveryEvent};
    use crate::http::Headers;
    use crate::request::{JsonParser, ResponseSource, StringParser};
    use parking_lot::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Answers every request with the same response and counts calls
    struct FixedNetwork {
        status: u16,
        body: &'static str,
        calls: Mutex<u32>,
    }

    impl FixedNetwork {
        fn new(status: u16, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body,
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    impl Network for FixedNetwork {
        fn perform_request(&self, _request: &Request, _timeout: Duration) -> Result<NetworkResponse, RequestError> {
            *self.calls.lock() += 1;
            let mut headers = Headers::new();
            headers.insert("Cache-Control".into(), "max-age=60".into());
            Ok(NetworkResponse::new(self.status, headers, self.body.as_bytes().to_vec()))
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        network: Arc<FixedNetwork>,
        clock: Arc<ManualClock>,
        _temp_dir: TempDir,
    }

    fn fixture(status: u16, body: &'static str) -> Fixture {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = DiskCache::with_config(temp_dir.path(), 1024 * 1024);
        cache.initialize();
        let network = FixedNetwork::new(status, body);
        let clock = Arc::new(ManualClock::new(10_000));
        let dispatcher = Dispatcher::new(cache, network.clone(), clock.clone());
        Fixture {
            dispatcher,
            network,
            clock,
            _temp_dir: temp_dir,
        }
    }

    fn seed(dispatcher: &Dispatcher, request: &Request, body: &str, soft_ttl: i64) {
        dispatcher.cache().put(
            request.cache_key(),
            CacheRecord {
                data: body.as_bytes().to_vec(),
                soft_ttl,
                ttl: soft_ttl,
                ..CacheRecord::default()
            },
        );
    }

    fn sources(events: &[DeliveryEvent<String>]) -> Vec<(ResponseSource, String)> {
        events
            .iter()
            .filter_map(|event| match event {
                DeliveryEvent::Response { response, .. } => Some((response.source, response.value.clone())),
                DeliveryEvent::Error { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_cache_only_hit_never_calls_network() {
        let f = fixture(200, "network");
        let request = Request::get("https://example.com/a");
        seed(&f.dispatcher, &request, "cached", 0);
        let (delivery, mut events) = ChannelDelivery::channel();

        let outcome = f.dispatcher.dispatch(
            &request,
            &StringParser::default(),
            &delivery,
            CachePolicy::CacheOnly,
            &RetryPolicy::default(),
        );
        assert_eq!(outcome, DispatchOutcome::Success("cached".to_string()));
        assert_eq!(f.network.calls(), 0);
        assert_eq!(sources(&events.drain()), vec![(ResponseSource::Cache, "cached".to_string())]);
    }

    #[test]
    fn test_cache_only_miss_reports_error() {
        let f = fixture(200, "network");
        let request = Request::get("https://example.com/a");
        let (delivery, mut events) = ChannelDelivery::<String>::channel();

        let outcome = f.dispatcher.dispatch(
            &request,
            &StringParser::default(),
            &delivery,
            CachePolicy::CacheOnly,
            &RetryPolicy::default(),
        );
        assert_eq!(outcome, DispatchOutcome::FatalError(RequestError::CacheMiss));
        assert_eq!(f.network.calls(), 0);
        assert!(matches!(
            events.drain().as_slice(),
            [DeliveryEvent::Error { error: RequestError::CacheMiss, .. }]
        ));
    }

    #[test]
    fn test_network_only_skips_cache_read_but_writes() {
        let f = fixture(200, "network");
        let request = Request::get("https://example.com/a");
        seed(&f.dispatcher, &request, "cached", i64::MAX);
        let (delivery, mut events) = ChannelDelivery::channel();

        let outcome = f.dispatcher.dispatch(
            &request,
            &StringParser::default(),
            &delivery,
            CachePolicy::NetworkOnly,
            &RetryPolicy::default(),
        );
        assert_eq!(outcome, DispatchOutcome::Success("network".to_string()));
        assert_eq!(sources(&events.drain()), vec![(ResponseSource::Network, "network".to_string())]);
        assert_eq!(f.dispatcher.cache().get(request.cache_key()).unwrap().data, b"network");
    }

    #[test]
    fn test_cache_then_network_delivers_both_in_order() {
        let f = fixture(200, "network");
        let request = Request::get("https://example.com/a");
        seed(&f.dispatcher, &request, "cached", 0);
        let (delivery, mut events) = ChannelDelivery::channel();

        let outcome = f.dispatcher.dispatch(
            &request,
            &StringParser::default(),
            &delivery,
            CachePolicy::CacheThenNetwork,
            &RetryPolicy::default(),
        );
        assert_eq!(outcome, DispatchOutcome::Success("network".to_string()));
        assert_eq!(
            sources(&events.drain()),
            vec![
                (ResponseSource::Cache, "cached".to_string()),
                (ResponseSource::Network, "network".to_string())
            ]
        );
    }

    #[test]
    fn test_cache_then_network_with_304_succeeds_with_cached_value() {
        let f = fixture(304, "");
        let request = Request::get("https://example.com/a");
        seed(&f.dispatcher, &request, "cached", 0);
        let (delivery, mut events) = ChannelDelivery::channel();

        let outcome = f.dispatcher.dispatch(
            &request,
            &StringParser::default(),
            &delivery,
            CachePolicy::CacheThenNetwork,
            &RetryPolicy::default(),
        );
        assert_eq!(outcome, DispatchOutcome::Success("cached".to_string()));
        assert_eq!(f.network.calls(), 1);
        assert_eq!(events.drain().len(), 1);
    }

    #[test]
    fn test_when_expired_uses_fresh_cache_only() {
        let f = fixture(200, "network");
        let request = Request::get("https://example.com/a");
        seed(&f.dispatcher, &request, "cached", 20_000);
        let (delivery, mut events) = ChannelDelivery::channel();

        let outcome = f.dispatcher.dispatch(
            &request,
            &StringParser::default(),
            &delivery,
            CachePolicy::CacheThenNetworkWhenExpired,
            &RetryPolicy::default(),
        );
        assert_eq!(outcome, DispatchOutcome::Success("cached".to_string()));
        assert_eq!(f.network.calls(), 0);
        assert_eq!(events.drain().len(), 1);

        // past the soft expiry the network is consulted
        f.clock.advance(Duration::from_secs(11));
        let outcome = f.dispatcher.dispatch(
            &request,
            &StringParser::default(),
            &delivery,
            CachePolicy::CacheThenNetworkWhenExpired,
            &RetryPolicy::default(),
        );
        assert_eq!(outcome, DispatchOutcome::Success("network".to_string()));
        assert_eq!(f.network.calls(), 1);
        assert_eq!(
            sources(&events.drain()),
            vec![
                (ResponseSource::Cache, "cached".to_string()),
                (ResponseSource::Network, "network".to_string())
            ]
        );
    }

    #[test]
    fn test_when_expired_miss_goes_to_network() {
        let f = fixture(200, "network");
        let request = Request::get("https://example.com/a");
        let (delivery, _events) = ChannelDelivery::channel();

        let outcome = f.dispatcher.dispatch(
            &request,
            &StringParser::default(),
            &delivery,
            CachePolicy::CacheThenNetworkWhenExpired,
            &RetryPolicy::default(),
        );
        assert!(outcome.is_success());
        assert_eq!(f.network.calls(), 1);
    }

    #[test]
    fn test_canceled_request_delivers_nothing() {
        let f = fixture(200, "network");
        let request = Request::get("https://example.com/a");
        seed(&f.dispatcher, &request, "cached", 0);
        request.cancel();
        let (delivery, mut events) = ChannelDelivery::<String>::channel();

        let outcome = f.dispatcher.dispatch(
            &request,
            &StringParser::default(),
            &delivery,
            CachePolicy::CacheThenNetwork,
            &RetryPolicy::default(),
        );
        assert_eq!(outcome, DispatchOutcome::Canceled);
        assert_eq!(f.network.calls(), 0);
        assert!(events.drain().is_empty());
    }

    #[test]
    fn test_rejected_cache_record_is_removed() {
        let f = fixture(200, "7");
        let request = Request::get("https://example.com/a");
        seed(&f.dispatcher, &request, "not a number", i64::MAX);
        let (delivery, _events) = ChannelDelivery::channel();

        let outcome = f.dispatcher.dispatch(
            &request,
            &JsonParser::<u32>::default(),
            &delivery,
            CachePolicy::CacheOnly,
            &RetryPolicy::default(),
        );
        assert_eq!(outcome, DispatchOutcome::FatalError(RequestError::CacheMiss));
        assert!(!f.dispatcher.cache().contains_key(request.cache_key()));
    }
}
