//! Request runner
//!
//! Executes one network round for a request: attempts with retry, 304
//! de-duplication and revalidation, parsing, caching, and delivery.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::descriptor::Request;
use super::errors::RequestError;
use super::outcome::{DispatchOutcome, Response};
use super::parser::Parser;
use super::retry::RetryPolicy;
use crate::cache::DiskCache;
use crate::clock::Clock;
use crate::delivery::Delivery;
use crate::http::NetworkResponse;
use crate::net::Network;

/// Runs requests against the network and writes results to the cache
#[derive(Clone)]
pub struct RequestRunner {
    network: Arc<dyn Network>,
    cache: DiskCache,
    clock: Arc<dyn Clock>,
}

/// Network stage failed; the outcome to report
enum Failure {
    Exhausted(RequestError),
    Fatal(RequestError),
    Canceled,
}

impl RequestRunner {
    pub fn new(network: Arc<dyn Network>, cache: DiskCache, clock: Arc<dyn Clock>) -> Self {
        Self {
            network,
            cache,
            clock,
        }
    }

    /// Run `request` once through the network
    ///
    /// Nothing is delivered if the request is canceled before the run starts
    /// or while it is in flight.
    pub fn run<P: Parser>(
        &self,
        request: &Request,
        parser: &P,
        delivery: &dyn Delivery<P::Output>,
        retry: &RetryPolicy,
    ) -> DispatchOutcome<P::Output> {
        if request.is_canceled() {
            debug!(url = request.url(), "Request canceled before network");
            return DispatchOutcome::Canceled;
        }

        let response = match self.perform_with_retry(request, retry) {
            Ok(response) => response,
            Err(Failure::Canceled) => return DispatchOutcome::Canceled,
            Err(Failure::Exhausted(e)) => {
                return self.fail(request, delivery, DispatchOutcome::RecoverableError(e))
            }
            Err(Failure::Fatal(e)) => return self.fail(request, delivery, DispatchOutcome::FatalError(e)),
        };

        if response.not_modified && request.has_had_response_delivered() {
            debug!(url = request.url(), "Not modified, response already delivered");
            return DispatchOutcome::NotModified;
        }

        let response = match (response.not_modified, request.cache_entry()) {
            (true, Some(record)) => NetworkResponse::revalidated(&record, &response),
            _ => response,
        };

        let now = self.clock.now_millis();
        let parsed = match parser.parse(&response, now) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(url = request.url(), error = %e, "Failed to parse response");
                return self.fail(request, delivery, DispatchOutcome::FatalError(e));
            }
        };

        if request.should_cache() {
            if let Some(record) = parsed.cache_record {
                self.cache.put(request.cache_key(), record);
            }
        }

        if request.is_canceled() {
            debug!(url = request.url(), "Request canceled, discarding response");
            return DispatchOutcome::Canceled;
        }
        request.mark_delivered();
        delivery.post_response(request, Response::from_network(parsed.value.clone()));
        DispatchOutcome::Success(parsed.value)
    }

    fn perform_with_retry(&self, request: &Request, policy: &RetryPolicy) -> Result<NetworkResponse, Failure> {
        let mut retry = policy.start();

        loop {
            let started = Instant::now();
            let result = self
                .network
                .perform_request(request, retry.current_timeout())
                .and_then(|response| {
                    if response.is_success() || response.not_modified {
                        Ok(response)
                    } else {
                        Err(RequestError::from_status(response.status, &response.body_text()))
                    }
                });

            if request.is_canceled() {
                debug!(url = request.url(), "Request canceled, discarding network result");
                return Err(Failure::Canceled);
            }

            let e = match result {
                Ok(response) => {
                    debug!(
                        url = request.url(),
                        status = response.status,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Network response"
                    );
                    return Ok(response);
                }
                Err(e) => e,
            };

            if !e.is_recoverable(policy) {
                error!(url = request.url(), error = %e, "Request failed");
                return Err(Failure::Fatal(e));
            }

            let attempt = retry.retry_count() + 1;
            if let Err(e) = retry.next_attempt(e.clone()) {
                error!(
                    url = request.url(),
                    attempts = attempt,
                    error = %e,
                    "Request failed after retries"
                );
                return Err(Failure::Exhausted(e));
            }

            warn!(
                url = request.url(),
                attempt = attempt,
                max = policy.max_retries,
                timeout_ms = retry.current_timeout_ms(),
                error = %e,
                "Retrying request"
            );
        }
    }

    /// Report a failure unless the request was canceled meanwhile
    fn fail<T>(
        &self,
        request: &Request,
        delivery: &dyn Delivery<T>,
        outcome: DispatchOutcome<T>,
    ) -> DispatchOutcome<T> {
        if request.is_canceled() {
            return DispatchOutcome::Canceled;
        }
        if let Some(e) = outcome.error() {
            info!(url = request.url(), error = %e, "Delivering request error");
            delivery.post_error(request, e.clone());
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheRecord;
    use crate::clock::ManualClock;
    use crate::delivery::{ChannelDelivery, DeliveryEvent};
    use crate::http::Headers;
    use crate::request::{JsonParser, StringParser};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Plays back scripted results and records each attempt's timeout
    #[derive(Default)]
    struct ScriptedNetwork {
        script: Mutex<VecDeque<Result<NetworkResponse, RequestError>>>,
        timeouts: Mutex<Vec<Duration>>,
    }

    impl ScriptedNetwork {
        fn new(script: Vec<Result<NetworkResponse, RequestError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                timeouts: Mutex::new(Vec::new()),
            })
        }
    }

    impl Network for ScriptedNetwork {
        fn perform_request(&self, _request: &Request, timeout: Duration) -> Result<NetworkResponse, RequestError> {
            self.timeouts.lock().push(timeout);
            self.script.lock().pop_front().unwrap_or(Err(RequestError::Timeout))
        }
    }

    fn ok(body: &str) -> Result<NetworkResponse, RequestError> {
        let mut headers = Headers::new();
        headers.insert("Cache-Control".into(), "max-age=60".into());
        headers.insert("Content-Type".into(), "text/plain; charset=utf-8".into());
        Ok(NetworkResponse::new(200, headers, body.as_bytes().to_vec()))
    }

    fn setup(network: Arc<ScriptedNetwork>) -> (RequestRunner, DiskCache, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = DiskCache::with_config(temp_dir.path(), 1024 * 1024);
        cache.initialize();
        let runner = RequestRunner::new(network, cache.clone(), Arc::new(ManualClock::new(1_000)));
        (runner, cache, temp_dir)
    }

    #[test]
    fn test_success_is_cached_and_delivered() {
        let (runner, cache, _temp_dir) = setup(ScriptedNetwork::new(vec![ok("hello")]));
        let (delivery, mut events) = ChannelDelivery::channel();
        let request = Request::get("https://example.com/a");

        let outcome = runner.run(&request, &StringParser::default(), &delivery, &RetryPolicy::default());
        assert_eq!(outcome, DispatchOutcome::Success("hello".to_string()));
        assert!(request.has_had_response_delivered());

        let record = cache.get(request.cache_key()).expect("response should be cached");
        assert_eq!(record.data, b"hello");
        assert_eq!(record.soft_ttl, 61_000);
        assert_eq!(events.drain().len(), 1);
    }

    #[test]
    fn test_should_cache_false_skips_store() {
        let (runner, cache, _temp_dir) = setup(ScriptedNetwork::new(vec![ok("hello")]));
        let (delivery, _events) = ChannelDelivery::channel();
        let request = Request::get("https://example.com/a").with_should_cache(false);

        runner.run(&request, &StringParser::default(), &delivery, &RetryPolicy::default());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_canceled_request_never_touches_network() {
        let network = ScriptedNetwork::new(vec![ok("hello")]);
        let (runner, _cache, _temp_dir) = setup(Arc::clone(&network));
        let (delivery, mut events) = ChannelDelivery::channel();
        let request = Request::get("https://example.com/a");
        request.cancel();

        let outcome = runner.run(&request, &StringParser::default(), &delivery, &RetryPolicy::default());
        assert_eq!(outcome, DispatchOutcome::Canceled);
        assert!(network.timeouts.lock().is_empty());
        assert!(events.drain().is_empty());
    }

    #[test]
    fn test_retry_backoff_then_exhausted() {
        let network = ScriptedNetwork::new(vec![]);
        let (runner, _cache, _temp_dir) = setup(Arc::clone(&network));
        let (delivery, mut events) = ChannelDelivery::<String>::channel();
        let request = Request::get("https://example.com/a");

        let outcome = runner.run(&request, &StringParser::default(), &delivery, &RetryPolicy::new(1000, 2, 2.0));
        assert_eq!(outcome, DispatchOutcome::RecoverableError(RequestError::Timeout));
        assert_eq!(
            *network.timeouts.lock(),
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000)
            ]
        );
        assert!(matches!(
            events.drain().as_slice(),
            [DeliveryEvent::Error { error: RequestError::Timeout, .. }]
        ));
    }

    #[test]
    fn test_recovers_after_transient_failure() {
        let network = ScriptedNetwork::new(vec![Err(RequestError::NoConnection("reset".into())), ok("second")]);
        let (runner, _cache, _temp_dir) = setup(Arc::clone(&network));
        let (delivery, _events) = ChannelDelivery::channel();
        let request = Request::get("https://example.com/a");

        let outcome = runner.run(&request, &StringParser::default(), &delivery, &RetryPolicy::default());
        assert_eq!(outcome.into_value().as_deref(), Some("second"));
        assert_eq!(network.timeouts.lock().len(), 2);
    }

    #[test]
    fn test_server_error_is_fatal_by_default() {
        let network = ScriptedNetwork::new(vec![Ok(NetworkResponse::new(500, Headers::new(), b"boom".to_vec()))]);
        let (runner, _cache, _temp_dir) = setup(Arc::clone(&network));
        let (delivery, mut events) = ChannelDelivery::<String>::channel();
        let request = Request::get("https://example.com/a");

        let outcome = runner.run(&request, &StringParser::default(), &delivery, &RetryPolicy::default());
        assert_eq!(
            outcome,
            DispatchOutcome::FatalError(RequestError::Server {
                status: 500,
                body: "boom".into()
            })
        );
        assert_eq!(network.timeouts.lock().len(), 1);
        assert_eq!(events.drain().len(), 1);
    }

    #[test]
    fn test_not_modified_after_delivery_is_deduplicated() {
        let not_modified = Ok(NetworkResponse::new(304, Headers::new(), Vec::new()));
        let (runner, _cache, _temp_dir) = setup(ScriptedNetwork::new(vec![not_modified]));
        let (delivery, mut events) = ChannelDelivery::<String>::channel();
        let request = Request::get("https://example.com/a");
        request.mark_delivered();

        let outcome = runner.run(&request, &StringParser::default(), &delivery, &RetryPolicy::default());
        assert_eq!(outcome, DispatchOutcome::NotModified);
        assert!(events.drain().is_empty());
    }

    #[test]
    fn test_not_modified_is_answered_from_attached_record() {
        let mut fresh_headers = Headers::new();
        fresh_headers.insert("Cache-Control".into(), "max-age=120".into());
        let not_modified = Ok(NetworkResponse::new(304, fresh_headers, Vec::new()));
        let (runner, cache, _temp_dir) = setup(ScriptedNetwork::new(vec![not_modified]));
        let (delivery, _events) = ChannelDelivery::channel();
        let request = Request::get("https://example.com/a");

        let mut cached_headers = Headers::new();
        cached_headers.insert("cache-control".into(), "max-age=0".into());
        request.set_cache_entry(CacheRecord {
            data: b"cached".to_vec(),
            response_headers: cached_headers,
            ..CacheRecord::default()
        });

        let outcome = runner.run(&request, &StringParser::default(), &delivery, &RetryPolicy::default());
        assert_eq!(outcome, DispatchOutcome::Success("cached".to_string()));

        // the 304's Cache-Control replaced the cached one
        let record = cache.get(request.cache_key()).unwrap();
        assert_eq!(record.soft_ttl, 121_000);
    }

    #[test]
    fn test_parse_failure_is_fatal() {
        let (runner, cache, _temp_dir) = setup(ScriptedNetwork::new(vec![ok("not json")]));
        let (delivery, mut events) = ChannelDelivery::channel();
        let request = Request::get("https://example.com/a");
        let parser = JsonParser::<u32>::default();

        let outcome = runner.run(&request, &parser, &delivery, &RetryPolicy::default());
        assert!(matches!(outcome, DispatchOutcome::FatalError(RequestError::Parse(_))));
        assert!(cache.is_empty());
        assert_eq!(events.drain().len(), 1);
    }
}
