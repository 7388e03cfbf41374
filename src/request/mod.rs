//! Request execution
//!
//! Request descriptors, cache policies, parsers, the retrying network runner
//! and the dispatcher that combines them with the disk cache.

mod descriptor;
mod dispatch;
mod errors;
mod outcome;
mod parser;
mod retry;
mod runner;

pub use descriptor::{CachePolicy, CancelHandle, Method, Request};
pub use dispatch::Dispatcher;
pub use errors::RequestError;
pub use outcome::{DispatchOutcome, Response, ResponseSource};
pub use parser::{BytesParser, GzipStringParser, JsonParser, Parsed, Parser, StringParser};
pub use retry::{
    RetryPolicy, RetryState, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MS,
};
pub use runner::RequestRunner;
