//! Delivered responses and terminal outcomes

use super::errors::RequestError;

/// Where a delivered value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
}

/// A parsed value handed to a delivery
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T> {
    pub value: T,
    pub source: ResponseSource,
    /// More deliveries follow for the same request
    pub intermediate: bool,
}

impl<T> Response<T> {
    pub fn from_cache(value: T, intermediate: bool) -> Self {
        Self {
            value,
            source: ResponseSource::Cache,
            intermediate,
        }
    }

    pub fn from_network(value: T) -> Self {
        Self {
            value,
            source: ResponseSource::Network,
            intermediate: false,
        }
    }
}

/// How one dispatch or run ended
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome<T> {
    Success(T),
    /// The server answered 304 after a response was already delivered;
    /// nothing further was delivered
    NotModified,
    /// A recoverable error that used up its retries
    RecoverableError(RequestError),
    FatalError(RequestError),
    /// Canceled; nothing was delivered after the cancellation was seen
    Canceled,
}

impl<T> DispatchOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            DispatchOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            DispatchOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&RequestError> {
        match self {
            DispatchOutcome::RecoverableError(e) | DispatchOutcome::FatalError(e) => Some(e),
            _ => None,
        }
    }
}
