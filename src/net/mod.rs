//! Network collaborator
//!
//! [`Network`] performs one attempt of a request with a deadline. The runner
//! owns retries, so implementations must not retry on their own.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use tracing::debug;

use crate::http::{Headers, NetworkResponse};
use crate::request::{Request, RequestError};

/// User agent sent by [`HttpNetwork::new`]
const USER_AGENT: &str = concat!("reqcache/", env!("CARGO_PKG_VERSION"));

/// Performs a single network attempt
pub trait Network: Send + Sync {
    fn perform_request(&self, request: &Request, timeout: Duration) -> Result<NetworkResponse, RequestError>;
}

/// HTTP network backed by a blocking reqwest client
///
/// Calls block the current thread, so do not use it from inside an async
/// runtime's worker threads.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn classify(e: reqwest::Error) -> RequestError {
    if e.is_timeout() {
        RequestError::Timeout
    } else if e.is_connect() {
        RequestError::NoConnection(e.to_string())
    } else {
        RequestError::Network(e.to_string())
    }
}

impl Network for HttpNetwork {
    fn perform_request(&self, request: &Request, timeout: Duration) -> Result<NetworkResponse, RequestError> {
        let method = reqwest::Method::from_bytes(request.method().as_str().as_bytes())
            .map_err(|e| RequestError::Network(e.to_string()))?;

        let mut builder = self.client.request(method, request.url()).timeout(timeout);
        for (name, value) in request.headers().iter().chain(request.conditional_headers().iter()) {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.to_vec());
        }

        debug!(
            method = %request.method(),
            url = request.url(),
            timeout_ms = timeout.as_millis() as u64,
            "Sending request"
        );
        let response = builder.send().map_err(classify)?;

        let status = response.status().as_u16();
        let headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
            .collect();
        let data = response.bytes().map_err(classify)?.to_vec();

        Ok(NetworkResponse::new(status, headers, data))
    }
}
