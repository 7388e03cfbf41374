//! Response delivery
//!
//! The runner and dispatcher report results through a [`Delivery`]. The
//! channel-backed deliveries here hand results to another thread, so callers
//! never assume delivery happens on the dispatching thread.

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::request::{CancelHandle, Request, RequestError, Response};

/// Delivery collaborator
pub trait Delivery<T>: Send + Sync {
    fn post_response(&self, request: &Request, response: Response<T>);
    fn post_error(&self, request: &Request, error: RequestError);
}

/// A delivered result, tagged with the request's cache key
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryEvent<T> {
    Response { cache_key: String, response: Response<T> },
    Error { cache_key: String, error: RequestError },
}

impl<T> DeliveryEvent<T> {
    pub fn cache_key(&self) -> &str {
        match self {
            DeliveryEvent::Response { cache_key, .. } | DeliveryEvent::Error { cache_key, .. } => {
                cache_key
            }
        }
    }
}

type Envelope<T> = (CancelHandle, DeliveryEvent<T>);

/// Posts events into an unbounded channel
pub struct ChannelDelivery<T> {
    tx: UnboundedSender<Envelope<T>>,
}

impl<T> Clone for ChannelDelivery<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<T: Send + 'static> ChannelDelivery<T> {
    pub fn channel() -> (Self, DeliveryReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, DeliveryReceiver { rx })
    }

    fn send(&self, request: &Request, event: DeliveryEvent<T>) {
        if request.is_canceled() {
            debug!(url = request.url(), "Dropping delivery for canceled request");
            return;
        }
        if self.tx.send((request.cancel_handle(), event)).is_err() {
            debug!(url = request.url(), "Delivery receiver closed");
        }
    }
}

impl<T: Send + 'static> Delivery<T> for ChannelDelivery<T> {
    fn post_response(&self, request: &Request, response: Response<T>) {
        let cache_key = request.cache_key().to_string();
        self.send(request, DeliveryEvent::Response { cache_key, response });
    }

    fn post_error(&self, request: &Request, error: RequestError) {
        let cache_key = request.cache_key().to_string();
        self.send(request, DeliveryEvent::Error { cache_key, error });
    }
}

/// Receiving end of a [`ChannelDelivery`]
///
/// Events whose request was canceled after posting are skipped.
pub struct DeliveryReceiver<T> {
    rx: UnboundedReceiver<Envelope<T>>,
}

impl<T> DeliveryReceiver<T> {
    /// Wait for the next event; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<DeliveryEvent<T>> {
        while let Some((cancel, event)) = self.rx.recv().await {
            if !cancel.is_canceled() {
                return Some(event);
            }
        }
        None
    }

    /// Next event if one is ready
    pub fn try_recv(&mut self) -> Option<DeliveryEvent<T>> {
        loop {
            match self.rx.try_recv() {
                Ok((cancel, event)) if !cancel.is_canceled() => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
    }

    /// Everything currently queued
    pub fn drain(&mut self) -> Vec<DeliveryEvent<T>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Callbacks run by an [`ExecutorDelivery`]
pub trait ResponseListener<T>: Send + 'static {
    fn on_response(&mut self, cache_key: &str, response: Response<T>);
    fn on_error(&mut self, cache_key: &str, error: RequestError);
}

/// Runs a listener on a tokio runtime, one event at a time, in posting order
pub struct ExecutorDelivery<T> {
    channel: ChannelDelivery<T>,
}

impl<T> Clone for ExecutorDelivery<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
        }
    }
}

impl<T: Send + 'static> ExecutorDelivery<T> {
    /// Spawn the listener task on `handle`
    ///
    /// The task ends once every clone of the returned delivery is dropped.
    pub fn spawn<L>(handle: &Handle, mut listener: L) -> (Self, JoinHandle<()>)
    where
        L: ResponseListener<T>,
    {
        let (channel, mut receiver) = ChannelDelivery::channel();
        let task = handle.spawn(async move {
            while let Some(event) = receiver.recv().await {
                trace!(key = event.cache_key(), "Delivering event");
                match event {
                    DeliveryEvent::Response { cache_key, response } => {
                        listener.on_response(&cache_key, response)
                    }
                    DeliveryEvent::Error { cache_key, error } => listener.on_error(&cache_key, error),
                }
            }
        });
        (Self { channel }, task)
    }
}

impl<T: Send + 'static> Delivery<T> for ExecutorDelivery<T> {
    fn post_response(&self, request: &Request, response: Response<T>) {
        self.channel.post_response(request, response);
    }

    fn post_error(&self, request: &Request, error: RequestError) {
        self.channel.post_error(request, error);
    }
}
