//! The contract between a session and whatever produces its bytes.
//!
//! A [`Transport`] is opened with a [`Delivery`] and from then on pushes raw
//! chunks into it, followed by exactly one terminal notification. The core
//! does not care whether the bytes come from HTTP, a pipe or a socket.

mod manual;

pub use manual::ManualTransport;

use std::fmt::Display;
use std::sync::{Arc, Weak};

use futures_util::{Stream, StreamExt};
use tracing::debug;

use crate::error::{StreamResult, TransportError};

/// Receiver of transport notifications. Implemented by the session; every
/// method must return promptly and never block on the consumer.
pub trait DeliveryTarget: Send + Sync {
    /// Returns `false` once the target no longer accepts data.
    fn on_chunk(&self, chunk: &[u8]) -> bool;
    fn on_complete(&self);
    fn on_error(&self, error: TransportError);
}

/// Producer-side handle a transport pushes into.
///
/// Cheap to clone and safe to use from any thread. It only holds a weak
/// reference, so deliveries after the session is dropped are ignored.
#[derive(Clone)]
pub struct Delivery {
    target: Weak<dyn DeliveryTarget>,
}

impl Delivery {
    pub fn new<T: DeliveryTarget + 'static>(target: &Arc<T>) -> Self {
        let weak: Weak<T> = Arc::downgrade(target);
        Self { target: weak }
    }

    /// Push one raw chunk. Returns `false` when the receiving side is gone or
    /// already terminal, which is the transport's cue to stop reading.
    pub fn chunk(&self, bytes: &[u8]) -> bool {
        match self.target.upgrade() {
            Some(target) => target.on_chunk(bytes),
            None => false,
        }
    }

    pub fn complete(&self) {
        if let Some(target) = self.target.upgrade() {
            target.on_complete();
        }
    }

    pub fn fail(&self, error: TransportError) {
        if let Some(target) = self.target.upgrade() {
            target.on_error(error);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.target.strong_count() == 0
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Stops an open transport. `stop` must not block: it may be called from the
/// transport's own delivery context.
pub trait TransportHandle: Send {
    fn stop(&self);
}

pub trait Transport: Send + Sync {
    /// Start delivering into `delivery` and return a handle to stop it.
    fn open(&self, delivery: Delivery) -> StreamResult<Box<dyn TransportHandle>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn open(&self, delivery: Delivery) -> StreamResult<Box<dyn TransportHandle>> {
        (**self).open(delivery)
    }
}

/// Drive a byte stream into `delivery` until it ends, fails, or the receiver
/// stops accepting data.
pub async fn pump<S, B, E>(stream: S, delivery: Delivery)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    futures_util::pin_mut!(stream);
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                if !delivery.chunk(chunk.as_ref()) {
                    debug!("receiver stopped accepting chunks, pump exiting");
                    return;
                }
            }
            Err(e) => {
                delivery.fail(TransportError::Network(e.to_string()));
                return;
            }
        }
    }
    delivery.complete();
}
