//! Hand-driven transport for tests and embedding.
//!
//! Whoever holds a clone pushes chunks and terminal notifications by hand,
//! from any thread.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{Delivery, Transport, TransportHandle};
use crate::error::{StreamError, StreamResult, TransportError};

#[derive(Debug, Default)]
struct Inner {
    delivery: Mutex<Option<Delivery>>,
    open_error: Mutex<Option<StreamError>>,
    opened: AtomicUsize,
    stopped: AtomicBool,
}

#[derive(Debug, Clone, Default)]
pub struct ManualTransport {
    inner: Arc<Inner>,
}

impl ManualTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose `open` fails with `err`.
    pub fn failing(err: StreamError) -> Self {
        let transport = Self::default();
        *lock(&transport.inner.open_error) = Some(err);
        transport
    }

    /// The delivery handed over by the last `open`, if any.
    pub fn delivery(&self) -> Option<Delivery> {
        lock(&self.inner.delivery).clone()
    }

    /// Push a chunk. Returns `false` if the transport is not open or the
    /// session refused it.
    pub fn push(&self, chunk: impl AsRef<[u8]>) -> bool {
        match self.delivery() {
            Some(delivery) => delivery.chunk(chunk.as_ref()),
            None => false,
        }
    }

    pub fn complete(&self) {
        if let Some(delivery) = self.delivery() {
            delivery.complete();
        }
    }

    pub fn fail(&self, error: TransportError) {
        if let Some(delivery) = self.delivery() {
            delivery.fail(error);
        }
    }

    pub fn open_count(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    /// Whether the session told this transport to stop.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl Transport for ManualTransport {
    fn open(&self, delivery: Delivery) -> StreamResult<Box<dyn TransportHandle>> {
        if let Some(err) = lock(&self.inner.open_error).clone() {
            return Err(err);
        }
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        *lock(&self.inner.delivery) = Some(delivery);
        Ok(Box::new(ManualHandle {
            inner: self.inner.clone(),
        }))
    }
}

struct ManualHandle {
    inner: Arc<Inner>,
}

impl TransportHandle for ManualHandle {
    fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
