//! One streaming request, end to end.
//!
//! `Idle → Streaming → {Completed | Failed | Cancelled}`. The transport feeds
//! chunks through a [`Delivery`] bound to the session; the session buffers and
//! scans them and forwards complete events to its [`Bridge`], where the
//! consumer pulls them with [`StreamSession::next`].
//!
//! Locks are always taken in the order buffer → state → bridge, and none is
//! held while the transport is told to stop.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::Stream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bridge::Bridge;
use crate::buffer::StreamBuffer;
use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult, TransportError};
use crate::event::Event;
use crate::transport::{Delivery, DeliveryTarget, Transport, TransportHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Streaming => "streaming",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Counters for one session, as seen by the producer side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub chunks: u64,
    pub bytes: u64,
    /// Events handed to the bridge (not necessarily pulled yet).
    pub events: u64,
}

/// How a terminal transition reaches the bridge.
enum Ending {
    Completed,
    Failed(StreamError),
    Cancelled,
}

struct Shared {
    id: Uuid,
    state: Mutex<SessionState>,
    buffer: Mutex<StreamBuffer>,
    bridge: Bridge,
    handle: Mutex<Option<Box<dyn TransportHandle>>>,
    chunks: AtomicU64,
    bytes: AtomicU64,
    events: AtomicU64,
}

impl Shared {
    fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Move to a terminal state if still live. Only the first call wins.
    fn finish(&self, ending: Ending) -> bool {
        let mut state = lock(&self.state);
        if state.is_terminal() {
            return false;
        }

        let previous = *state;
        let next = match &ending {
            Ending::Completed => SessionState::Completed,
            Ending::Failed(_) => SessionState::Failed,
            Ending::Cancelled => SessionState::Cancelled,
        };
        *state = next;
        match ending {
            Ending::Completed => self.bridge.complete(),
            Ending::Failed(err) => {
                warn!(session = %self.id, error = %err, "stream failed");
                self.bridge.fail(err)
            }
            Ending::Cancelled => self.bridge.cancel(),
        };
        info!(session = %self.id, from = %previous, to = %next, "stream session finished");
        true
    }

    /// Tell the transport to stop, at most once. Called with no lock held.
    fn stop_transport(&self) {
        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            debug!(session = %self.id, "stopping transport");
            handle.stop();
        }
    }

    /// Forget the handle of a transport that already ended on its own.
    fn release_transport(&self) {
        drop(lock(&self.handle).take());
    }
}

impl DeliveryTarget for Shared {
    fn on_chunk(&self, chunk: &[u8]) -> bool {
        let mut buffer = lock(&self.buffer);
        if self.state() != SessionState::Streaming {
            return false;
        }

        self.chunks.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        debug!(session = %self.id, bytes = chunk.len(), "chunk received");

        let events = match buffer.append(chunk) {
            Ok(events) => events,
            Err(err) => {
                drop(buffer);
                self.finish(Ending::Failed(err));
                self.stop_transport();
                return false;
            }
        };

        {
            let state = lock(&self.state);
            if *state != SessionState::Streaming {
                return false;
            }
            for event in events {
                if self.bridge.push(event) {
                    self.events.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        if let Err(err) = buffer.ensure_capacity() {
            drop(buffer);
            self.finish(Ending::Failed(err));
            self.stop_transport();
            return false;
        }
        true
    }

    fn on_complete(&self) {
        let remnant = lock(&self.buffer).finish();
        if self.finish(Ending::Completed) {
            if !remnant.is_empty() {
                debug!(
                    session = %self.id,
                    chars = remnant.text.len(),
                    undecoded = remnant.undecoded,
                    "discarding incomplete trailing event"
                );
            }
            self.release_transport();
        }
    }

    fn on_error(&self, error: TransportError) {
        if self.finish(Ending::Failed(error.into())) {
            self.release_transport();
        }
    }
}

/// A single streaming request with a pull-based consumer side.
///
/// `next` takes `&self`, so the session can be shared, but only one pull may
/// be outstanding at a time.
pub struct StreamSession {
    shared: Arc<Shared>,
    transport: Box<dyn Transport>,
}

impl StreamSession {
    pub fn new(transport: impl Transport + 'static, config: &StreamConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                state: Mutex::new(SessionState::Idle),
                buffer: Mutex::new(StreamBuffer::with_config(config)),
                bridge: Bridge::new(),
                handle: Mutex::new(None),
                chunks: AtomicU64::new(0),
                bytes: AtomicU64::new(0),
                events: AtomicU64::new(0),
            }),
            transport: Box::new(transport),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Open the transport and begin streaming.
    pub fn start(&self) -> StreamResult<()> {
        {
            let mut state = lock(&self.shared.state);
            match *state {
                SessionState::Idle => *state = SessionState::Streaming,
                SessionState::Cancelled => return Err(StreamError::Cancelled),
                _ => return Err(StreamError::AlreadyStarted),
            }
        }
        info!(session = %self.shared.id, "stream session started");

        match self.transport.open(Delivery::new(&self.shared)) {
            Ok(handle) => {
                *lock(&self.shared.handle) = Some(handle);
                // A cancel or decoding failure may have raced the open.
                if self.shared.state().is_terminal() {
                    self.shared.stop_transport();
                }
                Ok(())
            }
            Err(err) => {
                self.shared.finish(Ending::Failed(err.clone()));
                Err(err)
            }
        }
    }

    /// Pull the next event.
    ///
    /// `Ok(Some(event))` for an event, `Ok(None)` once the stream completed,
    /// `Err` for failure or cancellation. Terminal outcomes repeat on every
    /// later call.
    pub async fn next(&self) -> StreamResult<Option<Event>> {
        if self.state() == SessionState::Idle {
            return Err(StreamError::NotStarted);
        }
        self.shared.bridge.next().await
    }

    /// Stop the stream. A waiting `next` returns [`StreamError::Cancelled`]
    /// right away. No-op once the session is terminal.
    pub fn cancel(&self) {
        if self.shared.finish(Ending::Cancelled) {
            self.shared.stop_transport();
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Whether a consumer is currently suspended in [`StreamSession::next`].
    pub fn has_waiter(&self) -> bool {
        self.shared.bridge.has_waiter()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            chunks: self.shared.chunks.load(Ordering::Relaxed),
            bytes: self.shared.bytes.load(Ordering::Relaxed),
            events: self.shared.events.load(Ordering::Relaxed),
        }
    }

    /// Adapt the session into a `Stream` of events that ends after the first
    /// terminal outcome (an error item for failure or cancellation, nothing
    /// for completion).
    pub fn into_stream(self) -> impl Stream<Item = StreamResult<Event>> + Send {
        futures_util::stream::unfold(Some(self), |session| async move {
            let session = session?;
            match session.next().await {
                Ok(Some(event)) => Some((Ok(event), Some(session))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ManualTransport;

    fn started() -> (StreamSession, ManualTransport) {
        let transport = ManualTransport::new();
        let session = StreamSession::new(transport.clone(), &StreamConfig::default());
        session.start().unwrap();
        (session, transport)
    }

    #[tokio::test]
    async fn test_next_before_start() {
        let session = StreamSession::new(ManualTransport::new(), &StreamConfig::default());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.next().await, Err(StreamError::NotStarted));
    }

    #[test]
    fn test_start_twice() {
        let (session, transport) = started();
        assert_eq!(session.start(), Err(StreamError::AlreadyStarted));
        assert_eq!(transport.open_count(), 1);
    }

    #[test]
    fn test_open_failure_fails_session() {
        let err: StreamError = TransportError::Other("refused".into()).into();
        let session = StreamSession::new(ManualTransport::failing(err.clone()), &StreamConfig::default());
        assert_eq!(session.start(), Err(err));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let session = StreamSession::new(ManualTransport::new(), &StreamConfig::default());
        session.cancel();
        assert_eq!(session.state(), SessionState::Cancelled);
        assert_eq!(session.start(), Err(StreamError::Cancelled));
        assert_eq!(session.next().await, Err(StreamError::Cancelled));
    }

    #[tokio::test]
    async fn test_stats_track_producer_side() {
        let (session, transport) = started();
        transport.push("A\n\nB");
        transport.push("\n\n");
        assert_eq!(
            session.stats(),
            SessionStats {
                chunks: 2,
                bytes: 6,
                events: 2
            }
        );
    }

    #[tokio::test]
    async fn test_decoding_error_fails_and_stops_transport() {
        let (session, transport) = started();
        assert!(transport.push("A\n\n"));
        assert!(!transport.push(b"\xff\xfe"));

        assert_eq!(session.state(), SessionState::Failed);
        assert!(transport.is_stopped());
        assert_eq!(session.next().await.unwrap().unwrap(), "A");
        assert_eq!(
            session.next().await,
            Err(StreamError::Decoding { offset: 3 })
        );
    }

    #[tokio::test]
    async fn test_overflow_fails_session() {
        let transport = ManualTransport::new();
        let config = StreamConfig {
            max_pending_bytes: Some(8),
            ..StreamConfig::default()
        };
        let session = StreamSession::new(transport.clone(), &config);
        session.start().unwrap();

        assert!(transport.push("ok\n\n"));
        assert!(!transport.push("0123456789"));
        assert!(transport.is_stopped());
        assert_eq!(session.next().await.unwrap().unwrap(), "ok");
        assert_eq!(
            session.next().await,
            Err(StreamError::BufferOverflow { limit: 8 })
        );
    }

    #[test]
    fn test_drop_stops_transport() {
        let (session, transport) = started();
        let delivery = transport.delivery().unwrap();
        drop(session);

        assert!(transport.is_stopped());
        assert!(delivery.is_closed());
        assert!(!transport.push("late\n\n"));
    }

    #[test]
    fn test_completion_releases_without_stopping() {
        let (session, transport) = started();
        transport.complete();
        assert_eq!(session.state(), SessionState::Completed);
        // The transport ended by itself; a later cancel is a no-op.
        session.cancel();
        assert!(!transport.is_stopped());
        assert_eq!(session.state(), SessionState::Completed);
    }
}
