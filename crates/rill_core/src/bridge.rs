//! Push-to-pull rendezvous between a transport and a single consumer.
//!
//! The producer side ([`Bridge::push`], [`Bridge::complete`], [`Bridge::fail`],
//! [`Bridge::cancel`]) is synchronous and never waits: it either hands the
//! value straight to a suspended consumer through a oneshot channel or appends
//! it to a FIFO queue. The consumer side ([`Bridge::next`]) takes from the
//! queue when it can and otherwise parks a oneshot sender in the waiter slot.
//!
//! State lives behind one `std::sync::Mutex`; critical sections never await,
//! so the producer may run on any thread, runtime or not.
//!
//! Invariants:
//! - the queue and the waiter slot are never both occupied;
//! - at most one pull is outstanding;
//! - completion and failure become visible only after the queue is drained,
//!   cancellation is visible immediately;
//! - once terminal, every pull returns the same outcome without suspending.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{StreamError, StreamResult};
use crate::event::Event;

/// What a single pull resolves to: an event, end-of-stream (`None`), or the
/// stream's error.
pub type Pull = StreamResult<Option<Event>>;

#[derive(Debug, Clone)]
enum Terminal {
    Completed,
    Failed(StreamError),
    Cancelled,
}

impl Terminal {
    fn outcome(&self) -> Pull {
        match self {
            Terminal::Completed => Ok(None),
            Terminal::Failed(err) => Err(err.clone()),
            Terminal::Cancelled => Err(StreamError::Cancelled),
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    queue: VecDeque<Event>,
    waiter: Option<oneshot::Sender<Pull>>,
    terminal: Option<Terminal>,
    /// A pull has suspended and not yet returned or been dropped. Stays set
    /// after the producer takes `waiter` to hand over a value.
    outstanding: bool,
}

#[derive(Debug, Default)]
pub struct Bridge {
    slot: Mutex<Slot>,
}

impl Bridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer one event. Returns `false` if the stream is already terminal and
    /// the event was dropped.
    pub fn push(&self, event: Event) -> bool {
        let mut slot = self.lock();
        if slot.terminal.is_some() {
            return false;
        }

        let event = match slot.waiter.take() {
            None => event,
            Some(waiter) => match waiter.send(Ok(Some(event))) {
                Ok(()) => return true,
                // The pull is being dropped; keep the event for the next one.
                Err(Ok(Some(event))) => event,
                Err(_) => return true,
            },
        };
        slot.queue.push_back(event);
        true
    }

    /// Graceful end of stream. Queued events are still delivered first.
    pub fn complete(&self) -> bool {
        self.terminate(Terminal::Completed)
    }

    /// Stream failure. Queued events are still delivered first.
    pub fn fail(&self, err: StreamError) -> bool {
        self.terminate(Terminal::Failed(err))
    }

    /// Stop now: queued events are discarded and a waiting consumer is woken
    /// with [`StreamError::Cancelled`].
    pub fn cancel(&self) -> bool {
        self.terminate(Terminal::Cancelled)
    }

    /// Pull the next event, suspending until one is produced or the stream
    /// reaches a terminal state.
    ///
    /// Fails with [`StreamError::ConcurrentPull`] if another pull has not
    /// returned yet, even if a value is already on its way to it. Dropping
    /// the returned future before it resolves is safe: an event already
    /// handed to it goes back to the head of the queue.
    pub async fn next(&self) -> Pull {
        let rx = {
            let mut slot = self.lock();
            if slot.outstanding {
                return Err(StreamError::ConcurrentPull);
            }

            if let Some(event) = slot.queue.pop_front() {
                return Ok(Some(event));
            }
            if let Some(terminal) = &slot.terminal {
                return terminal.outcome();
            }

            let (tx, rx) = oneshot::channel();
            slot.waiter = Some(tx);
            slot.outstanding = true;
            rx
        };

        let mut pending = PendingPull {
            bridge: self,
            rx: Some(rx),
        };
        let received = match pending.rx.as_mut() {
            Some(rx) => rx.await,
            None => return Err(StreamError::Cancelled),
        };
        pending.rx = None;
        self.lock().outstanding = false;

        match received {
            Ok(pull) => pull,
            // Sender dropped without a value: the bridge itself is going away.
            Err(_) => Err(StreamError::Cancelled),
        }
    }

    /// Events produced but not yet pulled.
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminal.is_some()
    }

    /// Whether a consumer is currently suspended in [`Bridge::next`].
    pub fn has_waiter(&self) -> bool {
        self.lock().outstanding
    }

    fn terminate(&self, terminal: Terminal) -> bool {
        let mut slot = self.lock();
        if slot.terminal.is_some() {
            return false;
        }

        if matches!(terminal, Terminal::Cancelled) && !slot.queue.is_empty() {
            debug!(discarded = slot.queue.len(), "cancel dropped queued events");
            slot.queue.clear();
        }

        let outcome = terminal.outcome();
        slot.terminal = Some(terminal);
        if slot.queue.is_empty() {
            if let Some(waiter) = slot.waiter.take() {
                let _ = waiter.send(outcome);
            }
        }
        true
    }

    /// Release the slot of a pull that was dropped before it returned, putting
    /// back any event already handed to it.
    fn abandon(&self, salvaged: Option<Event>) {
        let mut slot = self.lock();
        slot.outstanding = false;
        slot.waiter = None;
        if let Some(event) = salvaged {
            if !matches!(slot.terminal, Some(Terminal::Cancelled)) {
                slot.queue.push_front(event);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // Critical sections cannot panic half-way, so a poisoned slot is still consistent.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Receiver side of an outstanding pull. If the pull future is dropped after
/// the producer already sent it an event, the event is salvaged on drop.
struct PendingPull<'a> {
    bridge: &'a Bridge,
    rx: Option<oneshot::Receiver<Pull>>,
}

impl Drop for PendingPull<'_> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            let salvaged = match rx.try_recv() {
                Ok(Ok(Some(event))) => Some(event),
                _ => None,
            };
            self.bridge.abandon(salvaged);
        }
    }
}
