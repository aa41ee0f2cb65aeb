//! Incremental event parsing for chunked byte streams.
//!
//! A transport pushes raw chunks into a [`StreamSession`]; the session splits
//! them into blank-line delimited [`Event`]s and hands them to a single
//! consumer that pulls one at a time with [`StreamSession::next`].

pub mod bridge;
pub mod buffer;
pub mod config;
pub mod error;
pub mod event;
pub mod scanner;
pub mod session;
pub mod transport;

pub use bridge::Bridge;
pub use buffer::{Remnant, StreamBuffer};
pub use config::{RillConfig, StreamConfig};
pub use error::{StreamError, StreamResult, TransportError};
pub use event::Event;
pub use session::{SessionState, SessionStats, StreamSession};
pub use transport::{pump, Delivery, DeliveryTarget, ManualTransport, Transport, TransportHandle};
