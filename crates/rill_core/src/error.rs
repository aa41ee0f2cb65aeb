use thiserror::Error;

/// Failure reported by the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection dropped, DNS failure, body read error, ...
    #[error("network error: {0}")]
    Network(String),
    /// The server answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    /// The transport went away without a terminal notification.
    #[error("transport closed")]
    Closed,
    #[error("{0}")]
    Other(String),
}

/// Everything `next()` can fail with.
///
/// Stream-level variants (`Decoding`, `Transport`, `BufferOverflow`,
/// `Cancelled`) are terminal and repeat on every later pull. The remaining
/// variants are usage errors and leave the stream untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("chunk is not valid UTF-8 (invalid byte at stream offset {offset})")]
    Decoding { offset: usize },

    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("next() called while a previous pull is still outstanding")]
    ConcurrentPull,

    /// Not a failure: the owner asked the stream to stop.
    #[error("stream cancelled")]
    Cancelled,

    #[error("session has not been started")]
    NotStarted,

    #[error("session already started")]
    AlreadyStarted,

    #[error("pending buffer grew past {limit} bytes without a complete event")]
    BufferOverflow { limit: usize },
}

impl StreamError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }

    /// Whether this error ends the stream (as opposed to a misuse of the API).
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            StreamError::ConcurrentPull | StreamError::NotStarted | StreamError::AlreadyStarted
        )
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
