//! Error types for the sink layer.

use std::io;

use thiserror::Error;

/// A record could not be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// Rendered line does not fit the line buffer.
    #[error("buffer overflow: max {max} bytes, got {actual}")]
    Overflow { max: usize, actual: usize },
}

/// A rendered line could not be delivered.
#[derive(Debug, Error)]
pub enum SendError {
    /// The sink was used before `open` or after `close`.
    #[error("sink is not open")]
    NotOpen,

    /// Fewer bytes left than were handed to the transport.
    #[error("short write: sent {sent} of {expected} bytes")]
    ShortWrite { sent: usize, expected: usize },

    /// Transport error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from sink lifecycle hooks.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink could not set up its connection.
    #[error("failed to open sink {name}: {source}")]
    Open {
        /// Sink name.
        name: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// Result type alias for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;
