//! Error types for vrclib.
//!
//! Every fallible vrclib call returns [`Result<T>`]. One [`Error`] enum
//! covers transport failures, malformed server lines and commands the
//! server refused.
//!
//! Only blocking operations (connect, call creation, license request,
//! headset preset, live-radio-control set) surface these to the host.
//! Fire-and-forget setters absorb them and report through version counters
//! or error channels instead.

/// The error type for all vrclib operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (TCP socket, in-process channel).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed line, bad field value).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for a response from the server.
    #[error("timeout waiting for response")]
    Timeout,

    /// No transport is attached, or the attached transport is closed.
    ///
    /// Blocking operations return this immediately without attempting a
    /// network round trip.
    #[error("not connected")]
    NotConnected,

    /// The transport was lost while an operation was in flight.
    #[error("connection lost")]
    ConnectionLost,

    /// The server answered a request with a non-zero result code.
    #[error("rejected by server (0x{code:08X}): {message}")]
    Rejected {
        /// Server result code.
        code: u32,
        /// Human-readable reason supplied by the server (may be empty).
        message: String,
    },

    /// An invalid parameter was passed to a client operation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
