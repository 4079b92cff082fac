// Error kinds the core distinguishes.
//
// All of these are local to one session: they terminate that session's
// connection loop and never propagate to, or affect, any other session.
// Internal invariant violations are not represented here; they panic,
// since they're treated as fatal bugs rather than recoverable errors.

use thiserror::Error;

/// Why a session's connection loop stopped.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection closed")]
    ConnectionEof,

    #[error("short read: got {got} of {expected} expected bytes")]
    ShortRead { got: usize, expected: usize },

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a Cancel request was rejected. Carried only as far as the report
/// emitted for it. Rejection never tears down a session.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CancelRejectReason {
    #[error("order id not found in the global index")]
    NotFound,
    #[error("order belongs to a different session")]
    WrongSession,
    #[error("order indexed but absent from its book's price level")]
    WrongPriceLevel,
}
