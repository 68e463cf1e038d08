//! Transport-level errors.
//!
//! Filesystem-level failures are not errors here: they travel as a
//! [`Status`](crate::status::Status) payload inside an otherwise successful
//! exchange. This type covers the call channel itself — aborts raised by the
//! peer, lost connections and malformed frames.

use std::{fmt, io};

use crate::status::AbortCode;

#[derive(Debug)]
pub enum Error {
    /// I/O error on the underlying connection.
    Io(io::Error),

    /// The peer aborted the call with a structured failure.
    Abort { code: AbortCode, message: String },

    /// The local side cancelled the call before a reply arrived.
    Cancelled,

    /// The connection closed while a call was still in flight.
    Disconnected,
}

impl Error {
    /// Abort raised when the native layer reports ENOSYS for `method`.
    pub fn unimplemented(method: &str) -> Error {
        Error::Abort {
            code: AbortCode::Unimplemented,
            message: format!("method {method} not implemented"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Abort { code, message } => write!(f, "call aborted ({code:?}): {message}"),
            Error::Cancelled => write!(f, "call cancelled"),
            Error::Disconnected => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}
