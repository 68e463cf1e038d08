//! Native status codes and the translation rules between them and the call
//! channel's own failure categories.
//!
//! A `Status` is the errno-like outcome of a filesystem operation. It crosses
//! the wire as a payload integer in a response or frame, with one exception:
//! `ENOSYS` never travels as a payload. The serving side turns it into an
//! [`AbortCode::Unimplemented`] call failure, and the calling side turns that
//! abort — and only that abort — back into `ENOSYS`. Every other transport
//! failure maps to `EIO`, so "the peer cannot do this at all" and "the peer
//! tried and the channel broke" stay distinguishable.

use log::{error, warn};

use crate::error::Error;

/// Outcome of a native filesystem operation. `0` is success.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Status(pub i32);

impl Status {
    pub const OK: Status = Status(0);
    pub const EPERM: Status = Status(1);
    pub const ENOENT: Status = Status(2);
    pub const EINTR: Status = Status(4);
    pub const EIO: Status = Status(5);
    pub const EACCES: Status = Status(13);
    pub const EEXIST: Status = Status(17);
    pub const ENOTDIR: Status = Status(20);
    pub const EISDIR: Status = Status(21);
    pub const EINVAL: Status = Status(22);
    pub const ERANGE: Status = Status(34);
    pub const ENOSYS: Status = Status(38);
    pub const ENOTEMPTY: Status = Status(39);
    pub const ENODATA: Status = Status(61);
    pub const ENOTSUP: Status = Status(95);

    pub fn is_ok(self) -> bool {
        self == Status::OK
    }

    pub fn errno(self) -> i32 {
        self.0
    }
}

impl From<nix::errno::Errno> for Status {
    fn from(errno: nix::errno::Errno) -> Status {
        Status(errno as i32)
    }
}

impl From<std::io::Error> for Status {
    fn from(e: std::io::Error) -> Status {
        match e.raw_os_error() {
            Some(errno) => Status(errno),
            None => Status::EIO,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "errno {}", self.0)
    }
}

/// Category carried by a call abort. The numbering follows the usual RPC
/// status-code table so that a wire capture reads naturally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortCode {
    Cancelled,
    Unknown,
    Unimplemented,
    Internal,
    Unavailable,
}

impl AbortCode {
    pub fn to_u8(self) -> u8 {
        match self {
            AbortCode::Cancelled => 1,
            AbortCode::Unknown => 2,
            AbortCode::Unimplemented => 12,
            AbortCode::Internal => 13,
            AbortCode::Unavailable => 14,
        }
    }

    pub fn from_u8(v: u8) -> AbortCode {
        match v {
            1 => AbortCode::Cancelled,
            12 => AbortCode::Unimplemented,
            13 => AbortCode::Internal,
            14 => AbortCode::Unavailable,
            _ => AbortCode::Unknown,
        }
    }
}

/// Maps a failed transport exchange to the status handed back to the kernel
/// side.
///
/// `Unimplemented` aborts become `ENOSYS`; a locally cancelled call becomes
/// `EINTR`; anything else — disconnects, decode failures, unexpected replies —
/// becomes `EIO`. The reverse of the `ENOSYS` mapping exists only for the
/// specific abort code, never for generic failures.
pub fn status_from_transport(method: &str, err: &Error) -> Status {
    match err {
        Error::Abort {
            code: AbortCode::Unimplemented,
            ..
        } => {
            warn!("{method} unimplemented");
            Status::ENOSYS
        }
        Error::Cancelled => Status::EINTR,
        other => {
            error!("{method}: {other}");
            Status::EIO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_err;

    #[test]
    fn unimplemented_maps_to_enosys() {
        let st = status_from_transport("GetAttr", &Error::unimplemented("GetAttr"));
        assert_eq!(st, Status::ENOSYS);
    }

    #[test]
    fn generic_abort_maps_to_eio() {
        let err = Error::Abort {
            code: AbortCode::Internal,
            message: "boom".to_owned(),
        };
        assert_eq!(status_from_transport("Read", &err), Status::EIO);
    }

    #[test]
    fn io_error_maps_to_eio() {
        let err = Error::Io(io_err!(BrokenPipe, "gone"));
        assert_eq!(status_from_transport("Lookup", &err), Status::EIO);
    }

    #[test]
    fn cancelled_maps_to_eintr() {
        assert_eq!(status_from_transport("Read", &Error::Cancelled), Status::EINTR);
    }

    #[test]
    fn abort_code_roundtrip() {
        for code in [
            AbortCode::Cancelled,
            AbortCode::Unknown,
            AbortCode::Unimplemented,
            AbortCode::Internal,
            AbortCode::Unavailable,
        ] {
            assert_eq!(AbortCode::from_u8(code.to_u8()), code);
        }
        assert_eq!(AbortCode::from_u8(200), AbortCode::Unknown);
    }

    #[test]
    fn status_from_os_error() {
        let e = std::io::Error::from_raw_os_error(13);
        assert_eq!(Status::from(e), Status::EACCES);
    }
}
