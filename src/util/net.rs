//! Transient-error classification for accept loops, grounded on
//! `util/net.go`'s `IsTemporaryError` (there checked via a `Temporary()`
//! interface method; here mapped onto the `std::io::ErrorKind`s that mean
//! "try accepting again" rather than "the listener is dead").

use std::io;

/// Whether `err` is the kind of accept-loop failure that should be retried
/// rather than treated as fatal (§4.6: "retries on transient errors").
pub fn is_temporary(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_kinds() {
        assert!(is_temporary(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(is_temporary(&io::Error::from(io::ErrorKind::ConnectionReset)));
    }

    #[test]
    fn classifies_fatal_kinds() {
        assert!(!is_temporary(&io::Error::from(io::ErrorKind::AddrInUse)));
        assert!(!is_temporary(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
