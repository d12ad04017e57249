//! The dispatch context (GLOSSARY: "opaque carrier of per-request values").
//!
//! Handlers that declare a context parameter (`hasCtx`, §3) receive this by
//! value. It currently carries the remote/local address attached by the
//! transport (§4.5, §4.6) and a cancellation token tied to the per-message
//! timeout (§5: "handlers must cooperate via the context they receive").

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct DispatchContext {
    peer_addr: Option<String>,
    cancelled: CancellationToken,
}

impl DispatchContext {
    pub fn new(peer_addr: Option<String>) -> Self {
        Self {
            peer_addr,
            cancelled: CancellationToken::new(),
        }
    }

    /// The remote address (HTTP/TCP, IPC) or local address attached by the
    /// transport, if any.
    pub fn peer_addr(&self) -> Option<&str> {
        self.peer_addr.as_deref()
    }

    /// A token that is cancelled once the per-message handler timeout
    /// (§4.4, §5) fires, so a cooperating handler can stop early. The wait
    /// barrier does not forcibly abort the handler task; it only stops
    /// waiting on it and emits a timeout response (§5 "not propagated into
    /// the handler").
    pub fn cancellation(&self) -> CancellationToken {
        self.cancelled.clone()
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.cancel();
    }
}
