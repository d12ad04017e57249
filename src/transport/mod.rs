//! The three request transports (§4.5–§4.7): HTTP, Unix-domain IPC, and a
//! WebSocket adapter mounted on the HTTP listener. Each transport binds an
//! accept/connection loop to a shared [`crate::dispatch::Dispatcher`] so
//! the message pipeline itself is transport-agnostic.

pub mod http;
pub mod ipc;
pub mod websocket;
