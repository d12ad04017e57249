//! A reflection-free JSON-RPC 2.0 server framework multiplexing HTTP,
//! Unix-socket IPC, and WebSocket transports onto a single dispatch engine.
//!
//! Start with [`opt::Options`] to configure listen endpoints and policy,
//! [`facade::Anser`] to register services and run the server, and
//! [`registry::ServiceDef`]/[`registry::Callback`] to describe the methods
//! an embedder exposes.

pub mod builtin;
pub mod codec;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod facade;
pub mod interrupt;
pub mod log;
pub mod message;
pub mod metrics;
pub mod opt;
pub mod registry;
pub mod transport;
pub mod util;

pub use error::StatusError;
pub use facade::Anser;
pub use opt::Options;
pub use registry::{Callback, MethodDef, ParamSpec, ReturnShape, ServiceDef};
