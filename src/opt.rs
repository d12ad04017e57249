//! Server configuration (§4.9 "Options", grounded on `opt.go`).
//!
//! The Go original applies a list of functional `Option` values to a
//! private `options` struct. Rust's equivalent idiom is a fluent builder:
//! [`Options::new`] seeds the documented defaults, and each `with_*`
//! method consumes and returns `self` so calls chain the same way
//! `anser.New(opts...)` composes a variadic option list.

use crate::log::{default_logger, Level, Logger, SharedLogger};
use crate::util::string::CaseFoldedSet;
use std::path::PathBuf;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 56789;
const DEFAULT_IPC_PATH: &str = "/var/run/anser.rpc";

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_JSON_RPC: &str = "application/json-rpc";
pub const CONTENT_TYPE_JSON_REQUEST: &str = "application/jsonrequest";

/// Server-wide configuration assembled by the caller before starting the
/// facade (§4.8, §4.9). All fields have documented defaults (§4.9
/// "Defaults").
pub struct Options {
    pub(crate) rpc_endpoint: Option<(String, u16)>,
    pub(crate) ipc_endpoint: Option<PathBuf>,
    pub(crate) logger: SharedLogger,
    pub(crate) log_level: Level,
    pub(crate) http_vhosts: CaseFoldedSet,
    pub(crate) http_denied_methods: CaseFoldedSet,
    pub(crate) http_allowed_content_types: CaseFoldedSet,
    pub(crate) disable_interrupt: bool,
}

impl Options {
    /// Neither transport is enabled by default; a caller must opt in with
    /// [`Self::rpc_endpoint`] and/or [`Self::ipc_endpoint`] (§4.8 `Run`
    /// only starts a transport whose endpoint is configured).
    pub fn new() -> Self {
        Self {
            rpc_endpoint: None,
            ipc_endpoint: None,
            logger: default_logger(),
            log_level: Level::Debug,
            http_vhosts: CaseFoldedSet::from_iter(["localhost"]),
            http_denied_methods: CaseFoldedSet::from_iter(["DELETE", "PUT"]),
            http_allowed_content_types: CaseFoldedSet::from_iter([
                CONTENT_TYPE_JSON,
                CONTENT_TYPE_JSON_RPC,
                CONTENT_TYPE_JSON_REQUEST,
            ]),
            disable_interrupt: false,
        }
    }

    /// Enables the HTTP transport on `host:port`.
    pub fn rpc_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.rpc_endpoint = Some((host.into(), port));
        self
    }

    /// Enables the HTTP transport on the documented default endpoint
    /// (`127.0.0.1:56789`).
    pub fn default_rpc_endpoint(self) -> Self {
        self.rpc_endpoint(DEFAULT_RPC_HOST, DEFAULT_RPC_PORT)
    }

    /// Enables the IPC transport at `path`.
    pub fn ipc_endpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.ipc_endpoint = Some(path.into());
        self
    }

    /// Enables the IPC transport at the documented default path
    /// (`/var/run/anser.rpc`).
    pub fn default_ipc_endpoint(self) -> Self {
        self.ipc_endpoint(DEFAULT_IPC_PATH)
    }

    /// Installs a caller-supplied logger, e.g. one writing to a file at a
    /// given filter level. This crate does not ship file-sink log
    /// rotation itself (§1 out of scope); callers that want `log-file`
    /// semantics construct a `tracing` file layer and pass it in here.
    pub fn log_custom(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = std::sync::Arc::new(logger);
        self
    }

    /// Restores the default logger (forwards to `tracing`) at the given
    /// filter level.
    pub fn log_default(mut self, level: Level) -> Self {
        self.logger = default_logger();
        self.log_level = level;
        self
    }

    /// Discards all log messages, matching `silent: true` in the Go
    /// default-log-file option.
    pub fn log_silent(mut self) -> Self {
        self.logger = std::sync::Arc::new(crate::log::SilentLogger);
        self
    }

    /// Extends (not replaces) the allowed virtual hosts (§4.5
    /// "Virtual-host"). Empty strings are ignored.
    pub fn http_vhosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for host in hosts {
            self.http_vhosts.insert(host.as_ref());
        }
        self
    }

    /// Extends the set of HTTP methods the validate middleware rejects
    /// (§4.5 "Validate"). Empty strings are ignored.
    pub fn http_denied_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for method in methods {
            self.http_denied_methods.insert(method.as_ref());
        }
        self
    }

    /// Skips installing the process-wide interrupt→`Close` wiring (§4.8
    /// step 1).
    pub fn disable_interrupt(mut self) -> Self {
        self.disable_interrupt = true;
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let opts = Options::new();
        assert!(opts.rpc_endpoint.is_none());
        assert!(opts.ipc_endpoint.is_none());
        assert!(!opts.disable_interrupt);
        assert!(opts.http_vhosts.contains("localhost"));
        assert!(opts.http_denied_methods.contains("delete"));
        assert!(opts.http_denied_methods.contains("put"));
        assert!(opts
            .http_allowed_content_types
            .contains(CONTENT_TYPE_JSON));
    }

    #[test]
    fn default_endpoints_use_documented_host_port_and_path() {
        let opts = Options::new().default_rpc_endpoint().default_ipc_endpoint();
        assert_eq!(
            opts.rpc_endpoint,
            Some((DEFAULT_RPC_HOST.to_string(), DEFAULT_RPC_PORT))
        );
        assert_eq!(opts.ipc_endpoint, Some(PathBuf::from(DEFAULT_IPC_PATH)));
    }

    #[test]
    fn vhosts_and_denied_methods_extend_rather_than_replace() {
        let opts = Options::new().http_vhosts(["example.com"]);
        assert!(opts.http_vhosts.contains("localhost"));
        assert!(opts.http_vhosts.contains("example.com"));
    }

    #[test]
    fn empty_vhost_entries_are_ignored() {
        let opts = Options::new().http_vhosts([""]);
        assert!(!opts.http_vhosts.contains(""));
    }
}
