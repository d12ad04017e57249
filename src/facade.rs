//! The server facade (§4.8 "Server Facade").
//!
//! [`Anser`] owns the registry, the configured [`Options`], and the two
//! transports, and sequences `run`/`close` the way the Go original's
//! `Run`/`Close` do: register the interrupt callback, start whichever
//! transports are configured, log the running configuration, then block
//! until both transports finish.

use crate::builtin::register_builtin;
use crate::dispatch::Dispatcher;
use crate::interrupt::register_on_interrupt;
use crate::log::SharedLogger;
use crate::metrics::Metrics;
use crate::opt::Options;
use crate::registry::{Registry, ServiceDef};
use crate::transport::http::HttpTransport;
use crate::transport::ipc::IpcTransport;
use crate::transport::websocket;
use std::net::SocketAddr;
use std::sync::Arc;

/// The top-level server: a registry, a dispatcher built from it, and the
/// two transports that feed the dispatcher (§4.8).
pub struct Anser {
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
    logger: SharedLogger,
    http: HttpTransport,
    ipc: IpcTransport,
    options: Options,
}

impl Anser {
    /// Builds a facade from `options`, registering the built-in service
    /// (§3 I5) immediately so `modules()` reflects it even before `run`.
    pub async fn new(options: Options) -> Self {
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(Metrics::new());
        let logger = options.logger.clone();

        register_builtin(&registry, metrics.clone()).await;

        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            metrics.clone(),
            logger.clone(),
        ));

        let http = HttpTransport::new(
            dispatcher.clone(),
            logger.clone(),
            options.http_vhosts.clone(),
            options.http_denied_methods.clone(),
            options.http_allowed_content_types.clone(),
            true,
        );
        let ipc = IpcTransport::new(dispatcher, logger.clone());

        Self {
            registry,
            metrics,
            logger,
            http,
            ipc,
            options,
        }
    }

    /// Registers an embedder-defined service (§4.3, §9 explicit
    /// registration). Call this before [`Self::run`].
    pub async fn register(&self, service: ServiceDef) -> Result<(), crate::error::StatusError> {
        self.registry.register(service).await
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// The HTTP transport's bound address, once [`Self::run`] has started
    /// it. Useful when `rpc_endpoint` was configured with port 0.
    pub async fn http_listen_addr(&self) -> Option<SocketAddr> {
        self.http.listen_addr().await
    }

    /// §4.8 `Run`:
    /// 1. Register an interrupt callback (unless disabled) that calls
    ///    [`Self::close`].
    /// 2. Start HTTP if an RPC endpoint is configured.
    /// 3. Start IPC if an IPC path is configured.
    /// 4. Log the running configuration and block until both transports
    ///    finish.
    pub async fn run(self: Arc<Self>) -> std::io::Result<()> {
        if !self.options.disable_interrupt {
            let closer = self.clone();
            register_on_interrupt(move || {
                tokio::spawn(async move { closer.close().await });
            });
        }

        if let Some((host, port)) = &self.options.rpc_endpoint {
            let addr: SocketAddr = format!("{host}:{port}")
                .parse()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{e}")))?;
            self.http.set_listen_addr(addr).await.map_err(|e| {
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
            })?;
            if let Err(e) = self.http.start().await {
                self.logger.error(&format!("HTTP transport failed to start: {e}"));
                self.http.stop().await;
            }
        }

        if let Some(path) = &self.options.ipc_endpoint {
            self.ipc.set_path(path.clone()).await.map_err(|e| {
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
            })?;
            if let Err(e) = self.ipc.start().await {
                self.logger.error(&format!("IPC transport failed to start: {e}"));
                self.ipc.stop().await;
            }
        }

        self.logger.info(&format!(
            "anserpc running; modules:\n{}",
            self.registry.modules().await
        ));

        tokio::join!(self.http.wait(), self.ipc.wait());
        Ok(())
    }

    /// §4.8 `Close`: stops both transports (non-waited) and closes every
    /// live WebSocket connection, then awaits drain.
    pub async fn close(&self) {
        self.http.stop().await;
        self.ipc.stop().await;
        websocket::close_all().await;
        self.http.wait().await;
        self.ipc.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_registers_builtin_service_up_front() {
        let anser = Anser::new(Options::new()).await;
        let modules = anser.registry.modules().await;
        assert!(modules.contains("built-in_1.0"));
    }

    #[tokio::test]
    async fn run_is_a_no_op_without_configured_endpoints() {
        let anser = Arc::new(Anser::new(Options::new().disable_interrupt()).await);
        // Neither transport is configured, so `run` returns once both
        // `wait()` calls resolve immediately.
        tokio::time::timeout(std::time::Duration::from_secs(2), anser.run())
            .await
            .expect("run should return promptly with no transports configured")
            .unwrap();
    }
}
