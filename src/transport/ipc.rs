//! IPC transport (§4.6 "Transport: IPC"): a Unix domain socket accept loop
//! feeding the same dispatch pipeline as HTTP, grounded on `ipc.go`'s
//! `setPath`/stale-file/chmod/transient-retry sequence and on
//! [`crate::codec::ByteStreamCodec`] (C2) for per-connection framing.

use crate::codec::ByteStreamCodec;
use crate::dispatch::Dispatcher;
use crate::error::StatusError;
use crate::log::SharedLogger;
use crate::util::net::is_temporary;
use crate::util::path::{ensure_parent_dir, exists};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// §4.6 "`setPath` enforces: length ≤ 128".
const MAX_PATH_LEN: usize = 128;

/// Reader cap for accepted connections (§4.6, matching HTTP's 5 MiB body
/// cap, §4.5).
const MAX_READ_BYTES: usize = 5 * 1024 * 1024;

struct RunningServer {
    path: PathBuf,
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

pub struct IpcTransport {
    dispatcher: Arc<Dispatcher>,
    logger: SharedLogger,
    running: Mutex<Option<RunningServer>>,
    configured_path: Mutex<Option<PathBuf>>,
}

impl IpcTransport {
    pub fn new(dispatcher: Arc<Dispatcher>, logger: SharedLogger) -> Self {
        Self {
            dispatcher,
            logger,
            running: Mutex::new(None),
            configured_path: Mutex::new(None),
        }
    }

    /// Validates and records the socket path; does not touch the
    /// filesystem until [`Self::start`] (§4.6 "`setPath`").
    pub async fn set_path(&self, path: impl Into<PathBuf>) -> Result<(), StatusError> {
        let path = path.into();
        let len = path.as_os_str().len();
        if len == 0 || len > MAX_PATH_LEN {
            return Err(StatusError::new(
                crate::error::CODE_INTERNAL_ERROR,
                format!("IPC path must be 1-{MAX_PATH_LEN} bytes, got {len}"),
            ));
        }
        *self.configured_path.lock().await = Some(path);
        Ok(())
    }

    /// No-op if already running or unconfigured.
    pub async fn start(&self) -> std::io::Result<()> {
        if self.running.lock().await.is_some() {
            return Ok(());
        }
        let Some(path) = self.configured_path.lock().await.clone() else {
            return Ok(());
        };

        ensure_parent_dir(&path).await?;
        if exists(&path).await? {
            tokio::fs::remove_file(&path).await?;
        }

        let listener = UnixListener::bind(&path)?;
        set_mode_0600(&path)?;

        let dispatcher = self.dispatcher.clone();
        let logger = self.logger.clone();
        let shutdown = CancellationToken::new();
        let shutdown_signal = shutdown.clone();
        let socket_path = path.clone();

        self.logger.info(&format!("IPC transport listening on {}", path.display()));
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_signal.cancelled() => break,
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, _addr)) => {
                                let dispatcher = dispatcher.clone();
                                let local = socket_path.display().to_string();
                                tokio::spawn(async move {
                                    let (read_half, write_half) = stream.into_split();
                                    let codec = Arc::new(ByteStreamCodec::with_limit(
                                        read_half,
                                        write_half,
                                        MAX_READ_BYTES,
                                    ));
                                    dispatcher.serve_connection(codec, Some(local)).await;
                                });
                            }
                            Err(e) if is_temporary(&e) => {
                                logger.warn(&format!("IPC accept transient error: {e}"));
                                continue;
                            }
                            Err(e) => {
                                logger.error(&format!("IPC accept fatal error: {e}"));
                                break;
                            }
                        }
                    }
                }
            }
            let _ = tokio::fs::remove_file(&socket_path).await;
        });

        *self.running.lock().await = Some(RunningServer {
            path,
            shutdown,
            task,
        });
        Ok(())
    }

    /// Non-waited stop: signals the accept loop to exit and returns.
    pub async fn stop(&self) {
        if let Some(running) = self.running.lock().await.take() {
            running.shutdown.cancel();
            drop(running.task);
        }
    }

    pub async fn wait(&self) {
        let task = self.running.lock().await.as_mut().map(|r| {
            std::mem::replace(&mut r.task, tokio::spawn(async {}))
        });
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

#[cfg(unix)]
fn set_mode_0600(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_mode_0600(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
