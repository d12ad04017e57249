//! Per-connection JSON-RPC codec (§3 "Codec state", §4.1).
//!
//! [`ByteStreamCodec`] binds the wire format to any `AsyncRead + AsyncWrite`
//! byte stream (TCP, Unix socket, or a single HTTP request/response body).
//! It reads one top-level JSON value at a time by scanning for a balanced,
//! string-escape-aware boundary rather than relying on newline or
//! length-prefixed framing, matching the Go codec's use of a streaming
//! `json.Decoder` over the raw connection.
//!
//! Every codec implements [`MessageCodec`], the common surface the dispatch
//! pipeline (§4.4) and the transports (§4.5–§4.7) program against; the
//! WebSocket transport provides its own implementation in
//! `transport::websocket` since a WebSocket connection is message-framed,
//! not byte-stream framed, but still wants the same write-serialization and
//! close-once guarantees.

use crate::error::StatusError;
use crate::message::Payload;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Default write deadline (§3 Codec state): 10 seconds from the start of
/// the write if the caller supplies none.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Cap on a single buffered read before it is treated as a malformed /
/// oversized payload. Transports that enforce their own body limit (HTTP's
/// 5 MiB cap) pass a matching value; others use this default.
pub const DEFAULT_MAX_READ_BYTES: usize = 5 * 1024 * 1024;

/// A boxed future, used to keep [`MessageCodec`] object-safe across the
/// transports that hold `Arc<dyn MessageCodec>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The operations the dispatch pipeline and transports need from a
/// connection's wire binding, independent of whether the connection is a
/// byte stream or a WebSocket.
pub trait MessageCodec: Send + Sync {
    /// Reads the next top-level payload (single message or batch). Returns
    /// `Ok(None)` when the peer has cleanly closed the connection.
    fn read_payload(&self) -> BoxFuture<'_, std::io::Result<Option<Payload>>>;

    /// Serializes and writes one JSON value, honoring `deadline` (defaults
    /// to [`DEFAULT_WRITE_TIMEOUT`] from now when `None`). Writes are
    /// globally serialized per connection (§5 Ordering guarantees).
    fn write_value(
        &self,
        value: serde_json::Value,
        deadline: Option<Duration>,
    ) -> BoxFuture<'_, std::io::Result<()>>;

    /// Idempotently closes the underlying connection.
    fn close(&self) -> BoxFuture<'_, ()>;

    fn is_closed(&self) -> bool;
}

struct ReadState<R> {
    reader: R,
    buf: Vec<u8>,
}

/// A [`MessageCodec`] over any `AsyncRead + AsyncWrite` byte stream.
pub struct ByteStreamCodec<R, W> {
    read: Mutex<ReadState<R>>,
    write: Mutex<W>,
    closed: AtomicBool,
    max_read_bytes: usize,
}

impl<R, W> ByteStreamCodec<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_limit(reader, writer, DEFAULT_MAX_READ_BYTES)
    }

    pub fn with_limit(reader: R, writer: W, max_read_bytes: usize) -> Self {
        Self {
            read: Mutex::new(ReadState {
                reader,
                buf: Vec::new(),
            }),
            write: Mutex::new(writer),
            closed: AtomicBool::new(false),
            max_read_bytes,
        }
    }
}

impl<R, W> MessageCodec for ByteStreamCodec<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn read_payload(&self) -> BoxFuture<'_, std::io::Result<Option<Payload>>> {
        Box::pin(async move {
            let mut state = self.read.lock().await;
            loop {
                if let Some(len) = scan_complete_value(&state.buf) {
                    let raw = state.buf[..len].to_vec();
                    state.buf.drain(..len);
                    return match Payload::decode(&raw) {
                        Ok(payload) => Ok(Some(payload)),
                        Err(e) => Ok(Some(Payload::Single(Box::new(
                            crate::message::JsonMessage::failure(None, e),
                        )))),
                    };
                }

                if state.buf.len() > self.max_read_bytes {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "message exceeds maximum size",
                    ));
                }

                let mut chunk = [0u8; 8192];
                let ReadState { reader, buf } = &mut *state;
                let n = reader.read(&mut chunk).await?;
                if n == 0 {
                    if buf.iter().all(|b| b.is_ascii_whitespace()) {
                        return Ok(None);
                    }
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed mid-message",
                    ));
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        })
    }

    fn write_value(
        &self,
        value: serde_json::Value,
        deadline: Option<Duration>,
    ) -> BoxFuture<'_, std::io::Result<()>> {
        Box::pin(async move {
            let bytes = serde_json::to_vec(&value)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            let mut writer = self.write.lock().await;
            let fut = async {
                writer.write_all(&bytes).await?;
                writer.flush().await
            };
            match tokio::time::timeout(deadline.unwrap_or(DEFAULT_WRITE_TIMEOUT), fut).await {
                Ok(res) => res,
                Err(_) => Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "write deadline exceeded",
                )),
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            let mut writer = self.write.lock().await;
            let _ = writer.shutdown().await;
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Scans `buf` for the first complete top-level JSON value (object, array,
/// string, number, boolean, or null), returning the number of bytes it
/// occupies including any leading whitespace. Returns `None` if `buf` holds
/// no complete value yet.
///
/// This is what lets the codec read a stream of back-to-back JSON values
/// with no delimiter between them, the way `encoding/json`'s streaming
/// `Decoder` does on the Go side.
fn scan_complete_value(buf: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < buf.len() && buf[i].is_ascii_whitespace() {
        i += 1;
    }
    let start = i;
    if i >= buf.len() {
        return None;
    }

    match buf[i] {
        b'{' | b'[' => {
            let mut depth: i64 = 0;
            let mut in_string = false;
            let mut escaped = false;
            while i < buf.len() {
                let b = buf[i];
                if in_string {
                    if escaped {
                        escaped = false;
                    } else if b == b'\\' {
                        escaped = true;
                    } else if b == b'"' {
                        in_string = false;
                    }
                } else {
                    match b {
                        b'"' => in_string = true,
                        b'{' | b'[' => depth += 1,
                        b'}' | b']' => {
                            depth -= 1;
                            if depth == 0 {
                                return Some(i + 1);
                            }
                        }
                        _ => {}
                    }
                }
                i += 1;
            }
            None
        }
        b'"' => {
            i += 1;
            let mut escaped = false;
            while i < buf.len() {
                let b = buf[i];
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    return Some(i + 1);
                }
                i += 1;
            }
            None
        }
        _ => {
            // number, true, false, null: runs until whitespace or a
            // structural character that can't appear inside one of these
            // tokens.
            let tok_start = i;
            while i < buf.len() {
                match buf[i] {
                    b' ' | b'\t' | b'\r' | b'\n' | b'{' | b'}' | b'[' | b']' | b',' | b':' => {
                        return Some(i);
                    }
                    _ => i += 1,
                }
            }
            if tok_start < i {
                // Ambiguous: could still be growing (e.g. "12" could become
                // "123"). Only call it complete once more bytes can't
                // arrive, which we can't know mid-stream; conservatively
                // require a following delimiter. Since HTTP/IPC peers
                // always terminate scalars with whitespace or EOF in
                // practice for this protocol (requests are objects/arrays),
                // treat end-of-buffer as incomplete.
                let _ = start;
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn scans_balanced_object() {
        let buf = br#"{"a":1}{"b":2}"#;
        let len = scan_complete_value(buf).unwrap();
        assert_eq!(&buf[..len], br#"{"a":1}"#);
    }

    #[test]
    fn scans_object_containing_braces_in_strings() {
        let buf = br#"{"a":"}{"}rest"#;
        let len = scan_complete_value(buf).unwrap();
        assert_eq!(&buf[..len], br#"{"a":"}{"}"#);
    }

    #[test]
    fn scans_array() {
        let buf = br#"[1,2,3]tail"#;
        let len = scan_complete_value(buf).unwrap();
        assert_eq!(&buf[..len], br#"[1,2,3]"#);
    }

    #[test]
    fn incomplete_object_returns_none() {
        let buf = br#"{"a":1"#;
        assert!(scan_complete_value(buf).is_none());
    }

    #[tokio::test]
    async fn round_trips_single_message_over_duplex_stream() {
        let (client, server) = duplex(4096);
        let (client_r, client_w) = tokio::io::split(client);
        let (server_r, server_w) = tokio::io::split(server);

        let client_codec = ByteStreamCodec::new(client_r, client_w);
        let server_codec = ByteStreamCodec::new(server_r, server_w);

        client_codec
            .write_value(serde_json::json!({"jsonrpc":"2.0","service":"a","method":"b"}), None)
            .await
            .unwrap();

        let payload = server_codec.read_payload().await.unwrap().unwrap();
        let msgs = payload.into_messages();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].method, "b");
    }

    #[tokio::test]
    async fn read_payload_returns_none_on_clean_close() {
        let (client, server) = duplex(64);
        drop(client);
        let (server_r, server_w) = tokio::io::split(server);
        let codec = ByteStreamCodec::new(server_r, server_w);
        assert!(codec.read_payload().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (_client, server) = duplex(64);
        let (server_r, server_w) = tokio::io::split(server);
        let codec = ByteStreamCodec::new(server_r, server_w);
        codec.close().await;
        codec.close().await;
        assert!(codec.is_closed());
    }
}
