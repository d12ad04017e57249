//! WebSocket transport adapter (§4.7 "Transport: WebSocket"), mounted on
//! the HTTP listener rather than owning its own accept loop. Grounded on
//! `websocket.go`'s read-loop/ping-keepalive/close-sequence shape, adapted
//! onto `axum::extract::ws` instead of a second WebSocket crate (the HTTP
//! transport already pulls in axum's upgrade support).

use crate::codec::BoxFuture;
use crate::codec::MessageCodec;
use crate::dispatch::Dispatcher;
use crate::message::{JsonMessage, Payload};
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Read-size limit (§4.7): messages larger than this are treated as a
/// protocol violation and close the connection.
const MAX_READ_BYTES: usize = 5 * 1024 * 1024;

/// Ping interval and per-ping write deadline (§4.7).
const PING_INTERVAL: Duration = Duration::from_secs(60);
const PING_WRITE_DEADLINE: Duration = Duration::from_secs(5);

type LiveSet = Mutex<Vec<Arc<WebSocketCodec>>>;
static LIVE_CONNECTIONS: OnceLock<LiveSet> = OnceLock::new();

fn live_connections() -> &'static LiveSet {
    LIVE_CONNECTIONS.get_or_init(|| Mutex::new(Vec::new()))
}

/// Closes every currently-registered WebSocket connection, used by the
/// facade's shutdown sequence (§4.7 "Close sequence").
pub async fn close_all() {
    let mut live = live_connections().lock().await;
    for codec in live.drain(..) {
        codec.close().await;
    }
}

/// A [`MessageCodec`] over a single WebSocket connection: reads/writes
/// whole text frames instead of scanning a byte stream for JSON
/// boundaries, since the WebSocket framing already delimits messages.
pub struct WebSocketCodec {
    reader: Mutex<SplitStream<WebSocket>>,
    writer: Mutex<SplitSink<WebSocket, Message>>,
    reset_ping: mpsc::Sender<()>,
    closed: AtomicBool,
}

impl WebSocketCodec {
    fn new(
        reader: SplitStream<WebSocket>,
        writer: SplitSink<WebSocket, Message>,
        reset_ping: mpsc::Sender<()>,
    ) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            reset_ping,
            closed: AtomicBool::new(false),
        }
    }

    fn signal_traffic(&self) {
        // Non-blocking: a full buffer just means a reset is already
        // pending, which is equivalent (§4.7 "non-blocking reset").
        let _ = self.reset_ping.try_send(());
    }
}

impl MessageCodec for WebSocketCodec {
    fn read_payload(&self) -> BoxFuture<'_, std::io::Result<Option<Payload>>> {
        Box::pin(async move {
            let mut reader = self.reader.lock().await;
            loop {
                match reader.next().await {
                    None => return Ok(None),
                    Some(Ok(Message::Close(_))) => return Ok(None),
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > MAX_READ_BYTES {
                            return Err(std::io::Error::new(
                                std::io::ErrorKind::InvalidData,
                                "message exceeds maximum size",
                            ));
                        }
                        return Ok(Some(decode_or_embed_error(text.as_bytes())));
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        if bytes.len() > MAX_READ_BYTES {
                            return Err(std::io::Error::new(
                                std::io::ErrorKind::InvalidData,
                                "message exceeds maximum size",
                            ));
                        }
                        return Ok(Some(decode_or_embed_error(&bytes)));
                    }
                    Some(Err(e)) => {
                        return Err(std::io::Error::new(std::io::ErrorKind::Other, e));
                    }
                }
            }
        })
    }

    fn write_value(
        &self,
        value: serde_json::Value,
        deadline: Option<Duration>,
    ) -> BoxFuture<'_, std::io::Result<()>> {
        Box::pin(async move {
            let text = serde_json::to_string(&value)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            let mut writer = self.writer.lock().await;
            let fut = writer.send(Message::Text(text));
            match tokio::time::timeout(deadline.unwrap_or(PING_WRITE_DEADLINE * 2), fut).await {
                Ok(Ok(())) => {
                    self.signal_traffic();
                    Ok(())
                }
                Ok(Err(e)) => Err(std::io::Error::new(std::io::ErrorKind::Other, e)),
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
            let mut writer = self.writer.lock().await;
            let _ = writer.close().await;
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn decode_or_embed_error(raw: &[u8]) -> Payload {
    match Payload::decode(raw) {
        Ok(payload) => payload,
        Err(e) => Payload::Single(Box::new(JsonMessage::failure(None, e))),
    }
}

/// Runs one WebSocket connection end to end (§4.7): registers the codec
/// in the process-level live set, spawns the ping keepalive, runs the
/// dispatch pipeline until the peer disconnects, then closes the codec
/// and drains the keepalive task.
pub async fn serve(socket: WebSocket, dispatcher: Arc<Dispatcher>, peer_addr: Option<String>) {
    let (writer, reader) = socket.split();
    let (reset_tx, reset_rx) = mpsc::channel(1);
    let codec = Arc::new(WebSocketCodec::new(reader, writer, reset_tx));

    live_connections().lock().await.push(codec.clone());

    let ping_codec = codec.clone();
    let ping_task = tokio::spawn(async move { ping_loop(ping_codec, reset_rx).await });

    dispatcher
        .serve_connection(codec.clone() as Arc<dyn MessageCodec>, peer_addr)
        .await;

    codec.close().await;
    ping_task.abort();
    let _ = ping_task.await;

    let mut live = live_connections().lock().await;
    live.retain(|c| !Arc::ptr_eq(c, &codec));
}

/// Sends a ping every [`PING_INTERVAL`] unless application traffic reset
/// the timer in the meantime (§4.7 "application traffic extends the idle
/// interval").
async fn ping_loop(codec: Arc<WebSocketCodec>, mut reset_rx: mpsc::Receiver<()>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(PING_INTERVAL) => {
                if codec.is_closed() {
                    return;
                }
                let mut writer = codec.writer.lock().await;
                let fut = writer.send(Message::Ping(Vec::new().into()));
                if tokio::time::timeout(PING_WRITE_DEADLINE, fut).await.is_err() {
                    return;
                }
            }
            _ = reset_rx.recv() => {
                continue;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_or_embed_error_passes_through_parse_failures() {
        let payload = decode_or_embed_error(b"not json");
        let msgs = payload.into_messages();
        assert!(msgs[0].error.is_some());
        assert_eq!(
            msgs[0].error.as_ref().unwrap().code,
            crate::error::CODE_PARSE_ERROR
        );
    }

    #[test]
    fn decode_or_embed_error_accepts_well_formed_request() {
        let payload =
            decode_or_embed_error(br#"{"jsonrpc":"2.0","service":"a","method":"b"}"#);
        let msgs = payload.into_messages();
        assert!(msgs[0].error.is_none());
        assert_eq!(msgs[0].method, "b");
    }
}
