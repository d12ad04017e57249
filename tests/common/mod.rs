//! Shared helpers for the integration suite: spins up a real [`Anser`]
//! server on an ephemeral port and speaks raw HTTP/1.1 over a `TcpStream`,
//! since no HTTP client crate is otherwise part of this workspace's stack.

use anserpc::{Anser, Options};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Starts `anser` (already configured with `rpc_endpoint("127.0.0.1", 0)`)
/// in the background and returns it along with the address the OS bound.
pub async fn spawn(anser: Arc<Anser>) -> SocketAddr {
    let runner = anser.clone();
    tokio::spawn(async move {
        let _ = runner.run().await;
    });

    for _ in 0..200 {
        if let Some(addr) = anser.http_listen_addr().await {
            return addr;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("HTTP transport never reported a bound address");
}

pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends a single HTTP/1.1 request over a fresh connection and reads the
/// response to completion (the request always carries `Connection: close`
/// so the server closes the socket once it has written the response).
pub async fn request(
    addr: SocketAddr,
    method: &str,
    path: &str,
    extra_headers: &[(&str, &str)],
    body: &str,
) -> HttpResponse {
    let mut stream = TcpStream::connect(addr).await.expect("connect to test server");

    let mut head = format!("{method} {path} HTTP/1.1\r\n");
    let has_host = extra_headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("host"));
    if !has_host {
        head.push_str("Host: localhost\r\n");
    }
    head.push_str("Connection: close\r\n");
    for (k, v) in extra_headers {
        head.push_str(&format!("{k}: {v}\r\n"));
    }
    if !body.is_empty() {
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    head.push_str("\r\n");

    stream.write_all(head.as_bytes()).await.unwrap();
    stream.write_all(body.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    parse_response(&raw)
}

fn parse_response(raw: &[u8]) -> HttpResponse {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has a header/body separator");
    let head = std::str::from_utf8(&raw[..split]).unwrap();
    let mut body_raw = raw[split + 4..].to_vec();

    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap();
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    let mut headers = Vec::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.push((k.trim().to_string(), v.trim().to_string()));
        }
    }

    let is_chunked = headers
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case("transfer-encoding") && v.eq_ignore_ascii_case("chunked"));
    if is_chunked {
        body_raw = dechunk(&body_raw);
    }

    HttpResponse {
        status,
        headers,
        body: body_raw,
    }
}

fn dechunk(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    loop {
        let line_end = raw[i..]
            .windows(2)
            .position(|w| w == b"\r\n")
            .expect("chunk size line");
        let size_str = std::str::from_utf8(&raw[i..i + line_end]).unwrap();
        let size = usize::from_str_radix(size_str.trim(), 16).unwrap();
        i += line_end + 2;
        if size == 0 {
            break;
        }
        out.extend_from_slice(&raw[i..i + size]);
        i += size + 2; // skip the trailing CRLF after each chunk
    }
    out
}

/// Decodes a gzip-compressed response body (§8 P7).
pub fn gunzip(bytes: &[u8]) -> Vec<u8> {
    use flate2::read::GzDecoder;
    use std::io::Read;
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).unwrap();
    out
}

pub fn json_body(res: &HttpResponse) -> serde_json::Value {
    serde_json::from_slice(&res.body).expect("response body is valid JSON")
}
