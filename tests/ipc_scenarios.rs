//! End-to-end IPC scenario (§4.6, §8 S2 over a Unix socket instead of HTTP):
//! confirms the facade wires the same dispatch pipeline onto both
//! transports rather than only having exercised it over HTTP.

use anserpc::Options;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn socket_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("anserpc-it-{}.sock", std::process::id()))
}

#[tokio::test]
async fn hello_round_trips_over_the_ipc_socket() {
    let path = socket_path();
    let _ = std::fs::remove_file(&path);

    let anser = Arc::new(build_server(&path).await);
    let runner = anser.clone();
    tokio::spawn(async move {
        let _ = runner.run().await;
    });

    let mut stream = connect_with_retry(&path).await;
    let request = br#"{"jsonrpc":"2.0","id":1,"service":"built-in","service_version":"1.0","method":"Hello"}"#;
    stream.write_all(request).await.unwrap();

    let mut buf = vec![0u8; 4096];
    let n = stream.read(&mut buf).await.unwrap();
    let response: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
    assert_eq!(response["result"], "olleh");

    anser.close().await;
    let _ = std::fs::remove_file(&path);
}

async fn build_server(path: &std::path::Path) -> anserpc::Anser {
    anserpc::Anser::new(Options::new().ipc_endpoint(path).disable_interrupt()).await
}

async fn connect_with_retry(path: &std::path::Path) -> tokio::net::UnixStream {
    for _ in 0..200 {
        if let Ok(stream) = tokio::net::UnixStream::connect(path).await {
            return stream;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("IPC socket never became connectable");
}
