//! Shared utilities for relay integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use relay::{Relay, RelayConfig};

/// Start a mock upstream that waits `delay`, then answers with `body`, a
/// newline, and the raw request head it received.
pub async fn start_mock_upstream(body: &'static str, delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                tokio::time::sleep(delay).await;

                let payload = format!("{}\n{}", body, head);
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    payload.len(),
                    payload
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Start a relay on an ephemeral loopback port.
pub async fn start_relay() -> (Arc<Relay>, SocketAddr, JoinHandle<relay::error::Result<()>>) {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();

    let relay = Arc::new(Relay::new(config));
    let handle = tokio::spawn({
        let relay = Arc::clone(&relay);
        async move { relay.start().await }
    });

    let addr = tokio::time::timeout(Duration::from_secs(5), relay.listening())
        .await
        .expect("relay did not bind in time")
        .expect("relay stopped before binding");

    (relay, addr, handle)
}

/// Client that never reuses connections or consults proxy settings.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
