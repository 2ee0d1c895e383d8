//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

use pooled_http_handler::config::HandlerConfig;
use pooled_http_handler::{Endpoint, Handler};

/// Start an axum backend on an ephemeral port.
///
/// Routes:
/// - `GET /crc`: `{}` with an `X-Amz-Crc32: 123` header
/// - `GET /headers`: the received request headers, one `name: value` per line
/// - `POST /echo`: the request body
/// - `GET /stream`: a multi-chunk body
/// - `GET /slow`: `slow` after 300ms
pub async fn start_backend() -> SocketAddr {
    let app = Router::new()
        .route("/crc", get(|| async { ([("X-Amz-Crc32", "123")], "{}") }))
        .route("/headers", get(echo_headers))
        .route("/echo", post(|body: Bytes| async move { body }))
        .route("/stream", get(stream_body))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                "slow"
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn echo_headers(headers: HeaderMap) -> String {
    let mut lines: Vec<String> = headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value.to_str().unwrap_or("<binary>")))
        .collect();
    lines.sort();
    lines.join("\n")
}

async fn stream_body() -> axum::body::Body {
    let chunks = (1..=4).map(|i| Ok::<_, std::io::Error>(Bytes::from(format!("chunk-{};", i))));
    axum::body::Body::from_stream(futures_util::stream::iter(chunks))
}

/// Start a backend that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// An address nothing is listening on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn endpoint(addr: SocketAddr) -> Endpoint {
    Endpoint::http(addr.ip().to_string(), addr.port())
}

pub fn handler(configure: impl FnOnce(&mut HandlerConfig)) -> Handler {
    let mut config = HandlerConfig::default();
    configure(&mut config);
    Handler::new(&config).unwrap()
}
