//! hyper-backed transport connections.
//!
//! # Responsibilities
//! - Resolve, connect and optionally TLS-wrap a TCP stream per endpoint
//! - Drive one HTTP/1.1 connection per pooled slot
//! - Enforce the connect and inactivity timeouts
//! - Map hyper and I/O failures onto the transport taxonomy

use std::error::Error as StdError;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::client::conn::http1::{self, SendRequest};
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, HOST};
use hyper::{Request, Uri, Version};
use hyper_util::rt::TokioIo;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

use crate::config::{ConfigError, TimeoutConfig, TlsConfig};
use crate::net::tls;
use crate::pool::Endpoint;
use crate::transport::{
    ChunkSink, Connection, Connector, FatalError, FatalKind, Payload, RawHeaderValue, RawResponse,
    TimeoutOverrides, TransportError, TransportParams,
};

/// Request body type sent on every connection.
pub type OutgoingBody = UnsyncBoxBody<Bytes, io::Error>;

/// Read size for streamed file uploads.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Opens HTTP/1.1 connections over TCP, with TLS for `https` endpoints.
#[derive(Clone)]
pub struct HyperConnector {
    connect_timeout: Duration,
    inactivity: Option<Duration>,
    tls: TlsConnector,
}

impl HyperConnector {
    pub fn new(timeouts: &TimeoutConfig, tls_config: &TlsConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            connect_timeout: timeouts.connect(),
            inactivity: timeouts.inactivity(),
            tls: tls::connector(tls_config)?,
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn inactivity_timeout(&self) -> Option<Duration> {
        self.inactivity
    }

    async fn connect_tcp(endpoint: &Endpoint) -> Result<TcpStream, TransportError> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((endpoint.dns_host(), endpoint.port()))
            .await
            .map_err(|e| TransportError::Dns(format!("{}: {}", endpoint.host(), e)))?
            .collect();

        let mut last_error =
            TransportError::Dns(format!("{}: no addresses found", endpoint.host()));
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!(endpoint = %endpoint, %addr, error = %e, "TCP connect failed");
                    last_error = TransportError::from_io(&e);
                }
            }
        }
        Err(last_error)
    }
}

impl Connector for HyperConnector {
    type Connection = HyperConnection;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        timeouts: &TimeoutOverrides,
    ) -> Result<HyperConnection, TransportError> {
        let connect_timeout = timeouts.connect.unwrap_or(self.connect_timeout);
        let timed_out = |stage: &str| {
            TransportError::Timeout(format!(
                "{} to {} exceeded {:?}",
                stage, endpoint, connect_timeout
            ))
        };

        let stream = tokio::time::timeout(connect_timeout, Self::connect_tcp(endpoint))
            .await
            .map_err(|_| timed_out("connect"))??;
        stream.set_nodelay(true).ok();

        let sender = if endpoint.is_secure() {
            let domain = ServerName::try_from(endpoint.dns_host().to_string())
                .map_err(|e| TransportError::Tls(format!("invalid server name: {}", e)))?;
            let tls_stream = tokio::time::timeout(connect_timeout, self.tls.connect(domain, stream))
                .await
                .map_err(|_| timed_out("TLS handshake"))?
                .map_err(|e| TransportError::Tls(format!("TLS handshake failed: {}", e)))?;
            handshake(TokioIo::new(tls_stream)).await?
        } else {
            handshake(TokioIo::new(stream)).await?
        };

        Ok(HyperConnection {
            sender,
            authority: endpoint.authority(),
            inactivity: self.inactivity,
            reusable: true,
        })
    }
}

async fn handshake<I>(io: I) -> Result<SendRequest<OutgoingBody>, TransportError>
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (sender, conn) = http1::handshake(io).await.map_err(map_hyper_error)?;

    // Spawn connection driver
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            trace!(error = %e, "Connection closed");
        }
    });

    Ok(sender)
}

/// One HTTP/1.1 connection. Carries one request at a time.
pub struct HyperConnection {
    sender: SendRequest<OutgoingBody>,
    authority: String,
    inactivity: Option<Duration>,
    /// Cleared when the server asks to close after the current response.
    reusable: bool,
}

/// Build the wire request; `authority` fills in a missing `Host` header.
async fn build_request(
    params: &TransportParams,
    authority: &str,
) -> Result<Request<OutgoingBody>, TransportError> {
    let (body, content_length) = match &params.payload {
        Payload::Bytes(bytes) => (full_body(bytes.clone()), None),
        Payload::File(path) => {
            let (body, len) = file_body(path).await?;
            (body, Some(len))
        }
    };

    let mut request = Request::new(body);
    *request.method_mut() = params.method.as_hyper();
    *request.uri_mut() = params
        .target()
        .parse::<Uri>()
        .map_err(|e| invalid_argument(format!("invalid request target: {}", e)))?;

    let headers = request.headers_mut();
    for (name, value) in &params.headers {
        if params.is_placeholder(name, value) {
            continue;
        }
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| invalid_argument(format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| invalid_argument(format!("invalid value for header '{}': {}", name, e)))?;
        headers.append(name, value);
    }

    if !headers.contains_key(HOST) {
        let host = HeaderValue::from_str(authority)
            .map_err(|e| invalid_argument(format!("invalid host '{}': {}", authority, e)))?;
        headers.insert(HOST, host);
    }
    if let Some(len) = content_length {
        if !headers.contains_key(CONTENT_LENGTH) {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
        }
    }
    if !params.keepalive {
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
    }

    Ok(request)
}

impl Connection for HyperConnection {
    async fn call(
        &mut self,
        params: &TransportParams,
        mut on_chunk: Option<&mut ChunkSink>,
    ) -> Result<RawResponse, TransportError> {
        let request = build_request(params, &self.authority).await?;
        let inactivity = params.timeouts().inactivity_or(self.inactivity);

        let ready = self.sender.ready();
        within(inactivity, "waiting for the connection", async move {
            ready.await.map_err(map_hyper_error)
        })
        .await?;
        let sent = self.sender.send_request(request);
        let response = within(inactivity, "waiting for response headers", async move {
            sent.await.map_err(map_hyper_error)
        })
        .await?;

        let (parts, mut body) = response.into_parts();
        let mut collected = BytesMut::new();
        loop {
            let next = body.frame();
            let frame = within(inactivity, "reading the response body", async move {
                next.await.transpose().map_err(map_hyper_error)
            })
            .await?;
            let Some(frame) = frame else { break };
            if let Ok(data) = frame.into_data() {
                if let Some(sink) = on_chunk.as_deref_mut() {
                    sink(data.clone());
                }
                collected.extend_from_slice(&data);
            }
        }

        if parts.version == Version::HTTP_10 || wants_close(&parts.headers) || !params.keepalive {
            self.reusable = false;
        }

        Ok(RawResponse {
            status: parts.status.as_u16(),
            headers: collect_headers(&parts.headers),
            body: collected.freeze(),
        })
    }

    fn is_open(&self) -> bool {
        self.reusable && !self.sender.is_closed()
    }
}

/// Run `fut`, failing with a timeout if it makes no progress within `limit`.
async fn within<T, F>(limit: Option<Duration>, stage: &str, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            TransportError::Timeout(format!("no activity for {:?} while {}", limit, stage))
        })?,
        None => fut.await,
    }
}

fn full_body(bytes: Bytes) -> OutgoingBody {
    Full::new(bytes).map_err(|never| match never {}).boxed_unsync()
}

async fn file_body(path: &Path) -> Result<(OutgoingBody, u64), TransportError> {
    let unreadable = |e: io::Error| {
        TransportError::Network(format!("cannot read upload file {}: {}", path.display(), e))
    };
    let file = tokio::fs::File::open(path).await.map_err(unreadable)?;
    let len = file.metadata().await.map_err(unreadable)?.len();

    let chunks = futures_util::stream::try_unfold(file, |mut file| async move {
        let mut chunk = BytesMut::with_capacity(UPLOAD_CHUNK_SIZE);
        match file.read_buf(&mut chunk).await? {
            0 => Ok::<_, io::Error>(None),
            _ => Ok(Some((Frame::data(chunk.freeze()), file))),
        }
    });

    Ok((StreamBody::new(chunks).boxed_unsync(), len))
}

fn invalid_argument(message: String) -> TransportError {
    FatalError::new(FatalKind::InvalidArgument, message).into()
}

fn wants_close(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("close"))
}

/// Group response headers by name, keeping repeated values as a list.
fn collect_headers(headers: &HeaderMap) -> Vec<(String, RawHeaderValue)> {
    headers
        .keys()
        .map(|name| {
            let mut values: Vec<String> = headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .collect();
            let value = if values.len() == 1 {
                RawHeaderValue::Single(values.remove(0))
            } else {
                RawHeaderValue::List(values)
            };
            (name.as_str().to_string(), value)
        })
        .collect()
}

fn map_hyper_error(err: hyper::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout(err.to_string());
    }
    if let Some(io_err) = find_io_error(&err) {
        return TransportError::from_io(io_err);
    }
    if err.is_incomplete_message() || err.is_closed() || err.is_canceled() {
        TransportError::ConnectionReset(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

fn find_io_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a io::Error> {
    let mut source = err.source();
    while let Some(e) = source {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return Some(io_err);
        }
        source = e.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_headers_become_lists() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        headers.insert("x-amz-crc32", HeaderValue::from_static("123"));

        let mut collected = collect_headers(&headers);
        collected.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            collected,
            vec![
                (
                    "set-cookie".to_string(),
                    RawHeaderValue::List(vec!["a=1".into(), "b=2".into()])
                ),
                ("x-amz-crc32".to_string(), RawHeaderValue::Single("123".into())),
            ]
        );
    }

    #[test]
    fn connection_close_is_detected() {
        let mut headers = HeaderMap::new();
        assert!(!wants_close(&headers));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, Close"));
        assert!(wants_close(&headers));
    }

    #[tokio::test]
    async fn inactivity_limit_times_out() {
        let result: Result<(), _> = within(Some(Duration::from_millis(10)), "testing", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(TransportError::Timeout(_))));

        let result = within(None, "testing", async { Ok::<_, TransportError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn missing_upload_file_is_a_network_failure() {
        match file_body(Path::new("/nonexistent/upload.bin")).await {
            Err(TransportError::Network(message)) => assert!(message.contains("upload.bin")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected an error"),
        }
    }

    fn params(headers: &[(&str, &str)], placeholders: &[&str]) -> TransportParams {
        TransportParams {
            method: crate::transport::Method::Get,
            path: Some("/".into()),
            query: None,
            headers: headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            placeholders: placeholders.iter().map(|name| name.to_string()).collect(),
            payload: Payload::Bytes(Bytes::new()),
            options: serde_json::Map::new(),
            async_mode: false,
            keepalive: true,
        }
    }

    #[tokio::test]
    async fn caller_empty_headers_are_sent() {
        let params = params(
            &[
                ("content-type", ""),
                ("accept-encoding", ""),
                ("x-amz-security-token", ""),
            ],
            &["content-type", "accept-encoding"],
        );
        let request = build_request(&params, "foo.bar.com").await.unwrap();
        let headers = request.headers();

        assert_eq!(headers.get("x-amz-security-token"), Some(&HeaderValue::from_static("")));
        assert!(!headers.contains_key("content-type"));
        assert!(!headers.contains_key("accept-encoding"));
        assert_eq!(headers.get(HOST), Some(&HeaderValue::from_static("foo.bar.com")));
    }

    #[tokio::test]
    async fn caller_supplied_seed_header_is_sent_even_when_empty() {
        let params = params(&[("accept-encoding", ""), ("Content-Type", "")], &["accept-encoding"]);
        let request = build_request(&params, "foo.bar.com").await.unwrap();

        assert!(request.headers().contains_key("content-type"));
        assert!(!request.headers().contains_key("accept-encoding"));
    }
}
