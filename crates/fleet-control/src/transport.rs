//! Minimal HTTPS/1.1 transport for the control-plane REST APIs.
//!
//! One connection per request: TCP connect, rustls handshake (Mozilla
//! roots from `webpki-roots`), hyper HTTP/1 exchange, full body read.
//! Plain `http://` URLs are accepted for local endpoints.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{ControlPlaneError, ControlPlaneResult};

const USER_AGENT: &str = concat!("fleetctl/", env!("CARGO_PKG_VERSION"));

/// A buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> ControlPlaneResult<serde_json::Value> {
        if self.body.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| ControlPlaneError::Permanent(format!("malformed response body: {e}")))
    }

    /// Best-effort error message from a Google API error body.
    pub fn error_message(&self) -> String {
        self.json()
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| String::from_utf8_lossy(&self.body).trim().to_string())
    }
}

#[derive(Clone)]
pub struct HttpsTransport {
    tls: Arc<rustls::ClientConfig>,
    request_timeout: Duration,
}

impl HttpsTransport {
    /// Transport trusting the Mozilla root certificate store.
    pub fn with_webpki_roots(request_timeout: Duration) -> ControlPlaneResult<Self> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()
        .map_err(|e| ControlPlaneError::Permanent(format!("tls protocol version error: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Self {
            tls: Arc::new(config),
            request_timeout,
        })
    }

    /// Send one request and buffer the response.
    ///
    /// Connection failures and the request timeout are transient; a
    /// malformed URL is permanent. Non-2xx statuses are returned as-is.
    pub async fn send(
        &self,
        method: http::Method,
        url: &str,
        bearer: Option<&str>,
        body: Option<&serde_json::Value>,
    ) -> ControlPlaneResult<HttpResponse> {
        let started = std::time::Instant::now();
        let response = tokio::time::timeout(self.request_timeout, self.exchange(&method, url, bearer, body))
            .await
            .map_err(|_| {
                ControlPlaneError::Transient(format!(
                    "{method} {url} timed out after {}s",
                    self.request_timeout.as_secs_f64()
                ))
            })??;

        debug!(
            %method,
            %url,
            status = response.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "control-plane request"
        );
        Ok(response)
    }

    async fn exchange(
        &self,
        method: &http::Method,
        url: &str,
        bearer: Option<&str>,
        body: Option<&serde_json::Value>,
    ) -> ControlPlaneResult<HttpResponse> {
        let uri: http::Uri = url
            .parse()
            .map_err(|e| ControlPlaneError::Permanent(format!("invalid url {url}: {e}")))?;
        let host = uri
            .host()
            .ok_or_else(|| ControlPlaneError::Permanent(format!("url has no host: {url}")))?
            .to_string();
        let tls = match uri.scheme_str() {
            Some("https") => true,
            Some("http") => false,
            other => {
                return Err(ControlPlaneError::Permanent(format!(
                    "unsupported scheme {other:?} in {url}"
                )));
            }
        };
        let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

        let mut builder = http::Request::builder()
            .method(method.clone())
            .uri(path)
            .header(http::header::HOST, host.as_str())
            .header(http::header::USER_AGENT, USER_AGENT)
            .header(http::header::ACCEPT, "application/json");
        if let Some(token) = bearer {
            builder = builder.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let payload = match body {
            Some(value) => {
                builder = builder.header(http::header::CONTENT_TYPE, "application/json");
                Bytes::from(serde_json::to_vec(value).map_err(|e| {
                    ControlPlaneError::Permanent(format!("cannot encode request body: {e}"))
                })?)
            }
            None => Bytes::new(),
        };
        let request = builder
            .body(Full::new(payload))
            .map_err(|e| ControlPlaneError::Permanent(format!("cannot build request: {e}")))?;

        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| ControlPlaneError::Transient(format!("connect {host}:{port}: {e}")))?;

        if tls {
            let server_name = rustls::pki_types::ServerName::try_from(host.clone())
                .map_err(|e| ControlPlaneError::Permanent(format!("invalid server name {host}: {e}")))?;
            let connector = tokio_rustls::TlsConnector::from(self.tls.clone());
            let stream = connector
                .connect(server_name, stream)
                .await
                .map_err(|e| ControlPlaneError::Transient(format!("tls handshake with {host}: {e}")))?;
            round_trip(stream, request).await
        } else {
            round_trip(stream, request).await
        }
    }
}

async fn round_trip<S>(stream: S, request: http::Request<Full<Bytes>>) -> ControlPlaneResult<HttpResponse>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| ControlPlaneError::Transient(format!("http handshake failed: {e}")))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| ControlPlaneError::Transient(format!("request failed: {e}")))?;
    let status = response.status().as_u16();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| ControlPlaneError::Transient(format!("reading response body: {e}")))?
        .to_bytes();

    Ok(HttpResponse { status, body })
}
