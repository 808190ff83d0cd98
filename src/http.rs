//! Shared HTTPS transport for the token endpoint and the Drive API

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, StatusCode, Uri};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::trace;
use url::Url;

use crate::error::{DriveError, Result};

/// Type alias for the underlying hyper client to simplify type signatures
pub type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

const USER_AGENT: &str = concat!("drive-provisioner/", env!("CARGO_PKG_VERSION"));

/// Failure to get any response at all (DNS, connect, TLS, body read)
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransportFailure(String);

/// A fully buffered response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as text, lossily decoded
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            DriveError::InvalidResponse(format!("Failed to parse response body: {}", e))
        })
    }

    /// Map a non-2xx response to [`DriveError::RemoteApi`] carrying the body text
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(DriveError::remote(self.status.as_u16(), self.text()))
        }
    }
}

#[cfg(not(windows))]
fn crypto_provider() -> rustls::crypto::CryptoProvider {
    rustls::crypto::aws_lc_rs::default_provider()
}

#[cfg(windows)]
fn crypto_provider() -> rustls::crypto::CryptoProvider {
    rustls::crypto::ring::default_provider()
}

/// Cheaply cloneable HTTPS client
#[derive(Clone)]
pub struct HttpTransport {
    client: Arc<HttpsClient>,
}

impl HttpTransport {
    /// Build an HTTP/1 client with TLS support
    ///
    /// Plain `http://` URLs are accepted too, so local endpoints work.
    pub fn new() -> Result<Self> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(crypto_provider())
            .map_err(|e| DriveError::Transport(format!("Failed to configure TLS: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Send a request and buffer the whole response body
    pub async fn send(
        &self,
        request: Request<Full<Bytes>>,
    ) -> std::result::Result<HttpResponse, TransportFailure> {
        let method = request.method().clone();
        let uri = request.uri().clone();

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| TransportFailure(format!("{} {} failed: {}", method, uri.path(), e)))?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| TransportFailure(format!("Failed to read response body: {}", e)))?
            .to_bytes();

        trace!("{} {} -> {}", method, uri.path(), status);
        Ok(HttpResponse { status, body })
    }
}

/// Request builder helpers shared by the session and the Drive client
pub struct RequestBuilder {
    method: Method,
    url: Url,
    bearer: Option<String>,
    content_type: Option<String>,
    body: Bytes,
}

impl RequestBuilder {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            bearer: None,
            content_type: None,
            body: Bytes::new(),
        }
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(format!("Bearer {}", token));
        self
    }

    pub fn json(mut self, value: &serde_json::Value) -> Result<Self> {
        self.body = Bytes::from(serde_json::to_vec(value)?);
        self.content_type = Some("application/json".to_string());
        Ok(self)
    }

    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        self.body = Bytes::from(encoded);
        self.content_type = Some("application/x-www-form-urlencoded".to_string());
        self
    }

    pub fn raw(mut self, content_type: impl Into<String>, body: Vec<u8>) -> Self {
        self.body = Bytes::from(body);
        self.content_type = Some(content_type.into());
        self
    }

    pub fn build(self) -> Result<Request<Full<Bytes>>> {
        let uri: Uri = self
            .url
            .as_str()
            .parse()
            .map_err(|e| DriveError::ConfigError(format!("Invalid URL {}: {}", self.url, e)))?;

        let mut builder = Request::builder()
            .method(self.method)
            .uri(uri)
            .header(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));

        if let Some(bearer) = self.bearer {
            builder = builder.header(header::AUTHORIZATION, bearer);
        }
        if let Some(content_type) = self.content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder = builder.header(header::CONTENT_LENGTH, self.body.len());

        builder
            .body(Full::new(self.body))
            .map_err(|e| DriveError::Transport(format!("Failed to build request: {}", e)))
    }
}

/// Join a base URL and a relative path, tolerating trailing slashes on the base
pub fn endpoint(base: &str, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| DriveError::ConfigError(format!("Invalid URL {}: {}", joined, e)))
}
