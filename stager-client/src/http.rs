//! Thin hyper client wrapper with a per-request deadline

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{HeaderMap, Request, StatusCode};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::{Connect, HttpConnector};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::{ClientError, Result};

/// Longest error body kept in `ClientError::Http`
const MAX_ERROR_BODY: usize = 512;

/// rustls over the webpki roots for `https://`, plain TCP for `http://`
pub type DefaultConnector = HttpsConnector<HttpConnector>;

pub fn default_connector() -> Result<DefaultConnector> {
    let builder = HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
        .map_err(|e| ClientError::Tls(e.to_string()))?;
    Ok(builder.https_or_http().enable_http1().build())
}

/// Shared HTTP client. Cloning shares the connection pool.
#[derive(Clone, Debug)]
pub struct HttpClient<C = DefaultConnector> {
    inner: Client<C, Full<Bytes>>,
    timeout: Duration,
}

impl HttpClient<DefaultConnector> {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(HttpClient::with_connector(default_connector()?, timeout))
    }
}

impl<C> HttpClient<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    pub fn with_connector(connector: C, timeout: Duration) -> Self {
        let inner = Client::builder(TokioExecutor::new()).build(connector);
        HttpClient { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a request and buffer the whole response body
    pub async fn send(&self, request: Request<Full<Bytes>>) -> Result<HttpReply> {
        match request.uri().scheme_str() {
            Some("http") | Some("https") => {}
            other => {
                return Err(ClientError::InvalidUrl(format!(
                    "unsupported scheme {:?}, expected http or https",
                    other.unwrap_or_default()
                )))
            }
        }

        let exchange = async {
            let response = self.inner.request(request).await?;
            let (parts, body) = response.into_parts();
            let body = body.collect().await?.to_bytes();
            Ok::<_, ClientError>(HttpReply {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))?
    }
}

/// Buffered response
#[derive(Debug)]
pub struct HttpReply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpReply {
    /// Turn non-2xx statuses into `ClientError::Http`
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_success() {
            return Ok(self);
        }
        let mut body = String::from_utf8_lossy(&self.body).into_owned();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(ClientError::Http {
            status: self.status.as_u16(),
            body,
        })
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ClientError::InvalidResponse(format!("malformed JSON body: {}", e)))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}
