//! HTTP/1.1 and HTTP/2 server

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE, SERVER};
use hyper::service::service_fn;
use hyper::{Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use stager_net::{ErrorBody, APPLICATION_JSON, PART_URL_VALIDITY};

use crate::handlers::handle_request;
use crate::provider::StorageProvider;
use crate::GatewayError;

pub type ResponseBody = Full<Bytes>;

const SERVER_NAME: &str = concat!("stager-gateway/", env!("CARGO_PKG_VERSION"));

/// Shared by every connection
pub struct AppState {
    pub provider: Arc<dyn StorageProvider>,
    pub part_url_validity: Duration,
}

pub struct GatewayServer {
    state: Arc<AppState>,
}

impl GatewayServer {
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self {
            state: Arc::new(AppState {
                provider,
                part_url_validity: PART_URL_VALIDITY,
            }),
        }
    }

    pub async fn serve(self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_listener(listener).await
    }

    /// Accept connections until the listener fails
    pub async fn serve_listener(self, listener: TcpListener) -> std::io::Result<()> {
        info!(
            "stager gateway listening on {} ({} provider)",
            listener.local_addr()?,
            self.state.provider.name()
        );

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            debug!("New connection from {}", remote_addr);

            let state = self.state.clone();
            tokio::spawn(async move {
                Self::handle_connection(stream, remote_addr, state).await;
            });
        }
    }

    async fn handle_connection(stream: TcpStream, remote_addr: SocketAddr, state: Arc<AppState>) {
        let io = TokioIo::new(stream);

        let service = service_fn(move |req| {
            let state = state.clone();
            async move { handle_request(req, state).await }
        });

        if let Err(err) = auto::Builder::new(TokioExecutor::new())
            .serve_connection(io, service)
            .await
        {
            error!("Connection error from {}: {}", remote_addr, err);
        }
    }
}

fn with_headers(status: StatusCode, body: Bytes, content_type: &'static str) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(SERVER, HeaderValue::from_static(SERVER_NAME));
    response
}

/// JSON response builder
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<ResponseBody> {
    match serde_json::to_vec(body) {
        Ok(bytes) => with_headers(status, Bytes::from(bytes), APPLICATION_JSON),
        Err(e) => {
            error!("Failed to encode response: {}", e);
            with_headers(
                StatusCode::INTERNAL_SERVER_ERROR,
                Bytes::from_static(br#"{"error":"Internal server error"}"#),
                APPLICATION_JSON,
            )
        }
    }
}

/// `{"error": ...}` with the error's status
pub fn error_response(err: &GatewayError) -> Response<ResponseBody> {
    let status = err.status();
    let message = if status.is_server_error() {
        "Internal server error".to_string()
    } else {
        err.to_string()
    };
    json_response(status, &ErrorBody { error: message })
}

/// Empty 200 carrying a part's ETag
pub fn etag_response(etag: &str) -> Result<Response<ResponseBody>, GatewayError> {
    let value = HeaderValue::from_str(etag)
        .map_err(|e| GatewayError::Internal(format!("unusable ETag {}: {}", etag, e)))?;
    let mut response = with_headers(StatusCode::OK, Bytes::new(), APPLICATION_JSON);
    response.headers_mut().insert(hyper::header::ETAG, value);
    Ok(response)
}
