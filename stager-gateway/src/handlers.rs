//! HTTP request handlers for the multipart routes

use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use hyper::body::{Body, Incoming};
use hyper::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use stager_core::limits::MAX_PARTS;
use stager_net::{
    decode, routes, AbortUploadRequest, AbortUploadResponse, BeginUploadRequest,
    BeginUploadResponse, CompleteUploadRequest, CompleteUploadResponse, PresignRequest,
    PresignResponse, PresignedUrl, MAX_CONTROL_BODY_SIZE,
};

use crate::server::{error_response, etag_response, json_response, AppState, ResponseBody};
use crate::GatewayError;

/// Largest part body the loopback intake buffers (S3's own part limit)
const MAX_PART_BODY_SIZE: usize = 5 * 1024 * 1024 * 1024;

type HandlerResult = crate::Result<Response<ResponseBody>>;

/// Main request handler
pub async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<ResponseBody>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("Handling {} {}", method, path);

    let result = match (&method, path.as_str()) {
        (&Method::GET, routes::HEALTH) => Ok(handle_health(&state)),
        (&Method::POST, routes::BEGIN_UPLOAD) => handle_begin_upload(req, &state).await,
        (&Method::POST, routes::PRESIGNED_URLS) => handle_presign(req, &state).await,
        (&Method::POST, routes::COMPLETE_UPLOAD) => handle_complete(req, &state).await,
        (&Method::DELETE, routes::ABORT_UPLOAD) => handle_abort(req, &state).await,
        (&Method::PUT, part_path) if part_path.starts_with(routes::PARTS_PREFIX) => {
            let part_path = part_path.to_string();
            handle_part(req, &state, &part_path).await
        }
        _ => Err(GatewayError::NotFound(format!("{} {}", method, path))),
    };

    match result {
        Ok(response) => {
            info!("{} {} -> {}", method, path, response.status());
            Ok(response)
        }
        Err(e) => {
            if e.status().is_server_error() {
                error!("{} {} failed: {}", method, path, e);
            } else {
                warn!("{} {} rejected: {}", method, path, e);
            }
            Ok(error_response(&e))
        }
    }
}

async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, GatewayError>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    Limited::new(body, limit)
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| GatewayError::Body(e.to_string()))
}

async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T, GatewayError> {
    let bytes = read_body(req.into_body(), MAX_CONTROL_BODY_SIZE).await?;
    Ok(decode(&bytes)?)
}

fn handle_health(state: &AppState) -> Response<ResponseBody> {
    json_response(
        StatusCode::OK,
        &json!({
            "status": "healthy",
            "service": "stager-gateway",
            "version": env!("CARGO_PKG_VERSION"),
            "provider": state.provider.name(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    )
}

/// `<fileName>-<ULID>`, unique per upload of the same name
fn object_key_for(file_name: &str) -> String {
    format!("{}-{}", file_name, Ulid::new())
}

async fn handle_begin_upload(req: Request<Incoming>, state: &AppState) -> HandlerResult {
    let request: BeginUploadRequest = read_json(req).await?;
    request.validate()?;

    let object_key = object_key_for(&request.file_name);
    let upload_id = state
        .provider
        .create_upload(&object_key, &request.content_type)
        .await?;

    info!("Began upload {} for {}", upload_id, object_key);
    Ok(json_response(
        StatusCode::OK,
        &BeginUploadResponse {
            upload_id,
            object_key,
        },
    ))
}

async fn handle_presign(req: Request<Incoming>, state: &AppState) -> HandlerResult {
    let request: PresignRequest = read_json(req).await?;
    let parts = request.requested_parts()?;

    let validity = state.part_url_validity;
    let mut presigned_urls = Vec::with_capacity(parts.len());
    for part_number in parts {
        let signed_url = state
            .provider
            .presign_part(&request.object_key, &request.upload_id, part_number, validity)
            .await?;
        presigned_urls.push(PresignedUrl {
            part_number,
            signed_url,
            expires_in: Some(validity.as_secs()),
        });
    }

    debug!("Presigned {} parts of {}", presigned_urls.len(), request.upload_id);
    Ok(json_response(
        StatusCode::OK,
        &PresignResponse {
            upload_id: request.upload_id,
            object_key: request.object_key,
            presigned_urls,
        },
    ))
}

async fn handle_complete(req: Request<Incoming>, state: &AppState) -> HandlerResult {
    let request: CompleteUploadRequest = read_json(req).await?;
    request.validate()?;

    state
        .provider
        .complete_upload(&request.object_key, &request.upload_id, &request.uploaded_parts)
        .await?;

    info!(
        "Completed upload {} of {} ({} parts)",
        request.upload_id,
        request.object_key,
        request.uploaded_parts.len()
    );
    Ok(json_response(
        StatusCode::OK,
        &CompleteUploadResponse {
            object_key: request.object_key,
        },
    ))
}

async fn handle_abort(req: Request<Incoming>, state: &AppState) -> HandlerResult {
    let request: AbortUploadRequest = read_json(req).await?;
    request.validate()?;

    state
        .provider
        .abort_upload(&request.object_key, &request.upload_id)
        .await?;

    info!("Aborted upload {} of {}", request.upload_id, request.object_key);
    Ok(json_response(
        StatusCode::OK,
        &AbortUploadResponse {
            success: format!("Upload {} aborted", request.upload_id),
        },
    ))
}

/// Parse `/parts/{uploadId}/{partNumber}`
fn parse_part_path(path: &str) -> Result<(&str, u32), GatewayError> {
    let invalid = || GatewayError::InvalidPartPath(path.to_string());

    let rest = path.strip_prefix(routes::PARTS_PREFIX).ok_or_else(invalid)?;
    let (upload_id, part_number) = rest.split_once('/').ok_or_else(invalid)?;
    if upload_id.is_empty() {
        return Err(invalid());
    }
    let part_number: u32 = part_number.parse().map_err(|_| invalid())?;
    if part_number == 0 || u64::from(part_number) > MAX_PARTS {
        return Err(invalid());
    }
    Ok((upload_id, part_number))
}

async fn handle_part(req: Request<Incoming>, state: &AppState, path: &str) -> HandlerResult {
    let (upload_id, part_number) = parse_part_path(path)?;
    let query = req.uri().query().unwrap_or_default().to_string();
    let body = read_body(req.into_body(), MAX_PART_BODY_SIZE).await?;

    let etag = state
        .provider
        .accept_part(upload_id, part_number, &query, body)
        .await?;
    etag_response(&etag)
}
