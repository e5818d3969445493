//! HTTP implementation of the upload control plane

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::Connect;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};
use tracing::debug;
use url::Url;

use stager_core::{ObjectKey, PartAuthorization, PartReceipt, SessionId, UploadSession};
use stager_net::{
    routes, AbortUploadRequest, AbortUploadResponse, BeginUploadRequest, BeginUploadResponse,
    CompleteUploadRequest, CompleteUploadResponse, PresignRequest, PresignResponse, UploadedPart,
    APPLICATION_JSON,
};

use crate::http::{DefaultConnector, HttpClient};
use crate::{ClientError, OpenedSession, Result, UploadAuthorizer};

/// Talks to the gateway's multipart routes
#[derive(Clone, Debug)]
pub struct BackendClient<C = DefaultConnector> {
    base_url: Url,
    http: HttpClient<C>,
}

impl BackendClient<DefaultConnector> {
    /// Create a client for the gateway at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        BackendClient::with_http(base_url, HttpClient::new(timeout)?)
    }
}

impl<C> BackendClient<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    pub fn with_http(base_url: &str, http: HttpClient<C>) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(format!("{} cannot be a base URL", base_url)));
        }
        // Routes are joined relative to the base path
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(BackendClient { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, route: &str) -> Result<Uri> {
        let url = self
            .base_url
            .join(route.trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", route, e)))?;
        url.as_str()
            .parse()
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", url, e)))
    }

    async fn call<Req, Resp>(&self, method: Method, route: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)
            .map_err(|e| ClientError::Request(format!("encode {}: {}", route, e)))?;
        let request = Request::builder()
            .method(method.clone())
            .uri(self.endpoint(route)?)
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .body(Full::new(Bytes::from(payload)))?;

        debug!("{} {}", method, route);
        let reply = self.http.send(request).await?.error_for_status()?;
        reply.json()
    }
}

#[async_trait]
impl<C> UploadAuthorizer for BackendClient<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    async fn open_session(&self, file_name: &str, content_type: &str) -> Result<OpenedSession> {
        let request = BeginUploadRequest {
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
        };
        let response: BeginUploadResponse = self.call(Method::POST, routes::BEGIN_UPLOAD, &request).await?;

        let object_key = ObjectKey::new(&response.object_key)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        let session_id = SessionId::new(&response.upload_id)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        Ok(OpenedSession {
            object_key,
            session_id,
        })
    }

    async fn authorize_parts(
        &self,
        session: &UploadSession,
        part_numbers: &[u32],
    ) -> Result<BTreeMap<u32, PartAuthorization>> {
        let request = PresignRequest::for_parts(
            session.object_key().as_str(),
            session.session_id().as_str(),
            part_numbers.to_vec(),
        );
        // Expiry counts from before the request so it never overshoots the server's clock
        let issued_at = SystemTime::now();
        let response: PresignResponse = self.call(Method::POST, routes::PRESIGNED_URLS, &request).await?;

        let mut authorizations = BTreeMap::new();
        for url in response.presigned_urls {
            let part_number = url.part_number;
            if authorizations
                .insert(part_number, url.into_authorization(issued_at))
                .is_some()
            {
                return Err(ClientError::InvalidResponse(format!(
                    "part {} authorized twice",
                    part_number
                )));
            }
        }
        Ok(authorizations)
    }

    async fn finalize(&self, session: &UploadSession, receipts: &[PartReceipt]) -> Result<ObjectKey> {
        let request = CompleteUploadRequest {
            object_key: session.object_key().as_str().to_string(),
            upload_id: session.session_id().as_str().to_string(),
            uploaded_parts: receipts.iter().map(UploadedPart::from).collect(),
        };
        let response: CompleteUploadResponse =
            self.call(Method::POST, routes::COMPLETE_UPLOAD, &request).await?;
        ObjectKey::new(&response.object_key).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    async fn abort(&self, session: &UploadSession) -> Result<()> {
        let request = AbortUploadRequest {
            object_key: session.object_key().as_str().to_string(),
            upload_id: session.session_id().as_str().to_string(),
        };
        let _: AbortUploadResponse = self.call(Method::DELETE, routes::ABORT_UPLOAD, &request).await?;
        Ok(())
    }
}
