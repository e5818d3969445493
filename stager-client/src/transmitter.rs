//! Part transmission to authorized targets

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::Connect;
use std::time::Duration;
use tracing::trace;

use stager_core::{PartAuthorization, PartReceipt};
use stager_net::{ETAG_HEADER, OCTET_STREAM};

use crate::http::{DefaultConnector, HttpClient};
use crate::{ClientError, Result};

/// Sends one part body under its authorization and returns the receipt
#[async_trait]
pub trait PartTransmitter: Send + Sync {
    async fn transmit(&self, authorization: &PartAuthorization, body: Bytes) -> Result<PartReceipt>;
}

/// `PUT`s part bodies to presigned URLs
#[derive(Clone, Debug)]
pub struct HttpTransmitter<C = DefaultConnector> {
    http: HttpClient<C>,
}

impl HttpTransmitter<DefaultConnector> {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(HttpTransmitter {
            http: HttpClient::new(timeout)?,
        })
    }
}

impl<C> HttpTransmitter<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    pub fn with_http(http: HttpClient<C>) -> Self {
        HttpTransmitter { http }
    }
}

#[async_trait]
impl<C> PartTransmitter for HttpTransmitter<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    async fn transmit(&self, authorization: &PartAuthorization, body: Bytes) -> Result<PartReceipt> {
        let part_number = authorization.part_number;
        let uri: Uri = authorization
            .token
            .parse()
            .map_err(|e| ClientError::InvalidUrl(format!("part {} target: {}", part_number, e)))?;

        let size = body.len();
        let request = Request::builder()
            .method(Method::PUT)
            .uri(uri)
            .header(CONTENT_TYPE, OCTET_STREAM)
            .body(Full::new(body))?;

        let reply = self.http.send(request).await?.error_for_status()?;

        // Kept verbatim, quotes included; the provider matches it byte for byte
        let etag = reply
            .header(ETAG_HEADER)
            .filter(|tag| !tag.is_empty())
            .ok_or_else(|| {
                ClientError::InvalidResponse(format!("part {} response carried no ETag", part_number))
            })?;

        trace!("Part {} stored ({} bytes, ETag {})", part_number, size, etag);
        Ok(PartReceipt::new(part_number, etag))
    }
}
