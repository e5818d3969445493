//! Gateway errors and their HTTP status

use hyper::StatusCode;
use thiserror::Error;

use stager_net::WireError;

use crate::provider::ProviderError;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Failed to read request body: {0}")]
    Body(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid part path: {0}")]
    InvalidPartPath(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Wire(WireError::BodyTooLarge(_, _)) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Wire(_) | GatewayError::Body(_) | GatewayError::InvalidPartPath(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Provider(err) => match err {
                ProviderError::NoSuchUpload(_) | ProviderError::IntakeUnsupported(_) => {
                    StatusCode::NOT_FOUND
                }
                ProviderError::Rejected(_) => StatusCode::BAD_REQUEST,
                ProviderError::Denied(_) => StatusCode::FORBIDDEN,
                ProviderError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
