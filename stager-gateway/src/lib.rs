//! Reference gateway for the multipart upload routes

pub mod error;
pub mod handlers;
pub mod provider;
pub mod server;

pub use error::GatewayError;
pub use provider::{MemoryProvider, ProviderError, S3Provider, StorageProvider};
pub use server::{AppState, GatewayServer};

pub type Result<T> = std::result::Result<T, GatewayError>;
