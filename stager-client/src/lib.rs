//! stager client SDK: stage a large local file as a multipart upload

pub mod authorizer;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod outcome;
pub mod progress;
pub mod retry;
pub mod source;
pub mod transmitter;

pub use authorizer::{OpenedSession, UploadAuthorizer};
pub use client::BackendClient;
pub use config::UploadConfig;
pub use coordinator::UploadCoordinator;
pub use error::{ClientError, UploadError};
pub use http::{default_connector, DefaultConnector, HttpClient, HttpReply};
pub use outcome::UploadOutcome;
pub use progress::{percent, ProgressSink};
pub use retry::{with_retries, RetryPolicy};
pub use source::{ByteSource, FileSource, MemorySource};
pub use transmitter::{HttpTransmitter, PartTransmitter};

pub type Result<T> = std::result::Result<T, ClientError>;
