//! Wire contract between the upload client and the gateway routes

pub mod protocol;
pub mod wire;

pub use protocol::*;
pub use wire::*;

pub type Result<T> = std::result::Result<T, WireError>;
