//! Error types for the directory client.
//!
//! # Design
//! Local failures (`InvalidArgument`, `NotInitialized`, `Config`) never reach
//! the network. Non-2xx token responses land in `HttpError` with the raw
//! status code and body; connection-level failures land in `Transport`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// A required payload was missing; raised before any request is sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The process-wide client was requested before `initialize`.
    #[error("api client not initialized")]
    NotInitialized,

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The request never produced a response (connect, timeout, TLS, ...).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The token endpoint answered 2xx but the body held no usable token.
    #[error("token retrieval failed: {0}")]
    Protocol(String),

    #[error("serialization failed: {0}")]
    SerializationError(String),

    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}
