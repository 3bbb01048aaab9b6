//! Error types for the request dispatcher.
//!
//! # Design
//! Variants fall into three groups. Malformed requests (`EmptyUrl`,
//! `UnsupportedMethod`, `BodyNotAllowed`) are reported straight back to the
//! submitter and never queued. Any error an attempt produces (usually
//! `Transport`, `HttpStatus` or `Timeout`) is retried by the dispatcher
//! until the policy budget runs out, and the last one is what the caller
//! sees. The remaining variants cover lifecycle and setup problems.

use thiserror::Error;

use crate::http::HttpMethod;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("request url is empty")]
    EmptyUrl,

    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("{0} requests do not carry a body")]
    BodyNotAllowed(HttpMethod),

    /// Connection-level failure reported by the transport.
    #[error("request failed: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The descriptor was dropped by `clear_queue` before it ran.
    #[error("request discarded before execution")]
    Discarded,

    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to save file: {0}")]
    Io(String),
}

impl DispatchError {
    /// Malformed requests are rejected at submission and never retried.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            DispatchError::EmptyUrl
                | DispatchError::UnsupportedMethod(_)
                | DispatchError::BodyNotAllowed(_)
        )
    }
}
