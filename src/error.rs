//! Error types for the REST client and token persistence.
//!
//! Realtime failures have no error type here: the socket client logs them and
//! keeps going, so nothing reaches the caller.

/// Errors produced by [`ApiClient`](crate::api::ApiClient) calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server answered 401. The held token has already been cleared.
    #[error("Unauthorized")]
    Unauthorized,

    /// Any other non-2xx status, carrying the server's message when it sent one.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// The request never produced a response (DNS, connect, TLS, timeout).
    #[error("http request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The response body was not the JSON the caller asked for.
    #[error("invalid JSON response: {0}")]
    Parse(#[source] serde_json::Error),

    /// The request body could not be serialized.
    #[error("request body encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The token could not be persisted or removed.
    #[error("token store failed: {0}")]
    Store(#[from] StoreError),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl ApiError {
    /// HTTP status behind this error, if the server produced one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors produced by a [`TokenStore`](crate::session::TokenStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("token file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("token file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
