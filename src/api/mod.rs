//! REST client for the social-network backend.
//!
//! ERROR HANDLING
//! ==============
//! Every call resolves to `Result<T, ApiError>`. A 401 clears the session
//! token before the error is returned, so the next request goes out
//! anonymous; deciding what to show (or where to navigate) is left to the
//! caller. Nothing at this layer retries.

mod auth;
mod messages;
mod posts;
mod stories;
pub mod types;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::session::Session;

/// Method and optional JSON body for [`ApiClient::request`].
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}

impl RequestOptions {
    #[must_use]
    pub fn get() -> Self {
        Self { method: Method::GET, body: None }
    }

    #[must_use]
    pub fn post() -> Self {
        Self { method: Method::POST, body: None }
    }

    #[must_use]
    pub fn put() -> Self {
        Self { method: Method::PUT, body: None }
    }

    #[must_use]
    pub fn delete() -> Self {
        Self { method: Method::DELETE, body: None }
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Authenticated HTTP client. Cheap to clone; clones share the session and
/// the connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Session,
}

impl ApiClient {
    /// Build a client for `config.api_base_url` using `session` for auth.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::ClientBuild`] if the HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig, session: Session) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeouts.request())
            .connect_timeout(config.timeouts.connect())
            .cookie_store(true)
            .build()
            .map_err(ApiError::ClientBuild)?;
        Ok(Self { http, base_url: config.api_base_url.trim_end_matches('/').to_owned(), session })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    /// # Errors
    ///
    /// Returns [`ApiError::Store`] if the token cannot be persisted.
    pub fn set_token(&self, token: &str) -> Result<(), ApiError> {
        Ok(self.session.set_token(token)?)
    }

    /// # Errors
    ///
    /// Returns [`ApiError::Store`] if the persisted token cannot be removed.
    pub fn clear_token(&self) -> Result<(), ApiError> {
        Ok(self.session.clear_token()?)
    }

    /// Call `base_url + endpoint` and decode the JSON response as `T`.
    ///
    /// # Errors
    ///
    /// - [`ApiError::Unauthorized`] on 401, after clearing the token
    /// - [`ApiError::Http`] on any other non-2xx status
    /// - [`ApiError::Transport`] when no response arrives
    /// - [`ApiError::Parse`] when the body is not the expected JSON
    /// - [`ApiError::Encode`] when the request body cannot be serialized
    pub async fn request<T: DeserializeOwned>(&self, endpoint: &str, options: RequestOptions) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let method = options.method.clone();

        let mut builder = self.http.request(options.method, &url).header(CONTENT_TYPE, "application/json");
        if let Some(token) = self.session.token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &options.body {
            builder = builder.body(serde_json::to_vec(body).map_err(ApiError::Encode)?);
        }

        let response = builder.send().await.map_err(|error| {
            tracing::warn!(%method, endpoint, %error, "API request failed");
            ApiError::Transport(error)
        })?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(%method, endpoint, "API request unauthorized; clearing session token");
            if let Err(error) = self.session.clear_token() {
                tracing::warn!(%error, "failed to clear session token");
            }
            return Err(ApiError::Unauthorized);
        }

        let body = response.bytes().await.map_err(ApiError::Transport)?;
        if !status.is_success() {
            let message = error_message(status, &body);
            tracing::warn!(%method, endpoint, status = status.as_u16(), %message, "API request failed");
            return Err(ApiError::Http { status: status.as_u16(), message });
        }

        serde_json::from_slice(&body).map_err(|error| {
            tracing::warn!(%method, endpoint, %error, "API response was not the expected JSON");
            ApiError::Parse(error)
        })
    }
}

/// Serialize a request body.
fn json_body<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(ApiError::Encode)
}

/// Human-readable message for a failed response: the body's `message`, then
/// its `detail`, then a generic `HTTP error: <status>`.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    let generic = || format!("HTTP error: {}", status.as_u16());
    let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(body) else {
        return generic();
    };

    let text = |key: &str| match fields.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Null | Value::String(_)) | None => None,
        Some(other) => Some(other.to_string()),
    };
    text("message").or_else(|| text("detail")).unwrap_or_else(generic)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
