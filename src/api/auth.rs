//! `/auth/*` endpoints.

use serde_json::json;

use super::types::{ApiResponse, Credentials, NewUser, TokenResponse, User};
use super::{ApiClient, RequestOptions, json_body};
use crate::error::ApiError;

impl ApiClient {
    /// Exchange credentials for tokens and store the access token.
    ///
    /// # Errors
    ///
    /// Wrong credentials surface as [`ApiError::Unauthorized`]; see
    /// [`ApiClient::request`] for the rest.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenResponse, ApiError> {
        let body = json_body(&Credentials { username, password })?;
        let tokens: TokenResponse = self.request("/auth/login", RequestOptions::post().with_body(body)).await?;
        self.set_token(&tokens.access_token)?;
        tracing::info!(username, "logged in");
        Ok(tokens)
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn register(&self, user: &NewUser) -> Result<ApiResponse, ApiError> {
        let body = json_body(user)?;
        self.request("/auth/register", RequestOptions::post().with_body(body)).await
    }

    /// Revoke the session server-side, then drop the local token.
    ///
    /// # Errors
    ///
    /// The local token is kept if the server call fails with anything but a 401.
    pub async fn logout(&self) -> Result<ApiResponse, ApiError> {
        let response = self.request("/auth/logout", RequestOptions::post()).await?;
        self.clear_token()?;
        tracing::info!("logged out");
        Ok(response)
    }

    /// Trade the refresh cookie set at login for a new access token.
    ///
    /// # Errors
    ///
    /// A missing or revoked refresh cookie surfaces as [`ApiError::Unauthorized`].
    pub async fn refresh(&self) -> Result<TokenResponse, ApiError> {
        let tokens: TokenResponse = self.request("/auth/refresh", RequestOptions::post().with_body(json!({}))).await?;
        if !tokens.access_token.is_empty() {
            self.set_token(&tokens.access_token)?;
        }
        Ok(tokens)
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.request("/auth/me", RequestOptions::get()).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn users(&self) -> Result<Vec<User>, ApiError> {
        self.request("/auth/users", RequestOptions::get()).await
    }
}
