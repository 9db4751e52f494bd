//! `/messages/*` endpoints. These persist messages; the realtime socket only
//! delivers them.

use serde_json::json;

use super::types::{ApiResponse, ChatSummary, DirectMessage};
use super::{ApiClient, RequestOptions};
use crate::error::ApiError;

impl ApiClient {
    /// Conversations of the current user, most recent first.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn chats(&self) -> Result<Vec<ChatSummary>, ApiError> {
        self.request("/messages/chats", RequestOptions::get()).await
    }

    /// Full thread with `user_id`, oldest first.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn messages_with(&self, user_id: i64) -> Result<Vec<DirectMessage>, ApiError> {
        self.request(&format!("/messages/{user_id}"), RequestOptions::get()).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn send_message(&self, receiver_id: i64, content: &str) -> Result<DirectMessage, ApiError> {
        let body = json!({ "content": content });
        self.request(&format!("/messages/{receiver_id}"), RequestOptions::post().with_body(body)).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn mark_messages_read(&self, user_id: i64) -> Result<ApiResponse, ApiError> {
        self.request(&format!("/messages/{user_id}/mark-read"), RequestOptions::post()).await
    }
}
