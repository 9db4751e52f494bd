//! `/posts/*` endpoints: feed, reactions and comments.

use serde_json::json;

use super::types::{ApiResponse, Comment, NewPost, Post, PostUpdate, ReactionKind};
use super::{ApiClient, RequestOptions, json_body};
use crate::error::ApiError;

impl ApiClient {
    /// One page of the feed. Pages start at 1.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn posts(&self, page: u32, per_page: u32) -> Result<Vec<Post>, ApiError> {
        self.request(&format!("/posts?page={page}&per_page={per_page}"), RequestOptions::get()).await
    }

    /// The public sample feed; works without a token.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn sample_posts(&self) -> Result<Vec<Post>, ApiError> {
        self.request("/posts/sample", RequestOptions::get()).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn post(&self, post_id: i64) -> Result<Post, ApiError> {
        self.request(&format!("/posts/{post_id}"), RequestOptions::get()).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn create_post(&self, post: &NewPost) -> Result<Post, ApiError> {
        let body = json_body(post)?;
        self.request("/posts", RequestOptions::post().with_body(body)).await
    }

    /// # Errors
    ///
    /// Editing someone else's post fails with a 403 [`ApiError::Http`].
    pub async fn update_post(&self, post_id: i64, update: &PostUpdate) -> Result<Post, ApiError> {
        let body = json_body(update)?;
        self.request(&format!("/posts/{post_id}"), RequestOptions::put().with_body(body)).await
    }

    /// Toggle the current user's like.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn like_post(&self, post_id: i64) -> Result<ApiResponse, ApiError> {
        self.request(&format!("/posts/{post_id}/like"), RequestOptions::post()).await
    }

    /// Set the current user's reaction; reacting again with the same kind
    /// removes it.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn react_to_post(&self, post_id: i64, reaction: ReactionKind) -> Result<ApiResponse, ApiError> {
        let body = json!({ "reaction_type": reaction });
        self.request(&format!("/posts/{post_id}/reactions"), RequestOptions::post().with_body(body)).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn delete_post(&self, post_id: i64) -> Result<ApiResponse, ApiError> {
        self.request(&format!("/posts/{post_id}"), RequestOptions::delete()).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn create_comment(&self, post_id: i64, content: &str) -> Result<Comment, ApiError> {
        let body = json!({ "content": content });
        self.request(&format!("/posts/{post_id}/comments"), RequestOptions::post().with_body(body)).await
    }
}
