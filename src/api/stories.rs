//! `/stories/*` endpoints.

use super::types::{Notice, Story};
use super::{ApiClient, RequestOptions};
use crate::error::ApiError;

impl ApiClient {
    /// Unexpired stories, newest first.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn stories(&self) -> Result<Vec<Story>, ApiError> {
        self.request("/stories", RequestOptions::get()).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn mark_story_viewed(&self, story_id: i64) -> Result<Notice, ApiError> {
        self.request(&format!("/stories/{story_id}/view"), RequestOptions::post()).await
    }
}
