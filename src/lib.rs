//! Client for the social-network backend.
//!
//! - [`api::ApiClient`]: authenticated REST calls (auth, posts, stories, messages).
//! - [`realtime::RealtimeClient`]: the chat socket, with typed event dispatch
//!   and bounded reconnects.
//!
//! Both share one [`session::Session`], so a login through the REST client is
//! visible to the next `connect()` and a 401 anywhere logs both out.

pub mod api;
pub mod config;
pub mod error;
pub mod realtime;
pub mod session;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use api::{ApiClient, RequestOptions};
pub use config::ClientConfig;
pub use error::{ApiError, StoreError};
pub use realtime::{ConnectionEvent, ConnectionState, RealtimeClient, RetryPolicy};
pub use session::{FileTokenStore, MemoryTokenStore, Session, TokenStore};

/// Build the session, REST client and realtime client described by `config`.
///
/// # Errors
///
/// Returns an error if the token file cannot be read or the HTTP client
/// cannot be constructed.
pub fn build_clients(config: &ClientConfig) -> Result<(ApiClient, RealtimeClient), ApiError> {
    let session = match &config.token_file {
        Some(path) => Session::load(FileTokenStore::new(path))?,
        None => Session::in_memory(),
    };
    let api = ApiClient::new(config, session.clone())?;
    let realtime = RealtimeClient::new(config.ws_url.clone(), session, config.reconnect);
    Ok((api, realtime))
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
