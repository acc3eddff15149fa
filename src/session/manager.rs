use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::identity;
use super::types::{TokenPair, ACCESS_KEY, REFRESH_KEY};
use super::user_data;
use crate::error::ApiError;
use crate::store::KeyValueStore;

/// Result of a refresh attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// A new access token was issued and stored
    Refreshed(String),
    /// Another call rotated the token while this one waited for the lock
    Reused(String),
    /// No refresh token was stored; the session has been cleared
    NoRefreshToken,
}

/// Session manager
/// Owns the token store and serializes refresh so concurrent 401s share one
/// exchange
pub struct SessionManager {
    /// Tokens and cached user fields
    store: Arc<dyn KeyValueStore>,

    /// Held for the whole refresh exchange
    refresh_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Underlying store
    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    pub fn access_token(&self) -> Result<Option<String>> {
        self.store.get(ACCESS_KEY)
    }

    pub fn refresh_token(&self) -> Result<Option<String>> {
        self.store.get(REFRESH_KEY)
    }

    /// True when an access token is stored (route guard)
    pub fn is_authenticated(&self) -> bool {
        match self.access_token() {
            Ok(token) => token.is_some(),
            Err(e) => {
                tracing::warn!("Failed to read access token: {:#}", e);
                false
            }
        }
    }

    /// Identity of the stored access token
    pub fn identity(&self) -> Option<String> {
        let token = self.access_token().ok().flatten();
        identity::session_identity(token.as_deref())
    }

    /// Start a session with freshly issued tokens
    ///
    /// Cached user data from a different identity is purged before the new
    /// tokens are written. Returns true when a purge happened.
    pub fn begin_session(&self, tokens: &TokenPair) -> Result<bool> {
        let purged = user_data::reset_on_session_change(self.store(), &tokens.access)?;
        self.store.set(ACCESS_KEY, &tokens.access)?;
        self.store.set(REFRESH_KEY, &tokens.refresh)?;

        tracing::info!(
            identity = ?identity::session_identity(Some(&tokens.access)),
            purged,
            "Session started"
        );
        Ok(purged)
    }

    pub fn store_access_token(&self, access: &str) -> Result<()> {
        self.store.set(ACCESS_KEY, access)
    }

    /// Drop all local session state: cached user data and both tokens
    pub fn clear_session(&self) -> Result<()> {
        user_data::clear_client_user_data(self.store())?;
        self.store.remove(ACCESS_KEY)?;
        self.store.remove(REFRESH_KEY)?;
        tracing::info!("Session cleared");
        Ok(())
    }

    /// Identity-scoped storage key for `base`
    pub fn scoped_key(&self, base: &str) -> Result<String> {
        user_data::scoped_storage_key(self.store(), base)
    }

    /// Obtain a fresh access token after a 401
    ///
    /// `sent_access` is the token the failed request carried. When the stored
    /// token no longer matches it, another call already refreshed and that
    /// token is reused. Otherwise `exchange` is called with the stored
    /// refresh token. Missing refresh token and failed exchange both clear
    /// the session.
    pub async fn refresh_access_token<F, Fut>(
        &self,
        sent_access: Option<&str>,
        exchange: F,
    ) -> std::result::Result<RefreshOutcome, ApiError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = std::result::Result<String, ApiError>>,
    {
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.access_token()? {
            if sent_access != Some(current.as_str()) {
                tracing::debug!("Access token already rotated by a concurrent call");
                return Ok(RefreshOutcome::Reused(current));
            }
        }

        let Some(refresh) = self.refresh_token()? else {
            tracing::warn!("No refresh token stored, clearing session");
            self.clear_session()?;
            return Ok(RefreshOutcome::NoRefreshToken);
        };

        match exchange(refresh).await {
            Ok(access) => {
                self.store_access_token(&access)?;
                Ok(RefreshOutcome::Refreshed(access))
            }
            Err(e) => {
                tracing::warn!(error = ?e, "Refresh failed, clearing session");
                self.clear_session()?;
                Err(ApiError::Refresh(Box::new(e)))
            }
        }
    }
}
