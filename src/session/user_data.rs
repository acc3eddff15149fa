// Cached user data scoped to the signed-in identity

use anyhow::Result;

use super::identity::{session_identity, session_identity_claim};
use super::types::ACCESS_KEY;
use crate::store::KeyValueStore;

/// Keys holding data that belongs to the signed-in identity
pub const USER_DATA_KEYS: [&str; 6] = [
    "username",
    "avatar",
    "cover",
    "email",
    "travelStyle",
    "travelPlaces",
];

/// Namespaced prefixes that also belong to the signed-in identity
pub const USER_DATA_PREFIXES: [&str; 1] = ["travelPlaces:"];

/// Identity suffix used for scoped keys when no one is signed in
const GUEST_SCOPE: &str = "guest";

/// Remove every cached user key, fixed and prefixed
pub fn clear_client_user_data(store: &dyn KeyValueStore) -> Result<()> {
    for key in USER_DATA_KEYS {
        store.remove(key)?;
    }

    let scoped: Vec<String> = store
        .keys()?
        .into_iter()
        .filter(|key| USER_DATA_PREFIXES.iter().any(|p| key.starts_with(p)))
        .collect();

    for key in &scoped {
        store.remove(key)?;
    }

    tracing::debug!(scoped_keys = scoped.len(), "Cleared cached user data");
    Ok(())
}

/// Purge cached user data unless `next_access` belongs to the same identity
/// as the currently stored access token
///
/// Identities compare as JSON values, so a numeric `7` and a string `"7"`
/// are different sessions. Must run before the new token is persisted.
/// Returns true when a purge happened.
pub fn reset_on_session_change(store: &dyn KeyValueStore, next_access: &str) -> Result<bool> {
    let previous = store.get(ACCESS_KEY)?;
    let prev_identity = session_identity_claim(previous.as_deref());
    let next_identity = session_identity_claim(Some(next_access));

    match (prev_identity, next_identity) {
        (Some(prev), Some(next)) if prev == next => {
            tracing::debug!("Session identity unchanged, keeping cached user data");
            Ok(false)
        }
        (prev, next) => {
            tracing::info!(
                had_previous = prev.is_some(),
                has_next = next.is_some(),
                "Session identity changed, purging cached user data"
            );
            clear_client_user_data(store)?;
            Ok(true)
        }
    }
}

/// Storage key namespaced by the current session identity
///
/// `travelPlaces` becomes `travelPlaces:<identity>` (or `travelPlaces:guest`).
pub fn scoped_storage_key(store: &dyn KeyValueStore, base: &str) -> Result<String> {
    let token = store.get(ACCESS_KEY)?;
    let scope = session_identity(token.as_deref()).unwrap_or_else(|| GUEST_SCOPE.to_string());
    Ok(format!("{}:{}", base, scope))
}
