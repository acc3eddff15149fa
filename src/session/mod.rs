// Session module
// Token storage, identity scoping of cached user data, and refresh

pub mod identity;
mod manager;
pub mod refresh;
mod types;
pub mod user_data;

pub use manager::{RefreshOutcome, SessionManager};
pub use types::{LoginRequest, SignupRequest, TokenPair, ACCESS_KEY, REFRESH_KEY};
