//! Login, logout and caller resolution.

pub mod principal;
pub mod session;
mod state;
pub mod types;
pub(crate) mod utils;

pub use principal::resolve_caller;
pub use state::AuthConfig;
pub(crate) use utils::{generate_session_token, hash_password, hash_session_token, verify_password};
