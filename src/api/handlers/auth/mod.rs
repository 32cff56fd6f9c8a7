//! Session authenticator: paired session/refresh tokens for user identities.
//!
//! Tokens are opaque CSPRNG strings and only their SHA-256 hashes are stored.
//! Each user owns exactly one (session, refresh, expiration) triple; renewal
//! overwrites it in place. Validation treats unknown and expired tokens
//! identically so responses cannot be used to probe for valid credentials.

pub(crate) mod principal;
pub mod session;
pub(crate) mod state;
pub(crate) mod storage;
pub mod types;
pub(crate) mod utils;

#[cfg(test)]
mod tests;

pub use self::principal::AuthFailure;
pub use self::session::{logout, renew};
pub use self::state::AuthConfig;
