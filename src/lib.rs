//! # veturi
//!
//! Trip and ride coordination API: users register, authenticate, post trips,
//! join trips as riders, and rate each other.
//!
//! The heart of the service is the session authenticator in
//! [`api::handlers::auth`]: paired session/refresh tokens are issued at
//! registration and login, rotated on renewal, and validated on every
//! mutating request. Everything else is route plumbing over `PostgreSQL`.

pub mod api;
pub mod cli;
pub mod geo;
