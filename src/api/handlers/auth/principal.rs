//! Bearer-token gate for endpoints that require a signed-in user.

use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use tracing::error;

use super::storage::{validate_session, SessionUser};

/// Uniform failure for the authentication gate.
///
/// Malformed headers are reported as such; everything else collapses into
/// `InvalidSession`, so a response never reveals whether a token was unknown
/// or merely expired.
#[derive(Debug)]
pub enum AuthFailure {
    MissingHeader,
    InvalidHeader,
    InvalidSession,
    Internal(anyhow::Error),
}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> Response {
        match self {
            Self::MissingHeader => {
                (StatusCode::BAD_REQUEST, "Missing Authorization header").into_response()
            }
            Self::InvalidHeader => {
                (StatusCode::BAD_REQUEST, "Invalid Authorization header").into_response()
            }
            Self::InvalidSession => {
                (StatusCode::BAD_REQUEST, "Invalid session token").into_response()
            }
            Self::Internal(err) => {
                error!("Authentication lookup failed: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Pull the bearer token out of the Authorization header.
///
/// A header without the `Bearer` scheme is treated as a bare token; an empty
/// value after stripping is a malformed header, not an invalid token.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AuthFailure> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Err(AuthFailure::MissingHeader);
    };
    let value = value.to_str().map_err(|_| AuthFailure::InvalidHeader)?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer")
        .or_else(|| trimmed.strip_prefix("bearer"))
        .unwrap_or(trimmed)
        .trim();
    if token.is_empty() {
        Err(AuthFailure::InvalidHeader)
    } else {
        Ok(token.to_string())
    }
}

/// Resolve the bearer token to a user, or fail with a uniform response.
pub(crate) async fn require_session(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<SessionUser, AuthFailure> {
    let token = extract_bearer_token(headers)?;
    match validate_session(pool, &token).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(AuthFailure::InvalidSession),
        Err(err) => Err(AuthFailure::Internal(err)),
    }
}
