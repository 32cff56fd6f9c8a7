//! Session lifecycle endpoints: renewal and logout.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use tracing::error;

use super::{
    principal::extract_bearer_token,
    state::AuthConfig,
    storage::{expire_now, renew_from_refresh, validate_session},
    types::{LogoutResponse, TokenResponse},
};

#[utoipa::path(
    post,
    path = "/session",
    responses(
        (status = 200, description = "Session renewed, both tokens rotated", body = TokenResponse),
        (status = 400, description = "Missing header or invalid refresh token", body = String)
    ),
    tag = "session"
)]
pub async fn renew(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    config: Extension<AuthConfig>,
) -> impl IntoResponse {
    let refresh_token = match extract_bearer_token(&headers) {
        Ok(token) => token,
        Err(failure) => return failure.into_response(),
    };

    match renew_from_refresh(&pool, &refresh_token, &config).await {
        Ok(Some((_user, triple))) => {
            (StatusCode::OK, Json(TokenResponse::from_triple(&triple))).into_response()
        }
        Ok(None) => (StatusCode::BAD_REQUEST, "Invalid refresh token".to_string()).into_response(),
        Err(err) => {
            error!("Failed to renew session: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to renew session".to_string(),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 200, description = "Session expired immediately", body = LogoutResponse),
        (status = 400, description = "Missing header or invalid session token", body = String)
    ),
    tag = "session"
)]
pub async fn logout(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let session_token = match extract_bearer_token(&headers) {
        Ok(token) => token,
        Err(failure) => return failure.into_response(),
    };

    let user = match validate_session(&pool, &session_token).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (StatusCode::BAD_REQUEST, "Invalid session token".to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to validate session: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to log out".to_string(),
            )
                .into_response();
        }
    };

    // The tokens themselves are untouched; validation fails the expiration
    // check from here on.
    match expire_now(&pool, user.id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(LogoutResponse {
                message: "You have been logged out".to_string(),
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to expire session: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to log out".to_string(),
            )
                .into_response()
        }
    }
}
