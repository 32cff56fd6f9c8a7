use crate::api::handlers::auth::{
    state::AuthConfig,
    storage::{new_triple, store_triple, verify_credentials},
    types::TokenResponse,
};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::error;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserLogin {
    username: String,
    password: String,
}

#[utoipa::path(
    post,
    path= "/login",
    request_body = UserLogin,
    responses (
        (status = 200, description = "Login successful, fresh session issued", body = TokenResponse),
        (status = 400, description = "Invalid body or invalid credentials", body = String),
    ),
    tag= "session"
)]
pub async fn login(
    pool: Extension<PgPool>,
    config: Extension<AuthConfig>,
    payload: Option<Json<UserLogin>>,
) -> impl IntoResponse {
    let Some(Json(credentials)) = payload else {
        return (StatusCode::BAD_REQUEST, "Invalid body".to_string()).into_response();
    };

    let user = match verify_credentials(&pool, credentials.username.trim(), &credentials.password)
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (StatusCode::BAD_REQUEST, "Invalid credentials".to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to verify credentials: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to log in".to_string(),
            )
                .into_response();
        }
    };

    // Login renews the session: both tokens rotate and the clock resets.
    let triple = match new_triple(&config) {
        Ok(triple) => triple,
        Err(err) => {
            error!("Failed to generate session tokens: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to log in".to_string(),
            )
                .into_response();
        }
    };

    match store_triple(&pool, user.id, &triple).await {
        Ok(()) => (StatusCode::OK, Json(TokenResponse::from_triple(&triple))).into_response(),
        Err(err) => {
            error!("Failed to store session: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to log in".to_string(),
            )
                .into_response()
        }
    }
}
