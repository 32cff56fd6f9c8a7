use crate::api::handlers::auth::{
    state::AuthConfig,
    storage::{insert_user, new_triple, RegisterOutcome},
    types::TokenResponse,
    utils::hash_password,
};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserRegister {
    name: String,
    username: String,
    password: String,
}

#[utoipa::path(
    post,
    path= "/register",
    request_body = UserRegister,
    responses (
        (status = 201, description = "Account created, first session issued", body = TokenResponse),
        (status = 400, description = "Invalid body or username already taken", body = String),
    ),
    tag= "session"
)]
pub async fn register(
    pool: Extension<PgPool>,
    config: Extension<AuthConfig>,
    payload: Option<Json<UserRegister>>,
) -> impl IntoResponse {
    let Some(Json(user)) = payload else {
        return (StatusCode::BAD_REQUEST, "Invalid body".to_string()).into_response();
    };

    let name = user.name.trim();
    let username = user.username.trim();
    if name.is_empty() || username.is_empty() || user.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Invalid body".to_string()).into_response();
    }

    let password_hash = match hash_password(&user.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to register user".to_string(),
            )
                .into_response();
        }
    };

    let triple = match new_triple(&config) {
        Ok(triple) => triple,
        Err(err) => {
            error!("Failed to generate session tokens: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to register user".to_string(),
            )
                .into_response();
        }
    };

    match insert_user(&pool, name, username, &password_hash, &triple).await {
        Ok(RegisterOutcome::Created(created)) => {
            debug!("Created user {}", created.id);

            (
                StatusCode::CREATED,
                Json(TokenResponse::from_triple(&triple)),
            )
                .into_response()
        }
        Ok(RegisterOutcome::Conflict) => {
            (StatusCode::BAD_REQUEST, "User already exists".to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to register user: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to register user".to_string(),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::UserRegister;
    use anyhow::Result;

    #[test]
    fn user_register_round_trips() -> Result<()> {
        let value = serde_json::json!({
            "name": "Alice",
            "username": "alice",
            "password": "pw1",
        });
        let decoded: UserRegister = serde_json::from_value(value)?;
        assert_eq!(decoded.username, "alice");
        Ok(())
    }

    #[test]
    fn user_register_rejects_missing_fields() {
        let value = serde_json::json!({ "name": "Alice" });
        assert!(serde_json::from_value::<UserRegister>(value).is_err());
    }
}
