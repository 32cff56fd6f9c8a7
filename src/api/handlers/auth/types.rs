//! Response types shared by the session endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::storage::TokenTriple;

/// The token triple returned by register, login, and session renewal.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub session_token: String,
    pub session_expiration: String,
    pub refresh_token: String,
}

impl TokenResponse {
    pub(crate) fn from_triple(triple: &TokenTriple) -> Self {
        Self {
            session_token: triple.session_token.clone(),
            session_expiration: triple.session_expires_at.to_rfc3339(),
            refresh_token: triple.refresh_token.clone(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::{state::AuthConfig, storage::new_triple};
    use anyhow::Result;

    #[test]
    fn token_response_round_trips() -> Result<()> {
        let triple = new_triple(&AuthConfig::new())?;
        let response = TokenResponse::from_triple(&triple);

        assert_eq!(response.session_token, triple.session_token);
        assert_eq!(response.refresh_token, triple.refresh_token);

        let value = serde_json::to_value(&response)?;
        let decoded: TokenResponse = serde_json::from_value(value)?;
        assert_eq!(decoded.session_token, triple.session_token);
        assert_eq!(
            decoded.session_expiration,
            triple.session_expires_at.to_rfc3339()
        );
        Ok(())
    }

    #[test]
    fn logout_response_serializes_message() -> Result<()> {
        let response = LogoutResponse {
            message: "You have been logged out".to_string(),
        };
        let value = serde_json::to_value(&response)?;
        assert_eq!(
            value.get("message").and_then(serde_json::Value::as_str),
            Some("You have been logged out")
        );
        Ok(())
    }
}
