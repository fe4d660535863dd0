//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for obtaining and revoking API tokens, plus the
//! password hashing helpers shared with the `manage` binary.

use argon2::{
    password_hash::{
        rand_core::{OsRng, RngCore},
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2,
};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use readers_core::input::ObjectFields;
use readers_core::ports::PortError;
use readers_core::validation::FieldErrors;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::web::middleware::AuthUser;
use crate::web::rest::json_body;
use crate::web::state::AppState;

/// Reported for an unknown user or a wrong password alike.
pub const BAD_CREDENTIALS: &str = "Unable to log in with provided credentials.";

/// Random bytes in a token key; the key is their hex encoding.
const TOKEN_BYTES: usize = 20;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Debug, ToSchema)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

//=========================================================================================
// Password and Token Helpers
//=========================================================================================

/// Hashes a password with Argon2 and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })
}

/// Checks a password against a stored Argon2 hash.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, ApiError> {
    let parsed_hash = PasswordHash::new(password_hash).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::Internal("Authentication error".to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Generates a new random token key (40 hex characters).
pub fn generate_token_key() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn parse_token_request(body: &serde_json::Value) -> Result<TokenRequest, FieldErrors> {
    let mut fields = ObjectFields::new(body)?;
    let username = fields.required_string("username");
    let password = fields.required_raw_string("password");
    fields.finish()?;
    match (username, password) {
        (Some(username), Some(password)) => Ok(TokenRequest { username, password }),
        _ => Err(FieldErrors::non_field(BAD_CREDENTIALS)),
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/token - Exchange a username and password for an API token
#[utoipa::path(
    post,
    path = "/api/token",
    tag = "auth",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "The caller's token", body = TokenResponse),
        (status = 400, description = "Missing fields or invalid credentials")
    )
)]
pub async fn obtain_token_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req = parse_token_request(&json_body(&body)?)?;

    let user = match state.credentials.get_user_by_username(&req.username).await {
        Ok(user) => user,
        Err(PortError::NotFound(_)) => return Err(FieldErrors::non_field(BAD_CREDENTIALS).into()),
        Err(e) => return Err(e.into()),
    };
    if !verify_password(&req.password, &user.password_hash)? {
        return Err(FieldErrors::non_field(BAD_CREDENTIALS).into());
    }

    let token = state
        .credentials
        .get_or_create_token(user.id, &generate_token_key())
        .await?;
    info!(user_id = user.id, "Issued API token");

    Ok((StatusCode::OK, Json(TokenResponse { token })))
}

/// DELETE /api/token - Revoke the caller's API token
#[utoipa::path(
    delete,
    path = "/api/token",
    tag = "auth",
    responses(
        (status = 204, description = "Token deleted"),
        (status = 401, description = "Not authenticated")
    ),
    security(("token" = []))
)]
pub async fn revoke_token_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    state.credentials.delete_tokens(user.id).await?;
    info!(user_id = user.id, "Revoked API token");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn password_hash_verifies_only_the_original_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("battery staple", &hash).unwrap());
    }

    #[test]
    fn token_keys_are_random_hex() {
        let a = generate_token_key();
        let b = generate_token_key();
        assert_eq!(a.len(), 40);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn token_request_keeps_password_verbatim() {
        let req = parse_token_request(&json!({
            "username": " admin ",
            "password": "  padded pass  "
        }))
        .unwrap();
        assert_eq!(req.username, "admin");
        assert_eq!(req.password, "  padded pass  ");
    }

    #[test]
    fn token_request_requires_both_fields() {
        let errors = parse_token_request(&json!({ "username": "admin" })).unwrap_err();
        assert_eq!(
            errors.messages_at(&["password"]),
            Some(&["This field is required.".to_string()][..])
        );
    }
}
