use actix_web::HttpResponse;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use serde::Serialize;
use uuid::Uuid;

use crate::core::errors::ApiError;

/// RFC 3339 with fixed microsecond width, so stored timestamps sort as text.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn json_response<T: Serialize>(status: u16, body: &T) -> anyhow::Result<HttpResponse> {
    let status = actix_web::http::StatusCode::from_u16(status)?;
    Ok(HttpResponse::build(status)
        .content_type("application/json")
        .body(serde_json::to_vec(body)?))
}

pub fn message(status: u16, msg: &str) -> anyhow::Result<HttpResponse> {
    json_response(status, &serde_json::json!({ "message": msg }))
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::PasswordHash;

    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn validate_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

/// Parses a JSON request body, treating an empty body as `{}`.
pub fn parse_body(body: &[u8]) -> Result<serde_json::Value, ApiError> {
    if body.is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_slice(body).map_err(|_| ApiError::BadRequest("Invalid JSON".to_string()))
}
