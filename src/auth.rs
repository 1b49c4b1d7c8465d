use actix_web::{HttpRequest, HttpResponse};
use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::config::token_expiration_hours;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, now_iso, parse_body, verify_password};
use crate::handlers::AppState;
use crate::models::models::TokenData;
use crate::users::{find_user_by_email, get_user};

pub fn issue_token(conn: &Connection, user_id: &str) -> rusqlite::Result<String> {
    let token = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO tokens (token, user_id, created_at) VALUES (?1, ?2, ?3)",
        params![token, user_id, now_iso()],
    )?;
    Ok(token)
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

pub fn login_user(state: &AppState, _req: &HttpRequest, body: &[u8]) -> anyhow::Result<HttpResponse> {
    let creds = match parse_body(body) {
        Ok(v) => v,
        Err(e) => return Ok(e.into()),
    };
    let email = creds["email"].as_str().unwrap_or_default();
    let password = creds["password"].as_str().unwrap_or_default();

    let conn = state.db.conn()?;
    let user = match find_user_by_email(&conn, email)? {
        Some(u) if verify_password(password, &u.password) => u,
        _ => return Ok(ApiError::Unauthorized.into()),
    };

    let token = issue_token(&conn, &user.id)?;
    info!("[Auth] User {} logged in", user.id);
    json_response(200, &serde_json::json!({
        "token": token,
        "user_id": user.id
    }))
}

pub fn logout_user(state: &AppState, req: &HttpRequest, _body: &[u8]) -> anyhow::Result<HttpResponse> {
    let token = match bearer_token(req) {
        Some(t) => t,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let conn = state.db.conn()?;
    let deleted = conn.execute("DELETE FROM tokens WHERE token = ?1", params![token])?;
    if deleted == 0 {
        return Ok(ApiError::Unauthorized.into());
    }

    json_response(200, &serde_json::json!({
        "message": "Logged out successfully"
    }))
}

/// Resolves the bearer token on `req` to the acting user's id.
pub fn validate_token(conn: &Connection, req: &HttpRequest) -> Option<String> {
    let token = bearer_token(req)?;
    let data = conn
        .query_row(
            "SELECT user_id, created_at FROM tokens WHERE token = ?1",
            params![token],
            |row| {
                Ok(TokenData {
                    user_id: row.get(0)?,
                    created_at: row.get(1)?,
                })
            },
        )
        .optional()
        .ok()??;

    // Check if token is expired
    if let Ok(created) = chrono::DateTime::parse_from_rfc3339(&data.created_at) {
        let now = chrono::Utc::now();
        let age_hours = (now - created.with_timezone(&chrono::Utc)).num_hours();
        if age_hours > token_expiration_hours() {
            return None;
        }
    }
    // Check if user still exists
    get_user(conn, &data.user_id).ok()??;
    Some(data.user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::Database;
    use crate::users::insert_user;
    use actix_web::test::TestRequest;

    #[test]
    fn token_resolves_to_user() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();
        let user = insert_user(&conn, "Ann", "ann@example.com", "hash").unwrap();
        let token = issue_token(&conn, &user.id).unwrap();

        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_http_request();
        assert_eq!(validate_token(&conn, &req), Some(user.id));

        let anonymous = TestRequest::default().to_http_request();
        assert_eq!(validate_token(&conn, &anonymous), None);

        let bogus = TestRequest::default()
            .insert_header(("Authorization", "Bearer nope"))
            .to_http_request();
        assert_eq!(validate_token(&conn, &bogus), None);
    }

    #[test]
    fn expired_token_is_rejected() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();
        let user = insert_user(&conn, "Ann", "ann@example.com", "hash").unwrap();
        let old = (chrono::Utc::now() - chrono::Duration::hours(48)).to_rfc3339();
        conn.execute(
            "INSERT INTO tokens (token, user_id, created_at) VALUES ('stale', ?1, ?2)",
            params![user.id, old],
        )
        .unwrap();

        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer stale"))
            .to_http_request();
        assert_eq!(validate_token(&conn, &req), None);
    }
}
