use actix_web::{HttpRequest, HttpResponse};
use ammonia::Builder;
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::auth::validate_token;
use crate::config::*;
use crate::core::db::is_unique_violation;
use crate::core::errors::ApiError;
use crate::core::helpers::{hash_password, json_response, new_id, now_iso, parse_body, validate_uuid};
use crate::handlers::AppState;
use crate::models::models::{User, UserView};

const USER_COLUMNS: &str = "id, name, email, password, created_at";

pub(crate) fn sanitize_text(text: &str) -> String {
    // Plain text only, all tags stripped
    Builder::default()
        .tags(std::collections::HashSet::new())
        .clean(text)
        .to_string()
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn insert_user(
    conn: &Connection,
    name: &str,
    email: &str,
    password_hash: &str,
) -> rusqlite::Result<User> {
    let user = User {
        id: new_id(),
        name: name.to_string(),
        email: email.to_string(),
        password: password_hash.to_string(),
        created_at: now_iso(),
    };
    conn.execute(
        "INSERT INTO users (id, name, email, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user.id, user.name, user.email, user.password, user.created_at],
    )?;
    Ok(user)
}

pub fn get_user(conn: &Connection, id: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
        params![id],
        row_to_user,
    )
    .optional()
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
        params![email],
        row_to_user,
    )
    .optional()
}

/// Strips markup from a display name and checks what is left.
pub(crate) fn clean_name(raw: &str) -> Result<String, ApiError> {
    let name = sanitize_text(raw.trim());
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ApiError::BadRequest("Name must be at most 255 characters".to_string()));
    }
    Ok(name.to_string())
}

pub fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

// === HTTP Handlers ===

pub fn create_user(state: &AppState, _req: &HttpRequest, body: &[u8]) -> anyhow::Result<HttpResponse> {
    let new_user = match parse_body(body) {
        Ok(v) => v,
        Err(e) => return Ok(e.into()),
    };
    let name = match clean_name(new_user["name"].as_str().unwrap_or("")) {
        Ok(n) => n,
        Err(e) => return Ok(e.into()),
    };
    let email = new_user["email"].as_str().unwrap_or("").trim();
    let password = new_user["password"].as_str().unwrap_or("");

    if !is_valid_email(email) {
        return Ok(ApiError::BadRequest("A valid email is required".to_string()).into());
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        return Ok(ApiError::BadRequest("Password must be at least 3 characters".to_string()).into());
    }

    let password_hash = hash_password(password)?;
    let conn = state.db.conn()?;
    match insert_user(&conn, &name, email, &password_hash) {
        Ok(user) => {
            info!("[Users] Created user {}", user.id);
            json_response(201, &UserView::from(&user))
        }
        Err(e) if is_unique_violation(&e) => {
            Ok(ApiError::Conflict("Email already registered".to_string()).into())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_profile(state: &AppState, req: &HttpRequest, _body: &[u8]) -> anyhow::Result<HttpResponse> {
    let conn = state.db.conn()?;
    let user_id = match validate_token(&conn, req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    match get_user(&conn, &user_id)? {
        Some(user) => json_response(200, &UserView::from(&user)),
        None => Ok(ApiError::NotFound("User not found".to_string()).into()),
    }
}

pub fn get_user_details(state: &AppState, user_id: &str) -> anyhow::Result<HttpResponse> {
    if !validate_uuid(user_id) {
        return Ok(ApiError::NotFound("User not found".to_string()).into());
    }

    let conn = state.db.conn()?;
    match get_user(&conn, user_id)? {
        Some(user) => json_response(200, &UserView::from(&user)),
        None => Ok(ApiError::NotFound("User not found".to_string()).into()),
    }
}
