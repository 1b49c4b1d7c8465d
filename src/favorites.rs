//! Polymorphic favorites: a user favorites either a post or another user.
//!
//! Rows are stored flat as `(favoritable_type, favoritable_id)`; everything
//! above the store functions works with [`FavoriteTarget`].

use actix_web::{HttpRequest, HttpResponse};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::auth::validate_token;
use crate::core::db::is_unique_violation;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, message, new_id, now_iso, validate_uuid};
use crate::handlers::AppState;
use crate::models::models::{
    FavoritableType, Favorite, FavoriteTarget, FavoritesView, PostView, User, UserView,
};
use crate::posts::{get_post, get_posts_with_authors};
use crate::users::get_user;

#[derive(Debug, thiserror::Error)]
pub enum FavoriteError {
    #[error("a user cannot favorite themselves")]
    InvalidOperation,
    #[error("{0} is already favorited")]
    Conflict(FavoriteTarget),
    #[error("{0} is not favorited")]
    NotFound(FavoriteTarget),
    #[error("{0} does not exist")]
    TargetNotFound(FavoriteTarget),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

// === Store ===

fn row_to_favorite(row: &Row) -> rusqlite::Result<Favorite> {
    let kind: FavoritableType = row.get(3)?;
    Ok(Favorite {
        id: row.get(0)?,
        user_id: row.get(1)?,
        target: FavoriteTarget::from_parts(kind, row.get(2)?),
        created_at: row.get(4)?,
    })
}

pub fn insert_favorite(
    conn: &Connection,
    user_id: &str,
    target: &FavoriteTarget,
) -> rusqlite::Result<Favorite> {
    let favorite = Favorite {
        id: new_id(),
        user_id: user_id.to_string(),
        target: target.clone(),
        created_at: now_iso(),
    };
    conn.execute(
        "INSERT INTO favorites (id, user_id, favoritable_id, favoritable_type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            favorite.id,
            favorite.user_id,
            target.id(),
            target.kind(),
            favorite.created_at
        ],
    )?;
    Ok(favorite)
}

pub fn find_favorite(
    conn: &Connection,
    user_id: &str,
    target: &FavoriteTarget,
) -> rusqlite::Result<Option<Favorite>> {
    conn.query_row(
        "SELECT id, user_id, favoritable_id, favoritable_type, created_at FROM favorites
         WHERE user_id = ?1 AND favoritable_id = ?2 AND favoritable_type = ?3",
        params![user_id, target.id(), target.kind()],
        row_to_favorite,
    )
    .optional()
}

/// Deletes the matching favorite, returning how many rows went away.
pub fn delete_favorite(
    conn: &Connection,
    user_id: &str,
    target: &FavoriteTarget,
) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM favorites
         WHERE user_id = ?1 AND favoritable_id = ?2 AND favoritable_type = ?3",
        params![user_id, target.id(), target.kind()],
    )
}

pub fn favorites_of(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<Favorite>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, favoritable_id, favoritable_type, created_at FROM favorites
         WHERE user_id = ?1 ORDER BY created_at, rowid",
    )?;
    let rows = stmt.query_map(params![user_id], row_to_favorite)?;
    rows.collect()
}

/// Distinct users holding a favorite on `author_id`, the author excluded.
pub fn followers_of(conn: &Connection, author_id: &str) -> rusqlite::Result<Vec<User>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT u.id, u.name, u.email, u.password, u.created_at
         FROM favorites f JOIN users u ON u.id = f.user_id
         WHERE f.favoritable_type = ?1 AND f.favoritable_id = ?2 AND f.user_id <> ?2
         ORDER BY u.created_at, u.id",
    )?;
    let rows = stmt.query_map(params![FavoritableType::User, author_id], |row| {
        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            password: row.get(3)?,
            created_at: row.get(4)?,
        })
    })?;
    rows.collect()
}

// === Service ===

pub fn list_favorites(conn: &Connection, user_id: &str) -> Result<FavoritesView, FavoriteError> {
    let mut post_ids = Vec::new();
    let mut user_ids = Vec::new();
    for favorite in favorites_of(conn, user_id)? {
        match favorite.target {
            FavoriteTarget::Post(id) => post_ids.push(id),
            FavoriteTarget::User(id) => user_ids.push(id),
        }
    }

    // Targets deleted since favoriting are skipped
    let posts = get_posts_with_authors(conn, &post_ids)?
        .iter()
        .map(|(post, author)| PostView::new(post, Some(author)))
        .collect();

    let mut users = Vec::with_capacity(user_ids.len());
    for id in &user_ids {
        if let Some(user) = get_user(conn, id)? {
            users.push(UserView::from(&user));
        }
    }

    Ok(FavoritesView { posts, users })
}

fn create(conn: &Connection, user_id: &str, target: FavoriteTarget) -> Result<Favorite, FavoriteError> {
    match insert_favorite(conn, user_id, &target) {
        Ok(favorite) => {
            info!("[Favorites] {} favorited {}", user_id, target);
            Ok(favorite)
        }
        Err(e) if is_unique_violation(&e) => {
            debug!("[Favorites] {} already favorited {}", user_id, target);
            Err(FavoriteError::Conflict(target))
        }
        Err(e) => Err(e.into()),
    }
}

fn remove(conn: &Connection, user_id: &str, target: FavoriteTarget) -> Result<(), FavoriteError> {
    match delete_favorite(conn, user_id, &target)? {
        0 => Err(FavoriteError::NotFound(target)),
        _ => {
            info!("[Favorites] {} unfavorited {}", user_id, target);
            Ok(())
        }
    }
}

pub fn favorite_post(conn: &Connection, user_id: &str, post_id: &str) -> Result<Favorite, FavoriteError> {
    let target = FavoriteTarget::Post(post_id.to_string());
    if get_post(conn, post_id)?.is_none() {
        return Err(FavoriteError::TargetNotFound(target));
    }
    create(conn, user_id, target)
}

pub fn unfavorite_post(conn: &Connection, user_id: &str, post_id: &str) -> Result<(), FavoriteError> {
    remove(conn, user_id, FavoriteTarget::Post(post_id.to_string()))
}

pub fn favorite_user(conn: &Connection, user_id: &str, target_id: &str) -> Result<Favorite, FavoriteError> {
    if user_id == target_id {
        return Err(FavoriteError::InvalidOperation);
    }
    let target = FavoriteTarget::User(target_id.to_string());
    if get_user(conn, target_id)?.is_none() {
        return Err(FavoriteError::TargetNotFound(target));
    }
    create(conn, user_id, target)
}

pub fn unfavorite_user(conn: &Connection, user_id: &str, target_id: &str) -> Result<(), FavoriteError> {
    remove(conn, user_id, FavoriteTarget::User(target_id.to_string()))
}

// === HTTP Handlers ===

fn into_response(err: FavoriteError) -> anyhow::Result<HttpResponse> {
    let api = match err {
        FavoriteError::InvalidOperation => {
            ApiError::Unprocessable("You cannot favorite yourself".to_string())
        }
        FavoriteError::Conflict(_) => ApiError::Unprocessable("Already favorited".to_string()),
        FavoriteError::NotFound(FavoriteTarget::User(_)) => {
            return message(404, "User was not in favorites");
        }
        FavoriteError::NotFound(FavoriteTarget::Post(_)) => {
            ApiError::NotFound("Post was not in favorites".to_string())
        }
        FavoriteError::TargetNotFound(FavoriteTarget::Post(_)) => {
            ApiError::NotFound("Post not found".to_string())
        }
        FavoriteError::TargetNotFound(FavoriteTarget::User(_)) => {
            ApiError::NotFound("User not found".to_string())
        }
        FavoriteError::Database(e) => return Err(e.into()),
    };
    Ok(api.into())
}

pub fn handle_list(state: &AppState, req: &HttpRequest, _body: &[u8]) -> anyhow::Result<HttpResponse> {
    let conn = state.db.conn()?;
    let user_id = match validate_token(&conn, req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    match list_favorites(&conn, &user_id) {
        Ok(view) => json_response(200, &serde_json::json!({ "data": view })),
        Err(e) => into_response(e),
    }
}

pub fn handle_favorite_post(state: &AppState, req: &HttpRequest, post_id: &str) -> anyhow::Result<HttpResponse> {
    let conn = state.db.conn()?;
    let user_id = match validate_token(&conn, req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };
    if !validate_uuid(post_id) {
        return Ok(ApiError::NotFound("Post not found".to_string()).into());
    }

    match favorite_post(&conn, &user_id, post_id) {
        Ok(_) => Ok(HttpResponse::Created().finish()),
        Err(e) => into_response(e),
    }
}

pub fn handle_unfavorite_post(state: &AppState, req: &HttpRequest, post_id: &str) -> anyhow::Result<HttpResponse> {
    let conn = state.db.conn()?;
    let user_id = match validate_token(&conn, req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    match unfavorite_post(&conn, &user_id, post_id) {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => into_response(e),
    }
}

pub fn handle_favorite_user(state: &AppState, req: &HttpRequest, target_id: &str) -> anyhow::Result<HttpResponse> {
    let conn = state.db.conn()?;
    let user_id = match validate_token(&conn, req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };
    if !validate_uuid(target_id) {
        return Ok(ApiError::NotFound("User not found".to_string()).into());
    }

    match favorite_user(&conn, &user_id, target_id) {
        Ok(_) => message(200, "User favorited successfully"),
        Err(e) => into_response(e),
    }
}

pub fn handle_unfavorite_user(state: &AppState, req: &HttpRequest, target_id: &str) -> anyhow::Result<HttpResponse> {
    let conn = state.db.conn()?;
    let user_id = match validate_token(&conn, req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    match unfavorite_user(&conn, &user_id, target_id) {
        Ok(()) => message(200, "User removed from favorites"),
        Err(e) => into_response(e),
    }
}
