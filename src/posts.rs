use std::sync::OnceLock;

use actix_web::{HttpRequest, HttpResponse};
use ammonia::Builder;
use html_escape::encode_double_quoted_attribute;
use log::{info, warn};
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::auth::validate_token;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, new_id, now_iso, parse_body, validate_uuid};
use crate::core::query_params::{get_int, get_string, parse_query_params};
use crate::handlers::AppState;
use crate::models::models::{Post, PostView, User};
use crate::notifications::NotificationDispatcher;
use crate::users::{get_user, sanitize_text};

const POST_WITH_AUTHOR: &str = "SELECT p.id, p.user_id, p.title, p.body, p.image_path, p.created_at, p.updated_at,
        u.id, u.name, u.email, u.password, u.created_at
 FROM posts p JOIN users u ON u.id = p.user_id";

/// Validated input for creating or editing a post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub body: String,
    pub image_path: Option<String>,
}

fn row_to_post(row: &Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        image_path: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn row_to_post_with_author(row: &Row) -> rusqlite::Result<(Post, User)> {
    let post = row_to_post(row)?;
    let author = User {
        id: row.get(7)?,
        name: row.get(8)?,
        email: row.get(9)?,
        password: row.get(10)?,
        created_at: row.get(11)?,
    };
    Ok((post, author))
}

pub fn insert_post(conn: &Connection, user_id: &str, new_post: &NewPost) -> rusqlite::Result<Post> {
    let post = Post {
        id: new_id(),
        user_id: user_id.to_string(),
        title: new_post.title.clone(),
        body: new_post.body.clone(),
        image_path: new_post.image_path.clone(),
        created_at: now_iso(),
        updated_at: None,
    };
    conn.execute(
        "INSERT INTO posts (id, user_id, title, body, image_path, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![post.id, post.user_id, post.title, post.body, post.image_path, post.created_at],
    )?;
    Ok(post)
}

pub fn get_post(conn: &Connection, id: &str) -> rusqlite::Result<Option<Post>> {
    conn.query_row(
        "SELECT id, user_id, title, body, image_path, created_at, updated_at FROM posts WHERE id = ?1",
        params![id],
        row_to_post,
    )
    .optional()
}

/// Posts with their authors, in the order of `ids`. Missing ids are skipped.
pub fn get_posts_with_authors(conn: &Connection, ids: &[String]) -> rusqlite::Result<Vec<(Post, User)>> {
    let mut stmt = conn.prepare(&format!("{} WHERE p.id = ?1", POST_WITH_AUTHOR))?;
    let mut posts = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(pair) = stmt.query_row(params![id], row_to_post_with_author).optional()? {
            posts.push(pair);
        }
    }
    Ok(posts)
}

/// One page of posts, newest first, optionally restricted to one author.
pub fn list_page(
    conn: &Connection,
    author_id: Option<&str>,
    page: usize,
) -> rusqlite::Result<Vec<(Post, User)>> {
    let offset = (page.max(1) - 1) * POSTS_PER_PAGE;
    let mut stmt = conn.prepare(&format!(
        "{} WHERE (?1 IS NULL OR p.user_id = ?1)
         ORDER BY p.created_at DESC, p.rowid DESC LIMIT ?2 OFFSET ?3",
        POST_WITH_AUTHOR
    ))?;
    let rows = stmt.query_map(
        params![author_id, POSTS_PER_PAGE as i64, offset as i64],
        row_to_post_with_author,
    )?;
    rows.collect()
}

pub fn update_post(conn: &Connection, post: &Post) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE posts SET title = ?2, body = ?3, image_path = ?4, updated_at = ?5 WHERE id = ?1",
        params![post.id, post.title, post.body, post.image_path, post.updated_at],
    )?;
    Ok(())
}

/// Writes the post, then fans out notifications to the author's followers.
pub fn create_post(
    conn: &Connection,
    dispatcher: &NotificationDispatcher,
    author_id: &str,
    new_post: &NewPost,
) -> rusqlite::Result<Post> {
    let post = insert_post(conn, author_id, new_post)?;
    info!("[Posts] {} created post {}", author_id, post.id);

    // The post is already stored; a failed fan-out does not undo it
    if let Err(e) = dispatcher.on_post_created(conn, &post) {
        warn!("[Posts] Notification fan-out for {} failed: {}", post.id, e);
    }
    Ok(post)
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"https?://[^\s<]+").expect("Regex should compile")
    })
}

fn filter_post_content(content: &str) -> String {
    // Drop scripts, event handlers and existing links
    let clean = Builder::default()
        .rm_tags(&["a"])
        .clean(content)
        .to_string();

    url_regex().replace_all(&clean, |caps: &regex::Captures| {
        let url = &caps[0];
        let escaped_url = encode_double_quoted_attribute(url);
        format!(r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#, escaped_url, url)
    }).to_string()
}

fn parse_post_input(body: &[u8]) -> Result<NewPost, ApiError> {
    let value = parse_body(body)?;
    let title = sanitize_text(value["title"].as_str().unwrap_or_default().trim());
    let title = title.trim();
    let content = value["body"].as_str().unwrap_or_default().trim();
    let image_path = value["image_path"].as_str().map(str::trim).filter(|p| !p.is_empty());

    if title.is_empty() || title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ApiError::BadRequest("Invalid title".to_string()));
    }
    // Length is bounded on what the author typed, emptiness on what survives filtering
    let filtered = filter_post_content(content);
    if filtered.trim().is_empty() || content.chars().count() > MAX_POST_LENGTH {
        return Err(ApiError::BadRequest("Invalid content".to_string()));
    }
    if let Some(path) = image_path {
        if path.contains("..") || path.contains("://") {
            return Err(ApiError::BadRequest("Invalid image path".to_string()));
        }
    }

    Ok(NewPost {
        title: title.to_string(),
        body: filtered.trim().to_string(),
        image_path: image_path.map(str::to_string),
    })
}

fn post_response(status: u16, post: &Post, author: Option<&User>) -> anyhow::Result<HttpResponse> {
    json_response(status, &serde_json::json!({ "data": PostView::new(post, author) }))
}

// === HTTP Handlers ===

pub fn list_posts(state: &AppState, req: &HttpRequest, _body: &[u8]) -> anyhow::Result<HttpResponse> {
    let params = parse_query_params(req.query_string());
    let author = get_string(&params, "user");
    let page = get_int(&params, "page", 1);

    let conn = state.db.conn()?;
    let posts: Vec<PostView> = list_page(&conn, author.as_deref(), page)?
        .iter()
        .map(|(post, author)| PostView::new(post, Some(author)))
        .collect();

    json_response(200, &serde_json::json!({ "data": posts }))
}

pub fn create_post_handler(state: &AppState, req: &HttpRequest, body: &[u8]) -> anyhow::Result<HttpResponse> {
    let conn = state.db.conn()?;
    let user_id = match validate_token(&conn, req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let new_post = match parse_post_input(body) {
        Ok(p) => p,
        Err(e) => return Ok(e.into()),
    };

    let post = create_post(&conn, &state.dispatcher, &user_id, &new_post)?;
    let author = get_user(&conn, &user_id)?;
    post_response(201, &post, author.as_ref())
}

pub fn show_post(state: &AppState, post_id: &str) -> anyhow::Result<HttpResponse> {
    if !validate_uuid(post_id) {
        return Ok(ApiError::NotFound("Post not found".to_string()).into());
    }

    let conn = state.db.conn()?;
    match get_posts_with_authors(&conn, &[post_id.to_string()])?.first() {
        Some((post, author)) => post_response(200, post, Some(author)),
        None => Ok(ApiError::NotFound("Post not found".to_string()).into()),
    }
}

pub fn edit_post(state: &AppState, req: &HttpRequest, post_id: &str, body: &[u8]) -> anyhow::Result<HttpResponse> {
    let conn = state.db.conn()?;
    let user_id = match validate_token(&conn, req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    if !validate_uuid(post_id) {
        return Ok(ApiError::NotFound("Post not found".to_string()).into());
    }

    // Check if post exists and belongs to user
    let mut post = match get_post(&conn, post_id)? {
        Some(p) => p,
        None => return Ok(ApiError::NotFound("Post not found".to_string()).into()),
    };
    if post.user_id != user_id {
        return Ok(ApiError::Forbidden.into());
    }

    let input = match parse_post_input(body) {
        Ok(p) => p,
        Err(e) => return Ok(e.into()),
    };

    let author = get_user(&conn, &user_id)?;

    // Skip update if nothing changed
    if post.title == input.title && post.body == input.body && post.image_path == input.image_path {
        return post_response(200, &post, author.as_ref());
    }

    post.title = input.title;
    post.body = input.body;
    post.image_path = input.image_path;
    post.updated_at = Some(now_iso());
    update_post(&conn, &post)?;

    post_response(200, &post, author.as_ref())
}

pub fn delete_post(state: &AppState, req: &HttpRequest, post_id: &str) -> anyhow::Result<HttpResponse> {
    let conn = state.db.conn()?;
    let user_id = match validate_token(&conn, req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    if !validate_uuid(post_id) {
        return Ok(ApiError::NotFound("Post not found".to_string()).into());
    }

    match get_post(&conn, post_id)? {
        Some(p) if p.user_id != user_id => Ok(ApiError::Forbidden.into()),
        Some(_) => {
            conn.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
            info!("[Posts] {} deleted post {}", user_id, post_id);
            Ok(HttpResponse::NoContent().finish())
        }
        None => Ok(ApiError::NotFound("Post not found".to_string()).into()),
    }
}
