use actix_web::{web, HttpRequest, HttpResponse};
use log::error;

use crate::core::db::Database;
use crate::notifications::NotificationDispatcher;
use crate::{auth, favorites, notifications, posts, users};

/// Shared state handed to every handler.
pub struct AppState {
    pub db: Database,
    pub dispatcher: NotificationDispatcher,
}

impl AppState {
    pub fn new(db: Database, dispatcher: NotificationDispatcher) -> Self {
        AppState { db, dispatcher }
    }
}

/// Single entry point: dispatches on method and path segments.
pub async fn handle_all(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let path = req.path().to_string();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let state = state.get_ref();

    let result = match (req.method().as_str(), segments.as_slice()) {
        ("POST", ["users"]) => users::create_user(state, &req, &body),
        ("POST", ["login"]) => auth::login_user(state, &req, &body),
        ("POST", ["logout"]) => auth::logout_user(state, &req, &body),
        ("GET", ["profile"]) => users::get_profile(state, &req, &body),
        ("GET", ["users", id]) => users::get_user_details(state, id),
        ("POST", ["users", id, "favorite"]) => favorites::handle_favorite_user(state, &req, id),
        ("DELETE", ["users", id, "favorite"]) => favorites::handle_unfavorite_user(state, &req, id),
        ("GET", ["posts"]) => posts::list_posts(state, &req, &body),
        ("POST", ["posts"]) => posts::create_post_handler(state, &req, &body),
        ("GET", ["posts", id]) => posts::show_post(state, id),
        ("PUT", ["posts", id]) => posts::edit_post(state, &req, id, &body),
        ("DELETE", ["posts", id]) => posts::delete_post(state, &req, id),
        ("POST", ["posts", id, "favorites"]) => favorites::handle_favorite_post(state, &req, id),
        ("DELETE", ["posts", id, "favorites"]) => favorites::handle_unfavorite_post(state, &req, id),
        ("GET", ["favorites"]) => favorites::handle_list(state, &req, &body),
        ("GET", ["notifications"]) => notifications::handle_list(state, &req, &body),
        _ => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({"error": "No route found"}))
        }
    };

    match result {
        Ok(resp) => resp,
        Err(e) => {
            error!("[Server] {} {} failed: {:#}", req.method(), path, e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "Internal server error"}))
        }
    }
}
