pub mod auth;
pub mod config;
pub mod favorites;
pub mod handlers;
pub mod import;
pub mod notifications;
pub mod posts;
pub mod users;

pub mod core {
    pub mod db;
    pub mod errors;
    pub mod helpers;
    pub mod query_params;
}

pub mod models {
    #[allow(clippy::module_inception)]
    pub mod models;
}

pub use handlers::{handle_all, AppState};
