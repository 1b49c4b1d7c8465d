use std::str::FromStr;

pub const MIN_PASSWORD_LENGTH: usize = 3;
pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_TITLE_LENGTH: usize = 255;
pub const MAX_POST_LENGTH: usize = 5000;
pub const POSTS_PER_PAGE: usize = 20;

/// Credential given to every account created by the bulk import.
pub const IMPORT_PLACEHOLDER_PASSWORD: &str = "password";

pub const NEW_POST_NOTIFICATION: &str = "new_post_from_favorite_user";

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

pub fn token_expiration_hours() -> i64 {
    env_or("FAVBOARD_TOKEN_EXPIRATION_HOURS", 24)
}

pub fn database_path() -> String {
    env_or("FAVBOARD_DATABASE", "favboard.db".to_string())
}

pub fn bind_address() -> String {
    env_or("FAVBOARD_BIND", "0.0.0.0:3000".to_string())
}

/// Prefix joined with a post's stored image path to build its public URL.
pub fn asset_base_url() -> String {
    env_or("FAVBOARD_ASSET_URL", "/storage".to_string())
}

pub fn seed_demo_data() -> bool {
    env_or("FAVBOARD_SEED", false)
}

/// `database` stores notifications, `log` only logs them.
pub fn notifier_kind() -> String {
    env_or("FAVBOARD_NOTIFIER", "database".to_string())
}
