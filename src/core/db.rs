use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use log::info;
use rusqlite::Connection;

use crate::core::helpers::hash_password;
use crate::favorites;
use crate::models::models::FavoriteTarget;
use crate::posts::{self, NewPost};
use crate::users;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tokens (
    token TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS posts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    image_path TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT
);
CREATE INDEX IF NOT EXISTS posts_user_id ON posts(user_id);

CREATE TABLE IF NOT EXISTS favorites (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    favoritable_id TEXT NOT NULL,
    favoritable_type TEXT NOT NULL CHECK (favoritable_type IN ('post', 'user')),
    created_at TEXT NOT NULL,
    UNIQUE (user_id, favoritable_id, favoritable_type),
    CHECK (NOT (favoritable_type = 'user' AND favoritable_id = user_id))
);
CREATE INDEX IF NOT EXISTS favorites_target ON favorites(favoritable_type, favoritable_id);

CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    post_id TEXT NOT NULL,
    author_id TEXT NOT NULL,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL,
    read_at TEXT,
    UNIQUE (user_id, post_id, kind)
);
"#;

/// Shared SQLite handle. Cloning shares the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        info!("[Db] Opening database {}", path.display());
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }
}

/// True when `err` is a UNIQUE constraint violation.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Seeds three demo accounts with a few posts, "test" following "bob".
/// Does nothing once the accounts exist.
pub fn init_test_data(conn: &Connection) -> anyhow::Result<()> {
    let demo = [
        ("test", "test@example.com", "This is my first post!"),
        ("alice", "alice@example.com", "Welcome to my board! Excited to share thoughts here."),
        ("bob", "bob@example.com", "Hey everyone! Looking forward to connecting with you all."),
    ];

    let mut seeded = Vec::new();
    for (name, email, first_post) in demo {
        let user = match users::find_user_by_email(conn, email)? {
            Some(existing) => existing,
            None => {
                let user = users::insert_user(conn, name, email, &hash_password(name)?)?;
                posts::insert_post(
                    conn,
                    &user.id,
                    &NewPost {
                        title: format!("Hello from {}", name),
                        body: first_post.to_string(),
                        image_path: None,
                    },
                )?;
                info!("[Db] Seeded demo user {}", name);
                user
            }
        };
        seeded.push(user);
    }

    let test = &seeded[0];
    let bob = &seeded[2];
    let target = FavoriteTarget::User(bob.id.clone());
    if favorites::find_favorite(conn, &test.id, &target)?.is_none() {
        favorites::insert_favorite(conn, &test.id, &target)?;
    }

    Ok(())
}
