use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::config::asset_base_url;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub image_path: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct TokenData {
    pub user_id: String,
    pub created_at: String,
}

/// Discriminator stored in `favorites.favoritable_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FavoritableType {
    Post,
    User,
}

impl FavoritableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FavoritableType::Post => "post",
            FavoritableType::User => "user",
        }
    }
}

impl fmt::Display for FavoritableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown favoritable type: {0}")]
pub struct UnknownFavoritableType(pub String);

impl FromStr for FavoritableType {
    type Err = UnknownFavoritableType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(FavoritableType::Post),
            "user" => Ok(FavoritableType::User),
            other => Err(UnknownFavoritableType(other.to_string())),
        }
    }
}

impl ToSql for FavoritableType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for FavoritableType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// What a favorite points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FavoriteTarget {
    Post(String),
    User(String),
}

impl FavoriteTarget {
    pub fn from_parts(kind: FavoritableType, id: String) -> Self {
        match kind {
            FavoritableType::Post => FavoriteTarget::Post(id),
            FavoritableType::User => FavoriteTarget::User(id),
        }
    }

    pub fn kind(&self) -> FavoritableType {
        match self {
            FavoriteTarget::Post(_) => FavoritableType::Post,
            FavoriteTarget::User(_) => FavoritableType::User,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            FavoriteTarget::Post(id) | FavoriteTarget::User(id) => id,
        }
    }
}

impl fmt::Display for FavoriteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Favorite {
    pub id: String,
    pub user_id: String,
    pub target: FavoriteTarget,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub post_id: String,
    pub author_id: String,
    pub title: String,
    pub created_at: String,
    pub read_at: Option<String>,
}

// === Response views ===

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        UserView {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PostView {
    pub id: String,
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserView>,
}

impl PostView {
    pub fn new(post: &Post, author: Option<&User>) -> Self {
        PostView {
            id: post.id.clone(),
            title: post.title.clone(),
            body: post.body.clone(),
            image_url: post.image_path.as_deref().map(image_url),
            created_at: post.created_at.clone(),
            updated_at: post.updated_at.clone(),
            user: author.map(UserView::from),
        }
    }
}

fn image_url(path: &str) -> String {
    format!(
        "{}/{}",
        asset_base_url().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[derive(Debug, Serialize, Clone, PartialEq, Default)]
pub struct FavoritesView {
    pub posts: Vec<PostView>,
    pub users: Vec<UserView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn favoritable_type_rejects_unknown_discriminator() {
        assert_eq!("post".parse::<FavoritableType>().unwrap(), FavoritableType::Post);
        assert_eq!("user".parse::<FavoritableType>().unwrap(), FavoritableType::User);
        assert!("App\\Models\\Post".parse::<FavoritableType>().is_err());
        assert!("Post".parse::<FavoritableType>().is_err());
    }

    #[test]
    fn target_keeps_kind_and_id() {
        let target = FavoriteTarget::from_parts(FavoritableType::User, "abc".to_string());
        assert_eq!(target, FavoriteTarget::User("abc".to_string()));
        assert_eq!(target.kind(), FavoritableType::User);
        assert_eq!(target.id(), "abc");
    }

    #[test]
    fn user_serialization_hides_password_hash() {
        let user = User {
            id: "1".to_string(),
            name: "Ann".to_string(),
            email: "ann@example.com".to_string(),
            password: "$argon2id$secret".to_string(),
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["email"], "ann@example.com");
    }
}
