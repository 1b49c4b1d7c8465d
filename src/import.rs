//! One-shot import of user accounts from a remote JSON source.

use std::future::Future;

use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::IMPORT_PLACEHOLDER_PASSWORD;
use crate::core::db::{is_unique_violation, Database};
use crate::core::helpers::hash_password;
use crate::users::{clean_name, insert_user, is_valid_email};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Limit parameter is required")]
    InvalidLimit,
    #[error("Failed to fetch data from URL: {0}")]
    Fetch(String),
    #[error("Failed to hash placeholder password: {0}")]
    Hash(String),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Where candidate user records come from.
pub trait UserSource {
    /// Fetches the raw records at `url`, in source order.
    fn fetch_users(&self, url: &str) -> impl Future<Output = Result<Vec<Value>, ImportError>> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct HttpUserSource {
    client: Client,
}

impl HttpUserSource {
    pub fn new(client: Client) -> Self {
        HttpUserSource { client }
    }
}

impl UserSource for HttpUserSource {
    fn fetch_users(&self, url: &str) -> impl Future<Output = Result<Vec<Value>, ImportError>> + Send {
        let request = self.client.get(url);
        async move {
            let response = request
                .send()
                .await
                .map_err(|e| ImportError::Fetch(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(ImportError::Fetch(format!("source answered {}", status)));
            }

            match response.json::<Value>().await {
                Ok(Value::Array(records)) => Ok(records),
                Ok(_) => Err(ImportError::Fetch("expected a JSON array".to_string())),
                Err(e) => Err(ImportError::Fetch(e.to_string())),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImportedUser {
    name: String,
    email: String,
}

#[derive(Debug, Default, PartialEq)]
pub struct ImportReport {
    pub imported: usize,
    /// Emails that already had an account.
    pub skipped: Vec<String>,
    /// Records that could not be decoded.
    pub failed: usize,
}

pub struct ImportJob<S> {
    source: S,
}

impl<S: UserSource> ImportJob<S> {
    pub fn new(source: S) -> Self {
        ImportJob { source }
    }

    pub async fn run(&self, db: &Database, url: &str, limit: Option<usize>) -> Result<ImportReport, ImportError> {
        let limit = match limit {
            Some(n) if n > 0 => n,
            _ => return Err(ImportError::InvalidLimit),
        };

        info!("[Import] Fetching users from {}", url);
        let records = self.source.fetch_users(url).await?;
        info!("[Import] {} records fetched, importing up to {}", records.len(), limit);

        let password = hash_password(IMPORT_PLACEHOLDER_PASSWORD)
            .map_err(|e| ImportError::Hash(e.to_string()))?;

        let conn = db.conn()?;
        let mut report = ImportReport::default();
        for (index, record) in records.into_iter().take(limit).enumerate() {
            let (name, candidate) = match serde_json::from_value::<ImportedUser>(record) {
                Ok(u) if is_valid_email(&u.email) => match clean_name(&u.name) {
                    Ok(name) => (name, u),
                    Err(_) => {
                        warn!("[Import] Record {} has an empty name {:?}", index, u.email);
                        report.failed += 1;
                        continue;
                    }
                },
                Ok(u) => {
                    warn!("[Import] Record {} has an invalid email {:?}", index, u.email);
                    report.failed += 1;
                    continue;
                }
                Err(e) => {
                    warn!("[Import] Record {} is malformed: {}", index, e);
                    report.failed += 1;
                    continue;
                }
            };

            match insert_user(&conn, &name, &candidate.email, &password) {
                Ok(user) => {
                    info!("[Import] Imported {} as {}", candidate.email, user.id);
                    report.imported += 1;
                }
                Err(e) if is_unique_violation(&e) => {
                    warn!("[Import] Skipping {} - already exists", candidate.email);
                    report.skipped.push(candidate.email);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::core::helpers::verify_password;
    use crate::users::find_user_by_email;

    struct FakeSource {
        response: Result<Vec<Value>, String>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn ok(records: Vec<Value>) -> Self {
            FakeSource { response: Ok(records), calls: AtomicUsize::new(0) }
        }

        fn failing(reason: &str) -> Self {
            FakeSource { response: Err(reason.to_string()), calls: AtomicUsize::new(0) }
        }
    }

    impl UserSource for FakeSource {
        fn fetch_users(&self, _url: &str) -> impl Future<Output = Result<Vec<Value>, ImportError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let response = self.response.clone().map_err(ImportError::Fetch);
            async move { response }
        }
    }

    fn user_count(db: &Database) -> i64 {
        db.conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap()
    }

    const URL: &str = "https://example.com/users";

    #[tokio::test]
    async fn imports_every_record_under_the_limit() {
        let db = Database::in_memory().unwrap();
        let job = ImportJob::new(FakeSource::ok(vec![
            json!({"name": "John Doe", "email": "john@example.com"}),
            json!({"name": "Jane Doe", "email": "jane@example.com"}),
        ]));

        let report = job.run(&db, URL, Some(10)).await.unwrap();
        assert_eq!(report.imported, 2);

        let conn = db.conn().unwrap();
        let john = find_user_by_email(&conn, "john@example.com").unwrap().unwrap();
        assert_eq!(john.name, "John Doe");
        assert!(verify_password(IMPORT_PLACEHOLDER_PASSWORD, &john.password));
        assert!(find_user_by_email(&conn, "jane@example.com").unwrap().is_some());
    }

    #[tokio::test]
    async fn limit_takes_first_records_in_source_order() {
        let db = Database::in_memory().unwrap();
        let job = ImportJob::new(FakeSource::ok(vec![
            json!({"name": "User 1", "email": "user1@example.com"}),
            json!({"name": "User 2", "email": "user2@example.com"}),
            json!({"name": "User 3", "email": "user3@example.com"}),
        ]));

        let report = job.run(&db, URL, Some(2)).await.unwrap();
        assert_eq!(report.imported, 2);

        let conn = db.conn().unwrap();
        assert!(find_user_by_email(&conn, "user1@example.com").unwrap().is_some());
        assert!(find_user_by_email(&conn, "user2@example.com").unwrap().is_some());
        assert!(find_user_by_email(&conn, "user3@example.com").unwrap().is_none());
    }

    #[tokio::test]
    async fn existing_email_is_skipped_and_left_unchanged() {
        let db = Database::in_memory().unwrap();
        let existing = {
            let conn = db.conn().unwrap();
            insert_user(&conn, "Original", "existing@example.com", "original-hash").unwrap()
        };
        let job = ImportJob::new(FakeSource::ok(vec![
            json!({"name": "Existing User", "email": "existing@example.com"}),
            json!({"name": "New User", "email": "new@example.com"}),
        ]));

        let report = job.run(&db, URL, Some(10)).await.unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped, vec!["existing@example.com".to_string()]);
        assert_eq!(user_count(&db), 2);

        let conn = db.conn().unwrap();
        assert_eq!(find_user_by_email(&conn, "existing@example.com").unwrap(), Some(existing));
        assert!(find_user_by_email(&conn, "new@example.com").unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_or_zero_limit_fails_without_fetching() {
        let db = Database::in_memory().unwrap();
        let job = ImportJob::new(FakeSource::ok(vec![json!({"name": "A", "email": "a@example.com"})]));

        assert!(matches!(job.run(&db, URL, None).await, Err(ImportError::InvalidLimit)));
        assert!(matches!(job.run(&db, URL, Some(0)).await, Err(ImportError::InvalidLimit)));
        assert_eq!(job.source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(user_count(&db), 0);
    }

    #[tokio::test]
    async fn fetch_failure_aborts_with_no_rows() {
        let db = Database::in_memory().unwrap();
        let job = ImportJob::new(FakeSource::failing("source answered 404 Not Found"));

        assert!(matches!(job.run(&db, URL, Some(5)).await, Err(ImportError::Fetch(_))));
        assert_eq!(user_count(&db), 0);
    }

    #[tokio::test]
    async fn malformed_record_does_not_abort_the_batch() {
        let db = Database::in_memory().unwrap();
        let job = ImportJob::new(FakeSource::ok(vec![
            json!({"name": "Good One", "email": "good1@example.com"}),
            json!({"name": "No Email"}),
            json!("not an object"),
            json!({"name": "Bad Email", "email": "nope"}),
            json!({"name": "<b></b>", "email": "markup@example.com"}),
            json!({"name": "Good Two", "email": "good2@example.com"}),
        ]));

        let report = job.run(&db, URL, Some(10)).await.unwrap();
        assert_eq!(report.imported, 2);
        assert_eq!(report.failed, 4);
        assert!(find_user_by_email(&db.conn().unwrap(), "markup@example.com").unwrap().is_none());
        assert_eq!(user_count(&db), 2);
    }

    /// Answers exactly one HTTP request with the given status line and body.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut read = 0;
            while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf[read..]).await.unwrap();
                if n == 0 {
                    break;
                }
                read += n;
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}/users", addr)
    }

    #[tokio::test]
    async fn http_source_reads_json_array() {
        let url = serve_once("200 OK", r#"[{"name":"John","email":"john@example.com"}]"#).await;
        let records = HttpUserSource::default().fetch_users(&url).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["email"], "john@example.com");
    }

    #[tokio::test]
    async fn http_source_rejects_error_status() {
        let url = serve_once("404 Not Found", "").await;
        let result = HttpUserSource::default().fetch_users(&url).await;
        assert!(matches!(result, Err(ImportError::Fetch(_))));
    }

    #[tokio::test]
    async fn http_source_rejects_non_array_body() {
        let url = serve_once("200 OK", r#"{"users":[]}"#).await;
        let result = HttpUserSource::default().fetch_users(&url).await;
        assert!(matches!(result, Err(ImportError::Fetch(_))));
    }
}
