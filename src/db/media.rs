//! Registry of uploaded media objects. Storage itself lives elsewhere; rows
//! only record the object key and public URL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::db::Page;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MediaFile {
    pub id: Uuid, pub key: String, pub url: String, pub content_type: String,
    pub size_bytes: i64, pub alt_text: Option<String>, pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewMedia {
    #[validate(length(min = 1, max = 1024))]
    pub key: String,
    #[validate(url)]
    pub url: String,
    #[validate(length(min = 3, max = 255))]
    pub content_type: String,
    #[validate(range(min = 0))]
    pub size_bytes: i64,
    #[validate(length(max = 500))]
    pub alt_text: Option<String>,
}

impl NewMedia {
    fn check(&self) -> AppResult<()> {
        self.validate()?;
        if self.key.starts_with('/') || self.key.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(AppError::validation("key must be a relative path without empty or '..' segments"));
        }
        if !self.content_type.contains('/') {
            return Err(AppError::validation("content_type must be a MIME type"));
        }
        Ok(())
    }
}

/// `prefix%` for LIKE with wildcards in the prefix escaped.
fn prefix_pattern(prefix: &str) -> String {
    let escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("{escaped}%")
}

pub async fn list(pool: &PgPool, prefix: Option<&str>, page: &Page) -> AppResult<(Vec<MediaFile>, i64)> {
    let pattern = prefix_pattern(prefix.unwrap_or_default());
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media_files WHERE key LIKE $1")
        .bind(&pattern).fetch_one(pool).await?;
    let items = sqlx::query_as::<_, MediaFile>("SELECT * FROM media_files WHERE key LIKE $1 ORDER BY key LIMIT $2 OFFSET $3")
        .bind(&pattern).bind(page.limit()).bind(page.offset())
        .fetch_all(pool).await?;
    Ok((items, total))
}

pub async fn register(pool: &PgPool, r: &NewMedia) -> AppResult<MediaFile> {
    r.check()?;
    let m = sqlx::query_as::<_, MediaFile>(
        "INSERT INTO media_files (id, key, url, content_type, size_bytes, alt_text) VALUES ($1, $2, $3, $4, $5, $6) RETURNING *")
        .bind(Uuid::now_v7()).bind(&r.key).bind(&r.url).bind(r.content_type.to_lowercase()).bind(r.size_bytes).bind(&r.alt_text)
        .fetch_one(pool).await?;
    tracing::info!(media_id = %m.id, key = %m.key, "media registered");
    Ok(m)
}

pub async fn delete(pool: &PgPool, id: Uuid) -> AppResult<()> {
    let done = sqlx::query("DELETE FROM media_files WHERE id = $1").bind(id).execute(pool).await?;
    if done.rows_affected() == 0 { return Err(AppError::not_found("Media file")); }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(key: &str) -> NewMedia {
        NewMedia {
            key: key.into(), url: format!("https://cdn.example.com/{key}"), content_type: "image/webp".into(),
            size_bytes: 2048, alt_text: None,
        }
    }

    #[test]
    fn test_key_rules() {
        assert!(media("products/foot-1/main.webp").check().is_ok());
        assert!(media("/products/main.webp").check().is_err());
        assert!(media("products/../secrets").check().is_err());
        assert!(media("products//main.webp").check().is_err());
    }

    #[test]
    fn test_prefix_pattern() {
        assert_eq!(prefix_pattern("products/"), "products/%");
        assert_eq!(prefix_pattern("a_b"), "a\\_b%");
        assert_eq!(prefix_pattern(""), "%");
    }
}
