//! Postgres repositories. Every function takes the pool (or an open
//! transaction) explicitly; multi-statement writes run in one transaction.

pub mod analytics;
pub mod catalog;
pub mod characteristics;
pub mod inventory;
pub mod locations;
pub mod media;
pub mod movements;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Page {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl Page {
    pub fn number(&self) -> u32 { self.page.unwrap_or(1).max(1) }
    pub fn size(&self) -> u32 { self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE) }
    pub fn limit(&self) -> i64 { i64::from(self.size()) }
    pub fn offset(&self) -> i64 { i64::from(self.number() - 1) * i64::from(self.size()) }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, page: &Page) -> Self {
        Self { items, total, page: page.number(), per_page: page.size() }
    }
}

/// `%term%` for ILIKE with the LIKE wildcards in `term` escaped.
pub fn like_pattern(term: &str) -> String {
    let escaped = term.trim().replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

/// Maps a foreign key violation raised by a DELETE to a Conflict.
pub fn referenced(message: impl Into<String>) -> impl FnOnce(sqlx::Error) -> AppError {
    let message = message.into();
    move |e| match e {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => AppError::Conflict(message),
        e => e.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        let p = Page { page: Some(0), per_page: Some(500) };
        assert_eq!((p.number(), p.size(), p.offset()), (1, 100, 0));
        let p = Page { page: Some(3), per_page: None };
        assert_eq!((p.limit(), p.offset()), (20, 40));
    }

    #[test]
    fn test_like_pattern_escapes() {
        assert_eq!(like_pattern(" 50%_off "), "%50\\%\\_off%");
    }
}
