//! Error type shared by repositories and handlers

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use thiserror::Error;

use crate::domain::catalog::CatalogError;
use crate::domain::inventory::InventoryError;
use crate::domain::value_objects::{SkuError, SlugError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { available: i32, requested: i32 },

    #[error("{0}")]
    Busy(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) | Self::InsufficientStock { .. } => StatusCode::CONFLICT,
            Self::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => Self::NotFound("Record".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                let constraint = db.constraint().unwrap_or("unique constraint");
                Self::Conflict(format!("Duplicate value violates {constraint}"))
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                Self::Validation(format!("Referenced record does not exist or is still in use ({})", db.constraint().unwrap_or("foreign key")))
            }
            sqlx::Error::Database(db) if db.is_check_violation() => {
                Self::Validation(format!("Value rejected by {}", db.constraint().unwrap_or("check constraint")))
            }
            _ => Self::Database(e),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::Validation(e.to_string().replace('\n', "; "))
    }
}

impl From<InventoryError> for AppError {
    fn from(e: InventoryError) -> Self {
        match e {
            InventoryError::InsufficientStock { available, requested } => Self::InsufficientStock { available, requested },
            InventoryError::VersionMismatch { .. } | InventoryError::StillReserved(_) => Self::Conflict(e.to_string()),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::CategoryCycle => Self::Conflict(e.to_string()),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<SkuError> for AppError {
    fn from(e: SkuError) -> Self { Self::Validation(e.to_string()) }
}

impl From<SlugError> for AppError {
    fn from(e: SlugError) -> Self { Self::Validation(e.to_string()) }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self { Self::Internal(e.to_string()) }
}

// Extractor rejections keep the error envelope instead of axum's plain text.
impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self { Self::Validation(e.body_text()) }
}

impl From<QueryRejection> for AppError {
    fn from(e: QueryRejection) -> Self { Self::Validation(e.body_text()) }
}

impl From<PathRejection> for AppError {
    fn from(e: PathRejection) -> Self { Self::Validation(e.body_text()) }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let message = match &self {
            // Driver errors stay in the logs.
            Self::Database(_) => "Database error".to_string(),
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "success": false, "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::not_found("Product").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::validation("bad").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InsufficientStock { available: 1, requested: 2 }.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::Busy("later".into()).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(AppError::from(sqlx::Error::RowNotFound).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_inventory_error_conversion() {
        let e: AppError = InventoryError::InsufficientStock { available: 3, requested: 5 }.into();
        assert_eq!(e.to_string(), "Insufficient stock: requested 5, available 3");
        let e: AppError = InventoryError::NonPositiveQuantity(0).into();
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        let e: AppError = InventoryError::StillReserved(2).into();
        assert_eq!(e.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_error_envelope() {
        let resp = AppError::not_found("Section").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Section not found");
    }
}
