use axum::{extract::State, routing::get, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::{ok, ApiResult, AppState, Query};
use crate::db::analytics::{self as repo, MAX_WINDOW_DAYS};
use crate::domain::analytics::AnalyticsReport;
use crate::error::AppError;

const DEFAULT_WINDOW_DAYS: i32 = 30;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/v1/warehouse/analytics", get(report))
}

#[derive(Debug, Default, Deserialize)]
struct AnalyticsParams {
    warehouse_id: Option<Uuid>,
    days: Option<i32>,
}

impl AnalyticsParams {
    fn window(&self) -> Result<i32, AppError> {
        let days = self.days.unwrap_or(DEFAULT_WINDOW_DAYS);
        if !(1..=MAX_WINDOW_DAYS).contains(&days) {
            return Err(AppError::validation(format!("days must be between 1 and {MAX_WINDOW_DAYS}")));
        }
        Ok(days)
    }
}

/// Movement figures cover the trailing `days` window; stock figures are current.
async fn report(State(s): State<AppState>, Query(p): Query<AnalyticsParams>) -> ApiResult<AnalyticsReport> {
    let days = p.window()?;
    ok(repo::report(&s.db, p.warehouse_id, days).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::send;
    use axum::http::StatusCode;

    #[test]
    fn test_window_defaults_and_bounds() {
        assert_eq!(AnalyticsParams::default().window().unwrap(), DEFAULT_WINDOW_DAYS);
        assert_eq!(AnalyticsParams { days: Some(365), ..Default::default() }.window().unwrap(), 365);
        assert!(AnalyticsParams { days: Some(0), ..Default::default() }.window().is_err());
        assert!(AnalyticsParams { days: Some(366), ..Default::default() }.window().is_err());
    }

    #[tokio::test]
    async fn test_out_of_range_window_rejected() {
        let (status, body) = send("GET", "/api/v1/warehouse/analytics?days=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "days must be between 1 and 365");
    }
}
