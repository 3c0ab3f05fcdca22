//! Location hierarchy: regions, cities, warehouses, zones and sections

use axum::{extract::State, routing::{get, post}, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::{created, ok, ApiResult, AppState, Created, Json, Path, Query};
use crate::cache::{WAREHOUSE_PREFIX, WAREHOUSE_TREE};
use crate::db::locations::{self as repo, Location, LocationInput};
use crate::domain::location::{BulkReport, BulkRequest, NodeKind};
use crate::error::AppError;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/warehouse/tree", get(tree))
        .route("/api/v1/warehouse/bulk", post(bulk))
        .route("/api/v1/warehouse/:kind", get(list).post(create))
        .route("/api/v1/warehouse/:kind/:id", get(fetch).put(update).delete(remove))
}

fn kind(segment: &str) -> Result<NodeKind, AppError> {
    segment.parse().map_err(AppError::Validation)
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    parent_id: Option<Uuid>,
}

async fn tree(State(s): State<AppState>) -> ApiResult<serde_json::Value> {
    let db = s.db.clone();
    ok(s.cached(WAREHOUSE_TREE, || async move { repo::tree(&db).await }).await?)
}

async fn list(State(s): State<AppState>, Path(segment): Path<String>, Query(p): Query<ListParams>) -> ApiResult<Vec<Location>> {
    ok(repo::list(&s.db, kind(&segment)?, p.parent_id).await?)
}

async fn create(State(s): State<AppState>, Path(segment): Path<String>, Json(r): Json<LocationInput>) -> Created<Location> {
    let loc = repo::create(&s.db, kind(&segment)?, &r).await?;
    s.invalidate_prefix(WAREHOUSE_PREFIX).await;
    created(loc)
}

async fn fetch(State(s): State<AppState>, Path((segment, id)): Path<(String, Uuid)>) -> ApiResult<Location> {
    ok(repo::get(&s.db, kind(&segment)?, id).await?)
}

async fn update(State(s): State<AppState>, Path((segment, id)): Path<(String, Uuid)>, Json(r): Json<LocationInput>) -> ApiResult<Location> {
    let loc = repo::update(&s.db, kind(&segment)?, id, &r).await?;
    s.invalidate_prefix(WAREHOUSE_PREFIX).await;
    ok(loc)
}

async fn remove(State(s): State<AppState>, Path((segment, id)): Path<(String, Uuid)>) -> ApiResult<Uuid> {
    repo::delete(&s.db, kind(&segment)?, id).await?;
    s.invalidate_prefix(WAREHOUSE_PREFIX).await;
    ok(id)
}

/// Per-id outcome; the request itself succeeds even when some ids fail.
async fn bulk(State(s): State<AppState>, Json(r): Json<BulkRequest>) -> ApiResult<BulkReport> {
    let ids = r.normalized_ids().map_err(AppError::Validation)?;
    let report = repo::bulk(&s.db, r.kind, r.action, &ids).await;
    if !report.succeeded.is_empty() {
        s.invalidate_prefix(WAREHOUSE_PREFIX).await;
    }
    ok(report)
}
