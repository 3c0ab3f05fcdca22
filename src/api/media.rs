//! Media registry. Listing is throttled so bursts of gallery requests cannot
//! drain the connection pool.

use axum::{extract::State, routing::{delete, get}, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::{created, ok, ApiResult, AppState, Created, Json, Path, Query};
use crate::db::media::{self as repo, MediaFile, NewMedia};
use crate::db::{Page, Paginated};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/media", get(list).post(register))
        .route("/api/v1/media/:id", delete(remove))
}

#[derive(Debug, Default, Deserialize)]
struct PrefixParam {
    prefix: Option<String>,
}

async fn list(State(s): State<AppState>, Query(page): Query<Page>, Query(p): Query<PrefixParam>) -> ApiResult<Paginated<MediaFile>> {
    let _permit = s.media_limiter.acquire().await?;
    let (items, total) = repo::list(&s.db, p.prefix.as_deref(), &page).await?;
    ok(Paginated::new(items, total, &page))
}

async fn register(State(s): State<AppState>, Json(r): Json<NewMedia>) -> Created<MediaFile> {
    created(repo::register(&s.db, &r).await?)
}

async fn remove(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Uuid> {
    repo::delete(&s.db, id).await?;
    ok(id)
}
