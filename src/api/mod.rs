//! HTTP surface. Every handler answers with `{success, data}` or, through
//! [`AppError`], `{success: false, error}`.

pub mod analytics;
pub mod catalog;
pub mod characteristics;
pub mod inventory;
pub mod media;
pub mod warehouse;

use axum::{
    extract::{FromRequest, FromRequestParts},
    http::StatusCode,
    routing::get,
    Router,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::cache::TtlCache;
use crate::config::Config;
use crate::domain::events::DomainEvent;
use crate::error::{AppError, AppResult};
use crate::limiter::ConcurrencyLimiter;

pub const SERVICE_NAME: &str = "prosthetics-store";

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub nats: Option<async_nats::Client>,
    pub cache: Arc<TtlCache<String, serde_json::Value>>,
    pub media_limiter: ConcurrencyLimiter,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: sqlx::PgPool, nats: Option<async_nats::Client>, config: Config) -> Self {
        Self {
            db,
            nats,
            cache: Arc::new(TtlCache::new(config.cache_ttl)),
            media_limiter: ConcurrencyLimiter::new(config.media_list_concurrency, config.media_acquire_timeout),
            config: Arc::new(config),
        }
    }

    /// Best effort: events go out after commit and a broker failure never
    /// fails the request.
    pub async fn publish(&self, events: impl IntoIterator<Item = DomainEvent>) {
        let Some(nats) = &self.nats else { return };
        for event in events {
            let subject = event.subject();
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(%subject, error = %e, "event serialization failed");
                    continue;
                }
            };
            if let Err(e) = nats.publish(subject.clone(), payload.into()).await {
                tracing::warn!(%subject, error = %e, "event publish failed");
            }
        }
    }

    /// Call after the write has committed.
    pub async fn invalidate(&self, key: &str) {
        self.cache.invalidate(&key.to_string()).await;
    }

    pub async fn invalidate_prefix(&self, prefix: &str) {
        self.cache.invalidate_prefix(prefix).await;
    }

    /// Serves `key` from the cache or fills it with `load`. A fill that
    /// overlaps an invalidation is returned but not stored.
    pub async fn cached<T, F, Fut>(&self, key: &str, load: F) -> AppResult<serde_json::Value>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let key = key.to_string();
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }
        let seen = self.cache.generation();
        let value = serde_json::to_value(load().await?)?;
        if !self.cache.insert_if_current(key.clone(), value.clone(), seen).await {
            tracing::debug!(%key, "cache fill raced an invalidation, not stored");
        }
        Ok(value)
    }
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

pub type ApiResult<T> = AppResult<axum::Json<Envelope<T>>>;
pub type Created<T> = AppResult<(StatusCode, axum::Json<Envelope<T>>)>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(axum::Json(Envelope { success: true, data }))
}

pub fn created<T>(data: T) -> Created<T> {
    Ok((StatusCode::CREATED, axum::Json(Envelope { success: true, data })))
}

/// `axum::Json` with rejections rendered through [`AppError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct Query<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct Path<T>(pub T);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { axum::Json(serde_json::json!({ "status": "healthy", "service": SERVICE_NAME })) }))
        .merge(catalog::routes())
        .merge(characteristics::routes())
        .merge(warehouse::routes())
        .merge(inventory::routes())
        .merge(analytics::routes())
        .merge(media::routes())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    /// Router over a pool that never connects; only requests rejected before
    /// the first query can be exercised.
    pub fn app() -> Router {
        let config = Config::from_lookup(|key| (key == "DATABASE_URL").then(|| "postgres://localhost/unused".to_string()))
            .expect("config");
        let db = PgPoolOptions::new().connect_lazy(&config.database_url).expect("lazy pool");
        router(AppState::new(db, None, config))
    }

    pub async fn send(method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder.header("content-type", "application/json").body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        let response = app().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }
}
