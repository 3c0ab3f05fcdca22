//! Inventory rows, stock operations, transfers and the movement ledger

use axum::{extract::State, routing::{get, post}, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{created, ok, ApiResult, AppState, Created, Json, Path, Query};
use crate::db::inventory::{
    self as repo, InventoryFilter, InventoryItem, InventoryUpdate, Movement, MovementContext, NewInventory, StockOp, StockOutcome,
    TransferRequest,
};
use crate::db::movements::{self, MovementFilter};
use crate::db::{Page, Paginated};
use crate::domain::events::{DomainEvent, InventoryEvent};
use crate::domain::inventory::Reconciliation;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/warehouse/inventory", get(list).post(create))
        .route("/api/v1/warehouse/inventory/:id", get(fetch).put(update).delete(remove))
        .route("/api/v1/warehouse/inventory/:id/receive", post(receive))
        .route("/api/v1/warehouse/inventory/:id/ship", post(ship))
        .route("/api/v1/warehouse/inventory/:id/adjust", post(adjust))
        .route("/api/v1/warehouse/inventory/:id/reconcile", get(reconcile))
        .route("/api/v1/warehouse/transfers", post(transfer))
        .route("/api/v1/warehouse/movements", get(list_movements))
}

#[derive(Debug, Serialize)]
pub struct InventoryView {
    #[serde(flatten)]
    pub item: InventoryItem,
    pub available: i32,
    pub low_stock: bool,
}

impl From<InventoryItem> for InventoryView {
    fn from(item: InventoryItem) -> Self {
        Self { available: item.level().available(), low_stock: item.is_low_stock(), item }
    }
}

async fn list(State(s): State<AppState>, Query(page): Query<Page>, Query(filter): Query<InventoryFilter>) -> ApiResult<Paginated<InventoryView>> {
    let (items, total) = repo::list(&s.db, &filter, &page).await?;
    ok(Paginated::new(items.into_iter().map(InventoryView::from).collect(), total, &page))
}

async fn fetch(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<InventoryView> {
    ok(repo::get(&s.db, id).await?.into())
}

#[derive(Debug, Deserialize)]
struct CreateRequest {
    #[serde(flatten)]
    item: NewInventory,
    #[serde(flatten)]
    context: MovementContext,
}

async fn create(State(s): State<AppState>, Json(r): Json<CreateRequest>) -> Created<StockOutcome> {
    let outcome = repo::create(&s.db, &r.item, &r.context, s.config.low_stock_threshold).await?;
    s.publish(outcome.events()).await;
    created(outcome)
}

#[derive(Debug, Deserialize)]
struct UpdateRequest {
    #[serde(flatten)]
    update: InventoryUpdate,
    #[serde(flatten)]
    context: MovementContext,
}

async fn update(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<UpdateRequest>) -> ApiResult<StockOutcome> {
    let outcome = repo::update(&s.db, id, &r.update, &r.context).await?;
    s.publish(outcome.events()).await;
    ok(outcome)
}

#[derive(Debug, Default, Deserialize)]
struct VersionParam {
    expected_version: Option<i32>,
}

/// Audit fields and the expected version come from the query string.
async fn remove(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Query(version): Query<VersionParam>,
    Query(context): Query<MovementContext>,
) -> ApiResult<StockOutcome> {
    let outcome = repo::delete(&s.db, id, version.expected_version, &context).await?;
    let mut events = outcome.events();
    if let (false, Some(row)) = (outcome.replayed, outcome.inventory.first()) {
        events.push(DomainEvent::from(InventoryEvent::InventoryRemoved { inventory_id: row.id, section_id: row.section_id, product_id: row.product_id }));
    }
    s.publish(events).await;
    ok(outcome)
}

#[derive(Debug, Deserialize)]
struct StockOpRequest {
    /// Signed delta for adjustments.
    #[serde(alias = "delta")]
    quantity: i32,
    expected_version: Option<i32>,
    #[serde(flatten)]
    context: MovementContext,
}

async fn run_stock_op(s: &AppState, id: Uuid, op: StockOp, r: &StockOpRequest) -> ApiResult<StockOutcome> {
    let outcome = repo::apply_stock_op(&s.db, id, op, r.expected_version, &r.context).await?;
    s.publish(outcome.events()).await;
    ok(outcome)
}

async fn receive(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<StockOpRequest>) -> ApiResult<StockOutcome> {
    run_stock_op(&s, id, StockOp::Receive(r.quantity), &r).await
}

async fn ship(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<StockOpRequest>) -> ApiResult<StockOutcome> {
    run_stock_op(&s, id, StockOp::Ship(r.quantity), &r).await
}

async fn adjust(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<StockOpRequest>) -> ApiResult<StockOutcome> {
    run_stock_op(&s, id, StockOp::Adjust(r.quantity), &r).await
}

async fn transfer(State(s): State<AppState>, Json(r): Json<TransferRequest>) -> ApiResult<StockOutcome> {
    let outcome = repo::transfer(&s.db, &r).await?;
    s.publish(outcome.events()).await;
    ok(outcome)
}

async fn reconcile(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Reconciliation> {
    ok(repo::reconcile(&s.db, id).await?)
}

async fn list_movements(State(s): State<AppState>, Query(page): Query<Page>, Query(filter): Query<MovementFilter>) -> ApiResult<Paginated<Movement>> {
    let (items, total) = movements::list(&s.db, &filter, &page).await?;
    ok(Paginated::new(items, total, &page))
}
