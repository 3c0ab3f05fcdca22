//! Products, variants, categories and manufacturers

use axum::{extract::State, routing::{get, put}, Router};
use serde::Serialize;
use uuid::Uuid;

use crate::api::{created, ok, ApiResult, AppState, Created, Json, Path, Query};
use crate::cache::{CATEGORY_TREE, MANUFACTURERS};
use crate::db::catalog::{self as repo, CategoryInput, ManufacturerInput, NewProduct, ProductFilter, ProductUpdate, VariantInput};
use crate::db::{characteristics, Page, Paginated};
use crate::domain::catalog::{build_category_tree, resolve_variant, Category, CharacteristicGroupView, Manufacturer, Product, ProductVariant, ResolvedVariant};
use crate::domain::events::CatalogEvent;
use crate::error::AppError;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/products", get(list_products).post(create_product))
        .route("/api/v1/products/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/api/v1/products/:id/variants", get(list_variants).post(create_variant))
        .route("/api/v1/variants/:id", put(update_variant).delete(delete_variant))
        .route("/api/v1/categories", get(list_categories).post(create_category))
        .route("/api/v1/categories/tree", get(category_tree))
        .route("/api/v1/categories/:id", get(get_category).put(update_category).delete(delete_category))
        .route("/api/v1/manufacturers", get(list_manufacturers).post(create_manufacturer))
        .route("/api/v1/manufacturers/:id", get(get_manufacturer).put(update_manufacturer).delete(delete_manufacturer))
}

async fn list_products(State(s): State<AppState>, Query(page): Query<Page>, Query(filter): Query<ProductFilter>) -> ApiResult<Paginated<Product>> {
    let (items, total) = repo::list_products(&s.db, &filter, &page).await?;
    ok(Paginated::new(items, total, &page))
}

#[derive(Debug, Serialize)]
pub struct ProductDetails {
    #[serde(flatten)]
    pub product: Product,
    pub variants: Vec<ResolvedVariant>,
    pub characteristics: Vec<CharacteristicGroupView>,
}

async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<ProductDetails> {
    let product = repo::get_product(&s.db, id).await?;
    let variants = repo::list_variants(&s.db, id).await?.iter().map(|v| resolve_variant(&product, v)).collect();
    let characteristics = characteristics::for_product(&s.db, id).await?;
    ok(ProductDetails { product, variants, characteristics })
}

async fn create_product(State(s): State<AppState>, Json(r): Json<NewProduct>) -> Created<Product> {
    let p = repo::create_product(&s.db, &r, &s.config.default_currency).await?;
    s.publish([CatalogEvent::ProductCreated { product_id: p.id, sku: p.sku.clone() }.into()]).await;
    created(p)
}

async fn update_product(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<ProductUpdate>) -> ApiResult<Product> {
    let p = repo::update_product(&s.db, id, &r).await?;
    s.publish([CatalogEvent::ProductUpdated { product_id: id }.into()]).await;
    ok(p)
}

async fn delete_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Uuid> {
    repo::delete_product(&s.db, id).await?;
    s.publish([CatalogEvent::ProductDeleted { product_id: id }.into()]).await;
    ok(id)
}

async fn list_variants(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Vec<ProductVariant>> {
    repo::get_product(&s.db, id).await?;
    ok(repo::list_variants(&s.db, id).await?)
}

async fn create_variant(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<VariantInput>) -> Created<ProductVariant> {
    let v = repo::create_variant(&s.db, id, &r).await?;
    s.publish([CatalogEvent::ProductUpdated { product_id: id }.into()]).await;
    created(v)
}

async fn update_variant(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<VariantInput>) -> ApiResult<ProductVariant> {
    let v = repo::update_variant(&s.db, id, &r).await?;
    s.publish([CatalogEvent::ProductUpdated { product_id: v.product_id }.into()]).await;
    ok(v)
}

async fn delete_variant(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Uuid> {
    repo::delete_variant(&s.db, id).await?;
    ok(id)
}

async fn list_categories(State(s): State<AppState>) -> ApiResult<Vec<Category>> {
    ok(repo::list_categories(&s.db).await?)
}

async fn category_tree(State(s): State<AppState>) -> ApiResult<serde_json::Value> {
    let db = s.db.clone();
    ok(s.cached(CATEGORY_TREE, || async move { Ok::<_, AppError>(build_category_tree(repo::list_categories(&db).await?)) }).await?)
}

async fn get_category(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Category> {
    ok(repo::get_category(&s.db, id).await?)
}

async fn create_category(State(s): State<AppState>, Json(r): Json<CategoryInput>) -> Created<Category> {
    let c = repo::create_category(&s.db, &r).await?;
    s.invalidate(CATEGORY_TREE).await;
    created(c)
}

async fn update_category(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<CategoryInput>) -> ApiResult<Category> {
    let c = repo::update_category(&s.db, id, &r).await?;
    s.invalidate(CATEGORY_TREE).await;
    ok(c)
}

async fn delete_category(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Uuid> {
    repo::delete_category(&s.db, id).await?;
    s.invalidate(CATEGORY_TREE).await;
    ok(id)
}

async fn list_manufacturers(State(s): State<AppState>) -> ApiResult<serde_json::Value> {
    let db = s.db.clone();
    ok(s.cached(MANUFACTURERS, || async move { repo::list_manufacturers(&db).await }).await?)
}

async fn get_manufacturer(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Manufacturer> {
    ok(repo::get_manufacturer(&s.db, id).await?)
}

async fn create_manufacturer(State(s): State<AppState>, Json(r): Json<ManufacturerInput>) -> Created<Manufacturer> {
    let m = repo::create_manufacturer(&s.db, &r).await?;
    s.invalidate(MANUFACTURERS).await;
    created(m)
}

async fn update_manufacturer(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<ManufacturerInput>) -> ApiResult<Manufacturer> {
    let m = repo::update_manufacturer(&s.db, id, &r).await?;
    s.invalidate(MANUFACTURERS).await;
    ok(m)
}

async fn delete_manufacturer(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Uuid> {
    repo::delete_manufacturer(&s.db, id).await?;
    s.invalidate(MANUFACTURERS).await;
    ok(id)
}
