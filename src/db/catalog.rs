//! Products, variants, categories and manufacturers

use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use crate::db::{like_pattern, referenced, Page};
use crate::domain::catalog::{validate_price, would_create_cycle, Category, CatalogError, Manufacturer, Product, ProductStatus, ProductVariant};
use crate::domain::value_objects::{Sku, Slug};
use crate::error::{AppError, AppResult};

const GENERATED_SKU_PREFIX: &str = "PRS";
// Serializes re-parenting so two concurrent moves cannot form a loop together.
const CATEGORY_TREE_LOCK: i64 = 0x6361_7465_676f_7279;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort { #[default] Newest, Oldest, PriceAsc, PriceDesc, Name }

impl ProductSort {
    fn order_by(&self) -> &'static str {
        match self {
            Self::Newest => "p.created_at DESC, p.id DESC",
            Self::Oldest => "p.created_at ASC, p.id ASC",
            Self::PriceAsc => "p.price ASC, p.id",
            Self::PriceDesc => "p.price DESC, p.id",
            Self::Name => "p.name ASC, p.id",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub search: Option<String>,
    /// Matches the category and all of its descendants.
    pub category_id: Option<Uuid>,
    pub manufacturer_id: Option<Uuid>,
    pub status: Option<ProductStatus>,
    pub featured: Option<bool>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub sort: ProductSort,
}

impl ProductFilter {
    pub fn check(&self) -> AppResult<()> {
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max { return Err(AppError::validation("min_price is above max_price")); }
        }
        Ok(())
    }
}

fn push_product_filters(qb: &mut QueryBuilder<'_, Postgres>, f: &ProductFilter) {
    match f.status {
        Some(status) => { qb.push(" WHERE p.status = ").push_bind(status); }
        None => { qb.push(" WHERE p.status <> 'deleted'"); }
    }
    if let Some(term) = f.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(term);
        qb.push(" AND (p.name ILIKE ").push_bind(pattern.clone())
            .push(" OR p.sku ILIKE ").push_bind(pattern.clone())
            .push(" OR p.description ILIKE ").push_bind(pattern)
            .push(")");
    }
    if let Some(category) = f.category_id {
        qb.push(" AND p.category_id IN (WITH RECURSIVE sub AS (SELECT id FROM categories WHERE id = ")
            .push_bind(category)
            .push(" UNION SELECT c.id FROM categories c JOIN sub ON c.parent_id = sub.id) SELECT id FROM sub)");
    }
    if let Some(m) = f.manufacturer_id { qb.push(" AND p.manufacturer_id = ").push_bind(m); }
    if let Some(featured) = f.featured { qb.push(" AND p.is_featured = ").push_bind(featured); }
    if let Some(min) = f.min_price { qb.push(" AND p.price >= ").push_bind(min); }
    if let Some(max) = f.max_price { qb.push(" AND p.price <= ").push_bind(max); }
}

pub async fn list_products(pool: &PgPool, f: &ProductFilter, page: &Page) -> AppResult<(Vec<Product>, i64)> {
    f.check()?;
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM products p");
    push_product_filters(&mut count, f);
    let (total,): (i64,) = count.build_query_as().fetch_one(pool).await?;

    let mut qb = QueryBuilder::new("SELECT p.* FROM products p");
    push_product_filters(&mut qb, f);
    qb.push(" ORDER BY ").push(f.sort.order_by())
        .push(" LIMIT ").push_bind(page.limit())
        .push(" OFFSET ").push_bind(page.offset());
    Ok((qb.build_query_as::<Product>().fetch_all(pool).await?, total))
}

pub async fn get_product(pool: &PgPool, id: Uuid) -> AppResult<Product> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 AND status <> 'deleted'")
        .bind(id).fetch_optional(pool).await?
        .ok_or_else(|| AppError::not_found("Product"))
}

fn check_attributes(attributes: Option<&serde_json::Value>) -> AppResult<()> {
    match attributes {
        Some(v) if !v.is_object() => Err(AppError::validation("attributes must be a JSON object")),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProduct {
    pub sku: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 10000))]
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    pub category_id: Option<Uuid>,
    pub manufacturer_id: Option<Uuid>,
    #[validate(range(min = 0))]
    pub stock_quantity: Option<i32>,
    pub status: Option<ProductStatus>,
    #[serde(default)]
    pub is_featured: bool,
    pub attributes: Option<serde_json::Value>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Slug is derived from name and SKU. A missing SKU is generated.
pub async fn create_product(pool: &PgPool, r: &NewProduct, default_currency: &str) -> AppResult<Product> {
    r.validate()?;
    validate_price(r.price, r.compare_at_price)?;
    check_attributes(r.attributes.as_ref())?;
    if r.status == Some(ProductStatus::Deleted) { return Err(AppError::validation("Cannot create a deleted product")); }
    let sku = match r.sku.as_deref() {
        Some(raw) => Sku::new(raw)?,
        None => Sku::generate(GENERATED_SKU_PREFIX),
    };
    let slug = Slug::from_title(&format!("{} {}", r.name, sku))?;
    let currency = r.currency.as_deref().unwrap_or(default_currency).to_uppercase();

    let p = sqlx::query_as::<_, Product>(
        "INSERT INTO products (id, sku, name, slug, description, price, compare_at_price, currency, category_id, manufacturer_id, stock_quantity, status, is_featured, attributes, images, tags) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) RETURNING *")
        .bind(Uuid::now_v7()).bind(sku.as_str()).bind(r.name.trim()).bind(slug.as_str()).bind(&r.description)
        .bind(r.price).bind(r.compare_at_price).bind(&currency).bind(r.category_id).bind(r.manufacturer_id)
        .bind(r.stock_quantity.unwrap_or(0)).bind(r.status.unwrap_or_default()).bind(r.is_featured)
        .bind(r.attributes.clone().unwrap_or_else(|| serde_json::json!({}))).bind(&r.images).bind(&r.tags)
        .fetch_one(pool).await?;
    tracing::info!(product_id = %p.id, sku = %p.sku, "product created");
    Ok(p)
}

/// Partial update; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProductUpdate {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 10000))]
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub compare_at_price: Option<Decimal>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    pub category_id: Option<Uuid>,
    pub manufacturer_id: Option<Uuid>,
    #[validate(range(min = 0))]
    pub stock_quantity: Option<i32>,
    pub status: Option<ProductStatus>,
    pub is_featured: Option<bool>,
    pub attributes: Option<serde_json::Value>,
    pub images: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

pub async fn update_product(pool: &PgPool, id: Uuid, r: &ProductUpdate) -> AppResult<Product> {
    r.validate()?;
    validate_price(r.price.unwrap_or(Decimal::ZERO), r.compare_at_price)?;
    check_attributes(r.attributes.as_ref())?;
    if r.status == Some(ProductStatus::Deleted) { return Err(AppError::validation("Use DELETE to remove a product")); }

    sqlx::query_as::<_, Product>(
        "UPDATE products SET name = COALESCE($2, name), description = COALESCE($3, description), price = COALESCE($4, price), \
         compare_at_price = COALESCE($5, compare_at_price), currency = COALESCE($6, currency), category_id = COALESCE($7, category_id), \
         manufacturer_id = COALESCE($8, manufacturer_id), stock_quantity = COALESCE($9, stock_quantity), status = COALESCE($10, status), \
         is_featured = COALESCE($11, is_featured), attributes = COALESCE($12, attributes), images = COALESCE($13, images), tags = COALESCE($14, tags), \
         updated_at = NOW() WHERE id = $1 AND status <> 'deleted' RETURNING *")
        .bind(id).bind(r.name.as_deref().map(str::trim)).bind(&r.description).bind(r.price).bind(r.compare_at_price)
        .bind(r.currency.as_deref().map(str::to_uppercase)).bind(r.category_id).bind(r.manufacturer_id).bind(r.stock_quantity)
        .bind(r.status).bind(r.is_featured).bind(&r.attributes).bind(&r.images).bind(&r.tags)
        .fetch_optional(pool).await?
        .ok_or_else(|| AppError::not_found("Product"))
}

/// Marks the product deleted; rows that reference it stay valid.
pub async fn delete_product(pool: &PgPool, id: Uuid) -> AppResult<()> {
    let done = sqlx::query("UPDATE products SET status = 'deleted', updated_at = NOW() WHERE id = $1 AND status <> 'deleted'")
        .bind(id).execute(pool).await?;
    if done.rows_affected() == 0 { return Err(AppError::not_found("Product")); }
    tracing::info!(product_id = %id, "product soft-deleted");
    Ok(())
}

pub async fn list_variants(pool: &PgPool, product_id: Uuid) -> AppResult<Vec<ProductVariant>> {
    Ok(sqlx::query_as::<_, ProductVariant>("SELECT * FROM product_variants WHERE product_id = $1 ORDER BY sort_order, name")
        .bind(product_id).fetch_all(pool).await?)
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VariantInput {
    pub sku: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub stock_quantity: Option<i32>,
    pub attributes: Option<serde_json::Value>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "active")]
    pub is_active: bool,
}

fn active() -> bool { true }

impl VariantInput {
    fn check(&self) -> AppResult<Sku> {
        self.validate()?;
        if let Some(price) = self.price { validate_price(price, None)?; }
        check_attributes(self.attributes.as_ref())?;
        Ok(Sku::new(&self.sku)?)
    }
}

pub async fn create_variant(pool: &PgPool, product_id: Uuid, r: &VariantInput) -> AppResult<ProductVariant> {
    let sku = r.check()?;
    get_product(pool, product_id).await?;
    Ok(sqlx::query_as::<_, ProductVariant>(
        "INSERT INTO product_variants (id, product_id, sku, name, price, stock_quantity, attributes, sort_order, is_active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *")
        .bind(Uuid::now_v7()).bind(product_id).bind(sku.as_str()).bind(r.name.trim()).bind(r.price).bind(r.stock_quantity)
        .bind(r.attributes.clone().unwrap_or_else(|| serde_json::json!({}))).bind(r.sort_order).bind(r.is_active)
        .fetch_one(pool).await?)
}

pub async fn update_variant(pool: &PgPool, id: Uuid, r: &VariantInput) -> AppResult<ProductVariant> {
    let sku = r.check()?;
    sqlx::query_as::<_, ProductVariant>(
        "UPDATE product_variants SET sku = $2, name = $3, price = $4, stock_quantity = $5, attributes = $6, sort_order = $7, is_active = $8, \
         updated_at = NOW() WHERE id = $1 RETURNING *")
        .bind(id).bind(sku.as_str()).bind(r.name.trim()).bind(r.price).bind(r.stock_quantity)
        .bind(r.attributes.clone().unwrap_or_else(|| serde_json::json!({}))).bind(r.sort_order).bind(r.is_active)
        .fetch_optional(pool).await?
        .ok_or_else(|| AppError::not_found("Variant"))
}

pub async fn delete_variant(pool: &PgPool, id: Uuid) -> AppResult<()> {
    let done = sqlx::query("DELETE FROM product_variants WHERE id = $1")
        .bind(id).execute(pool).await
        .map_err(referenced("Variant is still stocked in a warehouse"))?;
    if done.rows_affected() == 0 { return Err(AppError::not_found("Variant")); }
    Ok(())
}

pub async fn list_categories(pool: &PgPool) -> AppResult<Vec<Category>> {
    Ok(sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY sort_order, name").fetch_all(pool).await?)
}

pub async fn get_category(pool: &PgPool, id: Uuid) -> AppResult<Category> {
    sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
        .bind(id).fetch_optional(pool).await?
        .ok_or_else(|| AppError::not_found("Category"))
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CategoryInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Taken from `name` when absent.
    #[validate(length(max = 255))]
    pub slug: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "active")]
    pub is_active: bool,
}

impl CategoryInput {
    fn slug(&self) -> AppResult<Slug> {
        Ok(Slug::from_title(self.slug.as_deref().unwrap_or(&self.name))?)
    }
}

pub async fn create_category(pool: &PgPool, r: &CategoryInput) -> AppResult<Category> {
    r.validate()?;
    let slug = r.slug()?;
    Ok(sqlx::query_as::<_, Category>(
        "INSERT INTO categories (id, name, slug, description, parent_id, image_url, sort_order, is_active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *")
        .bind(Uuid::now_v7()).bind(r.name.trim()).bind(slug.as_str()).bind(&r.description).bind(r.parent_id)
        .bind(&r.image_url).bind(r.sort_order).bind(r.is_active)
        .fetch_one(pool).await?)
}

/// Full replacement. Moving a category under itself or one of its
/// descendants is refused.
pub async fn update_category(pool: &PgPool, id: Uuid, r: &CategoryInput) -> AppResult<Category> {
    r.validate()?;
    let slug = r.slug()?;
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(CATEGORY_TREE_LOCK).execute(&mut *tx).await?;

    let rows: Vec<(Uuid, Option<Uuid>)> = sqlx::query_as("SELECT id, parent_id FROM categories").fetch_all(&mut *tx).await?;
    let parents: HashMap<Uuid, Option<Uuid>> = rows.into_iter().collect();
    if !parents.contains_key(&id) { return Err(AppError::not_found("Category")); }
    if r.parent_id.is_some_and(|p| !parents.contains_key(&p)) { return Err(AppError::validation("Parent category does not exist")); }
    if would_create_cycle(&parents, id, r.parent_id) { return Err(CatalogError::CategoryCycle.into()); }

    let c = sqlx::query_as::<_, Category>(
        "UPDATE categories SET name = $2, slug = $3, description = $4, parent_id = $5, image_url = $6, sort_order = $7, is_active = $8, \
         updated_at = NOW() WHERE id = $1 RETURNING *")
        .bind(id).bind(r.name.trim()).bind(slug.as_str()).bind(&r.description).bind(r.parent_id)
        .bind(&r.image_url).bind(r.sort_order).bind(r.is_active)
        .fetch_one(&mut *tx).await?;
    tx.commit().await?;
    Ok(c)
}

/// Products in the category lose it; subcategories block the delete.
pub async fn delete_category(pool: &PgPool, id: Uuid) -> AppResult<()> {
    let done = sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id).execute(pool).await
        .map_err(referenced("Category still has subcategories"))?;
    if done.rows_affected() == 0 { return Err(AppError::not_found("Category")); }
    Ok(())
}

pub async fn list_manufacturers(pool: &PgPool) -> AppResult<Vec<Manufacturer>> {
    Ok(sqlx::query_as::<_, Manufacturer>("SELECT * FROM manufacturers ORDER BY name").fetch_all(pool).await?)
}

pub async fn get_manufacturer(pool: &PgPool, id: Uuid) -> AppResult<Manufacturer> {
    sqlx::query_as::<_, Manufacturer>("SELECT * FROM manufacturers WHERE id = $1")
        .bind(id).fetch_optional(pool).await?
        .ok_or_else(|| AppError::not_found("Manufacturer"))
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ManufacturerInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 100))]
    pub country: Option<String>,
    #[validate(url)]
    pub website: Option<String>,
    pub logo_url: Option<String>,
    pub description: Option<String>,
    #[serde(default = "active")]
    pub is_active: bool,
}

pub async fn create_manufacturer(pool: &PgPool, r: &ManufacturerInput) -> AppResult<Manufacturer> {
    r.validate()?;
    let slug = Slug::from_title(&r.name)?;
    Ok(sqlx::query_as::<_, Manufacturer>(
        "INSERT INTO manufacturers (id, name, slug, country, website, logo_url, description, is_active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *")
        .bind(Uuid::now_v7()).bind(r.name.trim()).bind(slug.as_str()).bind(&r.country).bind(&r.website)
        .bind(&r.logo_url).bind(&r.description).bind(r.is_active)
        .fetch_one(pool).await?)
}

pub async fn update_manufacturer(pool: &PgPool, id: Uuid, r: &ManufacturerInput) -> AppResult<Manufacturer> {
    r.validate()?;
    let slug = Slug::from_title(&r.name)?;
    sqlx::query_as::<_, Manufacturer>(
        "UPDATE manufacturers SET name = $2, slug = $3, country = $4, website = $5, logo_url = $6, description = $7, is_active = $8, \
         updated_at = NOW() WHERE id = $1 RETURNING *")
        .bind(id).bind(r.name.trim()).bind(slug.as_str()).bind(&r.country).bind(&r.website)
        .bind(&r.logo_url).bind(&r.description).bind(r.is_active)
        .fetch_optional(pool).await?
        .ok_or_else(|| AppError::not_found("Manufacturer"))
}

pub async fn delete_manufacturer(pool: &PgPool, id: Uuid) -> AppResult<()> {
    let done = sqlx::query("DELETE FROM manufacturers WHERE id = $1").bind(id).execute(pool).await?;
    if done.rows_affected() == 0 { return Err(AppError::not_found("Manufacturer")); }
    Ok(())
}
