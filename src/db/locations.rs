//! Location hierarchy CRUD, tree snapshot and bulk operations

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use crate::db::referenced;
use crate::domain::location::{build_tree, BulkAction, BulkReport, LocationNode, LocationTree, NodeKind};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Region { pub id: Uuid, pub name: String, pub code: String, pub description: Option<String>, pub is_active: bool, pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc> }

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct City { pub id: Uuid, pub region_id: Uuid, pub name: String, pub code: String, pub description: Option<String>, pub is_active: bool, pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc> }

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Warehouse {
    pub id: Uuid, pub city_id: Uuid, pub name: String, pub code: String, pub description: Option<String>,
    pub address: Option<String>, pub manager_name: Option<String>, pub phone: Option<String>, pub total_area: Option<Decimal>,
    pub is_active: bool, pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Zone {
    pub id: Uuid, pub warehouse_id: Uuid, pub name: String, pub code: String, pub description: Option<String>,
    pub zone_type: String, pub temperature_controlled: bool,
    pub is_active: bool, pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Section {
    pub id: Uuid, pub zone_id: Uuid, pub name: String, pub code: String, pub description: Option<String>,
    pub capacity: i32, pub is_active: bool, pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Location { Region(Region), City(City), Warehouse(Warehouse), Zone(Zone), Section(Section) }

/// Create/update body shared by all levels. Level-specific fields are
/// ignored where they don't apply.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LocationInput {
    pub parent_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub address: Option<String>,
    pub manager_name: Option<String>,
    pub phone: Option<String>,
    pub total_area: Option<Decimal>,
    #[validate(length(min = 1, max = 50))]
    pub zone_type: Option<String>,
    pub temperature_controlled: Option<bool>,
    #[validate(range(min = 0))]
    pub capacity: Option<i32>,
}

impl LocationInput {
    pub fn check(&self, kind: NodeKind) -> AppResult<()> {
        self.validate()?;
        if kind.parent().is_some() && self.parent_id.is_none() {
            return Err(AppError::validation(format!("{} requires parent_id", kind.label())));
        }
        if self.total_area.is_some_and(|a| a.is_sign_negative()) {
            return Err(AppError::validation("total_area cannot be negative"));
        }
        Ok(())
    }

    fn code(&self) -> String { self.code.trim().to_uppercase() }
}

async fn fetch_as<T>(pool: &PgPool, sql: &str, id: Uuid) -> AppResult<Option<T>>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    Ok(sqlx::query_as::<_, T>(sql).bind(id).fetch_optional(pool).await?)
}

pub async fn get(pool: &PgPool, kind: NodeKind, id: Uuid) -> AppResult<Location> {
    let sql = format!("SELECT * FROM {} WHERE id = $1", kind.table());
    let found = match kind {
        NodeKind::Region => fetch_as(pool, &sql, id).await?.map(Location::Region),
        NodeKind::City => fetch_as(pool, &sql, id).await?.map(Location::City),
        NodeKind::Warehouse => fetch_as(pool, &sql, id).await?.map(Location::Warehouse),
        NodeKind::Zone => fetch_as(pool, &sql, id).await?.map(Location::Zone),
        NodeKind::Section => fetch_as(pool, &sql, id).await?.map(Location::Section),
    };
    found.ok_or_else(|| AppError::not_found(kind.label()))
}

pub async fn list(pool: &PgPool, kind: NodeKind, parent_id: Option<Uuid>) -> AppResult<Vec<Location>> {
    let mut sql = format!("SELECT * FROM {}", kind.table());
    match (kind.parent_column(), parent_id) {
        (Some(col), Some(_)) => sql.push_str(&format!(" WHERE {col} = $1")),
        (None, Some(_)) => return Err(AppError::validation("Regions have no parent")),
        _ => {}
    }
    sql.push_str(" ORDER BY name");

    macro_rules! rows {
        ($ty:ty, $variant:path) => {{
            let q = sqlx::query_as::<_, $ty>(&sql);
            let q = match parent_id { Some(p) => q.bind(p), None => q };
            q.fetch_all(pool).await?.into_iter().map($variant).collect()
        }};
    }
    Ok(match kind {
        NodeKind::Region => rows!(Region, Location::Region),
        NodeKind::City => rows!(City, Location::City),
        NodeKind::Warehouse => rows!(Warehouse, Location::Warehouse),
        NodeKind::Zone => rows!(Zone, Location::Zone),
        NodeKind::Section => rows!(Section, Location::Section),
    })
}

pub async fn create(pool: &PgPool, kind: NodeKind, r: &LocationInput) -> AppResult<Location> {
    r.check(kind)?;
    let id = Uuid::now_v7();
    let active = r.is_active.unwrap_or(true);
    let loc = match kind {
        NodeKind::Region => Location::Region(sqlx::query_as::<_, Region>("INSERT INTO warehouse_regions (id, name, code, description, is_active) VALUES ($1, $2, $3, $4, $5) RETURNING *")
            .bind(id).bind(&r.name).bind(r.code()).bind(&r.description).bind(active).fetch_one(pool).await?),
        NodeKind::City => Location::City(sqlx::query_as::<_, City>("INSERT INTO warehouse_cities (id, region_id, name, code, description, is_active) VALUES ($1, $2, $3, $4, $5, $6) RETURNING *")
            .bind(id).bind(r.parent_id).bind(&r.name).bind(r.code()).bind(&r.description).bind(active).fetch_one(pool).await?),
        NodeKind::Warehouse => Location::Warehouse(sqlx::query_as::<_, Warehouse>("INSERT INTO warehouse_warehouses (id, city_id, name, code, description, address, manager_name, phone, total_area, is_active) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *")
            .bind(id).bind(r.parent_id).bind(&r.name).bind(r.code()).bind(&r.description).bind(&r.address).bind(&r.manager_name).bind(&r.phone).bind(r.total_area).bind(active)
            .fetch_one(pool).await?),
        NodeKind::Zone => Location::Zone(sqlx::query_as::<_, Zone>("INSERT INTO warehouse_zones (id, warehouse_id, name, code, description, zone_type, temperature_controlled, is_active) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *")
            .bind(id).bind(r.parent_id).bind(&r.name).bind(r.code()).bind(&r.description).bind(r.zone_type.as_deref().unwrap_or("storage")).bind(r.temperature_controlled.unwrap_or(false)).bind(active)
            .fetch_one(pool).await?),
        NodeKind::Section => Location::Section(sqlx::query_as::<_, Section>("INSERT INTO warehouse_sections (id, zone_id, name, code, description, capacity, is_active) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *")
            .bind(id).bind(r.parent_id).bind(&r.name).bind(r.code()).bind(&r.description).bind(r.capacity.unwrap_or(0)).bind(active)
            .fetch_one(pool).await?),
    };
    tracing::info!(%kind, %id, "location created");
    Ok(loc)
}

pub async fn update(pool: &PgPool, kind: NodeKind, id: Uuid, r: &LocationInput) -> AppResult<Location> {
    r.check(kind)?;
    let loc = match kind {
        NodeKind::Region => sqlx::query_as::<_, Region>("UPDATE warehouse_regions SET name = $2, code = $3, description = $4, is_active = COALESCE($5, is_active), updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id).bind(&r.name).bind(r.code()).bind(&r.description).bind(r.is_active).fetch_optional(pool).await?.map(Location::Region),
        NodeKind::City => sqlx::query_as::<_, City>("UPDATE warehouse_cities SET region_id = $2, name = $3, code = $4, description = $5, is_active = COALESCE($6, is_active), updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id).bind(r.parent_id).bind(&r.name).bind(r.code()).bind(&r.description).bind(r.is_active).fetch_optional(pool).await?.map(Location::City),
        NodeKind::Warehouse => sqlx::query_as::<_, Warehouse>("UPDATE warehouse_warehouses SET city_id = $2, name = $3, code = $4, description = $5, address = $6, manager_name = $7, phone = $8, total_area = $9, is_active = COALESCE($10, is_active), updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id).bind(r.parent_id).bind(&r.name).bind(r.code()).bind(&r.description).bind(&r.address).bind(&r.manager_name).bind(&r.phone).bind(r.total_area).bind(r.is_active)
            .fetch_optional(pool).await?.map(Location::Warehouse),
        NodeKind::Zone => sqlx::query_as::<_, Zone>("UPDATE warehouse_zones SET warehouse_id = $2, name = $3, code = $4, description = $5, zone_type = COALESCE($6, zone_type), temperature_controlled = COALESCE($7, temperature_controlled), is_active = COALESCE($8, is_active), updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id).bind(r.parent_id).bind(&r.name).bind(r.code()).bind(&r.description).bind(&r.zone_type).bind(r.temperature_controlled).bind(r.is_active)
            .fetch_optional(pool).await?.map(Location::Zone),
        NodeKind::Section => sqlx::query_as::<_, Section>("UPDATE warehouse_sections SET zone_id = $2, name = $3, code = $4, description = $5, capacity = COALESCE($6, capacity), is_active = COALESCE($7, is_active), updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id).bind(r.parent_id).bind(&r.name).bind(r.code()).bind(&r.description).bind(r.capacity).bind(r.is_active)
            .fetch_optional(pool).await?.map(Location::Section),
    };
    loc.ok_or_else(|| AppError::not_found(kind.label()))
}

/// Deletes a node that has no children. The existence check and the delete
/// share a transaction holding a row lock on the node.
pub async fn delete(pool: &PgPool, kind: NodeKind, id: Uuid) -> AppResult<()> {
    let mut tx = pool.begin().await?;
    let locked: Option<(Uuid,)> = sqlx::query_as(&format!("SELECT id FROM {} WHERE id = $1 FOR UPDATE", kind.table()))
        .bind(id).fetch_optional(&mut *tx).await?;
    if locked.is_none() { return Err(AppError::not_found(kind.label())); }

    let (child_table, child_col) = kind.children();
    let (has_children,): (bool,) = sqlx::query_as(&format!("SELECT EXISTS (SELECT 1 FROM {child_table} WHERE {child_col} = $1)"))
        .bind(id).fetch_one(&mut *tx).await?;
    if has_children {
        return Err(AppError::conflict(format!("{} still has {}", kind.label(), if kind == NodeKind::Section { "inventory" } else { "child locations" })));
    }

    sqlx::query(&format!("DELETE FROM {} WHERE id = $1", kind.table()))
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(referenced(format!("{} is referenced by movement history", kind.label())))?;
    tx.commit().await?;
    tracing::info!(%kind, %id, "location deleted");
    Ok(())
}

pub async fn set_active(pool: &PgPool, kind: NodeKind, id: Uuid, active: bool) -> AppResult<()> {
    let done = sqlx::query(&format!("UPDATE {} SET is_active = $2, updated_at = NOW() WHERE id = $1", kind.table()))
        .bind(id).bind(active).execute(pool).await?;
    if done.rows_affected() == 0 { return Err(AppError::not_found(kind.label())); }
    Ok(())
}

/// Applies one action to each id independently; a failure on one id does
/// not roll back the others.
pub async fn bulk(pool: &PgPool, kind: NodeKind, action: BulkAction, ids: &[Uuid]) -> BulkReport {
    let mut report = BulkReport::default();
    for &id in ids {
        let outcome = match action {
            BulkAction::Activate => set_active(pool, kind, id, true).await,
            BulkAction::Deactivate => set_active(pool, kind, id, false).await,
            BulkAction::Delete => delete(pool, kind, id).await,
        };
        report.record(id, outcome.map_err(|e| e.to_string()));
    }
    if report.is_complete_success() {
        tracing::info!(%kind, ?action, succeeded = report.succeeded.len(), "bulk operation finished");
    } else {
        tracing::warn!(%kind, ?action, succeeded = report.succeeded.len(), failed = report.failed.len(), "bulk operation partially failed");
    }
    report
}

pub async fn tree(pool: &PgPool) -> AppResult<LocationTree> {
    let mut levels = HashMap::new();
    for kind in NodeKind::ALL {
        let parent = kind.parent_column().unwrap_or("NULL::uuid");
        let nodes = sqlx::query_as::<_, LocationNode>(&format!("SELECT id, {parent} AS parent_id, name, code, is_active FROM {}", kind.table()))
            .fetch_all(pool)
            .await?;
        levels.insert(kind, nodes);
    }
    Ok(build_tree(&levels))
}
