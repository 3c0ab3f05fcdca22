//! Ledger queries

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::db::inventory::Movement;
use crate::db::Page;
use crate::domain::inventory::MovementType;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovementFilter {
    pub inventory_id: Option<Uuid>,
    pub section_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub operation_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl MovementFilter {
    pub fn check(&self) -> AppResult<()> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => Err(AppError::validation("`from` is after `to`")),
            _ => Ok(()),
        }
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, f: &MovementFilter) {
    qb.push(" WHERE TRUE");
    if let Some(v) = f.inventory_id { qb.push(" AND m.inventory_id = ").push_bind(v); }
    if let Some(v) = f.section_id { qb.push(" AND m.section_id = ").push_bind(v); }
    if let Some(v) = f.product_id { qb.push(" AND m.product_id = ").push_bind(v); }
    if let Some(v) = f.operation_id { qb.push(" AND m.operation_id = ").push_bind(v); }
    if let Some(v) = f.movement_type { qb.push(" AND m.movement_type = ").push_bind(v); }
    if let Some(v) = f.from { qb.push(" AND m.created_at >= ").push_bind(v); }
    if let Some(v) = f.to { qb.push(" AND m.created_at < ").push_bind(v); }
    if let Some(v) = f.warehouse_id {
        qb.push(" AND m.section_id IN (SELECT s.id FROM warehouse_sections s JOIN warehouse_zones z ON z.id = s.zone_id WHERE z.warehouse_id = ")
            .push_bind(v)
            .push(")");
    }
}

/// Newest first.
pub async fn list(pool: &PgPool, f: &MovementFilter, page: &Page) -> AppResult<(Vec<Movement>, i64)> {
    f.check()?;
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM warehouse_movements m");
    push_filters(&mut count, f);
    let (total,): (i64,) = count.build_query_as().fetch_one(pool).await?;

    let mut qb = QueryBuilder::new("SELECT m.* FROM warehouse_movements m");
    push_filters(&mut qb, f);
    qb.push(" ORDER BY m.created_at DESC, m.id DESC LIMIT ").push_bind(page.limit()).push(" OFFSET ").push_bind(page.offset());
    Ok((qb.build_query_as::<Movement>().fetch_all(pool).await?, total))
}
