//! Aggregation queries behind the warehouse analytics endpoint

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::analytics::{AnalyticsReport, AnalyticsSummary, DailyMovement, WarehouseAggregate, WarehouseMetrics};
use crate::error::AppResult;

pub const MAX_WINDOW_DAYS: i32 = 365;

// Capacity, stock and movements are aggregated in separate CTEs so the
// joins don't multiply each other's rows.
const AGGREGATE_SQL: &str = r#"
WITH caps AS (
    SELECT z.warehouse_id, COUNT(s.id) AS section_count, COALESCE(SUM(s.capacity), 0)::BIGINT AS total_capacity
    FROM warehouse_zones z
    JOIN warehouse_sections s ON s.zone_id = z.id
    GROUP BY z.warehouse_id
),
stock AS (
    SELECT z.warehouse_id,
           COUNT(i.id) AS item_count,
           COALESCE(SUM(i.quantity), 0)::BIGINT AS total_quantity,
           COALESCE(SUM(i.reserved_quantity), 0)::BIGINT AS reserved_quantity,
           COALESCE(SUM(i.quantity * i.unit_cost), 0)::NUMERIC AS stock_value,
           COUNT(i.id) FILTER (WHERE i.quantity <= i.min_stock) AS low_stock_count,
           COUNT(i.id) FILTER (WHERE i.quantity = 0) AS out_of_stock_count
    FROM warehouse_inventory i
    JOIN warehouse_sections s ON s.id = i.section_id
    JOIN warehouse_zones z ON z.id = s.zone_id
    GROUP BY z.warehouse_id
),
moves AS (
    SELECT z.warehouse_id,
           COALESCE(SUM(m.quantity_delta) FILTER (WHERE m.movement_type = 'in' OR (m.movement_type = 'transfer' AND m.quantity_delta > 0 AND oz.warehouse_id IS DISTINCT FROM z.warehouse_id)), 0)::BIGINT AS inbound_units,
           COALESCE(-SUM(m.quantity_delta) FILTER (WHERE m.movement_type = 'out' OR (m.movement_type = 'transfer' AND m.quantity_delta < 0 AND oz.warehouse_id IS DISTINCT FROM z.warehouse_id)), 0)::BIGINT AS outbound_units,
           COALESCE(SUM(m.quantity_delta) FILTER (WHERE m.movement_type = 'adjustment'), 0)::BIGINT AS adjustment_units,
           COUNT(m.id) AS movement_count
    FROM warehouse_movements m
    JOIN warehouse_sections s ON s.id = m.section_id
    JOIN warehouse_zones z ON z.id = s.zone_id
    -- the other end of a transfer leg: destination for the outgoing row, origin for the incoming one
    LEFT JOIN warehouse_sections os ON os.id = CASE WHEN m.quantity_delta < 0 THEN m.to_section_id ELSE m.from_section_id END
    LEFT JOIN warehouse_zones oz ON oz.id = os.zone_id
    WHERE m.created_at >= $1
    GROUP BY z.warehouse_id
)
SELECT w.id AS warehouse_id, w.name AS warehouse_name,
       COALESCE(caps.section_count, 0) AS section_count,
       COALESCE(caps.total_capacity, 0) AS total_capacity,
       COALESCE(stock.item_count, 0) AS item_count,
       COALESCE(stock.total_quantity, 0) AS total_quantity,
       COALESCE(stock.reserved_quantity, 0) AS reserved_quantity,
       COALESCE(stock.stock_value, 0) AS stock_value,
       COALESCE(stock.low_stock_count, 0) AS low_stock_count,
       COALESCE(stock.out_of_stock_count, 0) AS out_of_stock_count,
       COALESCE(moves.inbound_units, 0) AS inbound_units,
       COALESCE(moves.outbound_units, 0) AS outbound_units,
       COALESCE(moves.adjustment_units, 0) AS adjustment_units,
       COALESCE(moves.movement_count, 0) AS movement_count
FROM warehouse_warehouses w
LEFT JOIN caps ON caps.warehouse_id = w.id
LEFT JOIN stock ON stock.warehouse_id = w.id
LEFT JOIN moves ON moves.warehouse_id = w.id
WHERE ($2::uuid IS NULL OR w.id = $2)
ORDER BY w.name
"#;

const DAILY_SQL: &str = r#"
SELECT (date_trunc('day', m.created_at AT TIME ZONE 'UTC'))::date AS day,
       m.movement_type,
       COUNT(*) AS movement_count,
       COALESCE(SUM(ABS(m.quantity_delta)), 0)::BIGINT AS units
FROM warehouse_movements m
WHERE m.created_at >= $1
  AND ($2::uuid IS NULL OR m.section_id IN (
        SELECT s.id FROM warehouse_sections s JOIN warehouse_zones z ON z.id = s.zone_id WHERE z.warehouse_id = $2))
GROUP BY 1, 2
ORDER BY 1, 2
"#;

pub async fn aggregate(pool: &PgPool, warehouse_id: Option<Uuid>, since: DateTime<Utc>) -> AppResult<Vec<WarehouseAggregate>> {
    Ok(sqlx::query_as::<_, WarehouseAggregate>(AGGREGATE_SQL).bind(since).bind(warehouse_id).fetch_all(pool).await?)
}

pub async fn daily(pool: &PgPool, warehouse_id: Option<Uuid>, since: DateTime<Utc>) -> AppResult<Vec<DailyMovement>> {
    Ok(sqlx::query_as::<_, DailyMovement>(DAILY_SQL).bind(since).bind(warehouse_id).fetch_all(pool).await?)
}

pub async fn report(pool: &PgPool, warehouse_id: Option<Uuid>, days: i32) -> AppResult<AnalyticsReport> {
    let since = Utc::now() - chrono::Duration::days(i64::from(days));
    let warehouses: Vec<WarehouseMetrics> = aggregate(pool, warehouse_id, since).await?.into_iter().map(WarehouseMetrics::from).collect();
    let daily = daily(pool, warehouse_id, since).await?;
    Ok(AnalyticsReport { days, summary: AnalyticsSummary::from_metrics(&warehouses), warehouses, daily })
}
