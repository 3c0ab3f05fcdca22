//! Warehouse efficiency metrics derived from SQL aggregates

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Utilization above this point counts as overcrowding.
pub const OPTIMAL_UTILIZATION_PCT: f64 = 85.0;
const OVERCROWDING_PENALTY_PER_PCT: f64 = 4.0;

/// One row of the per-warehouse aggregate query. Inbound and outbound count
/// receipts, shipments and transfers that cross the warehouse boundary;
/// moves between sections of the same warehouse are neither.
#[derive(Clone, Debug, Default, PartialEq, sqlx::FromRow)]
pub struct WarehouseAggregate {
    pub warehouse_id: Uuid,
    pub warehouse_name: String,
    pub section_count: i64,
    pub total_capacity: i64,
    pub item_count: i64,
    pub total_quantity: i64,
    pub reserved_quantity: i64,
    pub stock_value: Decimal,
    pub low_stock_count: i64,
    pub out_of_stock_count: i64,
    pub inbound_units: i64,
    pub outbound_units: i64,
    /// Net signed correction; not part of the stock flow.
    pub adjustment_units: i64,
    pub movement_count: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WarehouseMetrics {
    pub warehouse_id: Uuid,
    pub warehouse_name: String,
    pub section_count: i64,
    pub total_capacity: i64,
    pub item_count: i64,
    pub total_quantity: i64,
    pub reserved_quantity: i64,
    pub stock_value: Decimal,
    pub low_stock_count: i64,
    pub out_of_stock_count: i64,
    pub inbound_units: i64,
    pub outbound_units: i64,
    /// Net signed correction; not part of the stock flow.
    pub adjustment_units: i64,
    pub movement_count: i64,
    pub utilization_pct: Option<f64>,
    pub turnover: f64,
    pub stock_health_pct: f64,
    pub efficiency_score: f64,
}

impl From<WarehouseAggregate> for WarehouseMetrics {
    fn from(a: WarehouseAggregate) -> Self {
        let utilization_pct = utilization(a.total_quantity, a.total_capacity);
        let turnover = a.outbound_units as f64 / a.total_quantity.max(1) as f64;
        let stock_health_pct = stock_health(a.low_stock_count, a.item_count);
        let efficiency_score = efficiency_score(utilization_pct, turnover, stock_health_pct);
        Self {
            warehouse_id: a.warehouse_id,
            warehouse_name: a.warehouse_name,
            section_count: a.section_count,
            total_capacity: a.total_capacity,
            item_count: a.item_count,
            total_quantity: a.total_quantity,
            reserved_quantity: a.reserved_quantity,
            stock_value: a.stock_value,
            low_stock_count: a.low_stock_count,
            out_of_stock_count: a.out_of_stock_count,
            inbound_units: a.inbound_units,
            outbound_units: a.outbound_units,
            adjustment_units: a.adjustment_units,
            movement_count: a.movement_count,
            utilization_pct,
            turnover: round2(turnover),
            stock_health_pct: round2(stock_health_pct),
            efficiency_score: round2(efficiency_score),
        }
    }
}

pub fn utilization(quantity: i64, capacity: i64) -> Option<f64> {
    (capacity > 0).then(|| round2(quantity as f64 / capacity as f64 * 100.0))
}

pub fn stock_health(low_stock: i64, items: i64) -> f64 {
    if items <= 0 { return 0.0; }
    (1.0 - low_stock.min(items) as f64 / items as f64) * 100.0
}

fn utilization_score(utilization_pct: Option<f64>) -> f64 {
    match utilization_pct {
        None => 0.0,
        Some(u) if u <= OPTIMAL_UTILIZATION_PCT => u / OPTIMAL_UTILIZATION_PCT * 100.0,
        Some(u) => (100.0 - (u - OPTIMAL_UTILIZATION_PCT) * OVERCROWDING_PENALTY_PER_PCT).max(0.0),
    }
}

/// Weighted 0–100 score: 40 % space utilization, 30 % turnover, 30 % stock health.
pub fn efficiency_score(utilization_pct: Option<f64>, turnover: f64, stock_health_pct: f64) -> f64 {
    let turnover_score = turnover.clamp(0.0, 1.0) * 100.0;
    (0.4 * utilization_score(utilization_pct) + 0.3 * turnover_score + 0.3 * stock_health_pct).clamp(0.0, 100.0)
}

fn round2(v: f64) -> f64 { (v * 100.0).round() / 100.0 }

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub warehouse_count: usize,
    pub total_capacity: i64,
    pub total_quantity: i64,
    pub stock_value: Decimal,
    pub low_stock_count: i64,
    pub out_of_stock_count: i64,
    pub inbound_units: i64,
    pub outbound_units: i64,
    pub utilization_pct: Option<f64>,
    pub average_efficiency: f64,
}

impl AnalyticsSummary {
    pub fn from_metrics(metrics: &[WarehouseMetrics]) -> Self {
        let mut s = Self { warehouse_count: metrics.len(), ..Self::default() };
        for m in metrics {
            s.total_capacity += m.total_capacity;
            s.total_quantity += m.total_quantity;
            s.stock_value += m.stock_value;
            s.low_stock_count += m.low_stock_count;
            s.out_of_stock_count += m.out_of_stock_count;
            s.inbound_units += m.inbound_units;
            s.outbound_units += m.outbound_units;
        }
        s.utilization_pct = utilization(s.total_quantity, s.total_capacity);
        if !metrics.is_empty() {
            s.average_efficiency = round2(metrics.iter().map(|m| m.efficiency_score).sum::<f64>() / metrics.len() as f64);
        }
        s
    }
}

/// Movements per day and type within the analytics window.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct DailyMovement {
    pub day: NaiveDate,
    pub movement_type: String,
    pub movement_count: i64,
    pub units: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub days: i32,
    pub summary: AnalyticsSummary,
    pub warehouses: Vec<WarehouseMetrics>,
    pub daily: Vec<DailyMovement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregate() -> WarehouseAggregate {
        WarehouseAggregate {
            warehouse_id: Uuid::nil(),
            warehouse_name: "Main".into(),
            section_count: 4,
            total_capacity: 1000,
            item_count: 10,
            total_quantity: 850,
            stock_value: Decimal::new(125_000, 2),
            low_stock_count: 2,
            outbound_units: 425,
            ..WarehouseAggregate::default()
        }
    }

    #[test]
    fn test_metrics_at_optimal_utilization() {
        let m = WarehouseMetrics::from(aggregate());
        assert_eq!(m.utilization_pct, Some(85.0));
        assert_eq!(m.turnover, 0.5);
        assert_eq!(m.stock_health_pct, 80.0);
        // 0.4*100 + 0.3*50 + 0.3*80
        assert_eq!(m.efficiency_score, 79.0);
    }

    #[test]
    fn test_overcrowding_is_penalised() {
        let crowded = WarehouseAggregate { total_quantity: 950, outbound_units: 0, low_stock_count: 0, ..aggregate() };
        let m = WarehouseMetrics::from(crowded);
        // utilization 95 % → 100 - 10*4 = 60
        assert_eq!(m.efficiency_score, round2(0.4 * 60.0 + 0.3 * 100.0));
    }

    #[test]
    fn test_empty_warehouse() {
        let m = WarehouseMetrics::from(WarehouseAggregate::default());
        assert_eq!(m.utilization_pct, None);
        assert_eq!(m.turnover, 0.0);
        assert_eq!(m.stock_health_pct, 0.0);
        assert_eq!(m.efficiency_score, 0.0);
    }

    #[test]
    fn test_summary() {
        let a = WarehouseMetrics::from(aggregate());
        let b = WarehouseMetrics::from(WarehouseAggregate { total_capacity: 0, total_quantity: 0, stock_value: Decimal::ONE, ..aggregate() });
        let s = AnalyticsSummary::from_metrics(&[a.clone(), b.clone()]);
        assert_eq!(s.warehouse_count, 2);
        assert_eq!(s.total_capacity, 1000);
        assert_eq!(s.stock_value, Decimal::new(125_100, 2));
        assert_eq!(s.utilization_pct, Some(85.0));
        assert_eq!(s.average_efficiency, round2((a.efficiency_score + b.efficiency_score) / 2.0));
        assert_eq!(AnalyticsSummary::from_metrics(&[]).average_efficiency, 0.0);
    }
}
