//! Stock level arithmetic behind every ledger entry.
//!
//! Each mutation of a `warehouse_inventory` row goes through [`StockLevel`],
//! which yields the [`StockChange`] that is written to `warehouse_movements`
//! in the same transaction. The delta of a change is always
//! `quantity_after - quantity_before`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::Quantity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum MovementType { In, Out, Transfer, Adjustment }

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
            Self::Transfer => "transfer",
            Self::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Quantity change to apply to one inventory row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StockChange {
    pub movement_type: MovementType,
    pub before: i32,
    pub delta: i32,
}

impl StockChange {
    pub fn after(&self) -> i32 { self.before + self.delta }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StockLevel {
    pub quantity: i32,
    pub reserved: i32,
}

impl StockLevel {
    pub fn new(quantity: i32, reserved: i32) -> Self { Self { quantity, reserved } }

    pub fn available(&self) -> i32 { (self.quantity - self.reserved).max(0) }

    pub fn receive(&self, qty: i32) -> Result<StockChange, InventoryError> {
        let qty = positive(qty)?;
        Quantity::try_from_i32(self.quantity).unwrap_or_default().add(qty.unsigned_abs()).ok_or(InventoryError::Overflow)?;
        Ok(self.change(MovementType::In, qty))
    }

    pub fn ship(&self, qty: i32) -> Result<StockChange, InventoryError> {
        let qty = positive(qty)?;
        let available = Quantity::try_from_i32(self.available()).unwrap_or_default();
        available
            .subtract(qty.unsigned_abs())
            .ok_or(InventoryError::InsufficientStock { available: available.as_i32(), requested: qty })?;
        Ok(self.change(MovementType::Out, -qty))
    }

    /// Absolute correction. Returns `None` when the quantity is unchanged so
    /// no empty ledger entry is written.
    pub fn set_quantity(&self, new_quantity: i32) -> Result<Option<StockChange>, InventoryError> {
        Quantity::try_from_i32(new_quantity).ok_or(InventoryError::NegativeQuantity(new_quantity))?;
        if new_quantity < self.reserved {
            return Err(InventoryError::BelowReserved { reserved: self.reserved, requested: new_quantity });
        }
        let delta = movement_delta(self.quantity, new_quantity);
        Ok((delta != 0).then(|| self.change(MovementType::Adjustment, delta)))
    }

    pub fn adjust(&self, delta: i32) -> Result<StockChange, InventoryError> {
        if delta == 0 { return Err(InventoryError::ZeroAdjustment); }
        let target = self.quantity.checked_add(delta).ok_or(InventoryError::Overflow)?;
        match self.set_quantity(target)? {
            Some(change) => Ok(change),
            None => Err(InventoryError::ZeroAdjustment),
        }
    }

    pub fn transfer_out(&self, qty: i32) -> Result<StockChange, InventoryError> {
        let shipped = self.ship(qty)?;
        Ok(StockChange { movement_type: MovementType::Transfer, ..shipped })
    }

    pub fn transfer_in(&self, qty: i32) -> Result<StockChange, InventoryError> {
        let received = self.receive(qty)?;
        Ok(StockChange { movement_type: MovementType::Transfer, ..received })
    }

    /// Writing off a row before it is removed.
    pub fn remove_all(&self) -> Result<Option<StockChange>, InventoryError> {
        if self.reserved > 0 {
            return Err(InventoryError::StillReserved(self.reserved));
        }
        Ok((self.quantity > 0).then(|| self.change(MovementType::Out, -self.quantity)))
    }

    fn change(&self, movement_type: MovementType, delta: i32) -> StockChange {
        StockChange { movement_type, before: self.quantity, delta }
    }
}

pub fn movement_delta(old_quantity: i32, new_quantity: i32) -> i32 { new_quantity - old_quantity }

fn positive(qty: i32) -> Result<i32, InventoryError> {
    if qty <= 0 { Err(InventoryError::NonPositiveQuantity(qty)) } else { Ok(qty) }
}

/// Optimistic lock check for callers that read a row before changing it.
pub fn check_version(current: i32, expected: Option<i32>) -> Result<(), InventoryError> {
    match expected {
        Some(expected) if expected != current => Err(InventoryError::VersionMismatch { expected, current }),
        _ => Ok(()),
    }
}

/// Ledger vs. stored quantity for one inventory row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub inventory_id: Uuid,
    pub recorded_quantity: i32,
    pub ledger_quantity: i64,
    pub discrepancy: i64,
    pub movement_count: i64,
    pub consistent: bool,
}

impl Reconciliation {
    pub fn compute(inventory_id: Uuid, recorded_quantity: i32, ledger_quantity: i64, movement_count: i64) -> Self {
        let discrepancy = i64::from(recorded_quantity) - ledger_quantity;
        Self { inventory_id, recorded_quantity, ledger_quantity, discrepancy, movement_count, consistent: discrepancy == 0 }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("Quantity must be positive, got {0}")]
    NonPositiveQuantity(i32),

    #[error("Quantity cannot be negative, got {0}")]
    NegativeQuantity(i32),

    #[error("Adjustment does not change the quantity")]
    ZeroAdjustment,

    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { available: i32, requested: i32 },

    #[error("Quantity {requested} is below reserved quantity {reserved}")]
    BelowReserved { reserved: i32, requested: i32 },

    #[error("Inventory row still holds {0} reserved units")]
    StillReserved(i32),

    #[error("Inventory row was modified (expected version {expected}, current {current})")]
    VersionMismatch { expected: i32, current: i32 },

    #[error("Source and target section are the same")]
    SameSection,

    #[error("Quantity out of range")]
    Overflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_sum<'a>(deltas: impl IntoIterator<Item = &'a StockChange>) -> i64 {
        deltas.into_iter().map(|c| i64::from(c.delta)).sum()
    }

    #[test]
    fn test_receive_and_ship() {
        let level = StockLevel::new(10, 2);
        let r = level.receive(5).unwrap();
        assert_eq!((r.movement_type, r.delta, r.after()), (MovementType::In, 5, 15));

        let s = level.ship(8).unwrap();
        assert_eq!((s.movement_type, s.delta, s.after()), (MovementType::Out, -8, 2));

        assert_eq!(level.ship(9), Err(InventoryError::InsufficientStock { available: 8, requested: 9 }));
        assert_eq!(level.receive(0), Err(InventoryError::NonPositiveQuantity(0)));
        assert_eq!(StockLevel::new(i32::MAX - 1, 0).receive(2), Err(InventoryError::Overflow));
    }

    #[test]
    fn test_delta_matches_quantity_difference() {
        let level = StockLevel::new(7, 0);
        for new_quantity in [0, 3, 7, 12, 40] {
            match level.set_quantity(new_quantity).unwrap() {
                Some(change) => {
                    assert_eq!(change.delta, movement_delta(7, new_quantity));
                    assert_eq!(change.after(), new_quantity);
                }
                None => assert_eq!(new_quantity, 7),
            }
        }
    }

    #[test]
    fn test_set_quantity_respects_reservations() {
        let level = StockLevel::new(10, 4);
        assert_eq!(level.set_quantity(3), Err(InventoryError::BelowReserved { reserved: 4, requested: 3 }));
        assert_eq!(level.set_quantity(-1), Err(InventoryError::NegativeQuantity(-1)));
        assert_eq!(level.adjust(-6).unwrap().after(), 4);
        assert_eq!(level.adjust(0), Err(InventoryError::ZeroAdjustment));
    }

    #[test]
    fn test_transfer_pair_balances() {
        let source = StockLevel::new(6, 0);
        let target = StockLevel::new(1, 0);
        let out = source.transfer_out(4).unwrap();
        let inc = target.transfer_in(4).unwrap();
        assert_eq!(out.movement_type, MovementType::Transfer);
        assert_eq!(ledger_sum([&out, &inc]), 0);
        assert_eq!((out.after(), inc.after()), (2, 5));
    }

    #[test]
    fn test_remove_all() {
        assert_eq!(StockLevel::new(0, 0).remove_all().unwrap(), None);
        assert_eq!(StockLevel::new(3, 0).remove_all().unwrap().map(|c| c.delta), Some(-3));
        assert_eq!(StockLevel::new(3, 1).remove_all(), Err(InventoryError::StillReserved(1)));
    }

    #[test]
    fn test_reconciliation() {
        let id = Uuid::nil();
        let history = [
            StockLevel::new(0, 0).receive(10).unwrap(),
            StockLevel::new(10, 0).ship(4).unwrap(),
            StockLevel::new(6, 0).adjust(-1).unwrap(),
        ];
        let ok = Reconciliation::compute(id, 5, ledger_sum(&history), history.len() as i64);
        assert!(ok.consistent);
        let drift = Reconciliation::compute(id, 8, ledger_sum(&history), 3);
        assert_eq!(drift.discrepancy, 3);
        assert!(!drift.consistent);
    }

    #[test]
    fn test_version_check() {
        assert!(check_version(3, None).is_ok());
        assert!(check_version(3, Some(3)).is_ok());
        assert_eq!(check_version(4, Some(3)), Err(InventoryError::VersionMismatch { expected: 3, current: 4 }));
    }

    #[test]
    fn test_movement_type_wire_format() {
        assert_eq!(serde_json::from_str::<MovementType>("\"transfer\"").unwrap(), MovementType::Transfer);
        assert!(serde_json::from_str::<MovementType>("\"loss\"").is_err());
        assert_eq!(serde_json::to_string(&MovementType::Adjustment).unwrap(), "\"adjustment\"");
    }
}
