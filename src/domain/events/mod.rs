//! Domain events
use serde::Serialize;
use uuid::Uuid;

use crate::domain::inventory::MovementType;

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Inventory(InventoryEvent),
    Catalog(CatalogEvent),
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InventoryEvent {
    StockChanged { inventory_id: Uuid, section_id: Uuid, product_id: Uuid, movement_type: MovementType, delta: i32, quantity: i32 },
    StockTransferred { product_id: Uuid, from_section_id: Uuid, to_section_id: Uuid, quantity: i32 },
    InventoryRemoved { inventory_id: Uuid, section_id: Uuid, product_id: Uuid },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CatalogEvent {
    ProductCreated { product_id: Uuid, sku: String },
    ProductUpdated { product_id: Uuid },
    ProductDeleted { product_id: Uuid },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> String {
        match self {
            Self::Inventory(e) => format!("warehouse.inventory.{}", match e {
                InventoryEvent::StockChanged { movement_type, .. } => movement_type.as_str(),
                InventoryEvent::StockTransferred { .. } => "transfer",
                InventoryEvent::InventoryRemoved { .. } => "removed",
            }),
            Self::Catalog(e) => format!("catalog.product.{}", match e {
                CatalogEvent::ProductCreated { .. } => "created",
                CatalogEvent::ProductUpdated { .. } => "updated",
                CatalogEvent::ProductDeleted { .. } => "deleted",
            }),
        }
    }
}

impl From<InventoryEvent> for DomainEvent {
    fn from(e: InventoryEvent) -> Self { Self::Inventory(e) }
}

impl From<CatalogEvent> for DomainEvent {
    fn from(e: CatalogEvent) -> Self { Self::Catalog(e) }
}
