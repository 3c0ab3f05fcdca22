//! Integration tests against a throwaway Postgres 16 container.

use chrono::{Duration, Utc};
use prosthetics_store::db::catalog::{self, CategoryInput, NewProduct, VariantInput};
use prosthetics_store::db::inventory::{self, InventoryUpdate, MovementContext, NewInventory, StockOp, TransferRequest};
use prosthetics_store::db::locations::{self, Location, LocationInput};
use prosthetics_store::db::analytics;
use prosthetics_store::domain::inventory::MovementType;
use prosthetics_store::domain::location::{BulkAction, NodeKind};
use prosthetics_store::AppError;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;

async fn create_database() -> (ContainerAsync<Postgres>, PgPool) {
    let container = Postgres::default()
        .with_tag("16")
        .start()
        .await
        .expect("Failed to start Postgres container");

    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(5432).await.unwrap();
    let url = format!("postgres://postgres:postgres@{host}:{port}/postgres");

    let pool = PgPoolOptions::new().max_connections(5).connect(&url).await.expect("Failed to connect to Postgres");
    sqlx::migrate!("./migrations").run(&pool).await.expect("Failed to run migrations");
    (container, pool)
}

fn input<T: DeserializeOwned>(v: Value) -> T {
    serde_json::from_value(v).unwrap()
}

fn id_of(loc: &Location) -> Uuid {
    match loc {
        Location::Region(r) => r.id,
        Location::City(c) => c.id,
        Location::Warehouse(w) => w.id,
        Location::Zone(z) => z.id,
        Location::Section(s) => s.id,
    }
}

async fn node(pool: &PgPool, kind: NodeKind, parent: Option<Uuid>, code: &str) -> Uuid {
    let body: LocationInput = input(json!({ "parent_id": parent, "name": code, "code": code, "capacity": 100 }));
    id_of(&locations::create(pool, kind, &body).await.unwrap())
}

struct Site { warehouse: Uuid, zone: Uuid, shelf_a: Uuid, shelf_b: Uuid }

/// One warehouse with a single zone and two sections.
async fn site(pool: &PgPool) -> Site {
    let region = node(pool, NodeKind::Region, None, "MSK").await;
    let city = node(pool, NodeKind::City, Some(region), "MOW").await;
    let warehouse = node(pool, NodeKind::Warehouse, Some(city), "WH1").await;
    let zone = node(pool, NodeKind::Zone, Some(warehouse), "Z1").await;
    let shelf_a = node(pool, NodeKind::Section, Some(zone), "A1").await;
    let shelf_b = node(pool, NodeKind::Section, Some(zone), "B1").await;
    Site { warehouse, zone, shelf_a, shelf_b }
}

async fn product(pool: &PgPool, name: &str) -> Uuid {
    let body: NewProduct = input(json!({ "name": name, "price": "1500.00" }));
    catalog::create_product(pool, &body, "RUB").await.unwrap().id
}

async fn stock(pool: &PgPool, section: Uuid, product: Uuid, quantity: i32) -> Uuid {
    let body: NewInventory = input(json!({ "section_id": section, "product_id": product, "quantity": quantity }));
    inventory::create(pool, &body, &MovementContext::default(), 5).await.unwrap().inventory[0].id
}

fn keyed(key: &str) -> MovementContext {
    MovementContext { idempotency_key: Some(key.into()), ..Default::default() }
}

fn transfer_body(from: Uuid, to: Uuid, quantity: i32) -> TransferRequest {
    input(json!({ "from_inventory_id": from, "to_section_id": to, "quantity": quantity }))
}

#[tokio::test]
async fn test_ledger_matches_stored_quantity() {
    let (_container, pool) = create_database().await;
    let site = site(&pool).await;
    let knee = product(&pool, "Knee joint").await;
    let row = stock(&pool, site.shelf_a, knee, 10).await;
    let ctx = MovementContext::default();

    inventory::apply_stock_op(&pool, row, StockOp::Receive(5), None, &ctx).await.unwrap();
    inventory::apply_stock_op(&pool, row, StockOp::Ship(4), None, &ctx).await.unwrap();
    let outcome = inventory::apply_stock_op(&pool, row, StockOp::Adjust(-2), None, &ctx).await.unwrap();
    assert_eq!(outcome.inventory[0].quantity, 9);
    assert_eq!(outcome.movements[0].movement_type, MovementType::Adjustment);
    assert_eq!(outcome.movements[0].quantity_before, 11);

    let err = inventory::apply_stock_op(&pool, row, StockOp::Ship(50), None, &ctx).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock { available: 9, requested: 50 }));

    let check = inventory::reconcile(&pool, row).await.unwrap();
    assert!(check.consistent);
    assert_eq!(check.ledger_quantity, 9);
    assert_eq!(check.movement_count, 4);
}

#[tokio::test]
async fn test_stale_version_rejected() {
    let (_container, pool) = create_database().await;
    let site = site(&pool).await;
    let row = stock(&pool, site.shelf_a, product(&pool, "Socket").await, 3).await;
    let current = inventory::get(&pool, row).await.unwrap().version;

    let err = inventory::apply_stock_op(&pool, row, StockOp::Receive(1), Some(current - 1), &MovementContext::default()).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert!(inventory::apply_stock_op(&pool, row, StockOp::Receive(1), Some(current), &MovementContext::default()).await.is_ok());
}

#[tokio::test]
async fn test_idempotent_replay_and_scope_conflict() {
    let (_container, pool) = create_database().await;
    let site = site(&pool).await;
    let row = stock(&pool, site.shelf_a, product(&pool, "Foot module").await, 2).await;

    let first = inventory::apply_stock_op(&pool, row, StockOp::Receive(3), None, &keyed("delivery-17")).await.unwrap();
    let again = inventory::apply_stock_op(&pool, row, StockOp::Receive(3), None, &keyed("delivery-17")).await.unwrap();
    assert!(!first.replayed);
    assert!(again.replayed);
    assert_eq!(again.movements[0].id, first.movements[0].id);
    assert!(again.events().is_empty());
    assert_eq!(inventory::get(&pool, row).await.unwrap().quantity, 5);

    let err = inventory::apply_stock_op(&pool, row, StockOp::Ship(1), None, &keyed("delivery-17")).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(inventory::get(&pool, row).await.unwrap().quantity, 5);
}

#[tokio::test]
async fn test_transfer_writes_two_linked_rows() {
    let (_container, pool) = create_database().await;
    let site = site(&pool).await;
    let liner = product(&pool, "Silicone liner").await;
    let row = stock(&pool, site.shelf_a, liner, 8).await;

    let outcome = inventory::transfer(&pool, &transfer_body(row, site.shelf_b, 3)).await.unwrap();
    let [out, inc] = &outcome.movements[..] else { panic!("expected two movements") };
    assert_eq!((out.quantity_delta, inc.quantity_delta), (-3, 3));
    assert_eq!(out.movement_type, MovementType::Transfer);
    assert_eq!(inc.movement_type, MovementType::Transfer);
    assert!(out.operation_id.is_some());
    assert_eq!(out.operation_id, inc.operation_id);
    assert_eq!((out.section_id, inc.section_id), (site.shelf_a, site.shelf_b));

    let target = outcome.inventory[1].id;
    assert_eq!(outcome.inventory[0].quantity, 5);
    assert_eq!(inventory::get(&pool, target).await.unwrap().quantity, 3);
    assert!(inventory::reconcile(&pool, row).await.unwrap().consistent);
    assert!(inventory::reconcile(&pool, target).await.unwrap().consistent);

    // a second transfer reuses the target row
    let again = inventory::transfer(&pool, &transfer_body(row, site.shelf_b, 1)).await.unwrap();
    assert_eq!(again.inventory[1].id, target);
    assert_eq!(again.inventory[1].quantity, 4);
}

#[tokio::test]
async fn test_transfer_to_own_section_rejected() {
    let (_container, pool) = create_database().await;
    let site = site(&pool).await;
    let row = stock(&pool, site.shelf_a, product(&pool, "Pylon").await, 4).await;

    let err = inventory::transfer(&pool, &transfer_body(row, site.shelf_a, 1)).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(inventory::get(&pool, row).await.unwrap().quantity, 4);
}

#[tokio::test]
async fn test_variant_of_other_product_rejected_with_explicit_sku() {
    let (_container, pool) = create_database().await;
    let site = site(&pool).await;
    let hand = product(&pool, "Myoelectric hand").await;
    let foot = product(&pool, "Carbon foot").await;
    let variant: VariantInput = input(json!({ "sku": "HAND-L", "name": "Left" }));
    let left = catalog::create_variant(&pool, hand, &variant).await.unwrap().id;

    for sku in [None, Some("CUSTOM-1")] {
        let body: NewInventory = input(json!({ "section_id": site.shelf_a, "product_id": foot, "variant_id": left, "sku": sku, "quantity": 1 }));
        let err = inventory::create(&pool, &body, &MovementContext::default(), 5).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Variant does not belong to product"), "sku {sku:?}: {err}");
    }

    let body: NewInventory = input(json!({ "section_id": site.shelf_a, "product_id": hand, "variant_id": left, "sku": "custom-1", "quantity": 1 }));
    let created = inventory::create(&pool, &body, &MovementContext::default(), 5).await.unwrap();
    assert_eq!(created.inventory[0].sku, "CUSTOM-1");
}

#[tokio::test]
async fn test_delete_refused_while_reserved() {
    let (_container, pool) = create_database().await;
    let site = site(&pool).await;
    let row = stock(&pool, site.shelf_a, product(&pool, "Elbow").await, 5).await;
    let update: InventoryUpdate = input(json!({ "quantity": 5, "reserved_quantity": 2 }));
    inventory::update(&pool, row, &update, &MovementContext::default()).await.unwrap();

    let err = inventory::delete(&pool, row, None, &MovementContext::default()).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(inventory::get(&pool, row).await.unwrap().quantity, 5);

    let release: InventoryUpdate = input(json!({ "quantity": 5, "reserved_quantity": 0 }));
    inventory::update(&pool, row, &release, &MovementContext::default()).await.unwrap();
    let removed = inventory::delete(&pool, row, None, &MovementContext::default()).await.unwrap();
    assert_eq!(removed.movements[0].quantity_delta, -5);
    assert_eq!(removed.movements[0].inventory_id, None);
    assert!(matches!(inventory::get(&pool, row).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_location_delete_refused_with_children_or_stock() {
    let (_container, pool) = create_database().await;
    let site = site(&pool).await;
    stock(&pool, site.shelf_a, product(&pool, "Knee brace").await, 1).await;

    let err = locations::delete(&pool, NodeKind::Zone, site.zone).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    let err = locations::delete(&pool, NodeKind::Section, site.shelf_a).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    locations::delete(&pool, NodeKind::Section, site.shelf_b).await.unwrap();
    assert!(matches!(locations::get(&pool, NodeKind::Section, site.shelf_b).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_bulk_reports_each_id() {
    let (_container, pool) = create_database().await;
    let site = site(&pool).await;
    let missing = Uuid::now_v7();

    let report = locations::bulk(&pool, NodeKind::Section, BulkAction::Deactivate, &[site.shelf_a, missing, site.shelf_b]).await;
    assert_eq!(report.succeeded, vec![site.shelf_a, site.shelf_b]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].id, missing);

    let Location::Section(shelf) = locations::get(&pool, NodeKind::Section, site.shelf_a).await.unwrap() else { panic!("expected a section") };
    assert!(!shelf.is_active);

    // the zone still has sections, the empty section goes
    let report = locations::bulk(&pool, NodeKind::Section, BulkAction::Delete, &[site.shelf_b]).await;
    assert!(report.is_complete_success());
    let report = locations::bulk(&pool, NodeKind::Zone, BulkAction::Delete, &[site.zone]).await;
    assert_eq!(report.failed.len(), 1);
}

#[tokio::test]
async fn test_category_cycle_refused() {
    let (_container, pool) = create_database().await;
    let root: CategoryInput = input(json!({ "name": "Lower limb" }));
    let root = catalog::create_category(&pool, &root).await.unwrap();
    let child: CategoryInput = input(json!({ "name": "Knees", "parent_id": root.id }));
    let child = catalog::create_category(&pool, &child).await.unwrap();
    let grandchild: CategoryInput = input(json!({ "name": "Hydraulic knees", "parent_id": child.id }));
    let grandchild = catalog::create_category(&pool, &grandchild).await.unwrap();

    let under_grandchild: CategoryInput = input(json!({ "name": "Lower limb", "parent_id": grandchild.id }));
    let err = catalog::update_category(&pool, root.id, &under_grandchild).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    let under_self: CategoryInput = input(json!({ "name": "Knees", "parent_id": child.id }));
    assert!(matches!(catalog::update_category(&pool, child.id, &under_self).await, Err(AppError::Conflict(_))));

    let err = catalog::delete_category(&pool, root.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_analytics_flow_ignores_internal_transfers() {
    let (_container, pool) = create_database().await;
    let site = site(&pool).await;
    let ctx = MovementContext::default();
    let row = stock(&pool, site.shelf_a, product(&pool, "Prosthetic socket").await, 10).await;

    inventory::apply_stock_op(&pool, row, StockOp::Ship(3), None, &ctx).await.unwrap();
    let moved = inventory::transfer(&pool, &transfer_body(row, site.shelf_b, 4)).await.unwrap();
    inventory::transfer(&pool, &transfer_body(moved.inventory[1].id, site.shelf_a, 2)).await.unwrap();
    inventory::apply_stock_op(&pool, row, StockOp::Adjust(1), None, &ctx).await.unwrap();

    let since = Utc::now() - Duration::days(1);
    let rows = analytics::aggregate(&pool, Some(site.warehouse), since).await.unwrap();
    let wh = rows.iter().find(|r| r.warehouse_id == site.warehouse).expect("warehouse row");
    assert_eq!(wh.inbound_units, 10);
    assert_eq!(wh.outbound_units, 3);
    assert_eq!(wh.adjustment_units, 1);
    assert_eq!(wh.total_quantity, 8);
    assert_eq!(wh.item_count, 2);
    assert_eq!(wh.section_count, 2);
    assert_eq!(wh.total_capacity, 200);
    assert_eq!(wh.movement_count, 7);
}

#[tokio::test]
async fn test_analytics_counts_transfers_between_warehouses() {
    let (_container, pool) = create_database().await;
    let site = site(&pool).await;
    let city = {
        let Location::Warehouse(w) = locations::get(&pool, NodeKind::Warehouse, site.warehouse).await.unwrap() else { panic!("expected a warehouse") };
        w.city_id
    };
    let other = node(&pool, NodeKind::Warehouse, Some(city), "WH2").await;
    let other_zone = node(&pool, NodeKind::Zone, Some(other), "Z1").await;
    let other_shelf = node(&pool, NodeKind::Section, Some(other_zone), "C1").await;
    let row = stock(&pool, site.shelf_a, product(&pool, "Wrist unit").await, 6).await;

    inventory::transfer(&pool, &transfer_body(row, other_shelf, 2)).await.unwrap();

    let rows = analytics::aggregate(&pool, None, Utc::now() - Duration::days(1)).await.unwrap();
    let source = rows.iter().find(|r| r.warehouse_id == site.warehouse).expect("source row");
    let target = rows.iter().find(|r| r.warehouse_id == other).expect("target row");
    assert_eq!((source.inbound_units, source.outbound_units), (6, 2));
    assert_eq!((target.inbound_units, target.outbound_units), (2, 0));
}
