//! Catalog records, variant resolution, category tree and EAV characteristics

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum ProductStatus { #[default] Draft, Active, Archived, Deleted }

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid, pub sku: String, pub name: String, pub slug: String, pub description: Option<String>,
    pub price: Decimal, pub compare_at_price: Option<Decimal>, pub currency: String,
    pub category_id: Option<Uuid>, pub manufacturer_id: Option<Uuid>, pub stock_quantity: i32,
    pub status: ProductStatus, pub is_featured: bool, pub attributes: serde_json::Value,
    pub images: Vec<String>, pub tags: Vec<String>,
    pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductVariant {
    pub id: Uuid, pub product_id: Uuid, pub sku: String, pub name: String,
    pub price: Option<Decimal>, pub stock_quantity: Option<i32>, pub attributes: serde_json::Value,
    pub sort_order: i32, pub is_active: bool,
    pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid, pub name: String, pub slug: String, pub description: Option<String>,
    pub parent_id: Option<Uuid>, pub image_url: Option<String>, pub sort_order: i32, pub is_active: bool,
    pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Manufacturer {
    pub id: Uuid, pub name: String, pub slug: String, pub country: Option<String>,
    pub website: Option<String>, pub logo_url: Option<String>, pub description: Option<String>,
    pub is_active: bool, pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

/// A variant with the product's values filled in where it has no override.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedVariant {
    pub variant_id: Uuid,
    pub sku: String,
    pub name: String,
    pub price: Decimal,
    pub currency: String,
    pub stock_quantity: i32,
    pub attributes: serde_json::Value,
    pub is_active: bool,
}

pub fn resolve_variant(product: &Product, variant: &ProductVariant) -> ResolvedVariant {
    let mut attributes = match &product.attributes {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    if let serde_json::Value::Object(own) = &variant.attributes {
        attributes.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    ResolvedVariant {
        variant_id: variant.id,
        sku: variant.sku.clone(),
        name: variant.name.clone(),
        price: variant.price.unwrap_or(product.price),
        currency: product.currency.clone(),
        stock_quantity: variant.stock_quantity.unwrap_or(product.stock_quantity),
        attributes: serde_json::Value::Object(attributes),
        is_active: variant.is_active && product.status == ProductStatus::Active,
    }
}

pub fn validate_price(price: Decimal, compare_at: Option<Decimal>) -> Result<(), CatalogError> {
    if price.is_sign_negative() { return Err(CatalogError::NegativePrice); }
    if compare_at.is_some_and(|c| c.is_sign_negative()) { return Err(CatalogError::NegativePrice); }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

/// Nests categories under their parents, ordered by `sort_order` then name.
/// Categories whose parent is missing are treated as roots.
pub fn build_category_tree(categories: Vec<Category>) -> Vec<CategoryNode> {
    let ids: HashSet<Uuid> = categories.iter().map(|c| c.id).collect();
    let mut by_parent: HashMap<Option<Uuid>, Vec<Category>> = HashMap::new();
    for c in categories {
        let parent = c.parent_id.filter(|p| ids.contains(p));
        by_parent.entry(parent).or_default().push(c);
    }
    fn attach(parent: Option<Uuid>, by_parent: &mut HashMap<Option<Uuid>, Vec<Category>>) -> Vec<CategoryNode> {
        let mut level = by_parent.remove(&parent).unwrap_or_default();
        level.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
        level.into_iter().map(|category| {
            let children = attach(Some(category.id), by_parent);
            CategoryNode { category, children }
        }).collect()
    }
    attach(None, &mut by_parent)
}

/// True when making `new_parent` the parent of `id` would close a loop.
pub fn would_create_cycle(parents: &HashMap<Uuid, Option<Uuid>>, id: Uuid, new_parent: Option<Uuid>) -> bool {
    let mut cursor = new_parent;
    let mut steps = 0;
    while let Some(current) = cursor {
        if current == id { return true; }
        steps += 1;
        // A pre-existing loop that does not include `id`.
        if steps > parents.len() { return true; }
        cursor = parents.get(&current).copied().flatten();
    }
    false
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CharacteristicGroup {
    pub id: Uuid, pub name: String, pub description: Option<String>,
    pub sort_order: i32, pub is_active: bool, pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CharacteristicValue {
    pub id: Uuid, pub group_id: Uuid, pub value: String, pub color_hex: Option<String>,
    pub sort_order: i32, pub is_active: bool, pub created_at: DateTime<Utc>,
}

/// Joined product characteristic row: assignment + group + optional value.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CharacteristicRow {
    pub group_id: Uuid,
    pub group_name: String,
    pub group_sort_order: i32,
    pub value_id: Option<Uuid>,
    pub value: Option<String>,
    pub value_sort_order: Option<i32>,
    pub custom_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacteristicEntry {
    pub value_id: Option<Uuid>,
    pub value: String,
    pub is_custom: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacteristicGroupView {
    pub group_id: Uuid,
    pub group_name: String,
    pub values: Vec<CharacteristicEntry>,
}

pub fn group_characteristics(mut rows: Vec<CharacteristicRow>) -> Vec<CharacteristicGroupView> {
    rows.sort_by(|a, b| {
        (a.group_sort_order, &a.group_name, a.group_id)
            .cmp(&(b.group_sort_order, &b.group_name, b.group_id))
            // Custom text sorts after catalog values.
            .then_with(|| a.value_sort_order.unwrap_or(i32::MAX).cmp(&b.value_sort_order.unwrap_or(i32::MAX)))
    });
    let mut out: Vec<CharacteristicGroupView> = Vec::new();
    for row in rows {
        let entry = match (row.value_id, row.value, row.custom_value) {
            (Some(id), Some(value), _) => CharacteristicEntry { value_id: Some(id), value, is_custom: false },
            (_, _, Some(custom)) => CharacteristicEntry { value_id: None, value: custom, is_custom: true },
            _ => continue,
        };
        match out.last_mut() {
            Some(group) if group.group_id == row.group_id => group.values.push(entry),
            _ => out.push(CharacteristicGroupView { group_id: row.group_id, group_name: row.group_name, values: vec![entry] }),
        }
    }
    out
}

/// One characteristic on a product: a catalog value or free text in a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacteristicAssignment {
    pub group_id: Uuid,
    #[serde(default)]
    pub value_id: Option<Uuid>,
    #[serde(default)]
    pub custom_value: Option<String>,
}

impl CharacteristicAssignment {
    fn normalized(&self) -> Self {
        Self {
            group_id: self.group_id,
            value_id: self.value_id,
            custom_value: self.custom_value.as_ref().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        }
    }
}

/// Trims custom text, rejects empty and duplicate assignments.
pub fn validate_assignments(items: &[CharacteristicAssignment]) -> Result<Vec<CharacteristicAssignment>, CatalogError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let item = item.normalized();
        if item.value_id.is_none() && item.custom_value.is_none() {
            return Err(CatalogError::EmptyCharacteristic(item.group_id));
        }
        if !seen.insert(item.clone()) {
            return Err(CatalogError::DuplicateCharacteristic(item.group_id));
        }
        out.push(item);
    }
    Ok(out)
}

/// Template entries not already assigned to the product.
pub fn merge_template(existing: &[CharacteristicAssignment], template: &[CharacteristicAssignment]) -> Vec<CharacteristicAssignment> {
    let mut present: HashSet<CharacteristicAssignment> = existing.iter().map(CharacteristicAssignment::normalized).collect();
    template
        .iter()
        .map(CharacteristicAssignment::normalized)
        .filter(|t| t.value_id.is_some() || t.custom_value.is_some())
        .filter(|t| present.insert(t.clone()))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CharacteristicTemplate {
    pub id: Uuid, pub name: String, pub description: Option<String>,
    pub entries: sqlx::types::Json<Vec<CharacteristicAssignment>>,
    pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Price cannot be negative")]
    NegativePrice,

    #[error("Category cannot be moved under itself or a descendant")]
    CategoryCycle,

    #[error("Characteristic in group {0} has neither a value nor custom text")]
    EmptyCharacteristic(Uuid),

    #[error("Duplicate characteristic in group {0}")]
    DuplicateCharacteristic(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product() -> Product {
        Product {
            id: Uuid::from_u128(1), sku: "FOOT-1".into(), name: "Carbon foot".into(), slug: "carbon-foot".into(),
            description: None, price: Decimal::new(150_000, 2), compare_at_price: None, currency: "RUB".into(),
            category_id: None, manufacturer_id: None, stock_quantity: 4, status: ProductStatus::Active,
            is_featured: false, attributes: json!({"material": "carbon", "side": "any"}), images: vec![], tags: vec![],
            created_at: Utc::now(), updated_at: Utc::now(),
        }
    }

    fn variant(price: Option<Decimal>, stock: Option<i32>) -> ProductVariant {
        ProductVariant {
            id: Uuid::from_u128(2), product_id: Uuid::from_u128(1), sku: "FOOT-1-L".into(), name: "Left".into(),
            price, stock_quantity: stock, attributes: json!({"side": "left"}), sort_order: 0, is_active: true,
            created_at: Utc::now(), updated_at: Utc::now(),
        }
    }

    fn category(id: u128, parent: Option<u128>, name: &str, sort: i32) -> Category {
        Category {
            id: Uuid::from_u128(id), name: name.into(), slug: name.to_lowercase(), description: None,
            parent_id: parent.map(Uuid::from_u128), image_url: None, sort_order: sort, is_active: true,
            created_at: Utc::now(), updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_variant_falls_back_to_product() {
        let resolved = resolve_variant(&product(), &variant(None, None));
        assert_eq!(resolved.price, Decimal::new(150_000, 2));
        assert_eq!(resolved.stock_quantity, 4);
        assert_eq!(resolved.attributes, json!({"material": "carbon", "side": "left"}));
        assert!(resolved.is_active);
    }

    #[test]
    fn test_variant_overrides() {
        let mut p = product();
        p.status = ProductStatus::Draft;
        let resolved = resolve_variant(&p, &variant(Some(Decimal::new(99, 0)), Some(0)));
        assert_eq!(resolved.price, Decimal::new(99, 0));
        assert_eq!(resolved.stock_quantity, 0);
        assert!(!resolved.is_active);
    }

    #[test]
    fn test_category_tree() {
        let tree = build_category_tree(vec![
            category(1, None, "Prosthetics", 1),
            category(2, Some(1), "Feet", 2),
            category(3, Some(1), "Knees", 1),
            category(4, None, "Orthoses", 0),
            category(5, Some(42), "Stray", 5),
        ]);
        let names: Vec<_> = tree.iter().map(|n| n.category.name.as_str()).collect();
        assert_eq!(names, ["Orthoses", "Prosthetics", "Stray"]);
        let kids: Vec<_> = tree[1].children.iter().map(|n| n.category.name.as_str()).collect();
        assert_eq!(kids, ["Knees", "Feet"]);
    }

    #[test]
    fn test_cycle_detection() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        let parents = HashMap::from([(a, None), (b, Some(a)), (c, Some(b))]);
        assert!(would_create_cycle(&parents, a, Some(c)));
        assert!(would_create_cycle(&parents, a, Some(a)));
        assert!(!would_create_cycle(&parents, c, Some(a)));
        assert!(!would_create_cycle(&parents, b, None));
    }

    #[test]
    fn test_group_characteristics() {
        let g1 = Uuid::from_u128(10);
        let g2 = Uuid::from_u128(20);
        let row = |group_id, group_name: &str, gs, value: Option<(u128, &str, i32)>, custom: Option<&str>| CharacteristicRow {
            group_id, group_name: group_name.into(), group_sort_order: gs,
            value_id: value.map(|v| Uuid::from_u128(v.0)), value: value.map(|v| v.1.to_string()),
            value_sort_order: value.map(|v| v.2), custom_value: custom.map(str::to_string),
        };
        let grouped = group_characteristics(vec![
            row(g2, "Size", 2, Some((3, "M", 2)), None),
            row(g1, "Material", 1, None, Some("titanium alloy")),
            row(g1, "Material", 1, Some((1, "Carbon", 1)), None),
            row(g2, "Size", 2, Some((2, "S", 1)), None),
        ]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].group_name, "Material");
        assert_eq!(grouped[0].values[0].value, "Carbon");
        assert!(grouped[0].values[1].is_custom);
        assert_eq!(grouped[1].values.iter().map(|v| v.value.as_str()).collect::<Vec<_>>(), ["S", "M"]);
    }

    #[test]
    fn test_validate_assignments() {
        let g = Uuid::from_u128(1);
        let v = Some(Uuid::from_u128(2));
        let ok = validate_assignments(&[
            CharacteristicAssignment { group_id: g, value_id: v, custom_value: None },
            CharacteristicAssignment { group_id: g, value_id: None, custom_value: Some("  38 cm ".into()) },
        ]).unwrap();
        assert_eq!(ok[1].custom_value.as_deref(), Some("38 cm"));

        let dup = validate_assignments(&[
            CharacteristicAssignment { group_id: g, value_id: v, custom_value: None },
            CharacteristicAssignment { group_id: g, value_id: v, custom_value: None },
        ]);
        assert_eq!(dup, Err(CatalogError::DuplicateCharacteristic(g)));
        assert!(CatalogError::DuplicateCharacteristic(g).to_string().starts_with("Duplicate characteristic in group"));

        let empty = validate_assignments(&[CharacteristicAssignment { group_id: g, value_id: None, custom_value: Some(" ".into()) }]);
        assert_eq!(empty, Err(CatalogError::EmptyCharacteristic(g)));
    }

    #[test]
    fn test_merge_template() {
        let g = Uuid::from_u128(1);
        let existing = vec![CharacteristicAssignment { group_id: g, value_id: Some(Uuid::from_u128(5)), custom_value: None }];
        let template = vec![
            CharacteristicAssignment { group_id: g, value_id: Some(Uuid::from_u128(5)), custom_value: None },
            CharacteristicAssignment { group_id: g, value_id: Some(Uuid::from_u128(6)), custom_value: None },
            CharacteristicAssignment { group_id: g, value_id: Some(Uuid::from_u128(6)), custom_value: None },
            CharacteristicAssignment { group_id: g, value_id: None, custom_value: None },
        ];
        let added = merge_template(&existing, &template);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].value_id, Some(Uuid::from_u128(6)));
    }

    #[test]
    fn test_price_validation() {
        assert!(validate_price(Decimal::ZERO, None).is_ok());
        assert_eq!(validate_price(Decimal::new(-1, 0), None), Err(CatalogError::NegativePrice));
        assert_eq!(validate_price(Decimal::ONE, Some(Decimal::new(-5, 1))), Err(CatalogError::NegativePrice));
    }
}
