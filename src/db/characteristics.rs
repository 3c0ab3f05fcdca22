//! EAV characteristics: groups, values, product assignments and templates

use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use crate::domain::catalog::{
    group_characteristics, merge_template, validate_assignments, CharacteristicAssignment, CharacteristicGroup,
    CharacteristicGroupView, CharacteristicRow, CharacteristicTemplate, CharacteristicValue,
};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GroupInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ValueInput {
    #[validate(length(min = 1, max = 255))]
    pub value: String,
    #[validate(length(equal = 7))]
    pub color_hex: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
}

pub async fn list_groups(pool: &PgPool) -> AppResult<Vec<CharacteristicGroup>> {
    Ok(sqlx::query_as::<_, CharacteristicGroup>("SELECT * FROM characteristics_groups_simple ORDER BY sort_order, name").fetch_all(pool).await?)
}

pub async fn create_group(pool: &PgPool, r: &GroupInput) -> AppResult<CharacteristicGroup> {
    r.validate()?;
    Ok(sqlx::query_as::<_, CharacteristicGroup>(
        "INSERT INTO characteristics_groups_simple (id, name, description, sort_order) VALUES ($1, $2, $3, $4) RETURNING *")
        .bind(Uuid::now_v7()).bind(r.name.trim()).bind(&r.description).bind(r.sort_order)
        .fetch_one(pool).await?)
}

/// Cascades to the group's values and every product assignment in it.
pub async fn delete_group(pool: &PgPool, id: Uuid) -> AppResult<()> {
    let done = sqlx::query("DELETE FROM characteristics_groups_simple WHERE id = $1").bind(id).execute(pool).await?;
    if done.rows_affected() == 0 { return Err(AppError::not_found("Characteristic group")); }
    tracing::info!(group_id = %id, "characteristic group deleted");
    Ok(())
}

pub async fn list_values(pool: &PgPool, group_id: Uuid) -> AppResult<Vec<CharacteristicValue>> {
    Ok(sqlx::query_as::<_, CharacteristicValue>("SELECT * FROM characteristics_values_simple WHERE group_id = $1 ORDER BY sort_order, value")
        .bind(group_id).fetch_all(pool).await?)
}

pub async fn create_value(pool: &PgPool, group_id: Uuid, r: &ValueInput) -> AppResult<CharacteristicValue> {
    r.validate()?;
    if r.color_hex.as_deref().is_some_and(|c| !c.starts_with('#') || !c[1..].chars().all(|d| d.is_ascii_hexdigit())) {
        return Err(AppError::validation("color_hex must look like #RRGGBB"));
    }
    Ok(sqlx::query_as::<_, CharacteristicValue>(
        "INSERT INTO characteristics_values_simple (id, group_id, value, color_hex, sort_order) VALUES ($1, $2, $3, $4, $5) RETURNING *")
        .bind(Uuid::now_v7()).bind(group_id).bind(r.value.trim()).bind(&r.color_hex).bind(r.sort_order)
        .fetch_one(pool).await?)
}

pub async fn delete_value(pool: &PgPool, id: Uuid) -> AppResult<()> {
    let done = sqlx::query("DELETE FROM characteristics_values_simple WHERE id = $1").bind(id).execute(pool).await?;
    if done.rows_affected() == 0 { return Err(AppError::not_found("Characteristic value")); }
    Ok(())
}

const PRODUCT_ROWS_SQL: &str = "SELECT pc.group_id, g.name AS group_name, g.sort_order AS group_sort_order, \
    pc.value_id, v.value, v.sort_order AS value_sort_order, pc.custom_value \
    FROM product_characteristics_simple pc \
    JOIN characteristics_groups_simple g ON g.id = pc.group_id \
    LEFT JOIN characteristics_values_simple v ON v.id = pc.value_id \
    WHERE pc.product_id = $1";

pub async fn for_product(pool: &PgPool, product_id: Uuid) -> AppResult<Vec<CharacteristicGroupView>> {
    let rows = sqlx::query_as::<_, CharacteristicRow>(PRODUCT_ROWS_SQL).bind(product_id).fetch_all(pool).await?;
    Ok(group_characteristics(rows))
}

async fn lock_product(tx: &mut Transaction<'_, Postgres>, product_id: Uuid) -> AppResult<()> {
    let found: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1 AND status <> 'deleted' FOR UPDATE")
        .bind(product_id).fetch_optional(&mut **tx).await?;
    found.map(|_| ()).ok_or_else(|| AppError::not_found("Product"))
}

/// Every catalog value must exist and belong to the group it is assigned in.
async fn check_value_groups(tx: &mut Transaction<'_, Postgres>, items: &[CharacteristicAssignment]) -> AppResult<()> {
    let ids: Vec<Uuid> = items.iter().filter_map(|i| i.value_id).collect();
    if ids.is_empty() { return Ok(()); }
    let owners: HashMap<Uuid, Uuid> = sqlx::query_as::<_, (Uuid, Uuid)>("SELECT id, group_id FROM characteristics_values_simple WHERE id = ANY($1)")
        .bind(&ids).fetch_all(&mut **tx).await?
        .into_iter().collect();
    for item in items {
        let Some(value_id) = item.value_id else { continue };
        match owners.get(&value_id) {
            None => return Err(AppError::validation(format!("Characteristic value {value_id} does not exist"))),
            Some(group) if *group != item.group_id => {
                return Err(AppError::validation(format!("Characteristic value {value_id} belongs to another group")));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

async fn insert_assignments(tx: &mut Transaction<'_, Postgres>, product_id: Uuid, items: &[CharacteristicAssignment]) -> AppResult<()> {
    if items.is_empty() { return Ok(()); }
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO product_characteristics_simple (id, product_id, group_id, value_id, custom_value) ");
    qb.push_values(items, |mut row, item| {
        row.push_bind(Uuid::now_v7()).push_bind(product_id).push_bind(item.group_id).push_bind(item.value_id).push_bind(item.custom_value.clone());
    });
    qb.build().execute(&mut **tx).await?;
    Ok(())
}

/// Replaces all characteristics of a product in one transaction.
pub async fn replace_for_product(pool: &PgPool, product_id: Uuid, items: &[CharacteristicAssignment]) -> AppResult<Vec<CharacteristicGroupView>> {
    let items = validate_assignments(items)?;
    let mut tx = pool.begin().await?;
    lock_product(&mut tx, product_id).await?;
    check_value_groups(&mut tx, &items).await?;
    sqlx::query("DELETE FROM product_characteristics_simple WHERE product_id = $1").bind(product_id).execute(&mut *tx).await?;
    insert_assignments(&mut tx, product_id, &items).await?;
    tx.commit().await?;
    tracing::info!(%product_id, count = items.len(), "product characteristics replaced");
    for_product(pool, product_id).await
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TemplateInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub entries: Vec<CharacteristicAssignment>,
}

pub async fn list_templates(pool: &PgPool) -> AppResult<Vec<CharacteristicTemplate>> {
    Ok(sqlx::query_as::<_, CharacteristicTemplate>("SELECT * FROM characteristic_templates ORDER BY name").fetch_all(pool).await?)
}

pub async fn get_template(pool: &PgPool, id: Uuid) -> AppResult<CharacteristicTemplate> {
    sqlx::query_as::<_, CharacteristicTemplate>("SELECT * FROM characteristic_templates WHERE id = $1")
        .bind(id).fetch_optional(pool).await?
        .ok_or_else(|| AppError::not_found("Characteristic template"))
}

pub async fn create_template(pool: &PgPool, r: &TemplateInput) -> AppResult<CharacteristicTemplate> {
    r.validate()?;
    let entries = validate_assignments(&r.entries)?;
    let mut tx = pool.begin().await?;
    check_value_groups(&mut tx, &entries).await?;
    let t = sqlx::query_as::<_, CharacteristicTemplate>(
        "INSERT INTO characteristic_templates (id, name, description, entries) VALUES ($1, $2, $3, $4) RETURNING *")
        .bind(Uuid::now_v7()).bind(r.name.trim()).bind(&r.description).bind(sqlx::types::Json(&entries))
        .fetch_one(&mut *tx).await?;
    tx.commit().await?;
    Ok(t)
}

pub async fn delete_template(pool: &PgPool, id: Uuid) -> AppResult<()> {
    let done = sqlx::query("DELETE FROM characteristic_templates WHERE id = $1").bind(id).execute(pool).await?;
    if done.rows_affected() == 0 { return Err(AppError::not_found("Characteristic template")); }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateApplied {
    pub added: usize,
    pub characteristics: Vec<CharacteristicGroupView>,
}

/// Adds the template's entries the product does not have yet. Groups or
/// values deleted since the template was saved are skipped.
pub async fn apply_template(pool: &PgPool, template_id: Uuid, product_id: Uuid) -> AppResult<TemplateApplied> {
    let template = get_template(pool, template_id).await?;
    let mut tx = pool.begin().await?;
    lock_product(&mut tx, product_id).await?;

    let existing: Vec<CharacteristicAssignment> = sqlx::query_as::<_, (Uuid, Option<Uuid>, Option<String>)>(
        "SELECT group_id, value_id, custom_value FROM product_characteristics_simple WHERE product_id = $1")
        .bind(product_id).fetch_all(&mut *tx).await?
        .into_iter()
        .map(|(group_id, value_id, custom_value)| CharacteristicAssignment { group_id, value_id, custom_value })
        .collect();

    let group_ids: Vec<Uuid> = template.entries.iter().map(|e| e.group_id).collect();
    let live_groups: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM characteristics_groups_simple WHERE id = ANY($1)")
        .bind(&group_ids).fetch_all(&mut *tx).await?;
    let value_ids: Vec<Uuid> = template.entries.iter().filter_map(|e| e.value_id).collect();
    let live_values: HashMap<Uuid, Uuid> = sqlx::query_as::<_, (Uuid, Uuid)>("SELECT id, group_id FROM characteristics_values_simple WHERE id = ANY($1)")
        .bind(&value_ids).fetch_all(&mut *tx).await?
        .into_iter().collect();

    let usable: Vec<CharacteristicAssignment> = template.entries.0.iter()
        .filter(|e| live_groups.iter().any(|(g,)| *g == e.group_id))
        .filter(|e| e.value_id.map_or(true, |v| live_values.get(&v) == Some(&e.group_id)))
        .cloned()
        .collect();
    let added = merge_template(&existing, &usable);
    insert_assignments(&mut tx, product_id, &added).await?;
    tx.commit().await?;
    tracing::info!(%template_id, %product_id, added = added.len(), "characteristic template applied");

    Ok(TemplateApplied { added: added.len(), characteristics: for_product(pool, product_id).await? })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_template_input() {
        let t: TemplateInput = serde_json::from_value(json!({
            "name": "Knee joint",
            "entries": [{ "group_id": Uuid::from_u128(1), "custom_value": "up to 125 kg" }]
        })).unwrap();
        assert!(t.validate().is_ok());
        assert_eq!(t.entries[0].value_id, None);
        assert_eq!(validate_assignments(&t.entries).unwrap().len(), 1);
    }

    #[test]
    fn test_value_input_validation() {
        let v: ValueInput = serde_json::from_value(json!({ "value": "Black", "color_hex": "#000" })).unwrap();
        assert!(v.validate().is_err());
        let v: ValueInput = serde_json::from_value(json!({ "value": "", "color_hex": "#000000" })).unwrap();
        assert!(v.validate().is_err());
    }
}
