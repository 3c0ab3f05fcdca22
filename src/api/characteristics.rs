use axum::{extract::State, routing::{delete, get, post}, Router};
use uuid::Uuid;

use crate::api::{created, ok, ApiResult, AppState, Created, Json, Path};
use crate::db::characteristics::{self as repo, GroupInput, TemplateApplied, TemplateInput, ValueInput};
use crate::domain::catalog::{CharacteristicAssignment, CharacteristicGroup, CharacteristicGroupView, CharacteristicTemplate, CharacteristicValue};
use crate::domain::events::CatalogEvent;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/products/:id/characteristics", get(product_characteristics).put(replace_product_characteristics))
        .route("/api/v1/characteristics/groups", get(list_groups).post(create_group))
        .route("/api/v1/characteristics/groups/:id", delete(delete_group))
        .route("/api/v1/characteristics/groups/:id/values", get(list_values).post(create_value))
        .route("/api/v1/characteristics/values/:id", delete(delete_value))
        .route("/api/v1/characteristic-templates", get(list_templates).post(create_template))
        .route("/api/v1/characteristic-templates/:id", get(get_template).delete(delete_template))
        .route("/api/v1/characteristic-templates/:id/apply/:product_id", post(apply_template))
}

async fn product_characteristics(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Vec<CharacteristicGroupView>> {
    crate::db::catalog::get_product(&s.db, id).await?;
    ok(repo::for_product(&s.db, id).await?)
}

async fn replace_product_characteristics(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(items): Json<Vec<CharacteristicAssignment>>,
) -> ApiResult<Vec<CharacteristicGroupView>> {
    let view = repo::replace_for_product(&s.db, id, &items).await?;
    s.publish([CatalogEvent::ProductUpdated { product_id: id }.into()]).await;
    ok(view)
}

async fn list_groups(State(s): State<AppState>) -> ApiResult<Vec<CharacteristicGroup>> {
    ok(repo::list_groups(&s.db).await?)
}

async fn create_group(State(s): State<AppState>, Json(r): Json<GroupInput>) -> Created<CharacteristicGroup> {
    created(repo::create_group(&s.db, &r).await?)
}

async fn delete_group(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Uuid> {
    repo::delete_group(&s.db, id).await?;
    ok(id)
}

async fn list_values(State(s): State<AppState>, Path(group_id): Path<Uuid>) -> ApiResult<Vec<CharacteristicValue>> {
    ok(repo::list_values(&s.db, group_id).await?)
}

async fn create_value(State(s): State<AppState>, Path(group_id): Path<Uuid>, Json(r): Json<ValueInput>) -> Created<CharacteristicValue> {
    created(repo::create_value(&s.db, group_id, &r).await?)
}

async fn delete_value(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Uuid> {
    repo::delete_value(&s.db, id).await?;
    ok(id)
}

async fn list_templates(State(s): State<AppState>) -> ApiResult<Vec<CharacteristicTemplate>> {
    ok(repo::list_templates(&s.db).await?)
}

async fn get_template(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<CharacteristicTemplate> {
    ok(repo::get_template(&s.db, id).await?)
}

async fn create_template(State(s): State<AppState>, Json(r): Json<TemplateInput>) -> Created<CharacteristicTemplate> {
    created(repo::create_template(&s.db, &r).await?)
}

async fn delete_template(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Uuid> {
    repo::delete_template(&s.db, id).await?;
    ok(id)
}

async fn apply_template(State(s): State<AppState>, Path((id, product_id)): Path<(Uuid, Uuid)>) -> ApiResult<TemplateApplied> {
    let applied = repo::apply_template(&s.db, id, product_id).await?;
    if applied.added > 0 {
        s.publish([CatalogEvent::ProductUpdated { product_id }.into()]).await;
    }
    ok(applied)
}
