//! Catalog endpoints.

use crate::AppState;
use crate::api::models::{AddToCatalogRequest, Pagination};
use crate::catalog::MatchSummary;
use crate::db::handlers::Materials;
use crate::db::models::{MaterialRecord, SynonymRecord};
use crate::errors::{Entity, Error};
use crate::types::MaterialId;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct MaterialDetail {
    pub material: MaterialRecord,
    pub synonyms: Vec<SynonymRecord>,
}

#[utoipa::path(post, path = "/api/catalog", tag = "catalog", request_body = AddToCatalogRequest,
    responses(
        (status = 200, description = "Items added to the catalog", body = MatchSummary),
        (status = 404, description = "Invoice not found"),
    ))]
pub async fn add_to_catalog(
    State(state): State<AppState>,
    Json(request): Json<AddToCatalogRequest>,
) -> Result<Json<MatchSummary>, Error> {
    let summary = state
        .reconciler
        .add_to_catalog(request.invoice_id, request.item_ids.as_deref())
        .await?;
    Ok(Json(summary))
}

#[utoipa::path(get, path = "/api/catalog", tag = "catalog", params(Pagination),
    responses((status = 200, description = "Materials ordered by name", body = Vec<MaterialRecord>)))]
pub async fn list_materials(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<MaterialRecord>>, Error> {
    Ok(Json(Materials::list(&state.pool, page.skip, page.limit).await?))
}

#[utoipa::path(get, path = "/api/catalog/{id}", tag = "catalog",
    params(("id" = String, Path, description = "Material id")),
    responses(
        (status = 200, description = "Material with synonyms", body = MaterialDetail),
        (status = 404, description = "Material not found"),
    ))]
pub async fn get_material(
    State(state): State<AppState>,
    Path(id): Path<MaterialId>,
) -> Result<Json<MaterialDetail>, Error> {
    let material = Materials::get(&state.pool, &id).await?.ok_or(Error::NotFound {
        entity: Entity::Material,
        id: id.clone(),
    })?;
    let synonyms = Materials::synonyms_for(&state.pool, &id).await?;
    Ok(Json(MaterialDetail { material, synonyms }))
}
