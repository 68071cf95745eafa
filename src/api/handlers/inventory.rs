//! Inventory and local sales endpoints.

use crate::AppState;
use crate::api::models::{
    IssueRequest, LowStockQuery, Pagination, ReceiveRequest, SalesInvoiceRequest,
};
use crate::db::models::{
    InventoryItemRecord, SalesInvoiceRecord, SalesItemRecord, StockMovementRecord,
};
use crate::errors::{Entity, Error};
use crate::types::{MaterialId, SalesInvoiceId};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Serialize;
use utoipa::ToSchema;

#[utoipa::path(post, path = "/api/inventory/receive", tag = "inventory", request_body = ReceiveRequest,
    responses(
        (status = 200, description = "Stock received, average cost recomputed", body = InventoryItemRecord),
        (status = 404, description = "Material not found"),
    ))]
pub async fn receive(
    State(state): State<AppState>,
    Json(request): Json<ReceiveRequest>,
) -> Result<Json<InventoryItemRecord>, Error> {
    let item = state
        .inventory
        .receive(
            &request.material_id,
            request.quantity,
            request.unit_cost,
            request.reference.as_deref(),
        )
        .await?;
    Ok(Json(item))
}

#[utoipa::path(post, path = "/api/inventory/issue", tag = "inventory", request_body = IssueRequest,
    responses(
        (status = 200, description = "Stock issued at current average cost", body = InventoryItemRecord),
        (status = 409, description = "Insufficient stock"),
    ))]
pub async fn issue(
    State(state): State<AppState>,
    Json(request): Json<IssueRequest>,
) -> Result<Json<InventoryItemRecord>, Error> {
    let item = state
        .inventory
        .issue(&request.material_id, request.quantity, request.reference.as_deref())
        .await?;
    Ok(Json(item))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InventoryStatusResponse {
    pub items: Vec<InventoryItemRecord>,
    pub total_value: f64,
}

#[utoipa::path(get, path = "/api/inventory/status", tag = "inventory",
    responses((status = 200, description = "Quantity and valuation per material", body = InventoryStatusResponse)))]
pub async fn status(State(state): State<AppState>) -> Result<Json<InventoryStatusResponse>, Error> {
    let items = state.inventory.status().await?;
    let total_value = items.iter().map(|i| i.total_value()).sum();
    Ok(Json(InventoryStatusResponse { items, total_value }))
}

#[utoipa::path(get, path = "/api/inventory/{id}/movements", tag = "inventory",
    params(("id" = String, Path, description = "Material id"), Pagination),
    responses((status = 200, description = "Movements, newest first", body = Vec<StockMovementRecord>)))]
pub async fn movements(
    State(state): State<AppState>,
    Path(id): Path<MaterialId>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<StockMovementRecord>>, Error> {
    if state.inventory.item(&id).await?.is_none() {
        return Err(Error::NotFound {
            entity: Entity::InventoryItem,
            id,
        });
    }
    Ok(Json(state.inventory.movements(&id, page.limit).await?))
}

#[utoipa::path(get, path = "/api/inventory/low-stock", tag = "inventory", params(LowStockQuery),
    responses((status = 200, description = "Items at or below the threshold", body = Vec<InventoryItemRecord>)))]
pub async fn low_stock(
    State(state): State<AppState>,
    Query(query): Query<LowStockQuery>,
) -> Result<Json<Vec<InventoryItemRecord>>, Error> {
    Ok(Json(state.inventory.low_stock(query.threshold).await?))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SalesInvoiceResponse {
    pub invoice: SalesInvoiceRecord,
    pub items: Vec<SalesItemRecord>,
}

#[utoipa::path(post, path = "/api/sales/invoices", tag = "sales", request_body = SalesInvoiceRequest,
    responses(
        (status = 201, description = "Sales invoice created, stock issued", body = SalesInvoiceResponse),
        (status = 409, description = "Insufficient stock; nothing was issued"),
    ))]
pub async fn create_sales_invoice(
    State(state): State<AppState>,
    Json(request): Json<SalesInvoiceRequest>,
) -> Result<(StatusCode, Json<SalesInvoiceResponse>), Error> {
    let (invoice, items) = state.inventory.create_sales_invoice(&request.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(SalesInvoiceResponse { invoice, items }),
    ))
}

#[utoipa::path(get, path = "/api/sales/invoices", tag = "sales", params(Pagination),
    responses((status = 200, description = "Sales invoices, newest first", body = Vec<SalesInvoiceRecord>)))]
pub async fn list_sales_invoices(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<SalesInvoiceRecord>>, Error> {
    Ok(Json(
        state.inventory.list_sales_invoices(page.skip, page.limit).await?,
    ))
}

#[utoipa::path(get, path = "/api/sales/invoices/{id}", tag = "sales",
    params(("id" = SalesInvoiceId, Path, description = "Sales invoice id")),
    responses(
        (status = 200, description = "Sales invoice with items", body = SalesInvoiceResponse),
        (status = 404, description = "Sales invoice not found"),
    ))]
pub async fn get_sales_invoice(
    State(state): State<AppState>,
    Path(id): Path<SalesInvoiceId>,
) -> Result<Json<SalesInvoiceResponse>, Error> {
    let (invoice, items) = state
        .inventory
        .sales_invoice(id)
        .await?
        .ok_or(Error::NotFound {
            entity: Entity::SalesInvoice,
            id: id.to_string(),
        })?;
    Ok(Json(SalesInvoiceResponse { invoice, items }))
}
