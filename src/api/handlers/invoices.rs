//! Invoice endpoints: upload, listing, detail, audits, catalog matching.

use crate::AppState;
use crate::api::models::{
    AuditRequest, InvoiceDetail, InvoiceListQuery, ItemSuggestions, MatchItemRequest,
    UploadOptions, UploadResponse,
};
use crate::audit::{AuditOptions, AuditOutcome};
use crate::catalog::MatchSummary;
use crate::db::handlers::{Audits, Invoices, Materials};
use crate::db::models::{AuditRecord, InvoiceFilter, InvoiceRecord};
use crate::errors::{Entity, Error};
use crate::ingest::IngestOptions;
use crate::types::{InvoiceId, RowId};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};

/// Pull the file and option fields out of the multipart form.
async fn read_upload(
    multipart: &mut Multipart,
) -> Result<(String, Vec<u8>, String, UploadOptions), Error> {
    let mut file: Option<(String, Vec<u8>, String)> = None;
    let mut options = UploadOptions::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| Error::Validation {
        message: format!("malformed multipart body: {e}"),
    })? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or("upload.bin").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await.map_err(|e| Error::Validation {
                message: format!("failed to read upload: {e}"),
            })?;
            file = Some((filename, bytes.to_vec(), content_type));
            continue;
        }

        let value = field.text().await.map_err(|e| Error::Validation {
            message: format!("malformed field {name}: {e}"),
        })?;
        let flag = value.parse::<bool>().ok();
        match name.as_str() {
            "vendor_hint" => options.vendor_hint = Some(value),
            "template_id" => options.template_id = Some(value),
            "company_key" => options.company_key = Some(value),
            "auto_audit" => options.auto_audit = flag,
            "auto_index" => options.auto_index = flag,
            "auto_catalog" => options.auto_catalog = flag,
            "strict_mode" => options.strict_mode = flag,
            "allow_reversion" => options.allow_reversion = flag,
            _ => {}
        }
    }

    let (filename, bytes, content_type) = file.ok_or_else(|| Error::Validation {
        message: "multipart form is missing the `file` part".to_string(),
    })?;
    if bytes.is_empty() {
        return Err(Error::Validation {
            message: "uploaded file is empty".to_string(),
        });
    }
    Ok((filename, bytes, content_type, options))
}

#[utoipa::path(post, path = "/api/invoices/upload", tag = "invoices",
    responses(
        (status = 201, description = "Invoice ingested", body = UploadResponse),
        (status = 409, description = "Duplicate document"),
        (status = 422, description = "No parser accepted the document"),
    ))]
pub async fn upload_invoice(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), Error> {
    let (filename, bytes, content_type, options) = read_upload(&mut multipart).await?;

    let ingest_options = IngestOptions {
        vendor_hint: options.vendor_hint,
        template_id: options.template_id,
        company_key: options.company_key,
        auto_audit: options.auto_audit.unwrap_or(true),
        auto_index: options.auto_index.unwrap_or(true),
        auto_catalog: options.auto_catalog.unwrap_or(true),
        strict_mode: options.strict_mode.unwrap_or(false),
        allow_reversion: options.allow_reversion.unwrap_or(false),
    };

    let outcome = state
        .pipeline
        .ingest_invoice(&filename, &bytes, &content_type, &ingest_options)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            document: outcome.document,
            invoice: outcome.invoice,
            items: outcome.items,
            parse_attempts: outcome.attempts,
            match_summary: outcome.match_summary,
            audit: outcome.audit,
            indexed_chunks: outcome.indexed_chunks,
        }),
    ))
}

#[utoipa::path(get, path = "/api/invoices", tag = "invoices", params(InvoiceListQuery),
    responses((status = 200, description = "Invoice list", body = Vec<InvoiceRecord>)))]
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<InvoiceListQuery>,
) -> Result<Json<Vec<InvoiceRecord>>, Error> {
    let filter = InvoiceFilter {
        company_key: query.company_key,
        parsing_status: query.parsing_status,
        skip: query.skip,
        limit: query.limit,
    };
    Ok(Json(Invoices::list(&state.pool, &filter).await?))
}

#[utoipa::path(get, path = "/api/invoices/{id}", tag = "invoices",
    params(("id" = InvoiceId, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Invoice detail", body = InvoiceDetail),
        (status = 404, description = "Invoice not found"),
    ))]
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<InvoiceId>,
) -> Result<Json<InvoiceDetail>, Error> {
    let invoice = Invoices::get(&state.pool, id).await?.ok_or(Error::NotFound {
        entity: Entity::Invoice,
        id: id.to_string(),
    })?;
    let items = Invoices::items_for(&state.pool, id).await?;
    let audits = Audits::list_for_invoice(&state.pool, id).await?;
    let suggestions = state
        .reconciler
        .suggestions_for_invoice(id, 5)
        .await?
        .into_iter()
        .map(|(item_id, materials)| ItemSuggestions { item_id, materials })
        .collect();

    Ok(Json(InvoiceDetail {
        invoice,
        items,
        audits,
        suggestions,
    }))
}

#[utoipa::path(delete, path = "/api/invoices/{id}", tag = "invoices",
    params(("id" = InvoiceId, Path, description = "Invoice id")),
    responses(
        (status = 204, description = "Invoice deleted"),
        (status = 404, description = "Invoice not found"),
    ))]
pub async fn delete_invoice(
    State(state): State<AppState>,
    Path(id): Path<InvoiceId>,
) -> Result<StatusCode, Error> {
    if Invoices::delete(&state.pool, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound {
            entity: Entity::Invoice,
            id: id.to_string(),
        })
    }
}

#[utoipa::path(post, path = "/api/invoices/{id}/audit", tag = "invoices",
    params(("id" = InvoiceId, Path, description = "Invoice id")),
    request_body = AuditRequest,
    responses(
        (status = 200, description = "Audit result", body = AuditOutcome),
        (status = 404, description = "Invoice not found"),
    ))]
pub async fn audit_invoice(
    State(state): State<AppState>,
    Path(id): Path<InvoiceId>,
    body: Option<Json<AuditRequest>>,
) -> Result<Json<AuditOutcome>, Error> {
    let request = body.map(|Json(b)| b);
    let defaults = AuditOptions::default();
    let options = match request {
        Some(request) => AuditOptions {
            use_llm: request.use_llm.unwrap_or(defaults.use_llm),
            strict_mode: request.strict_mode.unwrap_or(defaults.strict_mode),
            price_anomaly_threshold: request
                .price_anomaly_threshold
                .unwrap_or(defaults.price_anomaly_threshold),
            duplicate_window_days: request
                .duplicate_window_days
                .unwrap_or(defaults.duplicate_window_days),
            save_result: request.save_result.unwrap_or(defaults.save_result),
            rules: None,
        },
        None => defaults,
    };
    Ok(Json(state.audit.audit_invoice(id, &options).await?))
}

#[utoipa::path(get, path = "/api/invoices/{id}/audits", tag = "invoices",
    params(("id" = InvoiceId, Path, description = "Invoice id")),
    responses((status = 200, description = "Stored audit results", body = Vec<AuditRecord>)))]
pub async fn list_invoice_audits(
    State(state): State<AppState>,
    Path(id): Path<InvoiceId>,
) -> Result<Json<Vec<AuditRecord>>, Error> {
    Ok(Json(Audits::list_for_invoice(&state.pool, id).await?))
}

#[utoipa::path(post, path = "/api/invoices/{id}/match-catalog", tag = "invoices",
    params(("id" = InvoiceId, Path, description = "Invoice id")),
    responses((status = 200, description = "Auto-match summary", body = MatchSummary)))]
pub async fn match_catalog(
    State(state): State<AppState>,
    Path(id): Path<InvoiceId>,
) -> Result<Json<MatchSummary>, Error> {
    if Invoices::get(&state.pool, id).await?.is_none() {
        return Err(Error::NotFound {
            entity: Entity::Invoice,
            id: id.to_string(),
        });
    }
    Ok(Json(state.reconciler.auto_match_items(id).await?))
}

#[utoipa::path(post, path = "/api/invoices/{id}/items/{item_id}/match", tag = "invoices",
    params(
        ("id" = InvoiceId, Path, description = "Invoice id"),
        ("item_id" = RowId, Path, description = "Line item id"),
    ),
    request_body = MatchItemRequest,
    responses(
        (status = 200, description = "Item link updated"),
        (status = 404, description = "Invoice, item, or material not found"),
    ))]
pub async fn match_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(InvoiceId, RowId)>,
    Json(request): Json<MatchItemRequest>,
) -> Result<Json<serde_json::Value>, Error> {
    let item = Invoices::get_item(&state.pool, id, item_id)
        .await?
        .ok_or(Error::NotFound {
            entity: Entity::Invoice,
            id: format!("{id}/{item_id}"),
        })?;

    if let Some(material_id) = &request.material_id {
        if Materials::get(&state.pool, material_id).await?.is_none() {
            return Err(Error::NotFound {
                entity: Entity::Material,
                id: material_id.clone(),
            });
        }
    }
    Invoices::set_item_material(&state.pool, item.id, request.material_id.as_ref()).await?;
    Ok(Json(serde_json::json!({
        "item_id": item.id,
        "matched_material_id": request.material_id,
    })))
}
