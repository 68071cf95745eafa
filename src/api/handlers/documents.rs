//! RAG document endpoints: upload, listing, reindex, delete, stats.

use crate::AppState;
use crate::api::models::Pagination;
use crate::db::handlers::Documents;
use crate::db::models::documents::DocumentRecord;
use crate::errors::{Entity, Error};
use crate::indexer::IndexStats;
use crate::types::DocumentId;
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentUploadResponse {
    pub document: DocumentRecord,
    pub indexed_chunks: usize,
}

#[utoipa::path(post, path = "/api/documents/upload", tag = "documents",
    responses(
        (status = 201, description = "Document ingested and indexed", body = DocumentUploadResponse),
        (status = 409, description = "Duplicate document"),
    ))]
pub async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentUploadResponse>), Error> {
    let mut file: Option<(String, Vec<u8>, String)> = None;
    let mut company_key: Option<String> = None;

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
        } else if name == "company_key" {
            company_key = field.text().await.ok();
        }
    }

    let (filename, bytes, content_type) = file.ok_or_else(|| Error::Validation {
        message: "multipart form is missing the `file` part".to_string(),
    })?;

    let (document, indexed_chunks) = state
        .pipeline
        .ingest_document(&filename, &bytes, &content_type, company_key.as_deref())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(DocumentUploadResponse {
            document,
            indexed_chunks,
        }),
    ))
}

#[utoipa::path(get, path = "/api/documents", tag = "documents", params(Pagination),
    responses((status = 200, description = "Document list", body = Vec<DocumentRecord>)))]
pub async fn list_documents(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<DocumentRecord>>, Error> {
    Ok(Json(Documents::list(&state.pool, page.skip, page.limit).await?))
}

#[utoipa::path(get, path = "/api/documents/{id}", tag = "documents",
    params(("id" = DocumentId, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document", body = DocumentRecord),
        (status = 404, description = "Document not found"),
    ))]
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<DocumentId>,
) -> Result<Json<DocumentRecord>, Error> {
    let document = Documents::get(&state.pool, id).await?.ok_or(Error::NotFound {
        entity: Entity::Document,
        id: id.to_string(),
    })?;
    Ok(Json(document))
}

#[utoipa::path(post, path = "/api/documents/{id}/reindex", tag = "documents",
    params(("id" = DocumentId, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document re-chunked and re-embedded"),
        (status = 404, description = "Document not found"),
    ))]
pub async fn reindex_document(
    State(state): State<AppState>,
    Path(id): Path<DocumentId>,
) -> Result<Json<serde_json::Value>, Error> {
    if Documents::get(&state.pool, id).await?.is_none() {
        return Err(Error::NotFound {
            entity: Entity::Document,
            id: id.to_string(),
        });
    }
    let indexed = state.pipeline.reindex_document(id).await?;
    Ok(Json(serde_json::json!({"document_id": id, "indexed_chunks": indexed})))
}

#[utoipa::path(delete, path = "/api/documents/{id}", tag = "documents",
    params(("id" = DocumentId, Path, description = "Document id")),
    responses(
        (status = 204, description = "Document deleted"),
        (status = 404, description = "Document not found"),
    ))]
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<DocumentId>,
) -> Result<StatusCode, Error> {
    let Some(document) = Documents::get(&state.pool, id).await? else {
        return Err(Error::NotFound {
            entity: Entity::Document,
            id: id.to_string(),
        });
    };
    Documents::delete(&state.pool, id).await?;
    // Original file removal is best-effort; the DB row is the authority.
    if let Err(err) = tokio::fs::remove_file(&document.file_path).await {
        tracing::debug!(error = %err, path = %document.file_path, "stored file removal failed");
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(get, path = "/api/documents/stats", tag = "documents",
    responses((status = 200, description = "Corpus and index statistics", body = IndexStats)))]
pub async fn document_stats(State(state): State<AppState>) -> Result<Json<IndexStats>, Error> {
    Ok(Json(state.indexer.get_stats().await?))
}
