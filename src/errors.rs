//! Error types and HTTP response conversion.
//!
//! The application's failure modes form a small closed set of kinds, each
//! carrying a stable machine-readable code. Every HTTP error response uses
//! the same JSON envelope:
//!
//! ```json
//! {
//!   "error_code": "INVOICE_NOT_FOUND",
//!   "message": "Invoice with ID abc123 not found",
//!   "hint": "Check the invoice id against GET /api/invoices",
//!   "detail": null,
//!   "path": "/api/invoices/abc123",
//!   "timestamp": "2026-08-01T12:00:00Z"
//! }
//! ```
//!
//! Handlers return `Result<T, Error>`; [`IntoResponse`] renders the envelope
//! and stashes the body in a response extension so the outermost
//! [`envelope_path_middleware`] can stamp the request path in.

use crate::db::errors::DbError;
use crate::llm::LlmError;
use axum::{
    Json,
    body::Body,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Entities that can be missing, each with its stable not-found code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Invoice,
    Document,
    Session,
    Material,
    Reminder,
    CompanyDocument,
    InventoryItem,
    SalesInvoice,
}

impl Entity {
    pub fn not_found_code(&self) -> &'static str {
        match self {
            Entity::Invoice => "INVOICE_NOT_FOUND",
            Entity::Document => "DOCUMENT_NOT_FOUND",
            Entity::Session => "SESSION_NOT_FOUND",
            Entity::Material => "MATERIAL_NOT_FOUND",
            Entity::Reminder => "REMINDER_NOT_FOUND",
            Entity::CompanyDocument => "COMPANY_DOCUMENT_NOT_FOUND",
            Entity::InventoryItem => "INVENTORY_ITEM_NOT_FOUND",
            Entity::SalesInvoice => "SALES_INVOICE_NOT_FOUND",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Entity::Invoice => "Invoice",
            Entity::Document => "Document",
            Entity::Session => "Session",
            Entity::Material => "Material",
            Entity::Reminder => "Reminder",
            Entity::CompanyDocument => "Company document",
            Entity::InventoryItem => "Inventory item",
            Entity::SalesInvoice => "Sales invoice",
        }
    }
}

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data or business rule violation
    #[error("{message}")]
    Validation { message: String },

    /// Requested resource not found
    #[error("{} with ID {id} not found", entity.name())]
    NotFound { entity: Entity, id: String },

    /// The whole parser chain rejected the document
    #[error("Parsing failed: {message}")]
    ParsingFailed { message: String },

    /// A document with the same content hash is already the latest version
    #[error("Duplicate document: content already ingested as {existing_id}")]
    DuplicateDocument { existing_id: String },

    /// Model provider failures, subdivided by the provider error kind
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Embedding generation failed
    #[error("Embedding failed: {message}")]
    Embedding { message: String },

    /// Neither retrieval sub-index is able to serve queries
    #[error("Search index is not ready")]
    IndexNotReady,

    /// Stock issue rejected for lack of quantity on hand
    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { available: f64, requested: f64 },

    /// Configuration rejected at load time
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::ParsingFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::DuplicateDocument { .. } => StatusCode::CONFLICT,
            Error::Llm(err) => match err {
                LlmError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::SERVICE_UNAVAILABLE,
            },
            Error::Embedding { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::IndexNotReady => StatusCode::SERVICE_UNAVAILABLE,
            Error::InsufficientStock { .. } => StatusCode::CONFLICT,
            Error::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the envelope.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::NotFound { entity, .. } => entity.not_found_code(),
            Error::ParsingFailed { .. } => "PARSING_FAILED",
            Error::DuplicateDocument { .. } => "DUPLICATE_DOCUMENT",
            Error::Llm(err) => match err {
                LlmError::Timeout { .. } => "LLM_TIMEOUT",
                LlmError::CircuitOpen => "CIRCUIT_BREAKER_OPEN",
                _ => "LLM_UNAVAILABLE",
            },
            Error::Embedding { .. } => "EMBEDDING_ERROR",
            Error::IndexNotReady => "INDEX_NOT_READY",
            Error::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Error::Config { .. } => "CONFIG_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Recovery hint shown alongside the message.
    pub fn hint(&self) -> Option<String> {
        match self {
            Error::Validation { .. } => Some("Fix the request payload and retry".to_string()),
            Error::NotFound { .. } => Some("Verify the id against the corresponding list endpoint".to_string()),
            Error::ParsingFailed { .. } => {
                Some("Re-upload a clearer scan, or retry with a vendor_hint".to_string())
            }
            Error::DuplicateDocument { .. } => {
                Some("Delete the existing document first, or upload a changed file".to_string())
            }
            Error::Llm(LlmError::CircuitOpen) => {
                Some("The model provider is cooling down; retry after the cooldown window".to_string())
            }
            Error::Llm(_) | Error::Embedding { .. } => {
                Some("Check provider health at /api/health/llm".to_string())
            }
            Error::IndexNotReady => Some("Trigger a rebuild via POST /api/documents/{id}/reindex".to_string()),
            Error::InsufficientStock { available, .. } => {
                Some(format!("Only {available} on hand; receive stock first"))
            }
            _ => None,
        }
    }

    /// User-safe message, without leaking internal implementation details.
    pub fn user_message(&self) -> String {
        match self {
            Error::Database(DbError::Other(_)) => "Database error occurred".to_string(),
            Error::Other(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// The wire envelope, field names are part of the public contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error_code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    pub path: String,
    pub timestamp: String,
}

impl ErrorEnvelope {
    fn from_error(err: &Error) -> Self {
        let detail = match err {
            Error::InsufficientStock { available, requested } => Some(serde_json::json!({
                "available": available,
                "requested": requested,
            })),
            Error::DuplicateDocument { existing_id } => {
                Some(serde_json::json!({ "existing_document_id": existing_id }))
            }
            _ => None,
        };
        Self {
            error_code: err.error_code().to_string(),
            message: err.user_message(),
            hint: err.hint(),
            detail,
            path: String::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Full detail goes to the log; the envelope stays user-safe.
        match &self {
            Error::Database(DbError::Other(_)) | Error::Other(_) | Error::Config { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Llm(_) | Error::Embedding { .. } | Error::IndexNotReady => {
                tracing::warn!("Upstream degradation: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let envelope = ErrorEnvelope::from_error(&self);
        let mut response = (status, Json(envelope.clone())).into_response();
        // The path is only known to middleware; stash the envelope so it can
        // re-render the body with the real request path.
        response.extensions_mut().insert(envelope);
        response
    }
}

/// Outermost middleware that rewrites error envelopes with the request path.
pub async fn envelope_path_middleware(request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let response = next.run(request).await;

    if let Some(envelope) = response.extensions().get::<ErrorEnvelope>().cloned() {
        let status = response.status();
        let mut envelope = envelope;
        envelope.path = path;
        return (status, Json(envelope)).into_response();
    }
    response
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Validation { message: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_codes_match_contract() {
        assert_eq!(
            Error::NotFound {
                entity: Entity::Invoice,
                id: "x".into()
            }
            .error_code(),
            "INVOICE_NOT_FOUND"
        );
        assert_eq!(Error::Llm(LlmError::CircuitOpen).error_code(), "CIRCUIT_BREAKER_OPEN");
        assert_eq!(
            Error::Llm(LlmError::Timeout { seconds: 120 }).error_code(),
            "LLM_TIMEOUT"
        );
        assert_eq!(Error::IndexNotReady.error_code(), "INDEX_NOT_READY");
        assert_eq!(
            Error::Database(DbError::NotFound).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn insufficient_stock_carries_detail() {
        let envelope = ErrorEnvelope::from_error(&Error::InsufficientStock {
            available: 3.0,
            requested: 10.0,
        });
        let detail = envelope.detail.expect("detail present");
        assert_eq!(detail["available"], 3.0);
        assert_eq!(detail["requested"], 10.0);
    }
}
