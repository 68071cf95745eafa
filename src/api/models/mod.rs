//! Request/response DTOs for the HTTP surface.
//!
//! Responses reuse the domain records (which already serialize with
//! snake_case fields); the types here are the request shapes and the
//! composite response envelopes.

pub mod chat;
pub mod company;
pub mod inventory;
pub mod invoices;
pub mod search;

pub use chat::*;
pub use company::*;
pub use inventory::*;
pub use invoices::*;
pub use search::*;

use serde::Deserialize;
use utoipa::IntoParams;

/// Offset pagination, shared by the list endpoints.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct Pagination {
    /// Rows to skip
    #[serde(default)]
    pub skip: i64,
    /// Maximum rows to return
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: default_limit(),
        }
    }
}
