//! Shared identifier aliases and small helpers.

use uuid::Uuid;

pub type DocumentId = Uuid;
pub type InvoiceId = Uuid;
pub type SessionId = Uuid;
pub type AuditId = Uuid;
pub type CompanyDocumentId = Uuid;
pub type ReminderId = Uuid;
pub type SalesInvoiceId = Uuid;

/// Materials carry opaque string ids so externally sourced catalog entries
/// can keep their upstream identifiers.
pub type MaterialId = String;

/// Row ids for append-only child tables (line items, chunks, movements).
pub type RowId = i64;

/// Mint a fresh opaque material id.
pub fn new_material_id() -> MaterialId {
    format!("mat_{}", Uuid::new_v4().simple())
}

/// Short form of a UUID for log fields.
pub fn abbrev_uuid(id: &Uuid) -> String {
    let s = id.to_string();
    s[..8].to_string()
}

/// Whitespace token count, used consistently wherever a token budget appears
/// (chunk windows, session totals, context truncation).
pub fn approx_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_ids_are_prefixed_and_unique() {
        let a = new_material_id();
        let b = new_material_id();
        assert!(a.starts_with("mat_"));
        assert_ne!(a, b);
    }

    #[test]
    fn token_count_is_whitespace_based() {
        assert_eq!(approx_tokens("one two  three\nfour"), 4);
        assert_eq!(approx_tokens(""), 0);
    }
}
