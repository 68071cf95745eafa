//! Catalog reconciliation: link invoice line items to materials.
//!
//! Matching is two-step — exact normalized name, then exact synonym text —
//! and `auto_match_items` never creates materials. Explicit
//! `add_to_catalog` reuses or creates, records differing raw descriptions
//! as synonyms, backfills missing hs_code/unit, and backlinks the price
//! history rows of the invoice.

use crate::db::handlers::{Invoices, Materials, PriceHistory};
use crate::db::models::{LineItemRecord, MaterialCreate, MaterialRecord, RowType};
use crate::errors::{Entity, Error, Result};
use crate::types::{InvoiceId, RowId};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::instrument;
use utoipa::ToSchema;

/// The one normalization primitive everything agrees on.
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MatchSummary {
    pub matched: usize,
    pub unmatched: usize,
    pub created: usize,
    pub synonyms_added: usize,
}

pub struct CatalogReconciler {
    pool: SqlitePool,
}

impl CatalogReconciler {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_material(&self, item_name: &str) -> Result<Option<MaterialRecord>> {
        let normalized = normalize(item_name);
        if let Some(material) = Materials::get_by_normalized(&self.pool, &normalized).await? {
            return Ok(Some(material));
        }
        Ok(Materials::find_by_synonym(&self.pool, item_name.trim()).await?)
    }

    /// Link merchandise rows of an invoice to existing materials. Name
    /// matches also backlink the invoice's price history rows; synonym
    /// matches link the item only. Unmatched items are left alone.
    #[instrument(skip(self), fields(invoice_id = %invoice_id), err)]
    pub async fn auto_match_items(&self, invoice_id: InvoiceId) -> Result<MatchSummary> {
        let items = Invoices::items_for(&self.pool, invoice_id).await?;
        let mut summary = MatchSummary {
            matched: 0,
            unmatched: 0,
            created: 0,
            synonyms_added: 0,
        };

        for item in items.iter().filter(|i| i.row_type == RowType::LineItem) {
            let normalized = normalize(&item.item_name);
            if let Some(material) = Materials::get_by_normalized(&self.pool, &normalized).await? {
                Invoices::set_item_material(&self.pool, item.id, Some(&material.id)).await?;
                PriceHistory::set_material(&self.pool, invoice_id, &normalized, &material.id).await?;
                summary.matched += 1;
            } else if let Some(material) =
                Materials::find_by_synonym(&self.pool, item.item_name.trim()).await?
            {
                Invoices::set_item_material(&self.pool, item.id, Some(&material.id)).await?;
                summary.matched += 1;
            } else {
                summary.unmatched += 1;
            }
        }
        Ok(summary)
    }

    /// Add invoice items to the catalog: reuse existing materials (adding
    /// the raw description as a synonym when it differs), create fresh ones
    /// otherwise, and wire up items and price history either way.
    #[instrument(skip(self, item_ids), fields(invoice_id = %invoice_id), err)]
    pub async fn add_to_catalog(
        &self,
        invoice_id: InvoiceId,
        item_ids: Option<&[RowId]>,
    ) -> Result<MatchSummary> {
        let all_items = Invoices::items_for(&self.pool, invoice_id).await?;
        if all_items.is_empty() && Invoices::get(&self.pool, invoice_id).await?.is_none() {
            return Err(Error::NotFound {
                entity: Entity::Invoice,
                id: invoice_id.to_string(),
            });
        }

        let selected: Vec<&LineItemRecord> = all_items
            .iter()
            .filter(|i| i.row_type == RowType::LineItem)
            .filter(|i| item_ids.is_none_or(|ids| ids.contains(&i.id)))
            .collect();

        let mut summary = MatchSummary {
            matched: 0,
            unmatched: 0,
            created: 0,
            synonyms_added: 0,
        };

        for item in selected {
            let raw_name = item.item_name.trim();
            let material = match self.find_material(raw_name).await? {
                Some(existing) => {
                    if existing.display_name != raw_name {
                        Materials::add_synonym(&self.pool, &existing.id, raw_name).await?;
                        summary.synonyms_added += 1;
                    }
                    Materials::backfill(
                        &self.pool,
                        &existing.id,
                        item.hs_code.as_deref(),
                        item.unit.as_deref(),
                    )
                    .await?;
                    summary.matched += 1;
                    existing
                }
                None => {
                    let created = Materials::create(
                        &self.pool,
                        &MaterialCreate {
                            display_name: raw_name.to_string(),
                            hs_code: item.hs_code.clone(),
                            unit: item.unit.clone(),
                            description: item.description.clone(),
                            brand: item.brand.clone(),
                            ..Default::default()
                        },
                    )
                    .await?;
                    summary.created += 1;
                    created
                }
            };

            Invoices::set_item_material(&self.pool, item.id, Some(&material.id)).await?;
            PriceHistory::set_material(&self.pool, invoice_id, &normalize(raw_name), &material.id)
                .await?;
        }
        Ok(summary)
    }

    /// Up to `limit` lexical catalog suggestions per unmatched item.
    /// Index errors yield empty suggestion lists, never an error.
    pub async fn suggestions_for_invoice(
        &self,
        invoice_id: InvoiceId,
        limit: i64,
    ) -> Result<Vec<(RowId, Vec<MaterialRecord>)>> {
        let items = Invoices::items_for(&self.pool, invoice_id).await?;
        let mut suggestions = Vec::new();
        for item in items
            .iter()
            .filter(|i| i.row_type == RowType::LineItem && i.matched_material_id.is_none())
        {
            let matches = Materials::suggest(&self.pool, &item.item_name, limit).await;
            suggestions.push((item.id, matches));
        }
        Ok(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_test;
    use crate::db::handlers::invoices::tests::{invoice_request, item};

    #[test]
    fn normalize_is_lowercase_trim() {
        assert_eq!(normalize("  PVC Cable 10MM "), "pvc cable 10mm");
    }

    #[tokio::test]
    async fn auto_match_links_by_normalized_name_and_backlinks_history() {
        let pool = connect_test().await;
        let material = Materials::create(
            &pool,
            &MaterialCreate {
                display_name: "pvc cable 10mm".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let (invoice, items) = Invoices::create_with_items(
            &pool,
            &invoice_request(),
            &[item("PVC CABLE 10MM", 100.0, 5.0, 500.0)],
        )
        .await
        .unwrap();

        let reconciler = CatalogReconciler::new(pool.clone());
        let summary = reconciler.auto_match_items(invoice.id).await.unwrap();
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.created, 0);

        let linked = Invoices::get_item(&pool, invoice.id, items[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(linked.matched_material_id.as_deref(), Some(material.id.as_str()));

        let history_material: Option<String> =
            sqlx::query_scalar("SELECT material_id FROM price_history WHERE invoice_id = ?1")
                .bind(invoice.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(history_material.as_deref(), Some(material.id.as_str()));
    }

    #[tokio::test]
    async fn auto_match_never_creates_materials() {
        let pool = connect_test().await;
        let (invoice, _) = Invoices::create_with_items(
            &pool,
            &invoice_request(),
            &[item("Unseen Gadget", 1.0, 9.0, 9.0)],
        )
        .await
        .unwrap();

        let reconciler = CatalogReconciler::new(pool.clone());
        let summary = reconciler.auto_match_items(invoice.id).await.unwrap();
        assert_eq!(summary.unmatched, 1);
        assert_eq!(Materials::count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn add_to_catalog_reuses_and_records_synonym() {
        let pool = connect_test().await;
        let material = Materials::create(
            &pool,
            &MaterialCreate {
                display_name: "pvc cable 10mm".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let (invoice, _) = Invoices::create_with_items(
            &pool,
            &invoice_request(),
            &[item("PVC CABLE 10MM", 100.0, 5.0, 500.0)],
        )
        .await
        .unwrap();

        let reconciler = CatalogReconciler::new(pool.clone());
        let summary = reconciler.add_to_catalog(invoice.id, None).await.unwrap();
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.created, 0);
        assert_eq!(summary.synonyms_added, 1);

        let synonyms = Materials::synonyms_for(&pool, &material.id).await.unwrap();
        assert_eq!(synonyms.len(), 1);
        assert_eq!(synonyms[0].synonym, "PVC CABLE 10MM");
        // Still exactly one material.
        assert_eq!(Materials::count(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn add_to_catalog_creates_missing_materials_with_backfill_fields() {
        let pool = connect_test().await;
        let mut new_item = item("Hex Bolt M8", 100.0, 0.2, 20.0);
        new_item.hs_code = Some("7318.15".to_string());

        let (invoice, _) = Invoices::create_with_items(&pool, &invoice_request(), &[new_item])
            .await
            .unwrap();

        let reconciler = CatalogReconciler::new(pool.clone());
        let summary = reconciler.add_to_catalog(invoice.id, None).await.unwrap();
        assert_eq!(summary.created, 1);

        let material = Materials::get_by_normalized(&pool, "hex bolt m8")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(material.hs_code.as_deref(), Some("7318.15"));
        assert_eq!(material.unit.as_deref(), Some("pcs"));
    }

    #[tokio::test]
    async fn synonym_match_wins_when_normalized_name_differs() {
        let pool = connect_test().await;
        let material = Materials::create(
            &pool,
            &MaterialCreate {
                display_name: "copper pipe 15mm".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        Materials::add_synonym(&pool, &material.id, "CU PIPE 15").await.unwrap();

        let (invoice, items) = Invoices::create_with_items(
            &pool,
            &invoice_request(),
            &[item("CU PIPE 15", 5.0, 8.0, 40.0)],
        )
        .await
        .unwrap();

        let reconciler = CatalogReconciler::new(pool.clone());
        let summary = reconciler.auto_match_items(invoice.id).await.unwrap();
        assert_eq!(summary.matched, 1);

        let linked = Invoices::get_item(&pool, invoice.id, items[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(linked.matched_material_id.as_deref(), Some(material.id.as_str()));
    }
}
