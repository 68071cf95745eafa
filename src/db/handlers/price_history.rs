//! Database repository for the price history ledger.
//!
//! Rows are appended by the line-item trigger; this repository only reads
//! them and, on behalf of the catalog reconciler, backlinks `material_id`.

use crate::db::errors::Result;
use crate::db::models::PriceStats;
use crate::db::models::catalog::PriceHistoryRecord;
use crate::types::{InvoiceId, MaterialId};
use chrono::NaiveDate;
use sqlx::SqlitePool;

pub struct PriceHistory;

#[derive(Debug, Clone, Default)]
pub struct PriceHistoryFilter {
    pub normalized_name: Option<String>,
    pub seller: Option<String>,
    pub currency: Option<String>,
    pub skip: i64,
    pub limit: i64,
}

impl PriceHistory {
    /// Aggregate stats for `(normalized_name, seller, currency)`; seller and
    /// currency are optional narrowing filters, and rows belonging to
    /// `exclude_invoice` are left out (an invoice never audits against its
    /// own observations). Returns `None` when no rows match.
    pub async fn stats(
        pool: &SqlitePool,
        normalized_name: &str,
        seller: Option<&str>,
        currency: Option<&str>,
        exclude_invoice: Option<InvoiceId>,
    ) -> Result<Option<PriceStats>> {
        let row: Option<(i64, Option<f64>, Option<f64>, Option<f64>, Option<NaiveDate>)> =
            sqlx::query_as(
                r#"
                SELECT COUNT(*), AVG(unit_price), MIN(unit_price), MAX(unit_price), MAX(invoice_date)
                FROM price_history
                WHERE normalized_name = ?1
                  AND (?2 IS NULL OR seller = ?2)
                  AND (?3 IS NULL OR currency = ?3)
                  AND (?4 IS NULL OR invoice_id IS NULL OR invoice_id != ?4)
                "#,
            )
            .bind(normalized_name)
            .bind(seller)
            .bind(currency)
            .bind(exclude_invoice)
            .fetch_optional(pool)
            .await?;

        Ok(row.and_then(|(count, avg, min, max, last_seen)| {
            if count == 0 {
                return None;
            }
            Some(PriceStats {
                occurrence_count: count,
                avg_price: avg.unwrap_or(0.0),
                min_price: min.unwrap_or(0.0),
                max_price: max.unwrap_or(0.0),
                last_seen,
            })
        }))
    }

    /// Stats with the seller-fallback used by the anomaly rule: exact
    /// `(name, seller, currency)` first, then `(name, currency)`.
    pub async fn stats_with_fallback(
        pool: &SqlitePool,
        normalized_name: &str,
        seller: Option<&str>,
        currency: Option<&str>,
        exclude_invoice: Option<InvoiceId>,
    ) -> Result<Option<PriceStats>> {
        if seller.is_some() {
            if let Some(stats) =
                Self::stats(pool, normalized_name, seller, currency, exclude_invoice).await?
            {
                return Ok(Some(stats));
            }
        }
        Self::stats(pool, normalized_name, None, currency, exclude_invoice).await
    }

    /// Rows for an exact normalized name inside `[from, to]`, excluding a
    /// given invoice. Backs the cross-invoice duplicate rule.
    pub async fn rows_in_window(
        pool: &SqlitePool,
        normalized_name: &str,
        from: NaiveDate,
        to: NaiveDate,
        exclude_invoice: Option<InvoiceId>,
    ) -> Result<Vec<PriceHistoryRecord>> {
        let rows = sqlx::query_as::<_, PriceHistoryRecord>(
            r#"
            SELECT * FROM price_history
            WHERE normalized_name = ?1
              AND invoice_date IS NOT NULL
              AND invoice_date >= ?2 AND invoice_date <= ?3
              AND (?4 IS NULL OR invoice_id IS NULL OR invoice_id != ?4)
            ORDER BY invoice_date
            "#,
        )
        .bind(normalized_name)
        .bind(from)
        .bind(to)
        .bind(exclude_invoice)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn list(pool: &SqlitePool, filter: &PriceHistoryFilter) -> Result<Vec<PriceHistoryRecord>> {
        let limit = if filter.limit > 0 { filter.limit } else { 100 };
        let rows = sqlx::query_as::<_, PriceHistoryRecord>(
            r#"
            SELECT * FROM price_history
            WHERE (?1 IS NULL OR normalized_name = ?1)
              AND (?2 IS NULL OR seller = ?2)
              AND (?3 IS NULL OR currency = ?3)
            ORDER BY created_at DESC
            LIMIT ?4 OFFSET ?5
            "#,
        )
        .bind(&filter.normalized_name)
        .bind(&filter.seller)
        .bind(&filter.currency)
        .bind(limit)
        .bind(filter.skip)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Backlink history rows of one invoice + normalized name to a material.
    /// The only mutation this table ever sees.
    pub async fn set_material(
        pool: &SqlitePool,
        invoice_id: InvoiceId,
        normalized_name: &str,
        material_id: &MaterialId,
    ) -> Result<u64> {
        let affected = sqlx::query(
            "UPDATE price_history SET material_id = ?3 WHERE invoice_id = ?1 AND normalized_name = ?2",
        )
        .bind(invoice_id)
        .bind(normalized_name)
        .bind(material_id)
        .execute(pool)
        .await?
        .rows_affected();
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_test;
    use crate::db::handlers::Invoices;
    use crate::db::models::{InvoiceCreate, LineItemCreate, ParsingStatus, RowType};
    use serde_json::json;

    async fn seed_invoice(pool: &SqlitePool, seller: &str, date: &str, price: f64) -> InvoiceId {
        let request = InvoiceCreate {
            document_id: None,
            invoice_no: Some(format!("INV-{price}")),
            invoice_date: Some(date.parse().unwrap()),
            due_date: None,
            seller_name: Some(seller.to_string()),
            buyer_name: None,
            company_key: None,
            currency: Some("USD".to_string()),
            subtotal: None,
            tax: None,
            discount: None,
            total_amount: None,
            quality_score: 0.5,
            confidence: 0.5,
            parser_used: None,
            parsing_status: ParsingStatus::Ok,
            bank_details: json!({}),
        };
        let items = vec![LineItemCreate {
            line_number: 1,
            item_name: "Steel Rod".to_string(),
            description: None,
            hs_code: None,
            unit: None,
            brand: None,
            model: None,
            quantity: 10.0,
            unit_price: price,
            total_price: 10.0 * price,
            row_type: RowType::LineItem,
        }];
        let (invoice, _) = Invoices::create_with_items(pool, &request, &items).await.unwrap();
        invoice.id
    }

    #[tokio::test]
    async fn stats_fall_back_from_seller_to_currency_scope() {
        let pool = connect_test().await;
        seed_invoice(&pool, "ACME", "2026-05-01", 100.0).await;
        seed_invoice(&pool, "ACME", "2026-05-10", 100.0).await;

        let exact = PriceHistory::stats_with_fallback(&pool, "steel rod", Some("ACME"), Some("USD"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exact.occurrence_count, 2);
        assert_eq!(exact.avg_price, 100.0);

        // Unknown seller falls back to the currency-wide stats.
        let fallback =
            PriceHistory::stats_with_fallback(&pool, "steel rod", Some("Unknown Co"), Some("USD"), None)
                .await
                .unwrap()
                .unwrap();
        assert_eq!(fallback.occurrence_count, 2);

        // An invoice's own rows can be excluded from its stats.
        let probe = seed_invoice(&pool, "ACME", "2026-05-20", 130.0).await;
        let without_probe =
            PriceHistory::stats_with_fallback(&pool, "steel rod", Some("ACME"), Some("USD"), Some(probe))
                .await
                .unwrap()
                .unwrap();
        assert_eq!(without_probe.occurrence_count, 2);
        assert_eq!(without_probe.avg_price, 100.0);
    }

    #[tokio::test]
    async fn window_query_excludes_the_probing_invoice() {
        let pool = connect_test().await;
        let earlier = seed_invoice(&pool, "ACME", "2026-05-01", 90.0).await;
        let probe = seed_invoice(&pool, "ACME", "2026-05-15", 95.0).await;

        let rows = PriceHistory::rows_in_window(
            &pool,
            "steel rod",
            "2026-04-16".parse().unwrap(),
            "2026-05-14".parse().unwrap(),
            Some(probe),
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].invoice_id, Some(earlier));
    }
}
