//! Database repository for invoices and line items.

use crate::db::errors::Result;
use crate::db::models::{
    InvoiceCreate, InvoiceFilter, InvoiceRecord, LineItemCreate, LineItemRecord, RowType,
};
use crate::types::{InvoiceId, MaterialId, RowId};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::instrument;
use uuid::Uuid;

pub struct Invoices;

impl Invoices {
    /// Insert an invoice with its line items in one transaction. The
    /// price-history trigger fires once per `line_item` row that carries a
    /// price, so history rows exist exactly when this commits.
    #[instrument(skip_all, fields(items = items.len()), err)]
    pub async fn create_with_items(
        pool: &SqlitePool,
        request: &InvoiceCreate,
        items: &[LineItemCreate],
    ) -> Result<(InvoiceRecord, Vec<LineItemRecord>)> {
        let mut tx = pool.begin().await?;

        let id = Uuid::new_v4();
        let invoice = sqlx::query_as::<_, InvoiceRecord>(
            r#"
            INSERT INTO invoices
                (id, document_id, invoice_no, invoice_date, due_date, seller_name,
                 buyer_name, company_key, currency, subtotal, tax, discount,
                 total_amount, quality_score, confidence, parser_used,
                 parsing_status, bank_details)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.document_id)
        .bind(&request.invoice_no)
        .bind(request.invoice_date)
        .bind(request.due_date)
        .bind(&request.seller_name)
        .bind(&request.buyer_name)
        .bind(&request.company_key)
        .bind(&request.currency)
        .bind(request.subtotal)
        .bind(request.tax)
        .bind(request.discount)
        .bind(request.total_amount)
        .bind(request.quality_score)
        .bind(request.confidence)
        .bind(&request.parser_used)
        .bind(request.parsing_status)
        .bind(request.bank_details.to_string())
        .fetch_one(&mut *tx)
        .await?;

        let mut records = Vec::with_capacity(items.len());
        for item in items {
            let record = sqlx::query_as::<_, LineItemRecord>(
                r#"
                INSERT INTO line_items
                    (invoice_id, line_number, item_name, description, hs_code, unit,
                     brand, model, quantity, unit_price, total_price, row_type)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(item.line_number)
            .bind(&item.item_name)
            .bind(&item.description)
            .bind(&item.hs_code)
            .bind(&item.unit)
            .bind(&item.brand)
            .bind(&item.model)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.total_price)
            .bind(item.row_type)
            .fetch_one(&mut *tx)
            .await?;
            records.push(record);
        }

        tx.commit().await?;
        Ok((invoice, records))
    }

    pub async fn get(pool: &SqlitePool, id: InvoiceId) -> Result<Option<InvoiceRecord>> {
        let invoice = sqlx::query_as::<_, InvoiceRecord>("SELECT * FROM invoices WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(invoice)
    }

    pub async fn items_for(pool: &SqlitePool, id: InvoiceId) -> Result<Vec<LineItemRecord>> {
        let items = sqlx::query_as::<_, LineItemRecord>(
            "SELECT * FROM line_items WHERE invoice_id = ?1 ORDER BY line_number, id",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        Ok(items)
    }

    pub async fn get_item(pool: &SqlitePool, invoice_id: InvoiceId, item_id: RowId) -> Result<Option<LineItemRecord>> {
        let item = sqlx::query_as::<_, LineItemRecord>(
            "SELECT * FROM line_items WHERE invoice_id = ?1 AND id = ?2",
        )
        .bind(invoice_id)
        .bind(item_id)
        .fetch_optional(pool)
        .await?;
        Ok(item)
    }

    pub async fn list(pool: &SqlitePool, filter: &InvoiceFilter) -> Result<Vec<InvoiceRecord>> {
        let limit = if filter.limit > 0 { filter.limit } else { 50 };
        let invoices = sqlx::query_as::<_, InvoiceRecord>(
            r#"
            SELECT * FROM invoices
            WHERE (?1 IS NULL OR company_key = ?1)
              AND (?2 IS NULL OR parsing_status = ?2)
            ORDER BY created_at DESC
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(&filter.company_key)
        .bind(filter.parsing_status)
        .bind(limit)
        .bind(filter.skip)
        .fetch_all(pool)
        .await?;
        Ok(invoices)
    }

    #[instrument(skip(pool), err)]
    pub async fn delete(pool: &SqlitePool, id: InvoiceId) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM invoices WHERE id = ?1")
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    pub async fn set_item_material(
        pool: &SqlitePool,
        item_id: RowId,
        material_id: Option<&MaterialId>,
    ) -> Result<()> {
        sqlx::query("UPDATE line_items SET matched_material_id = ?2 WHERE id = ?1")
            .bind(item_id)
            .bind(material_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Line items past the incremental indexing cursor, restricted to
    /// merchandise rows.
    pub async fn items_after(pool: &SqlitePool, cursor: RowId, limit: i64) -> Result<Vec<LineItemRecord>> {
        let items = sqlx::query_as::<_, LineItemRecord>(
            "SELECT * FROM line_items WHERE id > ?1 AND row_type = ?2 ORDER BY id LIMIT ?3",
        )
        .bind(cursor)
        .bind(RowType::LineItem)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(items)
    }

    /// Unmatched merchandise items on latest invoices, for the insight scan.
    pub async fn unmatched_latest_items(pool: &SqlitePool) -> Result<Vec<LineItemRecord>> {
        let items = sqlx::query_as::<_, LineItemRecord>(
            r#"
            SELECT li.* FROM line_items li
            JOIN invoices i ON i.id = li.invoice_id
            WHERE i.is_latest = 1
              AND li.row_type = 'line_item'
              AND li.matched_material_id IS NULL
            ORDER BY li.id
            "#,
        )
        .fetch_all(pool)
        .await?;
        Ok(items)
    }

    /// Merchandise rows created in the trailing window, for the insight scan.
    pub async fn recent_items(pool: &SqlitePool, limit: i64) -> Result<Vec<LineItemRecord>> {
        let items = sqlx::query_as::<_, LineItemRecord>(
            "SELECT * FROM line_items WHERE row_type = 'line_item' ORDER BY id DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(items)
    }

    pub async fn touch(pool: &SqlitePool, id: InvoiceId) -> Result<()> {
        sqlx::query("UPDATE invoices SET updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::connect_test;
    use crate::db::models::ParsingStatus;
    use serde_json::json;

    pub(crate) fn invoice_request() -> InvoiceCreate {
        InvoiceCreate {
            document_id: None,
            invoice_no: Some("INV-100".to_string()),
            invoice_date: Some(chrono::NaiveDate::from_ymd_opt(2026, 5, 20).unwrap()),
            due_date: None,
            seller_name: Some("ACME".to_string()),
            buyer_name: Some("Globex".to_string()),
            company_key: Some("globex".to_string()),
            currency: Some("USD".to_string()),
            subtotal: Some(500.0),
            tax: Some(0.0),
            discount: None,
            total_amount: Some(500.0),
            quality_score: 0.9,
            confidence: 0.85,
            parser_used: Some("template".to_string()),
            parsing_status: ParsingStatus::Ok,
            bank_details: json!({"iban": "DE89370400440532013000"}),
        }
    }

    pub(crate) fn item(name: &str, qty: f64, unit_price: f64, total: f64) -> LineItemCreate {
        LineItemCreate {
            line_number: 1,
            item_name: name.to_string(),
            description: None,
            hs_code: None,
            unit: Some("pcs".to_string()),
            brand: None,
            model: None,
            quantity: qty,
            unit_price,
            total_price: total,
            row_type: RowType::LineItem,
        }
    }

    #[tokio::test]
    async fn create_with_items_appends_price_history_once_per_item() {
        let pool = connect_test().await;
        let (invoice, items) = Invoices::create_with_items(
            &pool,
            &invoice_request(),
            &[item("PVC Cable 10mm", 100.0, 5.0, 500.0)],
        )
        .await
        .unwrap();
        assert_eq!(items.len(), 1);

        let rows: Vec<(String, f64)> = sqlx::query_as(
            "SELECT normalized_name, unit_price FROM price_history WHERE invoice_id = ?1",
        )
        .bind(invoice.id)
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "pvc cable 10mm");
        assert_eq!(rows[0].1, 5.0);
    }

    #[tokio::test]
    async fn non_line_item_rows_do_not_reach_price_history() {
        let pool = connect_test().await;
        let mut header = item("SECTION A", 0.0, 0.0, 0.0);
        header.row_type = RowType::Header;
        let mut priced = item("Steel Rod", 10.0, 100.0, 1000.0);
        priced.line_number = 2;

        let (invoice, _) =
            Invoices::create_with_items(&pool, &invoice_request(), &[header, priced])
                .await
                .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM price_history WHERE invoice_id = ?1")
            .bind(invoice.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let pool = connect_test().await;
        Invoices::create_with_items(&pool, &invoice_request(), &[]).await.unwrap();

        let mut failed = invoice_request();
        failed.parsing_status = ParsingStatus::Failed;
        Invoices::create_with_items(&pool, &failed, &[]).await.unwrap();

        let filter = InvoiceFilter {
            parsing_status: Some(ParsingStatus::Failed),
            limit: 10,
            ..Default::default()
        };
        let listed = Invoices::list(&pool, &filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].parsing_status, ParsingStatus::Failed);
    }
}
