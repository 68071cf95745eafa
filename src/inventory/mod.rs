//! Inventory ledger: append-only stock movements with weighted-average-cost
//! accounting, and the local sales module that consumes stock.
//!
//! Every mutation runs in a single transaction. Receipts recompute the
//! weighted average cost; issues deduct at the current average and never
//! change it; a sales invoice issues every line or nothing.

use crate::db::errors::DbError;
use crate::db::models::{
    InventoryItemRecord, MovementType, SalesInvoiceCreate, SalesInvoiceRecord, SalesItemRecord,
    StockMovementRecord,
};
use crate::errors::{Entity, Error, Result};
use crate::types::{MaterialId, SalesInvoiceId};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::instrument;
use uuid::Uuid;

pub struct InventoryLedger {
    pool: SqlitePool,
}

impl InventoryLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn material_exists(conn: &mut SqliteConnection, material_id: &MaterialId) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM materials WHERE id = ?1")
            .bind(material_id)
            .fetch_one(conn)
            .await
            .map_err(DbError::from)?;
        Ok(count > 0)
    }

    async fn item_for_update(
        conn: &mut SqliteConnection,
        material_id: &MaterialId,
    ) -> Result<Option<InventoryItemRecord>> {
        let item = sqlx::query_as::<_, InventoryItemRecord>(
            "SELECT * FROM inventory_items WHERE material_id = ?1",
        )
        .bind(material_id)
        .fetch_optional(conn)
        .await
        .map_err(DbError::from)?;
        Ok(item)
    }

    /// Receive stock. Weighted average:
    /// `new_avg = (old_qty * old_avg + qty * unit_cost) / (old_qty + qty)`.
    #[instrument(skip(self), err)]
    pub async fn receive(
        &self,
        material_id: &MaterialId,
        quantity: f64,
        unit_cost: f64,
        reference: Option<&str>,
    ) -> Result<InventoryItemRecord> {
        if quantity <= 0.0 || !quantity.is_finite() {
            return Err(Error::Validation {
                message: format!("receive quantity must be positive (got {quantity})"),
            });
        }
        if unit_cost < 0.0 || !unit_cost.is_finite() {
            return Err(Error::Validation {
                message: format!("unit cost must be non-negative (got {unit_cost})"),
            });
        }

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        if !Self::material_exists(&mut tx, material_id).await? {
            return Err(Error::NotFound {
                entity: Entity::Material,
                id: material_id.clone(),
            });
        }

        let item = Self::apply_receipt(&mut tx, material_id, quantity, unit_cost).await?;
        Self::append_movement(&mut tx, material_id, MovementType::In, quantity, unit_cost, reference, None)
            .await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(item)
    }

    async fn apply_receipt(
        conn: &mut SqliteConnection,
        material_id: &MaterialId,
        quantity: f64,
        unit_cost: f64,
    ) -> Result<InventoryItemRecord> {
        let existing = Self::item_for_update(conn, material_id).await?;
        let (old_qty, old_avg) = existing
            .as_ref()
            .map(|i| (i.quantity_on_hand, i.avg_cost))
            .unwrap_or((0.0, 0.0));

        let new_qty = old_qty + quantity;
        let new_avg = if new_qty > 0.0 {
            (old_qty * old_avg + quantity * unit_cost) / new_qty
        } else {
            unit_cost
        };

        let item = sqlx::query_as::<_, InventoryItemRecord>(
            r#"
            INSERT INTO inventory_items (material_id, quantity_on_hand, avg_cost, last_movement_date)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (material_id) DO UPDATE SET
                quantity_on_hand = excluded.quantity_on_hand,
                avg_cost = excluded.avg_cost,
                last_movement_date = excluded.last_movement_date,
                updated_at = excluded.last_movement_date
            RETURNING *
            "#,
        )
        .bind(material_id)
        .bind(new_qty)
        .bind(new_avg)
        .bind(Utc::now())
        .fetch_one(conn)
        .await
        .map_err(DbError::from)?;
        Ok(item)
    }

    /// Issue stock at the current average cost. Fails with
    /// `INSUFFICIENT_STOCK` when the quantity on hand cannot cover the
    /// request; the average cost never changes on the way out.
    #[instrument(skip(self), err)]
    pub async fn issue(
        &self,
        material_id: &MaterialId,
        quantity: f64,
        reference: Option<&str>,
    ) -> Result<InventoryItemRecord> {
        if quantity <= 0.0 || !quantity.is_finite() {
            return Err(Error::Validation {
                message: format!("issue quantity must be positive (got {quantity})"),
            });
        }

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let item = Self::apply_issue(&mut tx, material_id, quantity, reference).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(item)
    }

    async fn apply_issue(
        conn: &mut SqliteConnection,
        material_id: &MaterialId,
        quantity: f64,
        reference: Option<&str>,
    ) -> Result<InventoryItemRecord> {
        let Some(existing) = Self::item_for_update(conn, material_id).await? else {
            return Err(Error::NotFound {
                entity: Entity::InventoryItem,
                id: material_id.clone(),
            });
        };

        if quantity > existing.quantity_on_hand {
            return Err(Error::InsufficientStock {
                available: existing.quantity_on_hand,
                requested: quantity,
            });
        }

        let item = sqlx::query_as::<_, InventoryItemRecord>(
            r#"
            UPDATE inventory_items
            SET quantity_on_hand = quantity_on_hand - ?2,
                last_movement_date = ?3,
                updated_at = ?3
            WHERE material_id = ?1
            RETURNING *
            "#,
        )
        .bind(material_id)
        .bind(quantity)
        .bind(Utc::now())
        .fetch_one(conn)
        .await
        .map_err(DbError::from)?;

        Self::append_movement(
            conn,
            material_id,
            MovementType::Out,
            quantity,
            existing.avg_cost,
            reference,
            None,
        )
        .await?;
        Ok(item)
    }

    async fn append_movement(
        conn: &mut SqliteConnection,
        material_id: &MaterialId,
        movement_type: MovementType,
        quantity: f64,
        unit_cost: f64,
        reference: Option<&str>,
        notes: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_movements (material_id, movement_type, quantity, unit_cost, reference, notes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(material_id)
        .bind(movement_type)
        .bind(quantity)
        .bind(unit_cost)
        .bind(reference)
        .bind(notes)
        .execute(conn)
        .await
        .map_err(DbError::from)?;
        Ok(())
    }

    /// Create a local sales invoice: one transaction that issues stock for
    /// every line, prices cost basis at the average cost at time of issue,
    /// and rolls up header totals. Any failure rolls everything back.
    #[instrument(skip(self, request), fields(invoice_no = %request.invoice_no, items = request.items.len()), err)]
    pub async fn create_sales_invoice(
        &self,
        request: &SalesInvoiceCreate,
    ) -> Result<(SalesInvoiceRecord, Vec<SalesItemRecord>)> {
        if request.items.is_empty() {
            return Err(Error::Validation {
                message: "a sales invoice needs at least one item".to_string(),
            });
        }

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let invoice_id: SalesInvoiceId = Uuid::new_v4();

        let mut subtotal = 0.0;
        let mut total_cost = 0.0;
        let mut item_rows = Vec::with_capacity(request.items.len());

        for item in &request.items {
            if item.quantity <= 0.0 || item.unit_price < 0.0 {
                return Err(Error::Validation {
                    message: format!("invalid sale line for {}", item.item_name),
                });
            }

            // Average cost at the moment of issue is the cost basis.
            let before = Self::item_for_update(&mut tx, &item.material_id)
                .await?
                .ok_or_else(|| Error::NotFound {
                    entity: Entity::InventoryItem,
                    id: item.material_id.clone(),
                })?;
            Self::apply_issue(&mut tx, &item.material_id, item.quantity, Some(&request.invoice_no))
                .await?;

            let cost_basis = before.avg_cost * item.quantity;
            let line_total = item.quantity * item.unit_price;
            subtotal += line_total;
            total_cost += cost_basis;
            item_rows.push((item, cost_basis, line_total));
        }

        let total_amount = subtotal + request.tax;
        let total_profit = total_amount - total_cost;

        let invoice = sqlx::query_as::<_, SalesInvoiceRecord>(
            r#"
            INSERT INTO local_sales_invoices
                (id, invoice_no, customer_name, invoice_date, subtotal, tax,
                 total_amount, total_cost, total_profit, notes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            RETURNING *
            "#,
        )
        .bind(invoice_id)
        .bind(&request.invoice_no)
        .bind(&request.customer_name)
        .bind(request.invoice_date)
        .bind(subtotal)
        .bind(request.tax)
        .bind(total_amount)
        .bind(total_cost)
        .bind(total_profit)
        .bind(&request.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::from)?;

        let mut persisted_items = Vec::with_capacity(item_rows.len());
        for (item, cost_basis, line_total) in item_rows {
            let record = sqlx::query_as::<_, SalesItemRecord>(
                r#"
                INSERT INTO local_sales_items
                    (sales_invoice_id, material_id, item_name, quantity, unit_price,
                     line_total, cost_basis, profit)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                RETURNING *
                "#,
            )
            .bind(invoice_id)
            .bind(&item.material_id)
            .bind(&item.item_name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(line_total)
            .bind(cost_basis)
            .bind(line_total - cost_basis)
            .fetch_one(&mut *tx)
            .await
            .map_err(DbError::from)?;
            persisted_items.push(record);
        }

        tx.commit().await.map_err(DbError::from)?;
        Ok((invoice, persisted_items))
    }

    pub async fn status(&self) -> Result<Vec<InventoryItemRecord>> {
        let items = sqlx::query_as::<_, InventoryItemRecord>(
            "SELECT * FROM inventory_items ORDER BY material_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(items)
    }

    pub async fn item(&self, material_id: &MaterialId) -> Result<Option<InventoryItemRecord>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        Self::item_for_update(&mut conn, material_id).await
    }

    pub async fn movements(
        &self,
        material_id: &MaterialId,
        limit: i64,
    ) -> Result<Vec<StockMovementRecord>> {
        let limit = if limit > 0 { limit } else { 100 };
        let movements = sqlx::query_as::<_, StockMovementRecord>(
            "SELECT * FROM stock_movements WHERE material_id = ?1 ORDER BY id DESC LIMIT ?2",
        )
        .bind(material_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(movements)
    }

    pub async fn low_stock(&self, threshold: f64) -> Result<Vec<InventoryItemRecord>> {
        let items = sqlx::query_as::<_, InventoryItemRecord>(
            "SELECT * FROM inventory_items WHERE quantity_on_hand <= ?1 ORDER BY quantity_on_hand",
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(items)
    }

    pub async fn sales_invoice(
        &self,
        id: SalesInvoiceId,
    ) -> Result<Option<(SalesInvoiceRecord, Vec<SalesItemRecord>)>> {
        let Some(invoice) = sqlx::query_as::<_, SalesInvoiceRecord>(
            "SELECT * FROM local_sales_invoices WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?
        else {
            return Ok(None);
        };
        let items = sqlx::query_as::<_, SalesItemRecord>(
            "SELECT * FROM local_sales_items WHERE sales_invoice_id = ?1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(Some((invoice, items)))
    }

    pub async fn list_sales_invoices(&self, skip: i64, limit: i64) -> Result<Vec<SalesInvoiceRecord>> {
        let limit = if limit > 0 { limit } else { 50 };
        let invoices = sqlx::query_as::<_, SalesInvoiceRecord>(
            "SELECT * FROM local_sales_invoices ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
        )
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(invoices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_test;
    use crate::db::handlers::Materials;
    use crate::db::models::{MaterialCreate, SalesItemCreate};

    async fn seed_material(pool: &SqlitePool, name: &str) -> MaterialId {
        Materials::create(
            pool,
            &MaterialCreate {
                display_name: name.to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn weighted_average_recomputes_on_every_receipt() {
        let pool = connect_test().await;
        let material = seed_material(&pool, "Steel Rod").await;
        let ledger = InventoryLedger::new(pool.clone());

        ledger.receive(&material, 10.0, 100.0, None).await.unwrap();
        let item = ledger.receive(&material, 30.0, 60.0, None).await.unwrap();

        // (10*100 + 30*60) / 40 = 70
        assert_eq!(item.quantity_on_hand, 40.0);
        assert!((item.avg_cost - 70.0).abs() < 1e-9);
        assert!((item.total_value() - 2800.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn wac_matches_closed_form_over_a_sequence() {
        let pool = connect_test().await;
        let material = seed_material(&pool, "Copper Pipe").await;
        let ledger = InventoryLedger::new(pool.clone());

        let receipts = [(5.0, 12.0), (7.5, 9.0), (2.25, 30.0), (10.0, 18.5)];
        for (qty, cost) in receipts {
            ledger.receive(&material, qty, cost, None).await.unwrap();
        }

        let total_qty: f64 = receipts.iter().map(|(q, _)| q).sum();
        let total_value: f64 = receipts.iter().map(|(q, c)| q * c).sum();
        let item = ledger.item(&material).await.unwrap().unwrap();
        assert!((item.avg_cost - total_value / total_qty).abs() < 1e-9);
    }

    #[tokio::test]
    async fn issue_deducts_without_touching_average() {
        let pool = connect_test().await;
        let material = seed_material(&pool, "Brass Elbow").await;
        let ledger = InventoryLedger::new(pool.clone());

        ledger.receive(&material, 20.0, 4.0, None).await.unwrap();
        let item = ledger.issue(&material, 5.0, Some("SO-1")).await.unwrap();
        assert_eq!(item.quantity_on_hand, 15.0);
        assert_eq!(item.avg_cost, 4.0);

        let movements = ledger.movements(&material, 10).await.unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[0].movement_type, MovementType::Out);
        assert_eq!(movements[0].unit_cost, 4.0);
        assert_eq!(movements[0].reference.as_deref(), Some("SO-1"));
    }

    #[tokio::test]
    async fn overdraw_is_rejected_with_amounts() {
        let pool = connect_test().await;
        let material = seed_material(&pool, "Hex Bolt").await;
        let ledger = InventoryLedger::new(pool.clone());
        ledger.receive(&material, 3.0, 1.0, None).await.unwrap();

        let err = ledger.issue(&material, 10.0, None).await.unwrap_err();
        match err {
            Error::InsufficientStock { available, requested } => {
                assert_eq!(available, 3.0);
                assert_eq!(requested, 10.0);
            }
            other => panic!("expected InsufficientStock, got {other}"),
        }

        // Stock untouched after the failed issue.
        let item = ledger.item(&material).await.unwrap().unwrap();
        assert_eq!(item.quantity_on_hand, 3.0);
    }

    #[tokio::test]
    async fn sales_invoice_rolls_up_costs_and_profit() {
        let pool = connect_test().await;
        let cable = seed_material(&pool, "PVC Cable").await;
        let rod = seed_material(&pool, "Steel Rod").await;
        let ledger = InventoryLedger::new(pool.clone());
        ledger.receive(&cable, 100.0, 2.0, None).await.unwrap();
        ledger.receive(&rod, 50.0, 80.0, None).await.unwrap();

        let (invoice, items) = ledger
            .create_sales_invoice(&SalesInvoiceCreate {
                invoice_no: "LS-1".to_string(),
                customer_name: Some("Walk-in".to_string()),
                invoice_date: "2026-06-01".parse().unwrap(),
                tax: 15.0,
                notes: None,
                items: vec![
                    SalesItemCreate {
                        material_id: cable.clone(),
                        item_name: "PVC Cable".to_string(),
                        quantity: 10.0,
                        unit_price: 3.5,
                    },
                    SalesItemCreate {
                        material_id: rod.clone(),
                        item_name: "Steel Rod".to_string(),
                        quantity: 2.0,
                        unit_price: 120.0,
                    },
                ],
            })
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        // subtotal = 35 + 240; cost = 20 + 160; total = subtotal + tax.
        assert!((invoice.subtotal - 275.0).abs() < 1e-9);
        assert!((invoice.total_amount - 290.0).abs() < 1e-9);
        assert!((invoice.total_cost - 180.0).abs() < 1e-9);
        assert!((invoice.total_profit - 110.0).abs() < 1e-9);

        // Stock deducted.
        assert_eq!(ledger.item(&cable).await.unwrap().unwrap().quantity_on_hand, 90.0);
        assert_eq!(ledger.item(&rod).await.unwrap().unwrap().quantity_on_hand, 48.0);
    }

    #[tokio::test]
    async fn failed_sales_invoice_rolls_back_all_deductions() {
        let pool = connect_test().await;
        let cable = seed_material(&pool, "PVC Cable").await;
        let rod = seed_material(&pool, "Steel Rod").await;
        let ledger = InventoryLedger::new(pool.clone());
        ledger.receive(&cable, 100.0, 2.0, None).await.unwrap();
        ledger.receive(&rod, 1.0, 80.0, None).await.unwrap();

        let err = ledger
            .create_sales_invoice(&SalesInvoiceCreate {
                invoice_no: "LS-2".to_string(),
                customer_name: None,
                invoice_date: "2026-06-01".parse().unwrap(),
                tax: 0.0,
                notes: None,
                items: vec![
                    SalesItemCreate {
                        material_id: cable.clone(),
                        item_name: "PVC Cable".to_string(),
                        quantity: 10.0,
                        unit_price: 3.5,
                    },
                    // Overdraws the rod stock, failing the whole invoice.
                    SalesItemCreate {
                        material_id: rod.clone(),
                        item_name: "Steel Rod".to_string(),
                        quantity: 5.0,
                        unit_price: 120.0,
                    },
                ],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientStock { .. }));

        // The first line's deduction rolled back with the transaction.
        assert_eq!(ledger.item(&cable).await.unwrap().unwrap().quantity_on_hand, 100.0);
        assert_eq!(ledger.item(&rod).await.unwrap().unwrap().quantity_on_hand, 1.0);
        assert!(ledger.list_sales_invoices(0, 10).await.unwrap().is_empty());
    }
}
