//! Inventory ledger and local sales entities.

use crate::types::{MaterialId, RowId, SalesInvoiceId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MovementType {
    In,
    Out,
    Adjust,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct InventoryItemRecord {
    pub id: RowId,
    pub material_id: MaterialId,
    pub quantity_on_hand: f64,
    pub avg_cost: f64,
    pub last_movement_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItemRecord {
    /// Derived valuation at weighted average cost.
    pub fn total_value(&self) -> f64 {
        self.quantity_on_hand * self.avg_cost
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct StockMovementRecord {
    pub id: RowId,
    pub material_id: MaterialId,
    pub movement_type: MovementType,
    pub quantity: f64,
    pub unit_cost: f64,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct SalesInvoiceRecord {
    #[schema(value_type = uuid::Uuid)]
    pub id: SalesInvoiceId,
    pub invoice_no: String,
    pub customer_name: Option<String>,
    pub invoice_date: NaiveDate,
    pub subtotal: f64,
    pub tax: f64,
    pub total_amount: f64,
    pub total_cost: f64,
    pub total_profit: f64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct SalesItemRecord {
    pub id: RowId,
    #[schema(value_type = uuid::Uuid)]
    pub sales_invoice_id: SalesInvoiceId,
    pub material_id: MaterialId,
    pub item_name: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub line_total: f64,
    pub cost_basis: f64,
    pub profit: f64,
}

#[derive(Debug, Clone)]
pub struct SalesInvoiceCreate {
    pub invoice_no: String,
    pub customer_name: Option<String>,
    pub invoice_date: NaiveDate,
    pub tax: f64,
    pub notes: Option<String>,
    pub items: Vec<SalesItemCreate>,
}

#[derive(Debug, Clone)]
pub struct SalesItemCreate {
    pub material_id: MaterialId,
    pub item_name: String,
    pub quantity: f64,
    pub unit_price: f64,
}
