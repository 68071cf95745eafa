//! Inventory and sales API shapes.

use crate::types::MaterialId;
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReceiveRequest {
    pub material_id: MaterialId,
    pub quantity: f64,
    pub unit_cost: f64,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct IssueRequest {
    pub material_id: MaterialId,
    pub quantity: f64,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct LowStockQuery {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    10.0
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SalesItemRequest {
    pub material_id: MaterialId,
    pub item_name: String,
    pub quantity: f64,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SalesInvoiceRequest {
    pub invoice_no: String,
    pub customer_name: Option<String>,
    pub invoice_date: NaiveDate,
    #[serde(default)]
    pub tax: f64,
    pub notes: Option<String>,
    pub items: Vec<SalesItemRequest>,
}

impl From<SalesInvoiceRequest> for crate::db::models::SalesInvoiceCreate {
    fn from(request: SalesInvoiceRequest) -> Self {
        Self {
            invoice_no: request.invoice_no,
            customer_name: request.customer_name,
            invoice_date: request.invoice_date,
            tax: request.tax,
            notes: request.notes,
            items: request
                .items
                .into_iter()
                .map(|item| crate::db::models::SalesItemCreate {
                    material_id: item.material_id,
                    item_name: item.item_name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
        }
    }
}
