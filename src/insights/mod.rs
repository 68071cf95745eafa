//! On-demand expiry and anomaly insights, optionally materialized as
//! reminders.
//!
//! Three scans: expiring company documents, unmatched catalog items on the
//! latest invoices, and recent price anomalies. Derived reminders carry a
//! prefixed `linked_entity_type` namespace so they never collide with
//! user-created ones, and creation is idempotent while an active reminder
//! for the same linked entity exists.

use crate::db::handlers::{CompanyDocuments, Invoices, PriceHistory, Reminders};
use crate::db::models::{ReminderCreate, RowType, Severity};
use crate::errors::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::instrument;
use utoipa::ToSchema;

pub const LINK_EXPIRING_DOC: &str = "insight:expiring_doc";
pub const LINK_UNMATCHED_ITEM: &str = "insight:unmatched_item";
pub const LINK_PRICE_ANOMALY: &str = "insight:price_anomaly";

/// Expiry horizon inside which an expiring document is CRITICAL.
const CRITICAL_DAYS: i64 = 7;

/// How many recent line items the anomaly scan inspects.
const RECENT_ITEM_WINDOW: i64 = 200;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Insight {
    pub kind: String,
    pub severity: Severity,
    pub title: String,
    pub detail: String,
    pub linked_entity_type: String,
    pub linked_entity_id: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InsightReport {
    pub insights: Vec<Insight>,
    pub reminders_created: usize,
}

pub struct InsightEvaluator {
    pool: SqlitePool,
}

impl InsightEvaluator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self), err)]
    pub async fn evaluate(&self, expiry_days: i64, auto_create: bool) -> Result<InsightReport> {
        let today = chrono::Utc::now().date_naive();
        let mut insights = Vec::new();

        // Expiring company documents.
        let horizon = today + chrono::Duration::days(expiry_days.max(0));
        for document in CompanyDocuments::expiring(&self.pool, horizon).await? {
            let Some(expiry) = document.expiry_date else { continue };
            let days_left = (expiry - today).num_days();
            let severity = if days_left <= CRITICAL_DAYS {
                Severity::Critical
            } else {
                Severity::Warning
            };
            insights.push(Insight {
                kind: "expiring_doc".to_string(),
                severity,
                title: format!("{} expires {}", document.title, expiry),
                detail: format!(
                    "{} ({}) expires in {} day(s)",
                    document.title, document.doc_type, days_left
                ),
                linked_entity_type: LINK_EXPIRING_DOC.to_string(),
                linked_entity_id: document.id.to_string(),
            });
        }

        // Unmatched items on latest invoices, deduplicated by normalized name.
        let mut seen_names = HashSet::new();
        for item in Invoices::unmatched_latest_items(&self.pool).await? {
            let normalized = item.item_name.trim().to_lowercase();
            if !seen_names.insert(normalized.clone()) {
                continue;
            }
            insights.push(Insight {
                kind: "unmatched_item".to_string(),
                severity: Severity::Info,
                title: format!("\"{}\" is not in the catalog", item.item_name),
                detail: format!(
                    "invoice item \"{}\" has no matched material; add it to the catalog to track prices",
                    item.item_name
                ),
                linked_entity_type: LINK_UNMATCHED_ITEM.to_string(),
                linked_entity_id: normalized,
            });
        }

        // Price anomalies over the recent item window.
        for item in Invoices::recent_items(&self.pool, RECENT_ITEM_WINDOW).await? {
            if item.row_type != RowType::LineItem || item.unit_price <= 0.0 {
                continue;
            }
            let normalized = item.item_name.trim().to_lowercase();
            let stats = match PriceHistory::stats(
                &self.pool,
                &normalized,
                None,
                None,
                Some(item.invoice_id),
            )
            .await
            {
                Ok(Some(stats)) => stats,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(error = %err, "price stats unavailable during insight scan");
                    break;
                }
            };
            if stats.occurrence_count < 2 || stats.avg_price <= 0.0 {
                continue;
            }
            let deviation = (item.unit_price - stats.avg_price).abs() / stats.avg_price;
            if deviation <= 0.20 {
                continue;
            }
            let entity_id = format!("{}:{}", item.invoice_id, item.id);
            insights.push(Insight {
                kind: "price_anomaly".to_string(),
                severity: Severity::Warning,
                title: format!("price anomaly on \"{}\"", item.item_name),
                detail: format!(
                    "unit price {:.2} deviates {:.0}% from the historical average {:.2}",
                    item.unit_price,
                    deviation * 100.0,
                    stats.avg_price
                ),
                linked_entity_type: LINK_PRICE_ANOMALY.to_string(),
                linked_entity_id: entity_id,
            });
        }

        let mut reminders_created = 0;
        if auto_create {
            for insight in &insights {
                let exists = Reminders::active_exists_for(
                    &self.pool,
                    &insight.linked_entity_type,
                    &insight.linked_entity_id,
                )
                .await?;
                if exists {
                    continue;
                }
                Reminders::create(
                    &self.pool,
                    &ReminderCreate {
                        title: insight.title.clone(),
                        body: Some(insight.detail.clone()),
                        due_date: None,
                        severity: Some(insight.severity),
                        linked_entity_type: Some(insight.linked_entity_type.clone()),
                        linked_entity_id: Some(insight.linked_entity_id.clone()),
                    },
                )
                .await?;
                reminders_created += 1;
            }
        }

        Ok(InsightReport {
            insights,
            reminders_created,
        })
    }
}
