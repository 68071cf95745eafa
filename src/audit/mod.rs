//! Audit engine: deterministic rules composed with an optional
//! model-assisted pass.
//!
//! Every audit carries all nine analytical sections (empty objects where
//! nothing applies) and an ordered issue list. The sanity gate guards
//! against trusting model output for invoices that have neither items nor
//! an invoice number: such audits re-run rule-only and are marked
//! `audit_type = fallback`, with processing time accumulated across both
//! attempts.

pub mod rules;
pub mod semantic;

use crate::db::handlers::{Audits, Invoices};
use crate::db::models::{
    AuditCreate, AuditStatus, AuditType, InvoiceRecord, LineItemRecord, RowType,
};
use crate::errors::{Entity, Error, Result};
use crate::llm::ModelProvider;
use crate::search::{HybridRetriever, SearchRequest, SearchStrategy};
use crate::types::{AuditId, InvoiceId};
use rules::{AuditIssue, IssueSeverity, RuleCode};
use serde::Serialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AuditOptions {
    pub use_llm: bool,
    pub strict_mode: bool,
    pub rules: Option<HashSet<RuleCode>>,
    pub price_anomaly_threshold: f64,
    pub duplicate_window_days: i64,
    pub save_result: bool,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            use_llm: true,
            strict_mode: false,
            rules: None,
            price_anomaly_threshold: 0.20,
            duplicate_window_days: 30,
            save_result: true,
        }
    }
}

/// A completed audit, as returned to callers and persisted when requested.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditOutcome {
    #[schema(value_type = uuid::Uuid)]
    pub id: AuditId,
    #[schema(value_type = uuid::Uuid)]
    pub invoice_id: InvoiceId,
    pub overall_status: AuditStatus,
    pub success: bool,
    pub audit_type: AuditType,
    pub sections: Value,
    pub issues: Vec<AuditIssue>,
    pub processing_time_ms: i64,
    pub model_identifier: Option<String>,
    pub confidence: f64,
}

/// The items/invoice-number sanity gate.
pub fn sanity_ok(invoice: &InvoiceRecord, items: &[LineItemRecord]) -> bool {
    let items_empty = !items.iter().any(|i| i.row_type == RowType::LineItem);
    let no_invoice_no = invoice.invoice_no.as_deref().is_none_or(|v| v.trim().is_empty());
    !(items_empty && no_invoice_no)
}

pub struct AuditEngine {
    pool: SqlitePool,
    provider: Arc<dyn ModelProvider>,
    retriever: Option<Arc<HybridRetriever>>,
}

impl AuditEngine {
    pub fn new(
        pool: SqlitePool,
        provider: Arc<dyn ModelProvider>,
        retriever: Option<Arc<HybridRetriever>>,
    ) -> Self {
        Self {
            pool,
            provider,
            retriever,
        }
    }

    #[instrument(skip(self, opts), fields(invoice_id = %invoice_id), err)]
    pub async fn audit_invoice(&self, invoice_id: InvoiceId, opts: &AuditOptions) -> Result<AuditOutcome> {
        let started = Instant::now();

        let invoice = Invoices::get(&self.pool, invoice_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                entity: Entity::Invoice,
                id: invoice_id.to_string(),
            })?;
        let items = Invoices::items_for(&self.pool, invoice_id).await?;
        let sanity = sanity_ok(&invoice, &items);

        let mut issues = self.deterministic_pass(&invoice, &items, opts).await;
        let mut sections = deterministic_sections(&invoice, &items, &issues);
        let mut audit_type = AuditType::RulesOnly;
        let mut success = true;
        let mut model_identifier = None;
        let mut confidence = invoice.confidence;

        if opts.use_llm {
            let health = self.provider.check_health().await;
            if health.available {
                let context = self.retrieve_context(&invoice, &items).await;
                match semantic::run_model_pass(self.provider.as_ref(), &invoice, &items, &context).await {
                    Ok(model_sections) => {
                        model_identifier = Some(health.identifier.clone());
                        if sanity {
                            audit_type = AuditType::RulesAndModel;
                            if let Some(c) = model_sections
                                .get("final_verdict")
                                .and_then(|v| v.get("confidence"))
                                .and_then(|v| v.as_f64())
                            {
                                confidence = c.clamp(0.0, 1.0);
                            }
                            merge_model_sections(&mut sections, model_sections);
                        } else {
                            // Model output discarded: rule-only rerun.
                            tracing::warn!(
                                invoice_id = %invoice_id,
                                "sanity gate rejected model-assisted audit; falling back to rules"
                            );
                            audit_type = AuditType::Fallback;
                            issues = self.deterministic_pass(&invoice, &items, opts).await;
                            sections = deterministic_sections(&invoice, &items, &issues);
                        }
                    }
                    Err(reason) => {
                        tracing::warn!(invoice_id = %invoice_id, reason, "model audit pass failed");
                        success = false;
                        audit_type = AuditType::Fallback;
                    }
                }
            } else {
                tracing::info!(
                    invoice_id = %invoice_id,
                    error = health.error.as_deref().unwrap_or("unknown"),
                    "provider unhealthy; running rules only"
                );
            }
        }

        if opts.strict_mode {
            rules::escalate_for_strict_mode(&mut issues);
        }

        let has_error = issues.iter().any(|i| i.severity == IssueSeverity::Error);
        let has_warning = issues.iter().any(|i| i.severity == IssueSeverity::Warning);
        let overall_status = if has_error {
            AuditStatus::Fail
        } else if has_warning || !sanity {
            AuditStatus::Hold
        } else {
            AuditStatus::Pass
        };

        if let Some(verdict) = sections.get_mut("final_verdict") {
            if let Some(map) = verdict.as_object_mut() {
                map.insert("status".to_string(), json!(overall_status));
                map.insert("issue_count".to_string(), json!(issues.len()));
                map.insert("sanity_ok".to_string(), json!(sanity));
            }
        }

        let outcome = AuditOutcome {
            id: Uuid::new_v4(),
            invoice_id,
            overall_status,
            success,
            audit_type,
            sections,
            issues,
            processing_time_ms: started.elapsed().as_millis() as i64,
            model_identifier,
            confidence,
        };

        if opts.save_result {
            Audits::insert(
                &self.pool,
                &AuditCreate {
                    id: outcome.id,
                    invoice_id,
                    overall_status: outcome.overall_status,
                    success: outcome.success,
                    audit_type: outcome.audit_type,
                    sections: outcome.sections.clone(),
                    issues: serde_json::to_value(&outcome.issues).unwrap_or_else(|_| json!([])),
                    processing_time_ms: outcome.processing_time_ms,
                    model_identifier: outcome.model_identifier.clone(),
                    confidence: outcome.confidence,
                },
            )
            .await?;
        }

        Ok(outcome)
    }

    async fn deterministic_pass(
        &self,
        invoice: &InvoiceRecord,
        items: &[LineItemRecord],
        opts: &AuditOptions,
    ) -> Vec<AuditIssue> {
        let today = chrono::Utc::now().date_naive();
        let mut issues = Vec::new();
        issues.extend(rules::check_line_math(items));
        issues.extend(rules::check_subtotal(invoice, items));
        issues.extend(rules::check_total(invoice));
        issues.extend(rules::check_required(invoice));
        issues.extend(rules::check_dates(invoice, today));
        issues.extend(rules::check_bank_details(invoice));
        issues.extend(
            rules::check_price_anomalies(&self.pool, invoice, items, opts.price_anomaly_threshold).await,
        );
        issues.extend(
            rules::check_cross_invoice_duplicates(&self.pool, invoice, items, opts.duplicate_window_days)
                .await,
        );
        rules::filter_rules(issues, opts.rules.as_ref())
    }

    /// Context chunks for the semantic pass, from the invoice's own corpus
    /// neighborhood. Retrieval failure just means less context.
    async fn retrieve_context(&self, invoice: &InvoiceRecord, items: &[LineItemRecord]) -> Vec<String> {
        let Some(retriever) = &self.retriever else {
            return Vec::new();
        };
        let mut terms: Vec<String> = Vec::new();
        if let Some(seller) = &invoice.seller_name {
            terms.push(seller.clone());
        }
        terms.extend(
            items
                .iter()
                .filter(|i| i.row_type == RowType::LineItem)
                .take(3)
                .map(|i| i.item_name.clone()),
        );
        if terms.is_empty() {
            return Vec::new();
        }

        let request = SearchRequest {
            query: terms.join(" "),
            top_k: 5,
            strategy: SearchStrategy::Hybrid,
            use_cache: false,
            ..Default::default()
        };
        match retriever.search(&request).await {
            Ok(results) => results.results.into_iter().map(|hit| hit.text).collect(),
            Err(err) => {
                tracing::debug!(error = %err, "context retrieval for audit failed");
                Vec::new()
            }
        }
    }
}

/// Sections the deterministic pass can fill on its own. The amount-in-words
/// comparison needs model extraction, so that section stays empty here.
fn deterministic_sections(
    invoice: &InvoiceRecord,
    items: &[LineItemRecord],
    issues: &[AuditIssue],
) -> Value {
    let line_items: Vec<&LineItemRecord> =
        items.iter().filter(|i| i.row_type == RowType::LineItem).collect();
    let bank = invoice.bank_details_json();

    let mut sections = serde_json::Map::new();
    for name in semantic::SECTION_NAMES {
        sections.insert(name.to_string(), json!({}));
    }
    sections.insert(
        "document_intake".to_string(),
        json!({
            "invoice_id": invoice.id,
            "document_id": invoice.document_id,
            "parser_used": invoice.parser_used,
            "parsing_status": invoice.parsing_status,
            "confidence": invoice.confidence,
        }),
    );
    sections.insert(
        "items_table".to_string(),
        json!({
            "row_count": items.len(),
            "line_item_count": line_items.len(),
            "total_quantity": line_items.iter().map(|i| i.quantity).sum::<f64>(),
        }),
    );
    sections.insert(
        "arithmetic_check".to_string(),
        json!({
            "line_math_errors": issues.iter().filter(|i| i.code == RuleCode::MathError).count(),
            "subtotal_ok": !issues.iter().any(|i| i.code == RuleCode::SubtotalMismatch),
            "total_ok": !issues.iter().any(|i| i.code == RuleCode::TotalMismatch),
        }),
    );
    sections.insert(
        "bank_details_check".to_string(),
        json!({
            "iban_present": bank.get("iban").and_then(|v| v.as_str()).is_some(),
            "swift_present": bank.get("swift").and_then(|v| v.as_str()).is_some(),
        }),
    );
    sections.insert("final_verdict".to_string(), json!({}));
    Value::Object(sections)
}

/// Overlay model sections onto the deterministic ones. Model content wins
/// for sections the rules cannot produce; deterministic arithmetic keeps
/// its own section.
fn merge_model_sections(sections: &mut Value, model: serde_json::Map<String, Value>) {
    let Some(map) = sections.as_object_mut() else { return };
    for (name, value) in model {
        if name == "arithmetic_check" || name == "document_intake" {
            continue;
        }
        if semantic::SECTION_NAMES.contains(&name.as_str()) {
            let empty = value.as_object().map(|m| m.is_empty()).unwrap_or(false);
            if !empty {
                map.insert(name, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingConfig, LlmConfig};
    use crate::db::connect_test;
    use crate::db::handlers::invoices::tests::{invoice_request, item};
    use crate::db::models::{InvoiceCreate, LineItemCreate, ParsingStatus};
    use crate::llm::inprocess::InProcessProvider;
    use crate::llm::{GenerateOptions, LlmError, ProviderHealth, TextStream};
    use serde_json::json;

    /// Provider whose generate() returns a fixed payload.
    struct StubProvider {
        response: String,
    }

    #[async_trait::async_trait]
    impl ModelProvider for StubProvider {
        fn identifier(&self) -> String {
            "stub-model".to_string()
        }
        async fn generate(&self, _prompt: &str, _opts: &GenerateOptions) -> std::result::Result<String, LlmError> {
            Ok(self.response.clone())
        }
        async fn stream(&self, _prompt: &str, _opts: &GenerateOptions) -> std::result::Result<TextStream, LlmError> {
            Err(LlmError::Unsupported { capability: "stream" })
        }
        async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
            Ok(texts.iter().map(|_| vec![0.0; 8]).collect())
        }
        async fn check_health(&self) -> ProviderHealth {
            ProviderHealth {
                available: true,
                latency_ms: 1,
                identifier: self.identifier(),
                error: None,
            }
        }
    }

    fn rules_engine(pool: &SqlitePool) -> AuditEngine {
        let provider = Arc::new(InProcessProvider::new(
            LlmConfig::default(),
            EmbeddingConfig {
                dimension: 8,
                ..Default::default()
            },
        ));
        AuditEngine::new(pool.clone(), provider, None)
    }

    fn rules_only() -> AuditOptions {
        AuditOptions {
            use_llm: false,
            ..Default::default()
        }
    }

    #[test]
    fn sanity_gate_requires_items_or_invoice_number() {
        use crate::audit::rules::tests::{invoice, line_item};

        let with_both = invoice();
        let items = vec![line_item("Widget", 1.0, 1.0, 1.0)];
        assert!(sanity_ok(&with_both, &items));

        let mut no_number = invoice();
        no_number.invoice_no = None;
        assert!(sanity_ok(&no_number, &items));
        assert!(sanity_ok(&with_both, &[]));

        // Both absent at once is the one rejected combination.
        assert!(!sanity_ok(&no_number, &[]));
    }

    #[tokio::test]
    async fn clean_invoice_passes() {
        let pool = connect_test().await;
        let (invoice, _) = Invoices::create_with_items(
            &pool,
            &invoice_request(),
            &[item("PVC Cable 10mm", 100.0, 5.0, 500.0)],
        )
        .await
        .unwrap();

        let outcome = rules_engine(&pool)
            .audit_invoice(invoice.id, &rules_only())
            .await
            .unwrap();
        assert_eq!(outcome.overall_status, AuditStatus::Pass);
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.audit_type, AuditType::RulesOnly);

        // All nine sections present.
        let sections = outcome.sections.as_object().unwrap();
        for name in semantic::SECTION_NAMES {
            assert!(sections.contains_key(name), "missing section {name}");
        }
    }

    #[tokio::test]
    async fn math_error_fails_the_audit() {
        let pool = connect_test().await;
        let mut request = invoice_request();
        request.subtotal = Some(600.0);
        request.total_amount = Some(600.0);
        let (invoice, _) = Invoices::create_with_items(
            &pool,
            &request,
            &[item("Widget", 5.0, 100.0, 600.0)],
        )
        .await
        .unwrap();

        let outcome = rules_engine(&pool)
            .audit_invoice(invoice.id, &rules_only())
            .await
            .unwrap();
        assert_eq!(outcome.overall_status, AuditStatus::Fail);
        assert!(
            outcome
                .issues
                .iter()
                .any(|i| i.code == RuleCode::MathError && i.severity == IssueSeverity::Error)
        );
    }

    #[tokio::test]
    async fn price_anomaly_holds_the_audit() {
        let pool = connect_test().await;

        // Three historical observations at 100.00 from the same seller.
        for day in ["2026-04-01", "2026-04-10", "2026-04-20"] {
            let mut request = invoice_request();
            request.invoice_no = Some(format!("HIST-{day}"));
            request.invoice_date = Some(day.parse().unwrap());
            Invoices::create_with_items(&pool, &request, &[item("Steel Rod", 10.0, 100.0, 1000.0)])
                .await
                .unwrap();
        }

        let mut probe = invoice_request();
        probe.invoice_no = Some("PROBE-1".to_string());
        probe.subtotal = Some(1250.0);
        probe.total_amount = Some(1250.0);
        let (invoice, _) =
            Invoices::create_with_items(&pool, &probe, &[item("Steel Rod", 10.0, 125.0, 1250.0)])
                .await
                .unwrap();

        let outcome = rules_engine(&pool)
            .audit_invoice(invoice.id, &rules_only())
            .await
            .unwrap();

        let anomaly = outcome
            .issues
            .iter()
            .find(|i| i.code == RuleCode::PriceAnomaly)
            .expect("price anomaly issue");
        assert!(anomaly.message.contains("0.25"));
        assert_eq!(outcome.overall_status, AuditStatus::Hold);
    }

    #[tokio::test]
    async fn model_pass_merges_sections() {
        let pool = connect_test().await;
        let (invoice, _) = Invoices::create_with_items(
            &pool,
            &invoice_request(),
            &[item("PVC Cable 10mm", 100.0, 5.0, 500.0)],
        )
        .await
        .unwrap();

        let model_response = json!({
            "proforma_summary": {"summary": "clean purchase of cable"},
            "amount_words_check": {"matches": true},
            "final_verdict": {"verdict": "PASS", "confidence": 0.92, "reason": "consistent"}
        })
        .to_string();
        let engine = AuditEngine::new(
            pool.clone(),
            Arc::new(StubProvider {
                response: format!("Here you go:\n```json\n{model_response}\n```"),
            }),
            None,
        );

        let outcome = engine
            .audit_invoice(invoice.id, &AuditOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.audit_type, AuditType::RulesAndModel);
        assert!(outcome.success);
        assert_eq!(outcome.confidence, 0.92);
        assert_eq!(outcome.sections["proforma_summary"]["summary"], "clean purchase of cable");
        assert_eq!(outcome.model_identifier.as_deref(), Some("stub-model"));
    }

    #[tokio::test]
    async fn unparseable_model_output_falls_back_to_rules() {
        let pool = connect_test().await;
        let (invoice, _) = Invoices::create_with_items(
            &pool,
            &invoice_request(),
            &[item("PVC Cable 10mm", 100.0, 5.0, 500.0)],
        )
        .await
        .unwrap();

        let engine = AuditEngine::new(
            pool.clone(),
            Arc::new(StubProvider {
                response: "I cannot produce JSON today.".to_string(),
            }),
            None,
        );
        let outcome = engine
            .audit_invoice(invoice.id, &AuditOptions::default())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.audit_type, AuditType::Fallback);
        // Rule output still decides the status.
        assert_eq!(outcome.overall_status, AuditStatus::Pass);
    }

    #[tokio::test]
    async fn sanity_gate_discards_model_output() {
        let pool = connect_test().await;
        let request = InvoiceCreate {
            invoice_no: None,
            ..invoice_request()
        };
        let (invoice, _) = Invoices::create_with_items(&pool, &request, &[]).await.unwrap();

        let model_response = json!({"final_verdict": {"verdict": "PASS", "confidence": 0.99}}).to_string();
        let engine = AuditEngine::new(
            pool.clone(),
            Arc::new(StubProvider {
                response: model_response,
            }),
            None,
        );
        let outcome = engine
            .audit_invoice(invoice.id, &AuditOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.audit_type, AuditType::Fallback);
        // MISSING_REQUIRED fires for the absent invoice number.
        assert_eq!(outcome.overall_status, AuditStatus::Fail);
    }

    #[tokio::test]
    async fn strict_mode_turns_warnings_into_failures() {
        let pool = connect_test().await;
        let mut request = invoice_request();
        request.bank_details = json!({});
        let (invoice, _) = Invoices::create_with_items(
            &pool,
            &request,
            &[item("PVC Cable 10mm", 100.0, 5.0, 500.0)],
        )
        .await
        .unwrap();

        let engine = rules_engine(&pool);
        let lenient = engine.audit_invoice(invoice.id, &rules_only()).await.unwrap();
        assert_eq!(lenient.overall_status, AuditStatus::Hold);

        let strict = engine
            .audit_invoice(
                invoice.id,
                &AuditOptions {
                    use_llm: false,
                    strict_mode: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(strict.overall_status, AuditStatus::Fail);
    }

    #[tokio::test]
    async fn saved_results_land_in_the_audit_table() {
        let pool = connect_test().await;
        let (invoice, _) = Invoices::create_with_items(
            &pool,
            &invoice_request(),
            &[item("PVC Cable 10mm", 100.0, 5.0, 500.0)],
        )
        .await
        .unwrap();

        let outcome = rules_engine(&pool)
            .audit_invoice(invoice.id, &rules_only())
            .await
            .unwrap();
        let saved = Audits::list_for_invoice(&pool, invoice.id).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, outcome.id);
        assert_eq!(saved[0].overall_status, AuditStatus::Pass);
    }
}
