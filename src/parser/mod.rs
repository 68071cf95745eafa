//! Invoice parsing: a prioritized strategy chain.
//!
//! Parsers are tried in descending priority; the first whose confidence
//! clears its acceptance threshold terminates the chain. The template
//! parser (priority 100) accepts at ≥ 0.7, the table-aware parser (80) at
//! ≥ 0.5, and the vision parser (60) is terminal — whatever it returns is
//! accepted. A parser error or a below-threshold result just moves the
//! chain along; if nothing accepts, the document fails with
//! `PARSING_FAILED` and the attempt trail explains why.

pub mod numbers;
pub mod table;
pub mod template;
pub mod vision;

use crate::db::models::{PageRecord, RowType};
use crate::db::models::documents::DocumentRecord;
use crate::errors::{Error, Result};
use crate::llm::ModelProvider;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Tolerance for `quantity * unit_price` vs the stated line total.
pub const CALC_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedItem {
    pub line_number: i64,
    pub item_name: String,
    pub description: Option<String>,
    pub hs_code: Option<String>,
    pub unit: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub quantity: f64,
    pub unit_price: f64,
    pub total_price: f64,
    pub row_type: RowType,
    /// Set when the stated total is trusted despite failing the tolerance
    /// check; downstream audit still reports the discrepancy.
    pub calc_flagged: bool,
}

impl ParsedItem {
    pub fn calc_consistent(&self) -> bool {
        (self.quantity * self.unit_price - self.total_price).abs() < CALC_TOLERANCE
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedInvoice {
    pub invoice_no: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub seller_name: Option<String>,
    pub buyer_name: Option<String>,
    pub currency: Option<String>,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub discount: Option<f64>,
    pub total_amount: Option<f64>,
    pub bank_details: serde_json::Value,
    pub items: Vec<ParsedItem>,
    pub confidence: f64,
    pub warnings: Vec<String>,
}

impl ParsedInvoice {
    /// Enforce the line-item contract: non-empty names, finite numbers, and
    /// either tolerance-consistent arithmetic or an explicit flag.
    pub fn enforce_item_contract(&mut self) {
        self.items.retain(|item| !item.item_name.trim().is_empty());
        for item in &mut self.items {
            for value in [&mut item.quantity, &mut item.unit_price, &mut item.total_price] {
                if !value.is_finite() || *value < 0.0 {
                    *value = 0.0;
                }
            }
            if item.row_type == RowType::LineItem && !item.calc_consistent() && !item.calc_flagged {
                item.calc_flagged = true;
                self.warnings.push(format!(
                    "line {}: stated total {} differs from {} x {}",
                    item.line_number, item.total_price, item.quantity, item.unit_price
                ));
            }
        }
    }
}

/// One entry in the attempt trail recorded on every parse.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ParseAttempt {
    pub parser: String,
    pub accepted: bool,
    pub confidence: Option<f64>,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub invoice: ParsedInvoice,
    pub parser_used: String,
    pub attempts: Vec<ParseAttempt>,
}

#[async_trait::async_trait]
pub trait InvoiceParser: Send + Sync {
    fn name(&self) -> &'static str;
    fn priority(&self) -> u8;
    /// Minimum confidence to accept this parser's output. The terminal
    /// vision parser returns 0.0.
    fn acceptance_threshold(&self) -> f64;
    async fn parse(
        &self,
        document: &DocumentRecord,
        pages: &[PageRecord],
    ) -> anyhow::Result<Option<ParsedInvoice>>;
}

pub struct ParserRegistry {
    parsers: Vec<Box<dyn InvoiceParser>>,
}

impl ParserRegistry {
    pub fn new(provider: Arc<dyn ModelProvider>, vision_cache_dir: std::path::PathBuf) -> Self {
        let mut parsers: Vec<Box<dyn InvoiceParser>> = vec![
            Box::new(template::TemplateParser::new()),
            Box::new(table::TableParser::new()),
            Box::new(vision::VisionParser::new(provider, vision_cache_dir)),
        ];
        parsers.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Self { parsers }
    }

    #[cfg(test)]
    pub fn with_parsers(mut parsers: Vec<Box<dyn InvoiceParser>>) -> Self {
        parsers.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Self { parsers }
    }

    /// Walk the chain. Returns the first accepted result plus the trail of
    /// everything that was tried.
    pub async fn parse_invoice(
        &self,
        document: &DocumentRecord,
        pages: &[PageRecord],
    ) -> Result<ParseOutcome> {
        let mut attempts = Vec::new();

        for parser in &self.parsers {
            match parser.parse(document, pages).await {
                Ok(Some(mut invoice)) => {
                    invoice.enforce_item_contract();
                    let accepted = invoice.confidence >= parser.acceptance_threshold();
                    attempts.push(ParseAttempt {
                        parser: parser.name().to_string(),
                        accepted,
                        confidence: Some(invoice.confidence),
                        note: None,
                    });
                    if accepted {
                        tracing::info!(
                            parser = parser.name(),
                            confidence = invoice.confidence,
                            "parser accepted document"
                        );
                        return Ok(ParseOutcome {
                            invoice,
                            parser_used: parser.name().to_string(),
                            attempts,
                        });
                    }
                }
                Ok(None) => {
                    attempts.push(ParseAttempt {
                        parser: parser.name().to_string(),
                        accepted: false,
                        confidence: None,
                        note: Some("no result".to_string()),
                    });
                }
                Err(err) => {
                    tracing::warn!(parser = parser.name(), error = %err, "parser errored; trying next");
                    attempts.push(ParseAttempt {
                        parser: parser.name().to_string(),
                        accepted: false,
                        confidence: None,
                        note: Some(err.to_string()),
                    });
                }
            }
        }

        Err(Error::ParsingFailed {
            message: format!(
                "no parser accepted the document ({})",
                attempts
                    .iter()
                    .map(|a| match a.confidence {
                        Some(c) => format!("{}={c:.2}", a.parser),
                        None => format!("{}=-", a.parser),
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::models::documents::DocumentStatus;
    use chrono::Utc;

    pub(crate) fn test_document(mime: &str) -> DocumentRecord {
        DocumentRecord {
            id: uuid::Uuid::new_v4(),
            filename: "test.pdf".to_string(),
            file_path: "data/documents/test.pdf".to_string(),
            content_hash: "hash".to_string(),
            size_bytes: 10,
            mime_type: mime.to_string(),
            status: DocumentStatus::Processing,
            version: 1,
            is_latest: true,
            page_count: 1,
            company_key: None,
            metadata: "{}".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            indexed_at: None,
        }
    }

    pub(crate) fn page_with(text: &str) -> PageRecord {
        PageRecord {
            id: 1,
            document_id: uuid::Uuid::new_v4(),
            page_number: 1,
            page_type: crate::db::models::PageType::Invoice,
            type_confidence: 0.9,
            text: text.to_string(),
            image_hash: None,
        }
    }

    struct FixedParser {
        name: &'static str,
        priority: u8,
        threshold: f64,
        confidence: Option<f64>,
    }

    #[async_trait::async_trait]
    impl InvoiceParser for FixedParser {
        fn name(&self) -> &'static str {
            self.name
        }
        fn priority(&self) -> u8 {
            self.priority
        }
        fn acceptance_threshold(&self) -> f64 {
            self.threshold
        }
        async fn parse(
            &self,
            _document: &DocumentRecord,
            _pages: &[PageRecord],
        ) -> anyhow::Result<Option<ParsedInvoice>> {
            Ok(self.confidence.map(|confidence| ParsedInvoice {
                confidence,
                ..Default::default()
            }))
        }
    }

    #[tokio::test]
    async fn chain_falls_through_to_lower_priority() {
        let registry = ParserRegistry::with_parsers(vec![
            Box::new(FixedParser {
                name: "high",
                priority: 100,
                threshold: 0.7,
                confidence: Some(0.4),
            }),
            Box::new(FixedParser {
                name: "low",
                priority: 80,
                threshold: 0.5,
                confidence: Some(0.6),
            }),
        ]);
        let outcome = registry
            .parse_invoice(&test_document("application/pdf"), &[])
            .await
            .unwrap();
        assert_eq!(outcome.parser_used, "low");
        assert_eq!(outcome.attempts.len(), 2);
        assert!(!outcome.attempts[0].accepted);
        assert!(outcome.attempts[1].accepted);
    }

    #[tokio::test]
    async fn chain_exhaustion_is_parsing_failed() {
        let registry = ParserRegistry::with_parsers(vec![Box::new(FixedParser {
            name: "only",
            priority: 100,
            threshold: 0.7,
            confidence: None,
        })]);
        let err = registry
            .parse_invoice(&test_document("application/pdf"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ParsingFailed { .. }));
    }

    #[test]
    fn item_contract_flags_inconsistent_rows() {
        let mut invoice = ParsedInvoice {
            items: vec![ParsedItem {
                line_number: 1,
                item_name: "Widget".to_string(),
                description: None,
                hs_code: None,
                unit: None,
                brand: None,
                model: None,
                quantity: 5.0,
                unit_price: 100.0,
                total_price: 600.0,
                row_type: RowType::LineItem,
                calc_flagged: false,
            }],
            ..Default::default()
        };
        invoice.enforce_item_contract();
        assert!(invoice.items[0].calc_flagged);
        assert_eq!(invoice.warnings.len(), 1);
    }
}
