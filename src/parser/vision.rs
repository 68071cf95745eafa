//! Vision parser: last resort for scanned/photographed invoices.
//!
//! Sends the image to the provider's vision capability with a prompt that
//! demands a JSON invoice, repairs the response, and maps it onto
//! [`ParsedInvoice`]. Terminal in the chain — whatever it produces is
//! accepted. Captions are cached on disk keyed by image hash so re-parsing
//! a document never pays for the same vision call twice.

use crate::db::models::{PageRecord, RowType};
use crate::db::models::documents::DocumentRecord;
use crate::json_repair::repair_json;
use crate::llm::ModelProvider;
use crate::parser::numbers::parse_amount;
use crate::parser::template::parse_date;
use crate::parser::{InvoiceParser, ParsedInvoice, ParsedItem};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;

const VISION_PROMPT: &str = "You are reading a photographed or scanned commercial invoice. \
Respond with only a JSON object: {\"invoice_no\": string|null, \"invoice_date\": \"YYYY-MM-DD\"|null, \
\"seller_name\": string|null, \"buyer_name\": string|null, \"currency\": string|null, \
\"subtotal\": number|null, \"tax\": number|null, \"total_amount\": number|null, \
\"items\": [{\"name\": string, \"quantity\": number, \"unit_price\": number, \"total_price\": number}]}";

pub struct VisionParser {
    provider: Arc<dyn ModelProvider>,
    cache_dir: PathBuf,
}

impl VisionParser {
    pub fn new(provider: Arc<dyn ModelProvider>, cache_dir: PathBuf) -> Self {
        Self { provider, cache_dir }
    }

    fn cache_path(&self, image: &[u8]) -> PathBuf {
        let hash = format!("{:x}", Sha256::digest(image));
        self.cache_dir.join(format!("{hash}.json"))
    }

    async fn caption_cached(&self, image: &[u8]) -> anyhow::Result<String> {
        let path = self.cache_path(image);
        if let Ok(cached) = tokio::fs::read_to_string(&path).await {
            return Ok(cached);
        }

        let caption = self.provider.caption(image, VISION_PROMPT).await?;

        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        if let Err(err) = tokio::fs::write(&path, &caption).await {
            tracing::debug!(error = %err, "vision cache write failed; continuing");
        }
        Ok(caption)
    }

    fn map_response(value: &serde_json::Value) -> ParsedInvoice {
        let text_field = |key: &str| {
            value
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        let number_field = |key: &str| {
            value.get(key).and_then(|v| {
                v.as_f64()
                    .or_else(|| v.as_str().and_then(parse_amount))
                    .filter(|n| n.is_finite())
            })
        };

        let items = value
            .get("items")
            .and_then(|v| v.as_array())
            .map(|rows| {
                rows.iter()
                    .enumerate()
                    .filter_map(|(index, row)| {
                        let name = row.get("name")?.as_str()?.trim().to_string();
                        if name.is_empty() {
                            return None;
                        }
                        let num = |key: &str| {
                            row.get(key)
                                .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(parse_amount)))
                                .unwrap_or(0.0)
                        };
                        Some(ParsedItem {
                            line_number: (index + 1) as i64,
                            item_name: name,
                            description: None,
                            hs_code: None,
                            unit: None,
                            brand: None,
                            model: None,
                            quantity: num("quantity"),
                            unit_price: num("unit_price"),
                            total_price: num("total_price"),
                            row_type: RowType::LineItem,
                            calc_flagged: false,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut invoice = ParsedInvoice {
            invoice_no: text_field("invoice_no"),
            invoice_date: text_field("invoice_date").as_deref().and_then(parse_date),
            seller_name: text_field("seller_name"),
            buyer_name: text_field("buyer_name"),
            currency: text_field("currency"),
            subtotal: number_field("subtotal"),
            tax: number_field("tax"),
            total_amount: number_field("total_amount"),
            items,
            ..Default::default()
        };

        // Vision output is trusted but marked: confidence reflects how much
        // of the structure came back.
        let mut confidence: f64 = 0.3;
        if invoice.invoice_no.is_some() {
            confidence += 0.2;
        }
        if !invoice.items.is_empty() {
            confidence += 0.3;
        }
        if invoice.total_amount.is_some() {
            confidence += 0.2;
        }
        invoice.confidence = confidence.min(1.0);
        invoice
    }
}

#[async_trait::async_trait]
impl InvoiceParser for VisionParser {
    fn name(&self) -> &'static str {
        "vision"
    }

    fn priority(&self) -> u8 {
        60
    }

    /// Terminal parser: anything it returns is accepted.
    fn acceptance_threshold(&self) -> f64 {
        0.0
    }

    async fn parse(
        &self,
        document: &DocumentRecord,
        _pages: &[PageRecord],
    ) -> anyhow::Result<Option<ParsedInvoice>> {
        if !document.mime_type.starts_with("image/") {
            return Ok(None);
        }

        let image = tokio::fs::read(&document.file_path).await?;
        let caption = self.caption_cached(&image).await?;
        let Some(value) = repair_json(&caption) else {
            anyhow::bail!("vision response contained no parseable JSON");
        };
        Ok(Some(Self::map_response(&value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_maps_onto_invoice() {
        let value = json!({
            "invoice_no": "VIS-9",
            "invoice_date": "2026-02-14",
            "seller_name": "Corner Shop",
            "currency": "AED",
            "total_amount": 42.5,
            "items": [
                {"name": "Tape", "quantity": 5, "unit_price": 2.5, "total_price": 12.5},
                {"name": "", "quantity": 1, "unit_price": 1, "total_price": 1}
            ]
        });
        let invoice = VisionParser::map_response(&value);
        assert_eq!(invoice.invoice_no.as_deref(), Some("VIS-9"));
        assert_eq!(invoice.items.len(), 1);
        assert_eq!(invoice.items[0].quantity, 5.0);
        assert!(invoice.confidence >= 0.9);
    }

    #[test]
    fn stringly_typed_numbers_are_tolerated() {
        let value = json!({
            "total_amount": "1.234,56",
            "items": [{"name": "Bolt", "quantity": "10", "unit_price": "0,50", "total_price": "5,00"}]
        });
        let invoice = VisionParser::map_response(&value);
        assert_eq!(invoice.total_amount, Some(1234.56));
        assert_eq!(invoice.items[0].unit_price, 0.5);
    }
}
