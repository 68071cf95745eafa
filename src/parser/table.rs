//! Table-aware parser: column heuristics for invoices whose item tables
//! carry no row numbering. Second in the chain; accepts at ≥ 0.5.

use crate::db::models::{PageRecord, RowType};
use crate::db::models::documents::DocumentRecord;
use crate::parser::numbers::{parse_amount, parse_quantity};
use crate::parser::template::{TemplateParser, relevant_text};
use crate::parser::{InvoiceParser, ParsedInvoice, ParsedItem};
use once_cell::sync::Lazy;
use regex::Regex;

/// Trailing numeric columns: `<name> <num> <num> [<num>]`.
static TRAILING_COLUMNS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*?[^\s0-9.,])\s+([0-9.,٠-٩]+)\s+([0-9.,٠-٩]+)(?:\s+([0-9.,٠-٩]+))?\s*$")
        .expect("columns regex")
});

static HEADER_ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:sl|no|item|description)\b.*\b(?:qty|quantity)\b.*\b(?:price|rate|amount|total)\b")
        .expect("header regex")
});

fn looks_like_totals(name: &str) -> bool {
    let lower = name.to_lowercase();
    ["subtotal", "sub total", "total", "grand", "vat", "tax", "discount", "balance", "amount due"]
        .iter()
        .any(|kw| lower.starts_with(kw) || lower.ends_with(kw))
}

pub struct TableParser;

impl TableParser {
    pub fn new() -> Self {
        Self
    }

    fn extract_items(text: &str) -> Vec<ParsedItem> {
        let mut items: Vec<ParsedItem> = Vec::new();
        let mut in_table = false;

        for raw_line in text.lines() {
            let line = raw_line.trim_end();
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if HEADER_ROW_RE.is_match(trimmed) {
                in_table = true;
                continue;
            }

            if let Some(caps) = TRAILING_COLUMNS_RE.captures(line) {
                let name = caps[1].trim().trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')').trim();
                if name.is_empty() {
                    continue;
                }
                if looks_like_totals(name) {
                    in_table = false;
                    continue;
                }

                let first = parse_quantity(&caps[2]);
                let second = parse_amount(&caps[3]);
                let third = caps.get(4).and_then(|m| parse_amount(m.as_str()));

                let (quantity, unit_price, total_price) = match (first, second, third) {
                    (Some(qty), Some(price), Some(total)) => (qty, price, total),
                    // Two columns: quantity and unit price, total derived.
                    (Some(qty), Some(price), None) => (qty, price, qty * price),
                    _ => continue,
                };

                items.push(ParsedItem {
                    line_number: (items.len() + 1) as i64,
                    item_name: name.to_string(),
                    description: None,
                    hs_code: None,
                    unit: None,
                    brand: None,
                    model: None,
                    quantity,
                    unit_price,
                    total_price,
                    row_type: RowType::LineItem,
                    calc_flagged: false,
                });
                in_table = true;
            } else if in_table {
                // Orphan continuation under the last item.
                if looks_like_totals(trimmed) {
                    in_table = false;
                    continue;
                }
                if parse_amount(trimmed.split_whitespace().last().unwrap_or("")).is_some() {
                    continue;
                }
                if let Some(last) = items.last_mut() {
                    match &mut last.description {
                        Some(description) => {
                            description.push(' ');
                            description.push_str(trimmed);
                        }
                        None => last.description = Some(trimmed.to_string()),
                    }
                }
            }
        }
        items
    }

    fn score(invoice: &ParsedInvoice) -> f64 {
        let line_items: Vec<&ParsedItem> = invoice
            .items
            .iter()
            .filter(|i| i.row_type == RowType::LineItem)
            .collect();
        if line_items.is_empty() {
            return 0.0;
        }

        let mut score: f64 = 0.3;
        let consistent = line_items.iter().filter(|i| i.calc_consistent()).count();
        score += 0.3 * consistent as f64 / line_items.len() as f64;
        if invoice.invoice_no.is_some() {
            score += 0.15;
        }
        if invoice.total_amount.is_some() {
            score += 0.15;
        }
        if invoice.invoice_date.is_some() {
            score += 0.1;
        }
        score.min(1.0)
    }
}

#[async_trait::async_trait]
impl InvoiceParser for TableParser {
    fn name(&self) -> &'static str {
        "table"
    }

    fn priority(&self) -> u8 {
        80
    }

    fn acceptance_threshold(&self) -> f64 {
        0.5
    }

    async fn parse(
        &self,
        _document: &DocumentRecord,
        pages: &[PageRecord],
    ) -> anyhow::Result<Option<ParsedInvoice>> {
        let text = relevant_text(pages);
        if text.trim().is_empty() {
            return Ok(None);
        }

        let mut invoice = ParsedInvoice::default();
        TemplateParser::extract_header(&text, &mut invoice);
        invoice.items = Self::extract_items(&text);
        if invoice.items.is_empty() {
            return Ok(None);
        }
        invoice.confidence = Self::score(&invoice);
        Ok(Some(invoice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tests::{page_with, test_document};

    const UNNUMBERED_INVOICE: &str = "\
Invoice #: 7731
Date: 12.03.2026

Description  Qty  Unit Price  Total
Copper Pipe 15mm  40  12.50  500.00
Brass Elbow  20  3.75  75.00
Total  575.00";

    #[tokio::test]
    async fn unnumbered_table_rows_are_extracted() {
        let parser = TableParser::new();
        let invoice = parser
            .parse(&test_document("application/pdf"), &[page_with(UNNUMBERED_INVOICE)])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(invoice.items.len(), 2);
        assert_eq!(invoice.items[0].item_name, "Copper Pipe 15mm");
        assert_eq!(invoice.items[0].quantity, 40.0);
        assert_eq!(invoice.items[0].unit_price, 12.5);
        assert_eq!(invoice.items[1].total_price, 75.0);
        assert!(invoice.confidence >= 0.5);
    }

    #[tokio::test]
    async fn two_column_rows_derive_the_total() {
        let parser = TableParser::new();
        let text = "Item  Qty  Price\nAngle Bracket  12  2.50";
        let invoice = parser
            .parse(&test_document("application/pdf"), &[page_with(text)])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(invoice.items.len(), 1);
        assert_eq!(invoice.items[0].total_price, 30.0);
    }

    #[tokio::test]
    async fn prose_only_text_returns_none() {
        let parser = TableParser::new();
        let result = parser
            .parse(
                &test_document("application/pdf"),
                &[page_with("Dear customer, thank you for your business.")],
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
