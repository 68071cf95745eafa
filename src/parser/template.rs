//! Template parser: labeled-field extraction for conventionally laid out
//! invoices. Highest priority in the chain; accepts at confidence ≥ 0.7.

use crate::db::models::{PageRecord, PageType, RowType};
use crate::db::models::documents::DocumentRecord;
use crate::parser::numbers::{normalize_digits, parse_amount, parse_quantity};
use crate::parser::{InvoiceParser, ParsedInvoice, ParsedItem};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static INVOICE_NO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:invoice|inv|proforma)\s*(?:no|number|num|#)?\s*[:.#]?\s*([A-Z0-9][A-Z0-9/_-]{2,24})").expect("invoice no regex")
});

static DATE_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(due\s+date|payment\s+due|invoice\s+date|date)\b\s*[:.]?\s*([0-9A-Za-z ./-]{6,20})")
        .expect("date regex")
});

static LABELED_AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(sub\s*total|subtotal|total\s+amount|grand\s+total|total|vat|tax|discount)\b\s*[:.]?\s*([0-9.,٠-٩$€£¥ ]+)")
        .expect("amount regex")
});

static PARTY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(seller|supplier|exporter|from|buyer|importer|consignee|bill\s+to|to)\s*[:.]\s*(.+)$")
        .expect("party regex")
});

static CURRENCY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(USD|EUR|GBP|AED|SAR|EGP|CNY|JPY)\b").expect("currency regex"));

static IBAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]{2}\d{2}[A-Z0-9]{11,30}\b").expect("iban regex"));

static SWIFT_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:swift|bic)\b\s*[:.]?\s*([A-Z]{6}[A-Z0-9]{2}(?:[A-Z0-9]{3})?)").expect("swift regex")
});

/// `1. Item name   10   5.00   50.00` — numbered row with three trailing
/// numeric columns.
static NUMBERED_ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d{1,3})[.)]?\s+(.*?)\s+([0-9.,٠-٩]+)\s+([0-9.,٠-٩]+)\s+([0-9.,٠-٩]+)\s*$")
        .expect("row regex")
});

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%d.%m.%Y", "%d-%m-%Y", "%d %b %Y", "%d %B %Y",
    "%b %d, %Y", "%B %d, %Y",
];

pub(crate) fn parse_date(input: &str) -> Option<NaiveDate> {
    let cleaned = normalize_digits(input.trim());
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&cleaned, format).ok())
}

/// Pages worth reading: classified invoice pages, or everything when the
/// classifier found none.
pub(crate) fn relevant_text(pages: &[PageRecord]) -> String {
    let invoice_pages: Vec<&PageRecord> = pages
        .iter()
        .filter(|p| p.page_type == PageType::Invoice)
        .collect();
    let selected: Vec<&PageRecord> = if invoice_pages.is_empty() {
        pages.iter().collect()
    } else {
        invoice_pages
    };
    selected
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A line that plainly belongs to the totals footer, not the item table.
fn is_totals_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    ["subtotal", "sub total", "total", "vat", "tax", "discount"]
        .iter()
        .any(|kw| lower.starts_with(kw))
}

pub struct TemplateParser;

impl TemplateParser {
    pub fn new() -> Self {
        Self
    }

    fn extract_items(text: &str) -> Vec<ParsedItem> {
        let mut items: Vec<ParsedItem> = Vec::new();
        // Continuations only attach directly under an item row; any other
        // line ends the table region.
        let mut in_table = false;
        for raw_line in text.lines() {
            let line = raw_line.trim_end();
            if line.trim().is_empty() {
                continue;
            }
            if let Some(caps) = NUMBERED_ROW_RE.captures(line) {
                let name = caps[2].trim().to_string();
                if name.is_empty() || is_totals_line(&name) {
                    continue;
                }
                let quantity = parse_quantity(&caps[3]).unwrap_or(0.0);
                let unit_price = parse_amount(&caps[4]).unwrap_or(0.0);
                let total_price = parse_amount(&caps[5]).unwrap_or(0.0);
                items.push(ParsedItem {
                    line_number: caps[1].parse().unwrap_or((items.len() + 1) as i64),
                    item_name: name,
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
                // Orphan-line merge: continuation text with no quantity trails
                // the preceding item's description.
                let trimmed = line.trim();
                if !is_totals_line(trimmed)
                    && parse_amount(trimmed.split_whitespace().last().unwrap_or("")).is_none()
                {
                    if let Some(last) = items.last_mut() {
                        match &mut last.description {
                            Some(description) => {
                                description.push(' ');
                                description.push_str(trimmed);
                            }
                            None => last.description = Some(trimmed.to_string()),
                        }
                    }
                } else {
                    in_table = false;
                }
            }
        }
        items
    }

    pub(crate) fn extract_header(text: &str, invoice: &mut ParsedInvoice) {
        // Line-scoped so a bare "INVOICE" title can't swallow the labeled
        // number on the following line.
        for line in text.lines() {
            if let Some(caps) = INVOICE_NO_RE.captures(line) {
                let candidate = caps[1].trim_matches(|c: char| c == '-' || c == '/').to_string();
                // A bare label word is a false positive.
                if candidate.chars().any(|c| c.is_ascii_digit()) {
                    invoice.invoice_no = Some(candidate);
                    break;
                }
            }
        }

        for caps in DATE_LABEL_RE.captures_iter(text) {
            let label = caps[1].to_lowercase();
            if let Some(date) = parse_date(&caps[2]) {
                if label.contains("due") || label.contains("payment") {
                    invoice.due_date.get_or_insert(date);
                } else {
                    invoice.invoice_date.get_or_insert(date);
                }
            }
        }

        for line in text.lines() {
            if let Some(caps) = PARTY_RE.captures(line) {
                let role = caps[1].to_lowercase();
                let value = caps[2].trim().to_string();
                if value.is_empty() {
                    continue;
                }
                if ["seller", "supplier", "exporter", "from"].contains(&role.as_str()) {
                    invoice.seller_name.get_or_insert(value);
                } else {
                    invoice.buyer_name.get_or_insert(value);
                }
            }
        }

        for caps in LABELED_AMOUNT_RE.captures_iter(text) {
            let label = caps[1].to_lowercase().replace(' ', "");
            let Some(amount) = parse_amount(&caps[2]) else { continue };
            match label.as_str() {
                "subtotal" => invoice.subtotal.get_or_insert(amount),
                "vat" | "tax" => invoice.tax.get_or_insert(amount),
                "discount" => invoice.discount.get_or_insert(amount),
                _ => invoice.total_amount.get_or_insert(amount),
            };
        }

        if let Some(caps) = CURRENCY_RE.captures(text) {
            invoice.currency = Some(caps[1].to_string());
        }

        let mut bank = serde_json::Map::new();
        if let Some(m) = IBAN_RE.find(text) {
            bank.insert("iban".to_string(), serde_json::Value::String(m.as_str().to_string()));
        }
        if let Some(caps) = SWIFT_LINE_RE.captures(text) {
            bank.insert("swift".to_string(), serde_json::Value::String(caps[1].to_uppercase()));
        }
        invoice.bank_details = serde_json::Value::Object(bank);
    }

    fn score(invoice: &ParsedInvoice) -> f64 {
        let mut score = 0.0;
        if invoice.invoice_no.is_some() {
            score += 0.25;
        }
        if invoice.invoice_date.is_some() {
            score += 0.15;
        }
        if invoice.total_amount.is_some() {
            score += 0.15;
        }
        if invoice.seller_name.is_some() {
            score += 0.1;
        }
        let line_items: Vec<&ParsedItem> = invoice
            .items
            .iter()
            .filter(|i| i.row_type == RowType::LineItem)
            .collect();
        if !line_items.is_empty() {
            score += 0.2;
            let consistent = line_items.iter().filter(|i| i.calc_consistent()).count();
            score += 0.15 * consistent as f64 / line_items.len() as f64;
        }
        score.min(1.0)
    }
}

#[async_trait::async_trait]
impl InvoiceParser for TemplateParser {
    fn name(&self) -> &'static str {
        "template"
    }

    fn priority(&self) -> u8 {
        100
    }

    fn acceptance_threshold(&self) -> f64 {
        0.7
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
        Self::extract_header(&text, &mut invoice);
        invoice.items = Self::extract_items(&text);
        invoice.confidence = Self::score(&invoice);
        Ok(Some(invoice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tests::{page_with, test_document};

    const CLEAN_INVOICE: &str = "\
COMMERCIAL INVOICE
Invoice No: INV-2026-001
Invoice Date: 2026-05-20
Seller: ACME Industrial Supplies
Buyer: Globex Construction LLC

1. PVC Cable 10mm  100  5.00  500.00
2. Steel Rod 12mm  10  100.00  1,000.00
   mild steel, cut to length

Subtotal: 1,500.00
Tax: 0.00
Total: 1,500.00 USD
IBAN: DE89370400440532013000
SWIFT: COBADEFFXXX";

    #[tokio::test]
    async fn clean_invoice_parses_with_high_confidence() {
        let parser = TemplateParser::new();
        let invoice = parser
            .parse(&test_document("application/pdf"), &[page_with(CLEAN_INVOICE)])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(invoice.invoice_no.as_deref(), Some("INV-2026-001"));
        assert_eq!(invoice.invoice_date, NaiveDate::from_ymd_opt(2026, 5, 20));
        assert_eq!(invoice.seller_name.as_deref(), Some("ACME Industrial Supplies"));
        assert_eq!(invoice.total_amount, Some(1500.0));
        assert_eq!(invoice.currency.as_deref(), Some("USD"));
        assert_eq!(invoice.items.len(), 2);
        assert_eq!(invoice.items[0].item_name, "PVC Cable 10mm");
        assert_eq!(invoice.items[0].quantity, 100.0);
        assert_eq!(invoice.items[1].total_price, 1000.0);
        assert!(invoice.confidence >= 0.7);
        assert_eq!(invoice.bank_details["iban"], "DE89370400440532013000");
        assert_eq!(invoice.bank_details["swift"], "COBADEFFXXX");
    }

    #[tokio::test]
    async fn orphan_lines_merge_into_previous_item() {
        let parser = TemplateParser::new();
        let invoice = parser
            .parse(&test_document("application/pdf"), &[page_with(CLEAN_INVOICE)])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            invoice.items[1].description.as_deref(),
            Some("mild steel, cut to length")
        );
    }

    #[tokio::test]
    async fn sparse_text_scores_below_acceptance() {
        let parser = TemplateParser::new();
        let invoice = parser
            .parse(
                &test_document("application/pdf"),
                &[page_with("just a paragraph of ordinary prose, nothing tabular")],
            )
            .await
            .unwrap()
            .unwrap();
        assert!(invoice.confidence < 0.7);
    }

    #[test]
    fn date_formats_parse() {
        assert_eq!(parse_date("2026-05-20"), NaiveDate::from_ymd_opt(2026, 5, 20));
        assert_eq!(parse_date("20/05/2026"), NaiveDate::from_ymd_opt(2026, 5, 20));
        assert_eq!(parse_date("20.05.2026"), NaiveDate::from_ymd_opt(2026, 5, 20));
        assert_eq!(parse_date("May 20, 2026"), NaiveDate::from_ymd_opt(2026, 5, 20));
        assert_eq!(parse_date("garbage"), None);
    }
}
