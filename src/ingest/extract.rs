//! Raw file to pages: text extraction and page classification.
//!
//! PDFs extract per page via `pdf-extract`; plain text splits on form
//! feeds; images carry no text (the vision parser reads the original
//! bytes) but record an image hash for the on-disk vision cache.

use crate::db::models::PageType;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub page_number: i64,
    pub text: String,
    pub page_type: PageType,
    pub type_confidence: f64,
    pub image_hash: Option<String>,
}

/// Keyword vocabulary per page type. First hit weight counts double for
/// the type's leading keyword.
const PAGE_SIGNALS: &[(PageType, &[&str])] = &[
    (PageType::Invoice, &["invoice", "proforma", "bill to", "amount due", "فاتورة"]),
    (PageType::PackingList, &["packing list", "gross weight", "net weight", "carton", "قائمة التعبئة"]),
    (PageType::Contract, &["contract", "agreement", "hereinafter", "party of the", "عقد"]),
    (PageType::BankForm, &["iban", "swift", "beneficiary", "account number", "bank transfer"]),
    (PageType::Certificate, &["certificate", "hereby certify", "certification", "شهادة"]),
    (PageType::CoverLetter, &["dear sir", "dear madam", "yours sincerely", "kind regards"]),
];

/// Classify a page by keyword scoring. Returns `(Other, 0.0)` for text
/// with no recognizable signals.
pub fn classify_page(text: &str) -> (PageType, f64) {
    let lower = text.to_lowercase();
    let mut best = (PageType::Other, 0usize);
    for (page_type, keywords) in PAGE_SIGNALS {
        let mut hits = 0;
        for (i, keyword) in keywords.iter().enumerate() {
            if lower.contains(keyword) {
                hits += if i == 0 { 2 } else { 1 };
            }
        }
        if hits > best.1 {
            best = (*page_type, hits);
        }
    }
    if best.1 == 0 {
        return (PageType::Other, 0.0);
    }
    let confidence = (best.1 as f64 / (best.1 as f64 + 2.0)).min(0.95);
    (best.0, confidence)
}

pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Extract pages from an upload. Unsupported binary types come back as a
/// single empty page so the vision parser still gets its shot.
pub fn extract_pages(bytes: &[u8], mime_type: &str) -> anyhow::Result<Vec<ExtractedPage>> {
    if mime_type == "application/pdf" {
        let texts = pdf_extract::extract_text_by_pages_from_mem(bytes)
            .map_err(|e| anyhow::anyhow!("pdf text extraction failed: {e}"))?;
        let pages = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let (page_type, type_confidence) = classify_page(&text);
                ExtractedPage {
                    page_number: (i + 1) as i64,
                    text,
                    page_type,
                    type_confidence,
                    image_hash: None,
                }
            })
            .collect();
        return Ok(pages);
    }

    if mime_type.starts_with("image/") {
        return Ok(vec![ExtractedPage {
            page_number: 1,
            text: String::new(),
            // A photographed upload is assumed to be an invoice until the
            // vision parser says otherwise.
            page_type: PageType::Invoice,
            type_confidence: 0.3,
            image_hash: Some(content_hash(bytes)),
        }]);
    }

    // Everything else is treated as text; form feeds separate pages.
    let text = String::from_utf8_lossy(bytes);
    let pages = text
        .split('\u{000C}')
        .enumerate()
        .map(|(i, page_text)| {
            let (page_type, type_confidence) = classify_page(page_text);
            ExtractedPage {
                page_number: (i + 1) as i64,
                text: page_text.to_string(),
                page_type,
                type_confidence,
                image_hash: None,
            }
        })
        .collect();
    Ok(pages)
}
