//! Model-assisted audit pass.
//!
//! Sends the full invoice plus retrieved context to the provider and
//! expects a JSON object carrying the nine analytical sections. Responses
//! go through the shared three-stage JSON repair; a response that survives
//! repair but misses sections gets the missing ones as empty objects.

use crate::db::models::{InvoiceRecord, LineItemRecord};
use crate::json_repair::repair_json;
use crate::llm::{GenerateOptions, ModelProvider};
use serde_json::{Map, Value, json};

/// The nine analytical sections every audit result carries.
pub const SECTION_NAMES: [&str; 9] = [
    "document_intake",
    "proforma_summary",
    "items_table",
    "arithmetic_check",
    "amount_words_check",
    "bank_details_check",
    "commercial_terms_suggestions",
    "contract_summary",
    "final_verdict",
];

pub fn build_prompt(invoice: &InvoiceRecord, items: &[LineItemRecord], context: &[String]) -> String {
    let invoice_json = json!({
        "invoice_no": invoice.invoice_no,
        "invoice_date": invoice.invoice_date,
        "due_date": invoice.due_date,
        "seller_name": invoice.seller_name,
        "buyer_name": invoice.buyer_name,
        "currency": invoice.currency,
        "subtotal": invoice.subtotal,
        "tax": invoice.tax,
        "discount": invoice.discount,
        "total_amount": invoice.total_amount,
        "bank_details": invoice.bank_details_json(),
        "items": items.iter().map(|item| json!({
            "line": item.line_number,
            "name": item.item_name,
            "quantity": item.quantity,
            "unit_price": item.unit_price,
            "total_price": item.total_price,
            "row_type": item.row_type,
        })).collect::<Vec<_>>(),
    });

    let mut prompt = String::from(
        "You are auditing a commercial invoice. Analyze it and respond with only a JSON object \
         containing exactly these keys (use {} for sections with nothing to report): ",
    );
    prompt.push_str(&SECTION_NAMES.join(", "));
    prompt.push_str(
        ". Check arithmetic, amount-in-words vs digits, bank details plausibility, and \
         commercial terms. In final_verdict include {\"verdict\": \"PASS\"|\"HOLD\"|\"FAIL\", \
         \"confidence\": 0..1, \"reason\": string}.\n\nInvoice:\n",
    );
    prompt.push_str(&invoice_json.to_string());
    if !context.is_empty() {
        prompt.push_str("\n\nRelated document excerpts:\n");
        for (i, chunk) in context.iter().enumerate() {
            prompt.push_str(&format!("[{}] {}\n", i + 1, chunk));
        }
    }
    prompt
}

/// Run the model pass. Returns the nine sections (missing ones backfilled
/// as `{}`) or an error string describing why the output was unusable.
pub async fn run_model_pass(
    provider: &dyn ModelProvider,
    invoice: &InvoiceRecord,
    items: &[LineItemRecord],
    context: &[String],
) -> Result<Map<String, Value>, String> {
    let prompt = build_prompt(invoice, items, context);
    let options = GenerateOptions {
        temperature: 0.1,
        ..Default::default()
    };
    let raw = provider
        .generate(&prompt, &options)
        .await
        .map_err(|e| format!("model call failed: {e}"))?;

    let value = repair_json(&raw).ok_or_else(|| {
        format!(
            "model output was not JSON after repair (first 120 chars: {})",
            raw.chars().take(120).collect::<String>()
        )
    })?;
    let Value::Object(mut sections) = value else {
        return Err("model output was JSON but not an object".to_string());
    };

    for name in SECTION_NAMES {
        sections.entry(name.to_string()).or_insert_with(|| json!({}));
    }
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::rules::tests::{invoice, line_item};

    #[test]
    fn prompt_carries_invoice_and_context() {
        let items = vec![line_item("Steel Rod", 10.0, 100.0, 1000.0)];
        let prompt = build_prompt(&invoice(), &items, &["excerpt one".to_string()]);
        assert!(prompt.contains("INV-1"));
        assert!(prompt.contains("Steel Rod"));
        assert!(prompt.contains("excerpt one"));
        for name in SECTION_NAMES {
            assert!(prompt.contains(name), "prompt must request section {name}");
        }
    }
}
