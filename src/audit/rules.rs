//! Deterministic audit rules.
//!
//! Each check emits zero or more issues; the engine filters by the rule
//! subset, composes them, and decides the final status. Amount arithmetic
//! uses the same 0.01 tolerance as the parser line-item contract; totals
//! tolerate up to 10% of the stated total (tax-inclusive layouts vary).

use crate::db::handlers::PriceHistory;
use crate::db::models::{InvoiceRecord, LineItemRecord, RowType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashSet;
use utoipa::ToSchema;

pub const AMOUNT_TOLERANCE: f64 = 0.01;
pub const TOTAL_TOLERANCE_RATIO: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleCode {
    MathError,
    SubtotalMismatch,
    TotalMismatch,
    MissingRequired,
    DateOrdering,
    FutureDate,
    MissingBankDetails,
    PriceAnomaly,
    CrossInvoiceDuplicate,
    PriceStatsUnavailable,
}

impl RuleCode {
    pub fn category(&self) -> &'static str {
        match self {
            RuleCode::MathError | RuleCode::SubtotalMismatch | RuleCode::TotalMismatch => "arithmetic",
            RuleCode::MissingRequired | RuleCode::DateOrdering | RuleCode::FutureDate => "format",
            RuleCode::MissingBankDetails => "bank",
            RuleCode::PriceAnomaly | RuleCode::PriceStatsUnavailable => "price",
            RuleCode::CrossInvoiceDuplicate => "duplicate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditIssue {
    pub code: RuleCode,
    pub category: String,
    pub severity: IssueSeverity,
    pub message: String,
}

impl AuditIssue {
    fn new(code: RuleCode, severity: IssueSeverity, message: String) -> Self {
        Self {
            code,
            category: code.category().to_string(),
            severity,
            message,
        }
    }
}

fn line_items(items: &[LineItemRecord]) -> impl Iterator<Item = &LineItemRecord> {
    items.iter().filter(|i| i.row_type == RowType::LineItem)
}

pub fn check_line_math(items: &[LineItemRecord]) -> Vec<AuditIssue> {
    line_items(items)
        .filter(|item| (item.quantity * item.unit_price - item.total_price).abs() >= AMOUNT_TOLERANCE)
        .map(|item| {
            AuditIssue::new(
                RuleCode::MathError,
                IssueSeverity::Error,
                format!(
                    "line {}: {} x {} = {:.2}, stated {:.2}",
                    item.line_number,
                    item.quantity,
                    item.unit_price,
                    item.quantity * item.unit_price,
                    item.total_price
                ),
            )
        })
        .collect()
}

pub fn check_subtotal(invoice: &InvoiceRecord, items: &[LineItemRecord]) -> Vec<AuditIssue> {
    let Some(stated) = invoice.subtotal else {
        return Vec::new();
    };
    let sum: f64 = line_items(items).map(|i| i.total_price).sum();
    if (sum - stated).abs() >= AMOUNT_TOLERANCE {
        vec![AuditIssue::new(
            RuleCode::SubtotalMismatch,
            IssueSeverity::Error,
            format!("line totals sum to {sum:.2}, stated subtotal is {stated:.2}"),
        )]
    } else {
        Vec::new()
    }
}

pub fn check_total(invoice: &InvoiceRecord) -> Vec<AuditIssue> {
    let (Some(subtotal), Some(total)) = (invoice.subtotal, invoice.total_amount) else {
        return Vec::new();
    };
    if total <= 0.0 {
        return Vec::new();
    }
    let expected = subtotal + invoice.tax.unwrap_or(0.0);
    if (expected - total).abs() > TOTAL_TOLERANCE_RATIO * total {
        vec![AuditIssue::new(
            RuleCode::TotalMismatch,
            IssueSeverity::Error,
            format!("subtotal + tax = {expected:.2} differs from stated total {total:.2} by more than 10%"),
        )]
    } else {
        Vec::new()
    }
}

pub fn check_required(invoice: &InvoiceRecord) -> Vec<AuditIssue> {
    let mut issues = Vec::new();
    let missing = |field: &str| {
        AuditIssue::new(
            RuleCode::MissingRequired,
            IssueSeverity::Error,
            format!("required field absent: {field}"),
        )
    };
    if invoice.invoice_no.as_deref().is_none_or(|v| v.trim().is_empty()) {
        issues.push(missing("invoice_no"));
    }
    if invoice.invoice_date.is_none() {
        issues.push(missing("invoice_date"));
    }
    if invoice.seller_name.as_deref().is_none_or(|v| v.trim().is_empty()) {
        issues.push(missing("seller_name"));
    }
    issues
}

pub fn check_dates(invoice: &InvoiceRecord, today: NaiveDate) -> Vec<AuditIssue> {
    let mut issues = Vec::new();
    if let (Some(invoice_date), Some(due_date)) = (invoice.invoice_date, invoice.due_date) {
        if due_date < invoice_date {
            issues.push(AuditIssue::new(
                RuleCode::DateOrdering,
                IssueSeverity::Warning,
                format!("due date {due_date} precedes invoice date {invoice_date}"),
            ));
        }
    }
    if let Some(invoice_date) = invoice.invoice_date {
        if invoice_date > today {
            issues.push(AuditIssue::new(
                RuleCode::FutureDate,
                IssueSeverity::Warning,
                format!("invoice date {invoice_date} is in the future"),
            ));
        }
    }
    issues
}

pub fn check_bank_details(invoice: &InvoiceRecord) -> Vec<AuditIssue> {
    let bank = invoice.bank_details_json();
    let has = |key: &str| {
        bank.get(key)
            .and_then(|v| v.as_str())
            .is_some_and(|v| !v.trim().is_empty())
    };
    if !has("iban") && !has("swift") {
        vec![AuditIssue::new(
            RuleCode::MissingBankDetails,
            IssueSeverity::Warning,
            "no IBAN and no SWIFT present in bank details".to_string(),
        )]
    } else {
        Vec::new()
    }
}

/// Price anomaly: deviation of a line's unit price from the historical
/// average for the same normalized name (seller-scoped, falling back to
/// currency scope). Requires at least two observations. Store errors emit a
/// single INFO issue and stop the scan.
pub async fn check_price_anomalies(
    pool: &SqlitePool,
    invoice: &InvoiceRecord,
    items: &[LineItemRecord],
    threshold: f64,
) -> Vec<AuditIssue> {
    let mut issues = Vec::new();
    for item in line_items(items) {
        if item.unit_price <= 0.0 {
            continue;
        }
        let normalized = item.item_name.trim().to_lowercase();
        // The probing invoice's own history rows are excluded from its stats.
        let stats = match PriceHistory::stats_with_fallback(
            pool,
            &normalized,
            invoice.seller_name.as_deref(),
            invoice.currency.as_deref(),
            Some(invoice.id),
        )
        .await
        {
            Ok(stats) => stats,
            Err(err) => {
                tracing::warn!(error = %err, "price stats unavailable; skipping anomaly scan");
                issues.push(AuditIssue::new(
                    RuleCode::PriceStatsUnavailable,
                    IssueSeverity::Info,
                    "price history unavailable, anomaly check skipped".to_string(),
                ));
                break;
            }
        };

        let Some(stats) = stats else { continue };
        if stats.occurrence_count < 2 || stats.avg_price <= 0.0 {
            continue;
        }
        let deviation = (item.unit_price - stats.avg_price).abs() / stats.avg_price;
        if deviation > threshold {
            issues.push(AuditIssue::new(
                RuleCode::PriceAnomaly,
                IssueSeverity::Warning,
                format!(
                    "{}: unit price {:.2} deviates {:.2} from average {:.2} ({} observations)",
                    item.item_name, item.unit_price, deviation, stats.avg_price, stats.occurrence_count
                ),
            ));
        }
    }
    issues
}

/// Cross-invoice duplicate: the same normalized item name appears on a
/// different invoice within the trailing window.
pub async fn check_cross_invoice_duplicates(
    pool: &SqlitePool,
    invoice: &InvoiceRecord,
    items: &[LineItemRecord],
    window_days: i64,
) -> Vec<AuditIssue> {
    let Some(invoice_date) = invoice.invoice_date else {
        return Vec::new();
    };
    let from = invoice_date - chrono::Duration::days(window_days);
    let to = invoice_date - chrono::Duration::days(1);

    let mut issues = Vec::new();
    for item in line_items(items) {
        let normalized = item.item_name.trim().to_lowercase();
        let rows = match PriceHistory::rows_in_window(pool, &normalized, from, to, Some(invoice.id)).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(error = %err, "duplicate window query failed; skipping");
                continue;
            }
        };
        if rows.is_empty() {
            continue;
        }
        let dates: Vec<String> = rows
            .iter()
            .filter_map(|r| r.invoice_date.map(|d| d.to_string()))
            .collect();
        issues.push(AuditIssue::new(
            RuleCode::CrossInvoiceDuplicate,
            IssueSeverity::Warning,
            format!(
                "{} also appears on invoices dated {} within the last {} days",
                item.item_name,
                dates.join(", "),
                window_days
            ),
        ));
    }
    issues
}

/// Apply the optional rule-subset filter.
pub fn filter_rules(issues: Vec<AuditIssue>, rules: Option<&HashSet<RuleCode>>) -> Vec<AuditIssue> {
    match rules {
        Some(allowed) => issues
            .into_iter()
            .filter(|issue| allowed.contains(&issue.code) || issue.code == RuleCode::PriceStatsUnavailable)
            .collect(),
        None => issues,
    }
}

/// Strict mode escalates warnings into errors; info stays info.
pub fn escalate_for_strict_mode(issues: &mut [AuditIssue]) {
    for issue in issues.iter_mut() {
        if issue.severity == IssueSeverity::Warning {
            issue.severity = IssueSeverity::Error;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::models::ParsingStatus;
    use chrono::Utc;

    pub(crate) fn invoice() -> InvoiceRecord {
        InvoiceRecord {
            id: uuid::Uuid::new_v4(),
            document_id: None,
            invoice_no: Some("INV-1".to_string()),
            invoice_date: NaiveDate::from_ymd_opt(2026, 5, 20),
            due_date: None,
            seller_name: Some("ACME".to_string()),
            buyer_name: None,
            company_key: None,
            currency: Some("USD".to_string()),
            subtotal: Some(500.0),
            tax: Some(0.0),
            discount: None,
            total_amount: Some(500.0),
            quality_score: 0.9,
            confidence: 0.9,
            parser_used: Some("template".to_string()),
            parsing_status: ParsingStatus::Ok,
            is_latest: true,
            bank_details: r#"{"iban": "DE89370400440532013000"}"#.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub(crate) fn line_item(name: &str, qty: f64, unit: f64, total: f64) -> LineItemRecord {
        LineItemRecord {
            id: 1,
            invoice_id: uuid::Uuid::new_v4(),
            line_number: 1,
            item_name: name.to_string(),
            description: None,
            hs_code: None,
            unit: None,
            brand: None,
            model: None,
            quantity: qty,
            unit_price: unit,
            total_price: total,
            row_type: RowType::LineItem,
            matched_material_id: None,
        }
    }

    #[test]
    fn math_error_fires_at_tolerance() {
        let bad = vec![line_item("Widget", 5.0, 100.0, 600.0)];
        let issues = check_line_math(&bad);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, RuleCode::MathError);
        assert_eq!(issues[0].severity, IssueSeverity::Error);

        let good = vec![line_item("Widget", 5.0, 100.0, 500.0)];
        assert!(check_line_math(&good).is_empty());

        // Just inside tolerance.
        let close = vec![line_item("Widget", 5.0, 100.0, 500.005)];
        assert!(check_line_math(&close).is_empty());
    }

    #[test]
    fn subtotal_and_total_checks() {
        let invoice = invoice();
        let items = vec![line_item("A", 10.0, 10.0, 100.0)];
        let issues = check_subtotal(&invoice, &items);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, RuleCode::SubtotalMismatch);

        let mut off = invoice();
        off.subtotal = Some(100.0);
        off.tax = Some(0.0);
        off.total_amount = Some(500.0);
        let issues = check_total(&off);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, RuleCode::TotalMismatch);

        // Within 10% of total passes.
        let mut near = invoice();
        near.subtotal = Some(480.0);
        near.total_amount = Some(500.0);
        assert!(check_total(&near).is_empty());
    }

    #[test]
    fn required_fields_and_dates() {
        let mut bare = invoice();
        bare.invoice_no = None;
        bare.seller_name = Some("  ".to_string());
        let issues = check_required(&bare);
        assert_eq!(issues.len(), 2);

        let mut dated = invoice();
        dated.due_date = NaiveDate::from_ymd_opt(2026, 5, 1);
        let today = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let issues = check_dates(&dated, today);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, RuleCode::DateOrdering);

        let mut future = invoice();
        future.invoice_date = NaiveDate::from_ymd_opt(2027, 1, 1);
        let issues = check_dates(&future, today);
        assert_eq!(issues[0].code, RuleCode::FutureDate);
    }

    #[test]
    fn bank_details_check_reads_the_json() {
        assert!(check_bank_details(&invoice()).is_empty());

        let mut bare = invoice();
        bare.bank_details = "{}".to_string();
        let issues = check_bank_details(&bare);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, IssueSeverity::Warning);
    }

    #[test]
    fn strict_mode_escalates_warnings_only() {
        let mut issues = vec![
            AuditIssue::new(RuleCode::MissingBankDetails, IssueSeverity::Warning, "w".into()),
            AuditIssue::new(RuleCode::PriceStatsUnavailable, IssueSeverity::Info, "i".into()),
            AuditIssue::new(RuleCode::MathError, IssueSeverity::Error, "e".into()),
        ];
        escalate_for_strict_mode(&mut issues);
        assert_eq!(issues[0].severity, IssueSeverity::Error);
        assert_eq!(issues[1].severity, IssueSeverity::Info);
        assert_eq!(issues[2].severity, IssueSeverity::Error);
    }

    #[test]
    fn rule_filter_keeps_the_subset() {
        let issues = vec![
            AuditIssue::new(RuleCode::MathError, IssueSeverity::Error, "e".into()),
            AuditIssue::new(RuleCode::FutureDate, IssueSeverity::Warning, "w".into()),
        ];
        let mut allowed = HashSet::new();
        allowed.insert(RuleCode::MathError);
        let filtered = filter_rules(issues, Some(&allowed));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].code, RuleCode::MathError);
    }
}
