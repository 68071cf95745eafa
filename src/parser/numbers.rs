//! Numeric field parsing for invoice text.
//!
//! Handles US (`1,234.56`) and European (`1.234,56`) grouping, currency
//! symbols and codes, and Arabic-Indic digits. Parsers call these helpers
//! for every quantity/price field.

use once_cell::sync::Lazy;
use regex::Regex;

static CURRENCY_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[\$€£¥₹﷼]|(?:usd|eur|gbp|aed|sar|egp|cny|jpy)\b").expect("currency regex"));

/// Map Arabic-Indic (U+0660..) and Extended Arabic-Indic (U+06F0..) digits
/// to ASCII, including the Arabic decimal/thousands separators.
pub fn normalize_digits(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            '\u{066B}' => '.',
            '\u{066C}' => ',',
            _ => c,
        })
        .collect()
}

/// Parse an amount from free text. Returns `None` for text with no usable
/// numeric content or non-finite results.
pub fn parse_amount(input: &str) -> Option<f64> {
    let normalized = normalize_digits(input);
    let stripped = CURRENCY_NOISE.replace_all(&normalized, "");
    let cleaned: String = stripped
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let has_dot = cleaned.contains('.');
    let has_comma = cleaned.contains(',');

    let canonical = match (has_dot, has_comma) {
        (true, true) => {
            // The rightmost separator is the decimal point.
            if cleaned.rfind('.') > cleaned.rfind(',') {
                cleaned.replace(',', "")
            } else {
                cleaned.replace('.', "").replace(',', ".")
            }
        }
        (false, true) => {
            // A single comma trailed by one or two digits reads as a decimal
            // mark; anything else is grouping.
            let after = cleaned.rsplit(',').next().unwrap_or("");
            if cleaned.matches(',').count() == 1 && (1..=2).contains(&after.len()) {
                cleaned.replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        (true, false) => {
            if cleaned.matches('.').count() > 1 {
                // European grouping: 1.234.567
                cleaned.replace('.', "")
            } else {
                cleaned
            }
        }
        (false, false) => cleaned,
    };

    canonical.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Quantity parsing shares amount parsing but rejects negatives.
pub fn parse_quantity(input: &str) -> Option<f64> {
    parse_amount(input).filter(|v| *v >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn us_and_european_grouping() {
        assert_eq!(parse_amount("1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("1.234,56"), Some(1234.56));
        assert_eq!(parse_amount("1.234.567,89"), Some(1234567.89));
        assert_eq!(parse_amount("1,234,567.89"), Some(1234567.89));
    }

    #[test]
    fn single_separator_heuristics() {
        assert_eq!(parse_amount("12,50"), Some(12.50));
        assert_eq!(parse_amount("1,234"), Some(1234.0));
        assert_eq!(parse_amount("0.500"), Some(0.5));
        assert_eq!(parse_amount("500"), Some(500.0));
    }

    #[test]
    fn currency_symbols_and_codes_are_stripped() {
        assert_eq!(parse_amount("$ 1,200.00"), Some(1200.0));
        assert_eq!(parse_amount("EUR 99,95"), Some(99.95));
        assert_eq!(parse_amount("1.500,00 AED"), Some(1500.0));
    }

    #[test]
    fn arabic_digits_normalize() {
        assert_eq!(normalize_digits("٠١٢٣٤٥٦٧٨٩"), "0123456789");
        assert_eq!(normalize_digits("۰۱۲"), "012");
        assert_eq!(parse_amount("١٢٣٤"), Some(1234.0));
        assert_eq!(parse_amount("١٢٫٥"), Some(12.5));
    }

    #[test]
    fn garbage_yields_none() {
        assert_eq!(parse_amount("no numbers here"), None);
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_quantity("-5"), None);
    }
}
