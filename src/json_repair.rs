//! Three-stage JSON repair for model output.
//!
//! Models wrap JSON in prose, markdown fences, or trailing commentary. The
//! repair policy: (1) accept the raw text as JSON; (2) extract the largest
//! balanced `{...}` region; (3) strip markdown fences and retry both.

/// Largest balanced top-level object in `text`, if any. Brace counting is
/// string-aware so braces inside JSON strings don't unbalance the scan.
fn largest_balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut best: Option<(usize, usize)> = None;
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start {
                            let len = i + 1 - s;
                            if best.map(|(bs, be)| be - bs).unwrap_or(0) < len {
                                best = Some((s, i + 1));
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
    best.map(|(s, e)| &text[s..e])
}

fn strip_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse model output into a JSON value, repairing common wrappers.
pub fn repair_json(text: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Some(value);
    }
    if let Some(region) = largest_balanced_object(text) {
        if let Ok(value) = serde_json::from_str(region) {
            return Some(value);
        }
    }
    let unfenced = strip_fences(text);
    if let Ok(value) = serde_json::from_str(unfenced.trim()) {
        return Some(value);
    }
    largest_balanced_object(&unfenced).and_then(|region| serde_json::from_str(region).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_json_passes_through() {
        assert_eq!(repair_json(r#"{"a": 1}"#), Some(json!({"a": 1})));
    }

    #[test]
    fn prose_wrapped_object_is_extracted() {
        let text = r#"Sure! Here is the analysis: {"verdict": "PASS", "note": "ok"} hope that helps."#;
        assert_eq!(repair_json(text).unwrap()["verdict"], "PASS");
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let text = "```json\n{\"verdict\": \"HOLD\"}\n```";
        assert_eq!(repair_json(text).unwrap()["verdict"], "HOLD");
    }

    #[test]
    fn braces_inside_strings_do_not_break_the_scan() {
        let text = r#"noise {"note": "uses { and } freely", "n": 2} trailing"#;
        assert_eq!(repair_json(text).unwrap()["n"], 2);
    }

    #[test]
    fn hopeless_input_returns_none() {
        assert_eq!(repair_json("no json at all"), None);
        assert_eq!(repair_json("{broken"), None);
    }
}
