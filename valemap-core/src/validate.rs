//! Input sanitization and validation.
//!
//! Every free-text string and every structured map payload passes through
//! here before it crosses a trust boundary (save, import, display). All
//! functions are pure and total: malformed input degrades to a safe default
//! or a structured error, never a panic.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use crate::models::{MapContent, RelationshipRecord, ScorePair, TrustLevel};

/// Maximum length of a relationship name after cleaning.
pub const MAX_NAME_LENGTH: usize = 50;
/// Maximum length of a map title after cleaning.
pub const MAX_TITLE_LENGTH: usize = 100;

/// Errors from name/title validation.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    #[error("{0} contains invalid characters")]
    OnlyInvalidCharacters(&'static str),
}

/// Clean arbitrary text for storage and display.
///
/// Strips tag-like markup, decodes HTML entities and then drops anything
/// outside a conservative allow-list (letters, digits, whitespace, and
/// `. - _ ' ( )`), collapses whitespace runs, trims, and truncates to
/// `max_length` characters. Idempotent: a second pass is a no-op.
pub fn sanitize_text(input: &str, max_length: usize) -> String {
    let stripped = strip_tags(input);
    let decoded = decode_entities(&stripped);

    let mut cleaned = String::with_capacity(decoded.len());
    let mut last_was_space = true; // leading whitespace folds away
    for c in decoded.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                cleaned.push(' ');
                last_was_space = true;
            }
        } else if is_allowed(c) {
            cleaned.push(c);
            last_was_space = false;
        }
    }

    let truncated: String = cleaned.trim_end().chars().take(max_length).collect();
    // Truncation can expose a trailing space again
    truncated.trim_end().to_string()
}

fn is_allowed(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | '\'' | '(' | ')')
}

// Remove complete <...> runs. An unterminated '<' is left for the
// allow-list to drop.
fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '<' {
            match input[i..].find('>') {
                Some(end) => {
                    // Skip to the matching '>'
                    while let Some((j, _)) = chars.next() {
                        if j >= i + end {
                            break;
                        }
                    }
                }
                None => out.push(c),
            }
        } else {
            out.push(c);
        }
    }
    out
}

// Decode the common named entities plus numeric references, so
// pre-encoded markup cannot sneak past the allow-list.
fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match rest.find(';') {
            Some(end) if end > 1 && end <= 10 => {
                let entity = &rest[1..end];
                if let Some(decoded) = decode_entity(entity) {
                    out.push(decoded);
                } else {
                    out.push('&');
                    out.push_str(entity);
                    out.push(';');
                }
                rest = &rest[end + 1..];
            }
            _ => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = entity.strip_prefix('#')?;
            let n = if let Some(hex) = code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                code.parse::<u32>().ok()?
            };
            char::from_u32(n)
        }
    }
}

/// Validate a relationship name: non-empty after trimming, and something
/// must survive sanitization.
pub fn validate_name(raw: &str) -> Result<String, ValidationError> {
    validate_text(raw, MAX_NAME_LENGTH, "Name")
}

/// Validate a map title with the longer length cap.
pub fn validate_title(raw: &str) -> Result<String, ValidationError> {
    validate_text(raw, MAX_TITLE_LENGTH, "Map title")
}

fn validate_text(
    raw: &str,
    max_length: usize,
    field: &'static str,
) -> Result<String, ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::Empty(field));
    }
    let sanitized = sanitize_text(raw, max_length);
    if sanitized.is_empty() {
        return Err(ValidationError::OnlyInvalidCharacters(field));
    }
    Ok(sanitized)
}

/// Coerce an arbitrary JSON value to a trust score. Anything that is not
/// an integer in 0-3 resolves to 0 rather than failing.
pub fn validate_score(value: &Value) -> u8 {
    let n = match value {
        Value::Number(n) => n.as_f64().map(|f| f.trunc()),
        Value::String(s) => parse_leading_int(s),
        _ => None,
    };
    match n {
        Some(v) if (0.0..=3.0).contains(&v) => v as u8,
        _ => 0,
    }
}

// parseInt-style: an optional sign and leading digits, junk after ignored.
fn parse_leading_int(s: &str) -> Option<f64> {
    let s = s.trim();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<f64>().ok().map(|v| sign * v)
}

/// Validate one relationship record from an untrusted payload. Records
/// without a usable id or name are dropped (returns `None`).
pub fn validate_relationship(value: &Value) -> Option<RelationshipRecord> {
    let obj = value.as_object()?;
    let id = match obj.get("id")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let name = validate_name(obj.get("name")?.as_str()?).ok()?;
    Some(RelationshipRecord { id, name })
}

/// Result of validating a whole relationships-plus-scores document.
#[derive(Debug, Clone)]
pub struct MapCheck {
    pub is_valid: bool,
    pub content: Option<MapContent>,
    pub errors: Vec<String>,
}

/// Validate a full map payload. Per-record failures are collected, and the
/// aggregate is invalid when zero usable relationships remain even if the
/// individual records were fine.
pub fn validate_map_payload(payload: &Value) -> MapCheck {
    if !payload.is_object() {
        return MapCheck {
            is_valid: false,
            content: None,
            errors: vec!["Invalid map data structure".to_string()],
        };
    }

    let mut errors = Vec::new();
    let mut relationships = Vec::new();

    if let Some(items) = payload.get("relationships").and_then(Value::as_array) {
        for (index, item) in items.iter().enumerate() {
            match validate_relationship(item) {
                Some(record) => relationships.push(record),
                None => errors.push(format!("Relationship {} is invalid", index)),
            }
        }
    }

    let trust_scores = validate_scores(payload.get("trust_scores").unwrap_or(&Value::Null));

    if relationships.is_empty() {
        errors.push("No valid relationships found".to_string());
    }

    let is_valid = errors.is_empty();
    MapCheck {
        is_valid,
        content: is_valid.then_some(MapContent {
            relationships,
            trust_scores,
        }),
        errors,
    }
}

fn validate_scores(value: &Value) -> HashMap<String, ScorePair> {
    let mut scores = HashMap::new();
    if let Some(obj) = value.as_object() {
        for (key, entry) in obj {
            if entry.is_object() {
                scores.insert(
                    key.clone(),
                    ScorePair::new(
                        validate_score(entry.get("outward").unwrap_or(&Value::Null)),
                        validate_score(entry.get("inward").unwrap_or(&Value::Null)),
                    ),
                );
            }
        }
    }
    scores
}

/// Total cleanup of imported JSON: bad records are silently dropped and
/// score entries missing either direction are skipped. Never fails.
pub fn sanitize_imported(value: &Value) -> MapContent {
    let relationships = value
        .get("relationships")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(validate_relationship).collect())
        .unwrap_or_default();

    let mut trust_scores = HashMap::new();
    if let Some(obj) = value.get("trust_scores").and_then(Value::as_object) {
        for (key, entry) in obj {
            if let (Some(outward), Some(inward)) = (entry.get("outward"), entry.get("inward")) {
                trust_scores.insert(
                    key.clone(),
                    ScorePair::new(validate_score(outward), validate_score(inward)),
                );
            }
        }
    }

    MapContent {
        relationships,
        trust_scores,
    }
}

/// Sanitize an already-typed map content payload: names re-cleaned (records
/// whose name sanitizes away are dropped along with their score entries)
/// and scores clamped back into 0-3.
pub fn sanitize_map_content(content: &MapContent) -> MapContent {
    let relationships: Vec<RelationshipRecord> = content
        .relationships
        .iter()
        .filter_map(|r| {
            let name = sanitize_text(&r.name, MAX_NAME_LENGTH);
            (!name.is_empty()).then(|| RelationshipRecord {
                id: r.id.clone(),
                name,
            })
        })
        .collect();

    let trust_scores = content
        .trust_scores
        .iter()
        .filter(|(id, _)| relationships.iter().any(|r| &r.id == *id))
        .map(|(id, pair)| {
            (
                id.clone(),
                ScorePair::new(
                    TrustLevel::from_score(pair.outward).score(),
                    TrustLevel::from_score(pair.inward).score(),
                ),
            )
        })
        .collect();

    MapContent {
        relationships,
        trust_scores,
    }
}

/// Whether a URL is safe to render as a link. Script-executing and
/// data-URI schemes are rejected; http(s), protocol-relative, and
/// relative paths are allowed.
pub fn is_safe_link(url: &str) -> bool {
    let trimmed = url.trim();
    let lower = trimmed.to_lowercase();

    if lower.starts_with("javascript:") || lower.starts_with("data:") || lower.starts_with("vbscript:")
    {
        return false;
    }
    if trimmed.starts_with("//") {
        return true;
    }
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return true;
    }

    // Any other explicit scheme is rejected; schemeless input is treated
    // as a relative path as long as it carries no markup.
    match scheme_of(trimmed) {
        Some(_) => false,
        None => !trimmed.contains('<') && !trimmed.contains('>'),
    }
}

fn scheme_of(url: &str) -> Option<&str> {
    let colon = url.find(':')?;
    let candidate = &url[..colon];
    let path_start = url.find(['/', '?', '#']).unwrap_or(url.len());
    if colon < path_start
        && !candidate.is_empty()
        && candidate.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        Some(candidate)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_strips_tags() {
        assert_eq!(sanitize_text("<script>alert(1)</script>Kate", 50), "alert(1)Kate");
        assert_eq!(sanitize_text("<b>Bold</b> name", 50), "Bold name");
        assert_eq!(sanitize_text("<img src=x onerror=alert(1)>", 50), "");
    }

    #[test]
    fn test_sanitize_decodes_then_filters_entities() {
        assert_eq!(sanitize_text("&lt;script&gt;", 50), "script");
        assert_eq!(sanitize_text("Tom &amp; Jerry", 50), "Tom Jerry");
        assert_eq!(sanitize_text("O&#39;Brien", 50), "O'Brien");
        assert_eq!(sanitize_text("&#x3C;svg&#x3E;", 50), "svg");
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(sanitize_text("  Kate   \t Smith \n", 50), "Kate Smith");
    }

    #[test]
    fn test_sanitize_truncates_by_chars() {
        assert_eq!(sanitize_text("abcdef", 3), "abc");
        // No trailing space after truncation
        assert_eq!(sanitize_text("ab cdef", 3), "ab");
    }

    #[test]
    fn test_sanitize_idempotent() {
        let inputs = [
            "<script>alert('xss')</script>",
            "Tom &amp;&amp; Jerry &lt;3",
            "  a   lot \t of   space  ",
            "plain name",
            "&#106;&#97;vascript:alert(1)",
            "ab cdef",
            "<<<>>>",
            "emoji \u{1F600} name",
        ];
        for input in inputs {
            let once = sanitize_text(input, 20);
            let twice = sanitize_text(&once, 20);
            assert_eq!(once, twice, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  Kate  ").unwrap(), "Kate");
        assert_eq!(validate_name(""), Err(ValidationError::Empty("Name")));
        assert_eq!(validate_name("   "), Err(ValidationError::Empty("Name")));
        assert_eq!(
            validate_name("<>!@#$%"),
            Err(ValidationError::OnlyInvalidCharacters("Name"))
        );
    }

    #[test]
    fn test_validate_name_truncates_to_fifty() {
        let long = "x".repeat(80);
        assert_eq!(validate_name(&long).unwrap().len(), 50);
    }

    #[test]
    fn test_validate_title_allows_longer() {
        let long = "t".repeat(80);
        assert_eq!(validate_title(&long).unwrap().len(), 80);
    }

    #[test]
    fn test_validate_score_in_range() {
        for n in 0..=3u8 {
            assert_eq!(validate_score(&json!(n)), n);
        }
        assert_eq!(validate_score(&json!("2")), 2);
        assert_eq!(validate_score(&json!(2.9)), 2);
    }

    #[test]
    fn test_validate_score_out_of_range_defaults_to_zero() {
        assert_eq!(validate_score(&json!(4)), 0);
        assert_eq!(validate_score(&json!(-1)), 0);
        assert_eq!(validate_score(&json!("eleven")), 0);
        assert_eq!(validate_score(&json!(null)), 0);
        assert_eq!(validate_score(&json!({"nested": true})), 0);
        assert_eq!(validate_score(&json!([2])), 0);
    }

    #[test]
    fn test_validate_relationship() {
        let good = json!({"id": "rel-1-0", "name": "Kate"});
        let record = validate_relationship(&good).unwrap();
        assert_eq!(record.name, "Kate");

        assert!(validate_relationship(&json!({"id": "rel-1-0", "name": "<>"})).is_none());
        assert!(validate_relationship(&json!({"name": "Kate"})).is_none());
        assert!(validate_relationship(&json!("not an object")).is_none());
    }

    #[test]
    fn test_validate_map_payload() {
        let payload = json!({
            "relationships": [
                {"id": "a", "name": "Kate"},
                {"id": "b", "name": "<><>"},
            ],
            "trust_scores": {
                "a": {"outward": 3, "inward": "7"},
            }
        });
        let check = validate_map_payload(&payload);
        assert!(!check.is_valid);
        assert_eq!(check.errors.len(), 1);
        assert!(check.content.is_none());

        let payload = json!({
            "relationships": [{"id": "a", "name": "Kate"}],
            "trust_scores": {"a": {"outward": 3, "inward": 7}}
        });
        let check = validate_map_payload(&payload);
        assert!(check.is_valid);
        let content = check.content.unwrap();
        assert_eq!(content.relationships.len(), 1);
        // Out-of-range inward coerced to 0
        assert_eq!(content.trust_scores["a"], ScorePair::new(3, 0));
    }

    #[test]
    fn test_map_payload_invalid_with_zero_survivors() {
        let check = validate_map_payload(&json!({"relationships": []}));
        assert!(!check.is_valid);
        assert!(check
            .errors
            .iter()
            .any(|e| e.contains("No valid relationships")));
    }

    #[test]
    fn test_sanitize_imported_is_total() {
        assert!(sanitize_imported(&json!(null)).relationships.is_empty());
        assert!(sanitize_imported(&json!(42)).relationships.is_empty());

        let content = sanitize_imported(&json!({
            "relationships": [
                {"id": "a", "name": "<i>Kate</i>"},
                {"bad": true},
            ],
            "trust_scores": {
                "a": {"outward": 1, "inward": 2},
                "b": {"outward": 1},
            }
        }));
        assert_eq!(content.relationships.len(), 1);
        assert_eq!(content.relationships[0].name, "Kate");
        assert_eq!(content.trust_scores.len(), 1);
    }

    #[test]
    fn test_is_safe_link() {
        assert!(is_safe_link("https://example.com/map"));
        assert!(is_safe_link("http://example.com"));
        assert!(is_safe_link("//cdn.example.com/x.png"));
        assert!(is_safe_link("/maps/123"));
        assert!(is_safe_link("?share=ABC234"));

        assert!(!is_safe_link("javascript:alert(1)"));
        assert!(!is_safe_link("JaVaScRiPt:alert(1)"));
        assert!(!is_safe_link("data:text/html,<script>"));
        assert!(!is_safe_link("ftp://example.com"));
        assert!(!is_safe_link("relative<script>"));
    }
}
