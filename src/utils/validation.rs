//! Input validation utilities

use once_cell::sync::Lazy;
use regex::Regex;

/// Canonical generated tracking identifier: `TRZ-YYYYMMDD-XXXXXX`
static TRACKING_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^TRZ-\d{8}-[A-Z0-9]{6}$").expect("valid tracking id regex"));

/// Characters accepted in a lookup identifier
static LOOKUP_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid lookup id regex"));

/// Whether `id` has the exact shape of a generated tracking identifier
pub fn is_canonical_tracking_id(id: &str) -> bool {
    TRACKING_ID_REGEX.is_match(id)
}

/// Cheap sanity check applied before hitting the store with a user-supplied id
pub fn is_plausible_lookup_id(id: &str) -> bool {
    LOOKUP_ID_REGEX.is_match(id)
}

/// Escape `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'` pattern
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Trimmed value, or `None` when nothing is left
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
