//! Input helpers for text that crosses the radio boundary: UTF-8 safe truncation,
//! prompt sanitising, and classification of `/set` values.

use crate::storage::ConfigField;

/// Prefix that marks a value as a provider secret key.
pub const SECRET_KEY_MARKER: &str = "sk-";

/// Prefixes that mark a value as an endpoint URL.
pub const URL_SCHEMES: &[&str] = &["https://", "http://"];

/// Cut `s` to at most `max_chars` Unicode scalar values without splitting a codepoint.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Remove control characters from a prompt but keep newlines and tabs.
pub fn sanitize_prompt(content: &str) -> String {
    content
        .chars()
        .filter(|&c| !c.is_control() || c == '\n' || c == '\t')
        .collect()
}

/// Decide which provider setting a single `/set` token targets.
///
/// Secret keys win over URLs, and anything else is taken as a model name.
pub fn classify_set_value(value: &str) -> ConfigField {
    if value.starts_with(SECRET_KEY_MARKER) {
        ConfigField::ApiKey
    } else if URL_SCHEMES.iter().any(|scheme| {
        value
            .get(..scheme.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(scheme))
    }) {
        ConfigField::BaseUrl
    } else {
        ConfigField::Model
    }
}
