//! Logging utilities for sanitizing user-supplied text so every record stays on one line.
//! Escapes control characters that otherwise break log readability.

/// Longest preview written for a single value.
const MAX_PREVIEW: usize = 300;

/// Render `s` on one line for a log record.
///
/// Backslash, newline, carriage return and tab get their Rust escapes; any
/// other control character is written as `\xNN`. At most [`MAX_PREVIEW`]
/// characters are kept, and a trailing `…` marks the cut.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    let mut chars = s.chars();
    for ch in chars.by_ref().take(MAX_PREVIEW) {
        push_escaped(&mut out, ch);
    }
    if chars.next().is_some() {
        out.push('…');
    }
    out
}

fn push_escaped(out: &mut String, ch: char) {
    use std::fmt::Write;
    match ch {
        '\\' | '\n' | '\r' | '\t' => out.extend(ch.escape_default()),
        c if c.is_control() => {
            let _ = write!(out, "\\x{:02X}", u32::from(c));
        }
        c => out.push(c),
    }
}

/// Hide all but the first few characters of a secret (API keys) for logging.
pub fn redact_secret(secret: &str) -> String {
    let shown: String = secret.chars().take(3).collect();
    if secret.chars().count() <= 3 {
        "***".to_string()
    } else {
        format!("{}***", shown)
    }
}
