//! Markup neutralisation for free-text submission fields.

/// Replace the characters that carry meaning in HTML with entity references.
///
/// Covers `& " ' < > / \` and the backtick, so the output is inert in element
/// content, quoted attributes and template literals alike.
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '/' => escaped.push_str("&#x2F;"),
            '\\' => escaped.push_str("&#x5C;"),
            '`' => escaped.push_str("&#96;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Trim surrounding whitespace, including the byte-order mark.
pub fn trim_field(input: &str) -> &str {
    input.trim_matches(|ch: char| ch.is_whitespace() || ch == '\u{feff}')
}
