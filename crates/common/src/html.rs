//! Small helpers for the HTML subset the platform renders.

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape for use inside a double-quoted attribute.
pub fn escape_attr(text: &str) -> String {
    escape_html(text).replace('"', "&quot;")
}

pub fn bold(text: &str) -> String {
    format!("<b>{}</b>", escape_html(text))
}

pub fn code(text: &str) -> String {
    format!("<code>{}</code>", escape_html(text))
}

pub fn link(label: &str, url: &str) -> String {
    format!("<a href=\"{}\">{}</a>", escape_attr(url), escape_html(label))
}

/// First `max_chars` characters of `text`.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Split `text` into pieces of at most `max_chars` characters each.
pub fn chunk_chars(text: &str, max_chars: usize) -> Vec<&str> {
    if max_chars == 0 {
        return Vec::new();
    }
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let head = truncate_chars(rest, max_chars);
        chunks.push(head);
        rest = &rest[head.len()..];
    }
    chunks
}
