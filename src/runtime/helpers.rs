//! Escaping helpers for generated HTML.

pub(super) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Make serialized JSON safe to embed in an inline `<script>`: `</` becomes
/// `<\/` so the HTML parser cannot close the block early.
pub(super) fn script_safe_json(json: &str) -> String {
    json.replace("</", "<\\/")
}

/// A JS single-quoted string literal.
pub(super) fn js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '<' => out.push_str("\\x3c"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}
