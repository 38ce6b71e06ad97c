//! Markup neutralization for upstream chat text.
//!
//! Overlay clients render chat messages into an HTML surface, so text that
//! crossed the upstream trust boundary has its angle brackets escaped before
//! broadcast. Locally-originated text is not routed through here.

/// Replace `<` and `>` with their escaped textual equivalents.
///
/// All other characters pass through unchanged, including `&`, quotes, and
/// already-escaped entities.
pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}
