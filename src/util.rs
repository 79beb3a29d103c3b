// src/util.rs — Shared utility functions

/// One-line preview of `s` for listings: the first non-blank line, cut to
/// `max_chars` characters. An ellipsis marks anything left out, whether
/// the tail of that line or further lines.
pub fn preview(s: &str, max_chars: usize) -> String {
    let text = s.trim();
    let line = text.lines().next().unwrap_or_default().trim_end();
    let shown = match line.char_indices().nth(max_chars) {
        Some((cut, _)) => &line[..cut],
        None => line,
    };
    if shown.len() < text.len() {
        format!("{shown}...")
    } else {
        shown.to_string()
    }
}
