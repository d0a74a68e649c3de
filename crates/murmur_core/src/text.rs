/*
 * SPDX-FileCopyrightText: 2026 Murmur Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Text and presentation helpers: markup sanitization for user-supplied
//! bodies, relative timestamps, compact number formatting, and the
//! `@mention`/`#hashtag` scanners.

/// Inline formatting allowed in post bodies. Comments allow no markup at
/// all (pass an empty slice).
pub const POST_ALLOWED_TAGS: &[&str] = &["p", "br", "strong", "em", "u"];

/// Strips every tag not in the allow-list, keeping its inner text.
/// Allowed tags are re-emitted bare: attributes never survive, so an
/// `onclick` or `style` payload cannot ride through on a permitted tag.
pub fn sanitize(input: &str, allowed: &[&str]) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let Some(end) = tail.find('>') else {
            // Unterminated tag: neutralize the bracket and keep the text.
            out.push_str("&lt;");
            rest = tail;
            continue;
        };
        let inner = &tail[..end];
        let closing = inner.starts_with('/');
        let body = inner.trim_start_matches('/').trim_end_matches('/');
        let name: String = body
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if !name.is_empty() && allowed.iter().any(|t| *t == name) {
            if closing {
                out.push_str(&format!("</{name}>"));
            } else {
                out.push_str(&format!("<{name}>"));
            }
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Relative timestamp buckets: days, then hours past one, then minutes
/// past one, then "Just now".
pub fn time_ago(then_ms: i64, now_ms: i64) -> String {
    let secs = (now_ms.saturating_sub(then_ms)).max(0) / 1000;
    let days = secs / 86_400;
    if days > 0 {
        format!("{days}d ago")
    } else if secs > 3600 {
        format!("{}h ago", secs / 3600)
    } else if secs > 60 {
        format!("{}m ago", secs / 60)
    } else {
        "Just now".to_string()
    }
}

/// Compact display form: 999 stays plain, then 1.0K / 1.0M / 1.0B.
pub fn format_number(num: u64) -> String {
    if num < 1_000 {
        num.to_string()
    } else if num < 1_000_000 {
        format!("{:.1}K", num as f64 / 1_000.0)
    } else if num < 1_000_000_000 {
        format!("{:.1}M", num as f64 / 1_000_000.0)
    } else {
        format!("{:.1}B", num as f64 / 1_000_000_000.0)
    }
}

/// Word-boundary truncation with a `...` suffix.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    let head = match cut.rsplit_once(' ') {
        Some((head, _)) => head.to_string(),
        None => cut,
    };
    format!("{head}...")
}

/// `@name` references, deduplicated, in order of first appearance.
pub fn extract_mentions(text: &str) -> Vec<String> {
    extract_marked(text, '@')
}

/// `#tag` references, deduplicated, in order of first appearance.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    extract_marked(text, '#')
}

fn extract_marked(text: &str, marker: char) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(marker) {
        let tail = &rest[pos + marker.len_utf8()..];
        let end = tail
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(tail.len());
        let word = &tail[..end];
        if !word.is_empty() && !out.iter().any(|w| w == word) {
            out.push(word.to_string());
        }
        rest = &tail[end..];
    }
    out
}
