//! Turns a plain-text YouTube description into display HTML.

use std::sync::LazyLock;

use html_escape::{decode_html_entities, encode_double_quoted_attribute, encode_text};
use regex::Regex;

use crate::validation::{LinkKind, classify_host, with_default_scheme};

const DEFAULT_PRODUCT_LABEL: &str = "View on Amazon";
const LABEL_SEPARATORS: &[char] = &[':', '-', '–', '—', '|', '>', '→', '👉', '⬇', '↓'];
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}'];
const MAX_LABEL_CHARS: usize = 80;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?P<url>https?://[^\s<>"']+|(?i:(?:www\.)?(?:amzn\.to|amazon\.com))/[^\s<>"']+)|(?P<hashtag>#[\p{L}\p{N}_]+)|(?P<timestamp>\b(?:\d{1,2}:)?\d{1,2}:\d{2}\b)"#,
    )
    .expect("valid description token regex")
});

/// Reverses the JSON-style escapes and HTML entities that scraped
/// descriptions tend to carry.
pub fn unescape_description(raw: &str) -> String {
    let replaced = raw
        .replace("\\r\\n", "\n")
        .replace("\\n", "\n")
        .replace("\\\"", "\"")
        .replace("\\/", "/")
        .replace("\\u0026", "&")
        .replace("\\u003c", "<")
        .replace("\\u003e", ">")
        .replace("\\'", "'");
    decode_html_entities(&replaced).into_owned()
}

/// `"01:02:03"` -> 3723, `"4:05"` -> 245. Out-of-range fields yield `None`.
pub fn timestamp_to_seconds(timestamp: &str) -> Option<u64> {
    let parts = timestamp
        .split(':')
        .map(|part| part.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    match parts.as_slice() {
        [minutes, seconds] if *seconds < 60 => Some(minutes * 60 + seconds),
        [hours, minutes, seconds] if *minutes < 60 && *seconds < 60 => {
            Some(hours * 3600 + minutes * 60 + seconds)
        }
        _ => None,
    }
}

pub fn format_youtube_description(text: &str, video_id: &str) -> String {
    let text = unescape_description(text);
    let mut previous_line: Option<&str> = None;
    let mut lines = Vec::new();

    for line in text.lines() {
        lines.push(format_line(line, previous_line, video_id));
        if !line.trim().is_empty() {
            previous_line = Some(line.trim());
        }
    }

    lines.join("<br>")
}

fn format_line(line: &str, previous_line: Option<&str>, video_id: &str) -> String {
    let mut out = String::with_capacity(line.len() * 2);
    let mut cursor = 0;

    for caps in TOKEN_RE.captures_iter(line) {
        if let Some(url) = caps.name("url") {
            let raw = url.as_str();
            let trimmed = raw.trim_end_matches(TRAILING_PUNCTUATION);
            let trailing = &raw[trimmed.len()..];
            let leading = &line[cursor..url.start()];

            if is_amazon_url(trimmed) {
                let (label, consumed) = match plausible_label(leading) {
                    Some(label) => (label, true),
                    None => (
                        previous_line
                            .filter(|prev| !TOKEN_RE.is_match(prev))
                            .and_then(plausible_label)
                            .unwrap_or_else(|| DEFAULT_PRODUCT_LABEL.to_string()),
                        false,
                    ),
                };
                if consumed {
                    let indent = &leading[..leading.len() - leading.trim_start().len()];
                    out.push_str(indent);
                } else {
                    out.push_str(&encode_text(leading));
                }
                out.push_str(&amazon_span(trimmed, &label));
            } else {
                out.push_str(&encode_text(leading));
                out.push_str(&anchor(trimmed));
            }
            out.push_str(&encode_text(trailing));
            cursor = url.end();
        } else if let Some(tag) = caps.name("hashtag") {
            let starts_word = line[..tag.start()]
                .chars()
                .next_back()
                .is_none_or(char::is_whitespace);
            if !starts_word {
                continue;
            }
            out.push_str(&encode_text(&line[cursor..tag.start()]));
            out.push_str(&format!(
                r#"<span class="hashtag">{}</span>"#,
                encode_text(tag.as_str())
            ));
            cursor = tag.end();
        } else if let Some(stamp) = caps.name("timestamp") {
            let Some(seconds) = timestamp_to_seconds(stamp.as_str()) else {
                continue;
            };
            out.push_str(&encode_text(&line[cursor..stamp.start()]));
            out.push_str(&format!(
                r#"<a class="timestamp-link" href="https://www.youtube.com/watch?v={id}&amp;t={seconds}s" data-seconds="{seconds}">{label}</a>"#,
                id = encode_double_quoted_attribute(video_id),
                label = stamp.as_str(),
            ));
            cursor = stamp.end();
        }
    }

    out.push_str(&encode_text(&line[cursor..]));
    out
}

fn is_amazon_url(url: &str) -> bool {
    url::Url::parse(&with_default_scheme(url))
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| {
            matches!(
                classify_host(&host),
                LinkKind::AmazonProduct | LinkKind::AmazonShortLink
            )
        })
}

/// Text that reads like a product name: a short phrase with at least one
/// letter, stripped of separators such as `:` or `->`.
fn plausible_label(text: &str) -> Option<String> {
    let label = text
        .trim()
        .trim_end_matches(|c: char| LABEL_SEPARATORS.contains(&c) || c.is_whitespace())
        .trim_start_matches(|c: char| c == '-' || c == '•' || c == '*' || c.is_whitespace())
        .trim();

    let chars = label.chars().count();
    let plausible = (2..=MAX_LABEL_CHARS).contains(&chars)
        && label.chars().any(char::is_alphabetic)
        && !label.contains("://");
    plausible.then(|| label.to_string())
}

fn amazon_span(url: &str, label: &str) -> String {
    let href = encode_double_quoted_attribute(&with_default_scheme(url)).into_owned();
    format!(
        r#"<span class="amazon-inline-preview" data-amazon-url="{href}"><a href="{href}" target="_blank" rel="noopener noreferrer sponsored">🛒 {label}</a></span>"#,
        label = encode_text(label),
    )
}

fn anchor(url: &str) -> String {
    let href = encode_double_quoted_attribute(url);
    format!(
        r#"<a href="{href}" target="_blank" rel="noopener noreferrer">{text}</a>"#,
        text = encode_text(url),
    )
}
