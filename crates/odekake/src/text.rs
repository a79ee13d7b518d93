//! Text helpers shared by extractors and the event normalizer.

use reqwest::Url;
use scraper::node::Node;
use scraper::{ElementRef, Html};

const SKIPPED_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

const BLOCK_ELEMENTS: [&str; 15] = [
    "p", "div", "li", "tr", "dt", "dd", "h1", "h2", "h3", "h4", "h5", "h6", "section", "article",
    "blockquote",
];

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            let name = child_element.value().name();
            if SKIPPED_ELEMENTS.contains(&name) {
                continue;
            }
            if name == "br" {
                out.push('\n');
                continue;
            }
            collect_text(child_element, out);
            if BLOCK_ELEMENTS.contains(&name) {
                out.push('\n');
            }
        } else if let Node::Text(text) = child.value() {
            out.push_str(text);
        }
    }
}

/// Text content of an HTML fragment with character references decoded.
///
/// `<br>` and the end of block-level elements become newlines; script, style
/// and comment content is dropped.
pub fn html_to_text(input: &str) -> String {
    if !input.contains('<') && !input.contains('&') {
        return input.to_string();
    }
    let fragment = Html::parse_fragment(input);
    let mut out = String::new();
    collect_text(fragment.root_element(), &mut out);
    out
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapses whitespace within each line and drops blank lines.
pub fn normalize_multiline(text: &str) -> String {
    text.lines()
        .map(normalize_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Single-line cleanup: tags stripped, entities decoded, whitespace collapsed.
pub fn clean_text(input: &str) -> String {
    normalize_whitespace(&html_to_text(input))
}

/// Like [`clean_text`] but keeps line structure.
pub fn clean_multiline(input: &str) -> String {
    normalize_multiline(&html_to_text(input))
}

/// Folds full-width ASCII (digits, letters, punctuation) and the ideographic
/// space to their half-width forms. Japanese sites mix both freely in dates
/// and times.
pub fn to_half_width(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            '\u{3000}' => ' ',
            _ => c,
        })
        .collect()
}

/// Trims and turns an empty string into `None`.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolves `href` against `base`. Returns `None` for empty, `javascript:`
/// and `mailto:` targets or when the base is not a valid URL.
pub fn absolute_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with("mailto:") {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base_url = Url::parse(base).ok()?;
    base_url.join(href).ok().map(|u| u.to_string())
}
