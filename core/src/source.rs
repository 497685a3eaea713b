//! Builds the source text from extraction units (usually pages).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::SourceOptions;

static PAGE_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^page\s*\d+$").expect("valid page marker regex"));

/// Merge `pages` in reading order into one source text with single spaces
/// between and inside units.
pub fn consolidate_pages<S: AsRef<str>>(pages: &[S], options: &SourceOptions) -> String {
    let mut merged = String::new();
    for page in pages {
        let page = page.as_ref();
        let cleaned = if options.strip_page_markers {
            strip_page_markers(page)
        } else {
            page.to_string()
        };
        for word in cleaned.split_whitespace() {
            if !merged.is_empty() {
                merged.push(' ');
            }
            merged.push_str(word);
        }
    }
    merged
}

/// Remove lines that only read `Page N`.
pub fn strip_page_markers(text: &str) -> String {
    text.lines()
        .filter(|line| !PAGE_MARKER_RE.is_match(line.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}
