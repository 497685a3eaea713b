//! Decides whether a phrase is substantiated by the source text.
//!
//! A phrase matches when its normalized form is contained in the normalized
//! source, or when a run of consecutive words is. Runs start at five words
//! and fall back to four and then three; phrases under three words only
//! match whole.

use aho_corasick::AhoCorasick;
use tracing::trace;

use crate::normalize::normalize;

/// Window size tried first.
pub const PRIMARY_WINDOW: usize = 5;
/// Window sizes tried, in order, after a full-size primary window fails.
pub const FALLBACK_WINDOWS: [usize; 2] = [4, 3];
/// Fewer tokens than this never use windows.
pub const MIN_WINDOW_TOKENS: usize = 3;

/// Normalized source text, computed once and reused for every phrase of a run.
#[derive(Debug, Clone, Default)]
pub struct SourceIndex {
    normalized: String,
}

impl SourceIndex {
    pub fn new(source: &str) -> Self {
        Self {
            normalized: normalize(source),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Whether `phrase` is found in the source.
    pub fn contains_phrase(&self, phrase: &str) -> bool {
        if self.normalized.is_empty() {
            return false;
        }
        let clean = normalize(phrase);
        if clean.is_empty() {
            return false;
        }
        if self.normalized.contains(&clean) {
            return true;
        }

        let tokens: Vec<&str> = clean.split(' ').filter(|t| !t.is_empty()).collect();
        if tokens.len() < MIN_WINDOW_TOKENS {
            return false;
        }

        let window = PRIMARY_WINDOW.min(tokens.len());
        if self.any_window_matches(&tokens, window) {
            return true;
        }
        if window == PRIMARY_WINDOW {
            for size in FALLBACK_WINDOWS {
                if self.any_window_matches(&tokens, size) {
                    return true;
                }
            }
        }
        false
    }

    fn any_window_matches(&self, tokens: &[&str], size: usize) -> bool {
        let windows: Vec<String> = tokens.windows(size).map(|w| w.join(" ")).collect();
        if windows.is_empty() {
            return false;
        }
        let found = AhoCorasick::new(&windows).is_match(&self.normalized);
        trace!(size, windows = windows.len(), found, "window scan");
        found
    }
}

/// Whether `phrase` is supported by `source`. Empty inputs never match.
pub fn matches(phrase: &str, source: &str) -> bool {
    SourceIndex::new(source).contains_phrase(phrase)
}
