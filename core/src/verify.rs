//! Drives extraction, segmentation, matching and position mapping to produce
//! the full highlight set for one document/source pair.
//!
//! Every run starts from scratch. Failures are local: a malformed document or
//! missing source gives an empty state, an unlocatable field is skipped.

use std::fmt;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::assist::FixRequest;
use crate::config::Config;
use crate::error::VerifyError;
use crate::extract::{extract_eligible, FieldEntry};
use crate::matcher::SourceIndex;
use crate::position::{locate_value, LineIndex, Location};
use crate::segment::segment;
use crate::serialize::to_canonical_string;

/// Whether a word's block was found in the source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    Matched,
    Unmatched,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Classification::Matched => "matched",
            Classification::Unmatched => "unmatched",
        })
    }
}

/// One word of a verified field, in serialized-document coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Highlight {
    pub classification: Classification,
    /// Byte range in the serialized text.
    pub span: (usize, usize),
    pub start: Location,
    pub end: Location,
    /// Dotted path of the field the word belongs to.
    pub path: String,
    /// Serialized text covered by `span`.
    pub snippet: String,
}

impl Highlight {
    pub fn contains(&self, offset: usize) -> bool {
        self.span.0 <= offset && offset <= self.span.1
    }
}

/// Block counts accumulated over a run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchStats {
    pub matched_blocks: usize,
    pub unmatched_blocks: usize,
}

impl MatchStats {
    pub fn total(&self) -> usize {
        self.matched_blocks + self.unmatched_blocks
    }

    /// Share of matched blocks in percent; 0 when there are no blocks.
    pub fn percentage(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.matched_blocks as f64 * 100.0 / total as f64
    }

    /// Percentage with two decimals, e.g. `33.33`.
    pub fn percentage_label(&self) -> String {
        format!("{:.2}", self.percentage())
    }

    fn record(&mut self, classification: Classification) {
        match classification {
            Classification::Matched => self.matched_blocks += 1,
            Classification::Unmatched => self.unmatched_blocks += 1,
        }
    }
}

impl AddAssign for MatchStats {
    fn add_assign(&mut self, other: Self) {
        self.matched_blocks += other.matched_blocks;
        self.unmatched_blocks += other.unmatched_blocks;
    }
}

impl fmt::Display for MatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percentage_label())
    }
}

/// Result of one run: the highlights and stats for the current snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationState {
    pub highlights: Vec<Highlight>,
    pub stats: MatchStats,
    /// Eligible fields that produced highlights.
    pub fields_checked: usize,
    /// Eligible fields whose value could not be found in the serialized text.
    pub fields_skipped: usize,
}

impl VerificationState {
    pub fn unmatched(&self) -> impl Iterator<Item = &Highlight> {
        self.highlights
            .iter()
            .filter(|h| h.classification == Classification::Unmatched)
    }

    pub fn resolve_fix_target(&self, cursor: usize) -> Option<FixRequest> {
        resolve_fix_target(cursor, &self.highlights)
    }
}

/// The unmatched highlight under `cursor` (a byte offset in the serialized
/// text), packaged for the fix assistant. A cursor right after a word counts.
pub fn resolve_fix_target(cursor: usize, highlights: &[Highlight]) -> Option<FixRequest> {
    highlights
        .iter()
        .find(|h| h.classification == Classification::Unmatched && h.contains(cursor))
        .map(|h| FixRequest {
            snippet: h.snippet.clone(),
            path: h.path.clone(),
        })
}

/// Verification engine configured with field eligibility rules.
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    config: Config,
}

impl Verifier {
    pub fn new(config: Config) -> Result<Self, VerifyError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Verify the serialized document `text` against `source`.
    pub fn run(&self, text: &str, source: &str) -> VerificationState {
        let index = SourceIndex::new(source);
        if index.is_empty() {
            debug!("no source text; clearing highlights");
            return VerificationState::default();
        }
        let doc: Value = match serde_json::from_str(text) {
            Ok(doc) => doc,
            Err(err) => {
                debug!(%err, "document does not parse; clearing highlights");
                return VerificationState::default();
            }
        };
        self.run_parsed(&doc, text, &index)
    }

    /// Serialize `doc` canonically and verify it. Returns the text the
    /// highlights refer to.
    pub fn run_document(&self, doc: &Value, source: &str) -> (String, VerificationState) {
        let text = to_canonical_string(doc);
        let index = SourceIndex::new(source);
        if index.is_empty() {
            return (text, VerificationState::default());
        }
        let state = self.run_parsed(doc, &text, &index);
        (text, state)
    }

    fn run_parsed(&self, doc: &Value, text: &str, index: &SourceIndex) -> VerificationState {
        let entries = extract_eligible(doc, &self.config.eligibility);
        let lines = LineIndex::new(text);
        let mut state = VerificationState::default();

        for entry in &entries {
            if !self.highlight_entry(entry, text, &lines, index, &mut state) {
                state.fields_skipped += 1;
                debug!(path = %entry.path_string(), "field value not found in document text");
                continue;
            }
            state.fields_checked += 1;
        }

        debug!(
            fields = entries.len(),
            skipped = state.fields_skipped,
            matched = state.stats.matched_blocks,
            unmatched = state.stats.unmatched_blocks,
            "verification run complete"
        );
        state
    }

    fn highlight_entry(
        &self,
        entry: &FieldEntry,
        text: &str,
        lines: &LineIndex,
        index: &SourceIndex,
        state: &mut VerificationState,
    ) -> bool {
        let Some(location) = locate_value(entry, text) else {
            return false;
        };
        let path = entry.path_string();
        let value = entry.value.as_str();

        for sentence in segment(value) {
            for block in sentence.blocks() {
                let classification = if index.contains_phrase(&block.phrase()) {
                    Classification::Matched
                } else {
                    Classification::Unmatched
                };
                trace!(path = %path, %classification, phrase = %block.phrase(), "block");
                state.stats.record(classification);

                for word in &block.words {
                    let start = location.serialized_offset(value, word.start);
                    let end = location.serialized_offset(value, word.end);
                    state.highlights.push(Highlight {
                        classification,
                        span: (start, end),
                        start: lines.location(text, start),
                        end: lines.location(text, end),
                        path: path.clone(),
                        snippet: text.get(start..end).unwrap_or_default().to_string(),
                    });
                }
            }
        }
        true
    }
}
