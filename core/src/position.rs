//! Maps offsets inside a raw field value to offsets inside the serialized
//! document.
//!
//! Escaping changes lengths unevenly (`"` becomes `\"`, a newline becomes
//! `\n`, control characters become `\u00XX`), so a raw offset is mapped by
//! re-escaping the prefix before it and adding that length to the place where
//! the value starts in the serialized text.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::escape::{escaped_len, quoted};
use crate::extract::{Anchor, FieldEntry};

/// 1-based line/column position; columns count characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// Byte offsets of line starts, for converting many offsets in one text.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(idx, _)| idx + 1));
        Self { starts }
    }

    pub fn location(&self, text: &str, byte_offset: usize) -> Location {
        let byte_offset = byte_offset.min(text.len());
        let line_idx = self.starts.partition_point(|&start| start <= byte_offset) - 1;
        let line_start = self.starts[line_idx];
        let column = text
            .get(line_start..byte_offset)
            .map(|s| s.chars().count())
            .unwrap_or(0)
            + 1;
        Location {
            line: line_idx + 1,
            column,
        }
    }

    /// Byte offset of a 1-based location, clamped to the line's end.
    pub fn offset(&self, text: &str, location: Location) -> Option<usize> {
        let line_start = *self.starts.get(location.line.checked_sub(1)?)?;
        let line_end = text[line_start..]
            .find('\n')
            .map(|idx| line_start + idx)
            .unwrap_or(text.len());
        let line = &text[line_start..line_end];
        let skip = location.column.saturating_sub(1);
        let within = line
            .char_indices()
            .nth(skip)
            .map(|(idx, _)| idx)
            .unwrap_or(line.len());
        Some(line_start + within)
    }
}

/// Where a field's value begins inside the serialized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueLocation {
    /// Byte offset of the first character after the opening quote.
    pub start: usize,
}

impl ValueLocation {
    /// Serialized offset of byte `raw_offset` of `value`.
    pub fn serialized_offset(&self, value: &str, raw_offset: usize) -> usize {
        self.start + escaped_len(&value[..raw_offset])
    }
}

/// Find the serialized occurrence of `entry`'s value in `text`.
///
/// Occurrences are counted with one whitespace-tolerant scan, so canonical
/// and hand-edited spacing in the same text share a single ordering.
/// Returns `None` when the text no longer holds the value where the entry's
/// anchor says it should be.
pub fn locate_value(entry: &FieldEntry, text: &str) -> Option<ValueLocation> {
    let encoded = quoted(&entry.value);
    match &entry.anchor {
        Anchor::Keyed { key, ordinal } => locate_keyed(text, key, &encoded, *ordinal),
        Anchor::ListItem {
            key,
            list_ordinal,
            ordinal,
        } => {
            let list_start = locate_list(text, key, *list_ordinal)?;
            let pos = find_list_item(text, list_start, &encoded, *ordinal)?;
            Some(ValueLocation { start: pos + 1 })
        }
        Anchor::Bare => None,
    }
}

fn locate_keyed(text: &str, key: &str, encoded: &str, ordinal: usize) -> Option<ValueLocation> {
    let pattern = format!(
        r"{}\s*:\s*{}",
        regex::escape(&quoted(key)),
        regex::escape(encoded)
    );
    let re = Regex::new(&pattern).ok()?;
    let found = re.find_iter(text).nth(ordinal)?;
    Some(ValueLocation {
        start: found.end() - encoded.len() + 1,
    })
}

/// Byte offset just past the opening bracket of the `ordinal`-th list under `key`.
fn locate_list(text: &str, key: &str, ordinal: usize) -> Option<usize> {
    let pattern = format!(r"{}\s*:\s*\[", regex::escape(&quoted(key)));
    let re = Regex::new(&pattern).ok()?;
    let found = re.find_iter(text).nth(ordinal)?;
    Some(found.end())
}

/// Start of the `nth` (0-based) top-level string literal equal to `encoded`
/// in the list body beginning at `list_start`. Stops at the list's closing
/// bracket; literals inside nested arrays or objects are not items.
fn find_list_item(text: &str, list_start: usize, encoded: &str, nth: usize) -> Option<usize> {
    let body = text.get(list_start..)?;
    let bytes = body.as_bytes();
    let mut remaining = nth;
    let mut depth = 0usize;
    let mut idx = 0;
    while idx < bytes.len() {
        match bytes[idx] {
            b'"' => {
                let end = string_literal_end(bytes, idx)?;
                if depth == 0 && &body[idx..end] == encoded {
                    if remaining == 0 {
                        return Some(list_start + idx);
                    }
                    remaining -= 1;
                }
                idx = end;
                continue;
            }
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                if depth == 0 {
                    return None;
                }
                depth -= 1;
            }
            _ => {}
        }
        idx += 1;
    }
    None
}

/// Byte offset just past the closing quote of the literal opening at `open`.
fn string_literal_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut idx = open + 1;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' => idx += 2,
            b'"' => return Some(idx + 1),
            _ => idx += 1,
        }
    }
    None
}
