//! Splits a raw field value into sentences, words and fixed-size blocks.
//!
//! Every unit keeps its byte offset inside the raw value. Offsets are taken
//! from a single forward scan of the value so they never drift when the same
//! text repeats.

use once_cell::sync::Lazy;
use regex::Regex;

/// Words per block. The last block of a sentence may be shorter.
pub const BLOCK_SIZE: usize = 6;

static SENTENCE_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\n\\n|\\n|\n\n|\n").expect("valid sentence break regex"));

/// A line of a field value, bounded by escaped or literal line breaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence<'a> {
    pub start: usize,
    pub text: &'a str,
}

/// One whitespace-delimited token with its byte range in the raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Word<'a> {
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
}

/// Up to [`BLOCK_SIZE`] consecutive words of one sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block<'a> {
    pub words: Vec<Word<'a>>,
}

impl<'a> Block<'a> {
    /// Words joined by single spaces; the text checked against the source.
    pub fn phrase(&self) -> String {
        let mut phrase = String::new();
        for (idx, word) in self.words.iter().enumerate() {
            if idx > 0 {
                phrase.push(' ');
            }
            phrase.push_str(word.text);
        }
        phrase
    }
}

impl<'a> Sentence<'a> {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    /// Words of this sentence with offsets relative to the whole value.
    pub fn words(&self) -> Vec<Word<'a>> {
        let mut words = Vec::new();
        let mut token_start: Option<usize> = None;
        for (idx, ch) in self.text.char_indices() {
            if ch.is_whitespace() {
                if let Some(begin) = token_start.take() {
                    words.push(self.word(begin, idx));
                }
            } else if token_start.is_none() {
                token_start = Some(idx);
            }
        }
        if let Some(begin) = token_start {
            words.push(self.word(begin, self.text.len()));
        }
        words
    }

    /// Words grouped into blocks of [`BLOCK_SIZE`].
    pub fn blocks(&self) -> Vec<Block<'a>> {
        self.words()
            .chunks(BLOCK_SIZE)
            .map(|chunk| Block {
                words: chunk.to_vec(),
            })
            .collect()
    }

    fn word(&self, begin: usize, end: usize) -> Word<'a> {
        Word {
            start: self.start + begin,
            end: self.start + end,
            text: &self.text[begin..end],
        }
    }
}

/// Split `value` into non-empty, trimmed sentences in order.
pub fn segment(value: &str) -> Vec<Sentence<'_>> {
    let mut sentences = Vec::new();
    let mut cursor = 0;
    for boundary in SENTENCE_BREAK_RE.find_iter(value) {
        push_trimmed(&mut sentences, value, cursor, boundary.start());
        cursor = boundary.end();
    }
    push_trimmed(&mut sentences, value, cursor, value.len());
    sentences
}

fn push_trimmed<'a>(out: &mut Vec<Sentence<'a>>, value: &'a str, start: usize, end: usize) {
    let piece = &value[start..end];
    let trimmed = piece.trim();
    if trimmed.is_empty() {
        return;
    }
    let lead = piece.len() - piece.trim_start().len();
    out.push(Sentence {
        start: start + lead,
        text: trimmed,
    });
}
