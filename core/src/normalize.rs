//! Canonical text form shared by both sides of every comparison.
//!
//! The source text and each field value go through the same pipeline, so a
//! phrase matches regardless of case, typographic quotes, dash variants,
//! line breaks or punctuation.

use once_cell::sync::Lazy;
use regex::Regex;

static ESCAPED_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\n\\n|\\n").expect("valid escaped break regex"));

static LITERAL_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\n+|\n").expect("valid line break regex"));

static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Canonicalize `text` for containment checks.
///
/// Total, deterministic and idempotent: the output only contains
/// `[a-z0-9"'-]` separated by single spaces.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let folded: String = text.to_lowercase().chars().map(fold_typography).collect();
    let unbroken = ESCAPED_BREAK_RE.replace_all(&folded, " ");
    let unbroken = LITERAL_BREAK_RE.replace_all(&unbroken, " ");
    let unescaped = strip_stray_backslashes(&unbroken);

    let filtered: String = unescaped
        .chars()
        .map(|ch| if is_kept(ch) { ch } else { ' ' })
        .collect();

    WHITESPACE_RE.replace_all(&filtered, " ").trim().to_string()
}

/// Guillemets fold to `"`, the reversed, grave and acute single marks fold
/// to `'`. Curly quotes are left alone and fall out with other punctuation.
fn fold_typography(ch: char) -> char {
    match ch {
        '\u{00AB}' | '\u{00BB}' => '"',
        '\u{201B}' | '`' | '\u{00B4}' => '\'',
        '\u{2010}' | '\u{2012}' | '\u{2013}' | '\u{2014}' => '-',
        other => other,
    }
}

/// Drop a backslash unless it starts one of `\n \r \t \\ \"`.
/// Each backslash is judged against the character that follows it in the input.
fn strip_stray_backslashes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let keeps = matches!(chars.peek(), Some('n' | 'r' | 't' | '\\' | '"'));
            if !keeps {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

fn is_kept(ch: char) -> bool {
    ch.is_ascii_lowercase()
        || ch.is_ascii_digit()
        || matches!(ch, '"' | '\'' | '-')
        || ch.is_whitespace()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_case_quotes_and_dashes() {
        assert_eq!(
            normalize("\u{201C}Hello\u{2014}World\u{201D}"),
            normalize("hello-world")
        );
        assert_eq!(normalize("\u{00AB}Hi\u{00BB} `fine\u{00B4}"), "\"hi\" 'fine'");
        assert_eq!(normalize("a\u{2010}b\u{2012}c\u{2013}d"), "a-b-c-d");
    }

    #[test]
    fn curly_quotes_drop_out_like_punctuation() {
        assert_eq!(normalize("It\u{2019}s \u{2018}fine\u{2019}"), "it s fine");
        assert_eq!(normalize("\u{201E}Hallo\u{201C}"), "hallo");
    }

    #[test]
    fn collapses_escaped_and_literal_breaks() {
        assert_eq!(normalize("one\\n\\ntwo\\nthree"), "one two three");
        assert_eq!(normalize("one\n\n\ntwo\nthree"), "one two three");
    }

    #[test]
    fn strips_backslashes_and_punctuation() {
        assert_eq!(normalize("a\\b"), "ab");
        assert_eq!(normalize("Article 5(1), para. 2;"), "article 5 1 para 2");
        assert_eq!(normalize("caf\u{00E9} \u{00A7} 12"), "caf 12");
    }

    #[test]
    fn is_total_on_degenerate_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \n\t "), "");
        assert_eq!(normalize("\\\\\\"), "");
        assert_eq!(normalize("!!!"), "");
    }

    #[test]
    fn is_idempotent() {
        let samples = [
            "The Sky \u{2013} is BLUE.",
            "line\\nbreak \\\\n mixed\n\nparagraphs",
            "\u{00AB}Quoted\u{00BB} and \u{2018}single\u{2019} marks",
            "  tabs\tand   spaces  ",
            "\u{0130}stanbul \u{00DF}trasse",
            "path\\to\\file \"x\"",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {sample:?}");
        }
    }
}
