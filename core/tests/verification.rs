use serde_json::{json, Value};
use vbt_core::{
    matches, normalize, to_canonical_string, Classification, Config, MatchStats,
    VerificationState, Verifier,
};

fn verify_with(cfg: Config, doc: &Value, source: &str) -> (String, VerificationState) {
    let verifier = Verifier::new(cfg).unwrap();
    verifier.run_document(doc, source)
}

fn verify(doc: &Value, source: &str) -> (String, VerificationState) {
    verify_with(Config::default(), doc, source)
}

fn classes_for(state: &VerificationState, path: &str) -> Vec<Classification> {
    state
        .highlights
        .iter()
        .filter(|h| h.path == path)
        .map(|h| h.classification)
        .collect()
}

fn stats(matched: usize, unmatched: usize) -> MatchStats {
    MatchStats {
        matched_blocks: matched,
        unmatched_blocks: unmatched,
    }
}

#[test]
fn normalization_folds_case_quotes_and_dashes() {
    assert_eq!(
        normalize("\u{201C}Hello\u{2014}World\u{201D}"),
        normalize("hello-world")
    );
}

#[test]
fn both_sentences_found_in_source() {
    let doc = json!({"content": "The sky is blue.\nGrass is green."});
    let (_, state) = verify(&doc, "the sky is blue and grass is green today");
    assert_eq!(state.stats, stats(2, 0));
    assert_eq!(state.stats.to_string(), "100.00%");
    assert_eq!(state.highlights.len(), 7);
    assert!(state
        .highlights
        .iter()
        .all(|h| h.classification == Classification::Matched));
}

#[test]
fn second_sentence_missing_from_source() {
    let doc = json!({"content": "The sky is blue.\nGrass is green."});
    let (_, state) = verify(&doc, "the sky is blue");
    assert_eq!(state.stats, stats(1, 1));
    assert_eq!(state.stats.to_string(), "50.00%");
    let classes = classes_for(&state, "content");
    assert_eq!(&classes[..4], &[Classification::Matched; 4]);
    assert_eq!(&classes[4..], &[Classification::Unmatched; 3]);
}

#[test]
fn malformed_document_yields_empty_state() {
    let verifier = Verifier::new(Config::default()).unwrap();
    let state = verifier.run("{\"content\": \"The sky\",, }", "the sky");
    assert!(state.highlights.is_empty());
    assert_eq!(state.stats, stats(0, 0));
    assert_eq!(state.stats.to_string(), "0.00%");
}

#[test]
fn missing_source_clears_highlights() {
    let doc = json!({"content": "The sky is blue."});
    let (_, state) = verify(&doc, "");
    assert!(state.highlights.is_empty());
    let (_, state) = verify(&doc, " \n ");
    assert_eq!(state, VerificationState::default());
}

#[test]
fn identical_values_at_different_paths_do_not_collide() {
    let doc = json!({
        "regulation": {"title": "General Provisions"},
        "articles": [
            {"title": "General Provisions", "content": "", "path": ["General Provisions"]},
            {"title": "General Provisions", "content": "", "path": ["General Provisions"]}
        ]
    });
    let (text, state) = verify(&doc, "general provisions");
    let mut spans: Vec<(usize, usize)> = state.highlights.iter().map(|h| h.span).collect();
    assert_eq!(spans.len(), 10);
    spans.sort();
    spans.dedup();
    assert_eq!(spans.len(), 10);
    for pair in spans.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "overlapping spans {pair:?}");
    }
    for h in &state.highlights {
        assert_eq!(&text[h.span.0..h.span.1], h.snippet);
    }
    let paths: Vec<&str> = state.highlights.iter().map(|h| h.path.as_str()).collect();
    assert!(paths.contains(&"articles.[1].path.[0]"));
}

#[test]
fn mixed_spacing_in_edited_text_keeps_ranges_apart() {
    let verifier = Verifier::new(Config::default()).unwrap();
    let text = r#"{"a": {"path":["Chapter One"], "title":"Same words here"}, "b": {"path": ["Part Two"], "title": "Chapter One", "content": "Same words here"}}"#;
    let state = verifier.run(text, "chapter one part two same words here");
    assert_eq!(state.fields_skipped, 0);
    let mut spans: Vec<(usize, usize)> = state.highlights.iter().map(|h| h.span).collect();
    spans.sort();
    for pair in spans.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "overlapping spans {pair:?}");
    }
    let title = state.highlights.iter().find(|h| h.path == "a.title").unwrap();
    assert_eq!(title.span.0, text.find("Same").unwrap());
}

#[test]
fn blocks_of_six_words_are_classified_independently() {
    let doc = json!({
        "content": "one two three four five six seven eight nine ten eleven twelve"
    });
    let (_, state) = verify(&doc, "one two three four five six");
    assert_eq!(state.stats, stats(1, 1));
    let classes = classes_for(&state, "content");
    assert_eq!(&classes[..6], &[Classification::Matched; 6]);
    assert_eq!(&classes[6..], &[Classification::Unmatched; 6]);
}

#[test]
fn window_fallback_accepts_partially_truncated_blocks() {
    assert!(matches(
        "alpha beta gamma delta epsilon zeta",
        "source has beta gamma delta epsilon in it"
    ));
    assert!(!matches(
        "alpha beta gamma delta epsilon zeta",
        "source has beta gamma only"
    ));
    assert!(!matches("beta gamma", "source has gamma beta"));
}

#[test]
fn escaped_characters_keep_highlights_aligned() {
    let doc = json!({
        "articles": [
            {"title": "Art. 1 \"Scope\"", "content": "He said \"stop\".\n\tThen\\left \u{00E9}t\u{00E9}."}
        ]
    });
    let (text, state) = verify(&doc, "he said stop then left t");
    assert!(!state.highlights.is_empty());
    for h in &state.highlights {
        assert_eq!(&text[h.span.0..h.span.1], h.snippet);
    }
    let snippets: Vec<&str> = state
        .highlights
        .iter()
        .filter(|h| h.path == "articles.[0].content")
        .map(|h| h.snippet.as_str())
        .collect();
    assert_eq!(
        snippets,
        vec!["He", "said", "\\\"stop\\\".", "Then\\\\left", "\u{00E9}t\u{00E9}."]
    );
}

#[test]
fn rows_and_columns_follow_the_serialized_text() {
    let doc = json!({"regulation": {"title": "Data Act"}});
    let (text, state) = verify(&doc, "the data act");
    assert_eq!(text, "{\n  \"regulation\": {\n    \"title\": \"Data Act\"\n  }\n}");
    let first = &state.highlights[0];
    assert_eq!((first.start.line, first.start.column), (3, 15));
    assert_eq!((first.end.line, first.end.column), (3, 19));
}

#[test]
fn custom_eligibility_selects_other_fields() {
    let mut cfg = Config::default();
    cfg.eligibility.content_fields = vec!["body".into()];
    cfg.eligibility.list_fields = vec!["refs".into()];
    let doc = json!({"content": "ignored now", "body": "kept text", "refs": ["kept too"]});
    let (_, state) = verify_with(cfg, &doc, "kept text kept too");
    assert_eq!(state.fields_checked, 2);
    assert!(state.highlights.iter().all(|h| h.path != "content"));
    assert_eq!(state.stats, stats(2, 0));
}

#[test]
fn hand_edited_values_are_verified_as_written() {
    let verifier = Verifier::new(Config::default()).unwrap();
    let doc = json!({"title": "Data Act", "content": "The sky is blue."});
    let text = to_canonical_string(&doc).replace("\"Data Act\"", "\"Data  Act\"");
    let state = verifier.run(&text, "data act the sky is blue");
    assert_eq!(state.fields_checked, 2);
    assert_eq!(state.highlights.len(), 6);
}

#[test]
fn fix_request_targets_unmatched_word_under_cursor() {
    let doc = json!({"content": "The sky is blue.\nGrass is green."});
    let (text, state) = verify(&doc, "the sky is blue");
    let grass = text.find("Grass").unwrap();
    let request = state.resolve_fix_target(grass + 1).unwrap();
    assert_eq!(request.snippet, "Grass");
    assert_eq!(request.path, "content");
    let sky = text.find("sky").unwrap();
    assert!(state.resolve_fix_target(sky).is_none());
}
