//! Walks a structured document and yields its string leaves with their paths.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EligibilityRules;

/// One step of a field path: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(idx) => write!(f, "[{idx}]"),
        }
    }
}

/// How a leaf can be found again in the serialized document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// Object member. `ordinal` counts earlier leaves with the same key and value.
    Keyed { key: String, ordinal: usize },
    /// Item of an array stored under `key`. `list_ordinal` counts earlier arrays
    /// under that key; `ordinal` counts earlier items of this array with the same value.
    ListItem {
        key: String,
        list_ordinal: usize,
        ordinal: usize,
    },
    /// Root string or item of an array without a key.
    Bare,
}

/// A string leaf of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEntry {
    pub path: Vec<PathSegment>,
    pub value: String,
    pub is_empty: bool,
    pub anchor: Anchor,
}

impl FieldEntry {
    /// Dotted form, e.g. `articles.[0].path.[1]`.
    pub fn path_string(&self) -> String {
        self.path
            .iter()
            .map(|seg| seg.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Name of the field owning this value: the last key, or for list items
    /// the key of the enclosing array.
    pub fn field_name(&self) -> Option<&str> {
        match &self.anchor {
            Anchor::Keyed { key, .. } | Anchor::ListItem { key, .. } => Some(key),
            Anchor::Bare => None,
        }
    }

    pub fn is_eligible(&self, rules: &EligibilityRules) -> bool {
        if self.is_empty {
            return false;
        }
        let name = match &self.anchor {
            Anchor::Keyed { key, .. } if rules.is_content_field(key) => key,
            Anchor::ListItem { key, .. } if rules.is_list_field(key) => key,
            _ => return false,
        };
        if rules.is_short_value_field(name) {
            return true;
        }
        self.value.trim().chars().count() >= rules.min_value_chars
    }
}

struct Frame<'a> {
    value: &'a Value,
    path: Vec<PathSegment>,
    list: Option<ListSlot>,
}

#[derive(Clone)]
struct ListSlot {
    key: String,
    list_ordinal: usize,
    ordinal: usize,
}

/// Every string leaf of `doc` in depth-first order: object members in their
/// original order, arrays by index.
pub fn extract(doc: &Value) -> Vec<FieldEntry> {
    let mut entries = Vec::new();
    let mut keyed_seen: HashMap<(String, String), usize> = HashMap::new();
    let mut lists_seen: HashMap<String, usize> = HashMap::new();
    let mut stack = vec![Frame {
        value: doc,
        path: Vec::new(),
        list: None,
    }];

    while let Some(frame) = stack.pop() {
        match frame.value {
            Value::String(text) => {
                let anchor = match (frame.path.last(), frame.list) {
                    (Some(PathSegment::Key(key)), _) => {
                        let seen = keyed_seen.entry((key.clone(), text.clone())).or_default();
                        let ordinal = *seen;
                        *seen += 1;
                        Anchor::Keyed {
                            key: key.clone(),
                            ordinal,
                        }
                    }
                    (Some(PathSegment::Index(_)), Some(slot)) => Anchor::ListItem {
                        key: slot.key,
                        list_ordinal: slot.list_ordinal,
                        ordinal: slot.ordinal,
                    },
                    _ => Anchor::Bare,
                };
                entries.push(FieldEntry {
                    is_empty: text.trim().is_empty(),
                    value: text.clone(),
                    path: frame.path,
                    anchor,
                });
            }
            Value::Array(items) => {
                let owner = match frame.path.last() {
                    Some(PathSegment::Key(key)) => Some(key.clone()),
                    _ => None,
                };
                let list_ordinal = owner.as_ref().map(|key| {
                    let seen = lists_seen.entry(key.clone()).or_default();
                    let ordinal = *seen;
                    *seen += 1;
                    ordinal
                });

                let mut same_value: HashMap<&str, usize> = HashMap::new();
                let mut children = Vec::with_capacity(items.len());
                for (idx, item) in items.iter().enumerate() {
                    let list = match (&owner, list_ordinal, item) {
                        (Some(key), Some(list_ordinal), Value::String(text)) => {
                            let seen = same_value.entry(text.as_str()).or_default();
                            let ordinal = *seen;
                            *seen += 1;
                            Some(ListSlot {
                                key: key.clone(),
                                list_ordinal,
                                ordinal,
                            })
                        }
                        _ => None,
                    };
                    let mut path = frame.path.clone();
                    path.push(PathSegment::Index(idx));
                    children.push(Frame {
                        value: item,
                        path,
                        list,
                    });
                }
                stack.extend(children.into_iter().rev());
            }
            Value::Object(map) => {
                let children: Vec<Frame> = map
                    .iter()
                    .map(|(key, item)| {
                        let mut path = frame.path.clone();
                        path.push(PathSegment::Key(key.clone()));
                        Frame {
                            value: item,
                            path,
                            list: None,
                        }
                    })
                    .collect();
                stack.extend(children.into_iter().rev());
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }

    entries
}

/// The leaves of `doc` that `rules` select for verification.
pub fn extract_eligible(doc: &Value, rules: &EligibilityRules) -> Vec<FieldEntry> {
    extract(doc)
        .into_iter()
        .filter(|entry| entry.is_eligible(rules))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(entries: &[FieldEntry]) -> Vec<String> {
        entries.iter().map(|e| e.path_string()).collect()
    }

    #[test]
    fn walks_depth_first_in_key_order() {
        let doc: Value = serde_json::from_str(
            r#"{"b": "one", "a": {"z": "two", "y": ["three", {"x": "four"}]}, "c": 5}"#,
        )
        .unwrap();
        let entries = extract(&doc);
        assert_eq!(paths(&entries), vec!["b", "a.z", "a.y.[0]", "a.y.[1].x"]);
        assert_eq!(entries[2].value, "three");
    }

    #[test]
    fn handles_deep_nesting_without_recursion() {
        let mut doc = json!("leaf");
        for _ in 0..1_000 {
            doc = json!({ "n": doc });
        }
        let entries = extract(&doc);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path.len(), 1_000);
        assert_eq!(entries[0].value, "leaf");
    }

    #[test]
    fn counts_repeated_keyed_values_in_walk_order() {
        let doc = json!({
            "articles": [
                {"title": "Same", "sub": {"title": "Same"}},
                {"title": "Same"}
            ]
        });
        let ordinals: Vec<usize> = extract(&doc)
            .iter()
            .map(|e| match e.anchor {
                Anchor::Keyed { ordinal, .. } => ordinal,
                _ => usize::MAX,
            })
            .collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[test]
    fn anchors_list_items_by_list_and_duplicate_ordinal() {
        let doc = json!({
            "articles": [
                {"path": []},
                {"path": ["Chapter I", "Part A", "Chapter I"]}
            ]
        });
        let anchors: Vec<Anchor> = extract(&doc).into_iter().map(|e| e.anchor).collect();
        assert_eq!(
            anchors,
            vec![
                Anchor::ListItem { key: "path".into(), list_ordinal: 1, ordinal: 0 },
                Anchor::ListItem { key: "path".into(), list_ordinal: 1, ordinal: 0 },
                Anchor::ListItem { key: "path".into(), list_ordinal: 1, ordinal: 1 },
            ]
        );
    }

    #[test]
    fn eligibility_follows_rules() {
        let doc = json!({
            "content": "Body text",
            "notes": "Not checked",
            "title": "ab",
            "ref": "1",
            "url": "   ",
            "path": ["Chapter I", "x"],
            "tags": ["ignored"]
        });
        let eligible = extract_eligible(&doc, &EligibilityRules::default());
        assert_eq!(paths(&eligible), vec!["content", "ref", "path.[0]"]);
    }

    #[test]
    fn marks_blank_values_empty() {
        let entries = extract(&json!({"content": " \n "}));
        assert!(entries[0].is_empty);
        assert_eq!(entries[0].field_name(), Some("content"));
        assert_eq!(extract(&json!("root"))[0].anchor, Anchor::Bare);
    }
}
