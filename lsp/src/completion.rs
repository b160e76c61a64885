//! Static keyword completion.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `CompletionItemKind.Keyword`.
const KIND_KEYWORD: u8 = 14;

const KEYWORDS: [(&str, u32); 7] = [
    ("fn", 1),
    ("var", 2),
    ("if", 3),
    ("else", 4),
    ("while", 5),
    ("return", 6),
    ("print", 7),
];

/// Keyword whose item gains detail text on resolve.
const FUNCTION_KEYWORD_ID: u32 = 1;

/// A completion item as exchanged with the client.
///
/// Fields this server does not interpret are carried through `extra`, so a
/// resolved item comes back exactly as sent apart from what resolve adds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionItem {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The fixed keyword list, independent of cursor position and document content.
#[must_use]
pub fn keyword_completions() -> Vec<CompletionItem> {
    KEYWORDS
        .iter()
        .map(|&(label, id)| CompletionItem {
            label: label.to_string(),
            kind: Some(KIND_KEYWORD),
            detail: None,
            documentation: None,
            data: Some(id.into()),
            extra: Map::new(),
        })
        .collect()
}

/// Attach detail text to the `fn` item; every other item is returned unchanged.
#[must_use]
pub fn resolve(mut item: CompletionItem) -> CompletionItem {
    let is_function = item
        .data
        .as_ref()
        .and_then(Value::as_u64)
        .is_some_and(|id| id == u64::from(FUNCTION_KEYWORD_ID));
    if is_function {
        item.detail = Some("Function definition".to_string());
        item.documentation = Some("fn name(args) { ... }".into());
    }
    item
}
