//! JSON-RPC envelopes and the LSP message shapes this server reads and writes.

use epsilon_types::{Diagnostic, DocumentVersion};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

pub(crate) const PARSE_ERROR: i64 = -32700;
pub(crate) const INVALID_REQUEST: i64 = -32600;
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;
pub(crate) const INVALID_PARAMS: i64 = -32602;
pub(crate) const SERVER_NOT_INITIALIZED: i64 = -32002;

/// A message received from the client, classified by shape.
#[derive(Debug)]
pub(crate) enum Incoming {
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
    /// Reply to a server-initiated request. This server sends none, so these are dropped.
    Response { id: Value },
}

impl Incoming {
    /// Classify a raw frame. Returns `None` for frames that are not JSON-RPC messages.
    pub fn classify(mut frame: Value) -> Option<Self> {
        let obj = frame.as_object_mut()?;
        let params = obj.remove("params").unwrap_or(Value::Null);
        let method = obj
            .get("method")
            .and_then(Value::as_str)
            .map(String::from);
        let id = obj.remove("id");

        match (id, method) {
            (Some(id), Some(method)) => Some(Self::Request { id, method, params }),
            (None, Some(method)) => Some(Self::Notification { method, params }),
            (Some(id), None) if obj.contains_key("result") || obj.contains_key("error") => {
                Some(Self::Response { id })
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(crate) struct ResponseError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum Outcome {
    Result(Value),
    Error(ResponseError),
}

#[derive(Debug, Serialize)]
pub(crate) struct Response {
    jsonrpc: &'static str,
    id: Value,
    #[serde(flatten)]
    outcome: Outcome,
}

impl Response {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            outcome: Outcome::Result(result),
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            outcome: Outcome::Error(ResponseError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: &'static str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

/// Zero-based position; `character` counts UTF-16 code units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TextDocumentItem {
    pub uri: Url,
    #[serde(default)]
    pub language_id: String,
    pub version: DocumentVersion,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextDocumentIdentifier {
    pub uri: Url,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VersionedTextDocumentIdentifier {
    pub uri: Url,
    pub version: DocumentVersion,
}

/// One entry of `contentChanges`: a ranged edit, or a full replacement when `range` is absent.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentChange {
    #[serde(default)]
    pub range: Option<Range>,
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DidOpenTextDocumentParams {
    pub text_document: TextDocumentItem,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DidChangeTextDocumentParams {
    pub text_document: VersionedTextDocumentIdentifier,
    pub content_changes: Vec<ContentChange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DidSaveTextDocumentParams {
    pub text_document: TextDocumentIdentifier,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DidCloseTextDocumentParams {
    pub text_document: TextDocumentIdentifier,
}

#[derive(Debug, Serialize)]
pub(crate) struct PublishDiagnosticsParams {
    pub uri: Url,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<DocumentVersion>,
    pub diagnostics: Vec<LspDiagnostic>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LspDiagnostic {
    pub range: Range,
    pub severity: u8,
    pub source: String,
    pub message: String,
}

impl From<&Diagnostic> for LspDiagnostic {
    fn from(diag: &Diagnostic) -> Self {
        Self {
            range: Range {
                start: Position {
                    line: diag.line(),
                    character: diag.character(),
                },
                end: Position {
                    line: diag.line(),
                    character: diag.end_character(),
                },
            },
            severity: diag.severity().to_lsp(),
            source: diag.source().to_string(),
            message: diag.message().to_string(),
        }
    }
}

/// `TextDocumentSyncKind.Incremental`.
const SYNC_INCREMENTAL: u8 = 2;

pub(crate) fn initialize_result() -> Value {
    serde_json::json!({
        "capabilities": {
            "textDocumentSync": {
                "openClose": true,
                "change": SYNC_INCREMENTAL,
                "save": { "includeText": false }
            },
            "completionProvider": {
                "resolveProvider": true
            }
        },
        "serverInfo": {
            "name": "epsilon-lsp",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}
