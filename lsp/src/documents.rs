//! Open-document store with incremental synchronization.
//!
//! Owned by the dispatch loop; validation runs only ever see copies of the text.

use std::collections::HashMap;

use epsilon_types::{DocumentVersion, SessionId};
use url::Url;

use crate::protocol::{ContentChange, Position};

#[derive(Debug)]
pub struct Document {
    uri: Url,
    language_id: String,
    version: DocumentVersion,
    session: SessionId,
    text: String,
}

impl Document {
    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    #[must_use]
    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    #[must_use]
    pub fn version(&self) -> DocumentVersion {
        self.version
    }

    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    fn apply(&mut self, change: &ContentChange) {
        match change.range {
            Some(range) => {
                let start = byte_offset(&self.text, range.start);
                let end = byte_offset(&self.text, range.end);
                let (start, end) = if end < start {
                    (end, start)
                } else {
                    (start, end)
                };
                self.text.replace_range(start..end, &change.text);
            }
            None => self.text.clone_from(&change.text),
        }
    }
}

/// Byte offset of an LSP position, clamped to the document.
///
/// Lines past the end map to the end of the text; characters past the end
/// of a line map to the end of that line (before its terminator).
fn byte_offset(text: &str, pos: Position) -> usize {
    let mut line_start = 0;
    for _ in 0..pos.line {
        match text[line_start..].find('\n') {
            Some(i) => line_start += i + 1,
            None => return text.len(),
        }
    }

    let rest = &text[line_start..];
    let line = rest.find('\n').map_or(rest, |i| &rest[..i]);
    let line = line.strip_suffix('\r').unwrap_or(line);

    let mut units = 0u32;
    for (idx, ch) in line.char_indices() {
        if units >= pos.character {
            return line_start + idx;
        }
        units += ch.len_utf16() as u32;
    }
    line_start + line.len()
}

#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: HashMap<Url, Document>,
    next_session: u64,
}

impl DocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or reopen) a document, starting a new session for it.
    pub fn open(
        &mut self,
        uri: Url,
        language_id: String,
        version: DocumentVersion,
        text: String,
    ) -> &Document {
        self.next_session += 1;
        let doc = Document {
            uri: uri.clone(),
            language_id,
            version,
            session: SessionId::new(self.next_session),
            text,
        };
        self.documents.insert(uri.clone(), doc);
        &self.documents[&uri]
    }

    /// Apply `changes` in order and adopt `version`. Returns `None` for unknown documents.
    pub fn change(
        &mut self,
        uri: &Url,
        version: DocumentVersion,
        changes: &[ContentChange],
    ) -> Option<&Document> {
        let doc = self.documents.get_mut(uri)?;
        for change in changes {
            doc.apply(change);
        }
        doc.version = version;
        Some(doc)
    }

    #[must_use]
    pub fn get(&self, uri: &Url) -> Option<&Document> {
        self.documents.get(uri)
    }

    pub fn close(&mut self, uri: &Url) -> Option<Document> {
        self.documents.remove(uri)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
