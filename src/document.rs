//! Open text documents and their encodings.
//!
//! Documents are stored as [`Rope`]s so incremental `didChange` edits are
//! cheap, and snapshots handed to timers or backends are O(1) clones.
//!
//! | Language id | Encoding |
//! |-------------|----------|
//! | `ssm-json`  | [`Encoding::Structured`] |
//! | anything else (`ssm-yaml`, ...) | [`Encoding::Indented`] |

use std::collections::HashMap;
use std::sync::Mutex;

use ropey::Rope;
use tower_lsp::lsp_types::{Position, Range, TextDocumentContentChangeEvent, Url};

use crate::util::lock;

/// Which of the two textual syntaxes a document is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// JSON.
    Structured,
    /// YAML.
    Indented,
}

impl Encoding {
    pub fn from_language_id(language_id: &str) -> Self {
        match language_id {
            "ssm-json" => Encoding::Structured,
            _ => Encoding::Indented,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Encoding::Structured => "json",
            Encoding::Indented => "yaml",
        }
    }
}

/// An immutable snapshot of an open document.
#[derive(Debug, Clone)]
pub struct TextDocument {
    uri: Url,
    language_id: String,
    version: i32,
    encoding: Encoding,
    rope: Rope,
}

impl TextDocument {
    pub fn new(uri: Url, language_id: &str, version: i32, text: &str) -> Self {
        TextDocument {
            uri,
            language_id: language_id.to_string(),
            version,
            encoding: Encoding::from_language_id(language_id),
            rope: Rope::from_str(text),
        }
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Text of a single line without its line break.
    pub fn line(&self, line: u32) -> Option<String> {
        let line = line as usize;
        if line >= self.rope.len_lines() {
            return None;
        }
        let text = self.rope.line(line).to_string();
        Some(text.trim_end_matches(['\n', '\r']).to_string())
    }

    /// Range covering the whole document.
    pub fn full_range(&self) -> Range {
        Range {
            start: Position::new(0, 0),
            end: self.position_at(self.rope.len_chars()),
        }
    }

    /// Char index of an LSP (UTF-16) position, clamped to the document.
    pub fn offset_at(&self, position: Position) -> usize {
        let line = position.line as usize;
        if line >= self.rope.len_lines() {
            return self.rope.len_chars();
        }
        let line_start = self.rope.line_to_char(line);
        let line_end = line_start + content_len(self.rope.line(line));
        let start_cu = self.rope.char_to_utf16_cu(line_start);
        let end_cu = self.rope.char_to_utf16_cu(line_end);
        let target = (start_cu + position.character as usize).min(end_cu);
        self.rope.utf16_cu_to_char(target)
    }

    /// LSP (UTF-16) position of a char index.
    pub fn position_at(&self, offset: usize) -> Position {
        let offset = offset.min(self.rope.len_chars());
        let line = self.rope.char_to_line(offset);
        let line_start = self.rope.line_to_char(line);
        let character =
            self.rope.char_to_utf16_cu(offset) - self.rope.char_to_utf16_cu(line_start);
        Position::new(line as u32, character as u32)
    }

    /// Apply one `didChange` content change in place.
    pub fn apply_change(&mut self, change: &TextDocumentContentChangeEvent) {
        match change.range {
            Some(range) => {
                let start = self.offset_at(range.start);
                let end = self.offset_at(range.end).max(start);
                self.rope.remove(start..end);
                self.rope.insert(start, &change.text);
            }
            None => self.rope = Rope::from_str(&change.text),
        }
    }
}

/// Length in chars of a line slice without its line break.
fn content_len(line: ropey::RopeSlice<'_>) -> usize {
    let mut len = line.len_chars();
    while len > 0 && matches!(line.char(len - 1), '\n' | '\r') {
        len -= 1;
    }
    len
}

/// The set of documents the client currently has open.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: Mutex<HashMap<Url, TextDocument>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, document: TextDocument) -> TextDocument {
        lock(&self.documents).insert(document.uri().clone(), document.clone());
        document
    }

    /// Apply changes for a new version. Returns the updated snapshot, or
    /// `None` when the document is not open.
    pub fn change(
        &self,
        uri: &Url,
        version: i32,
        changes: &[TextDocumentContentChangeEvent],
    ) -> Option<TextDocument> {
        let mut documents = lock(&self.documents);
        let document = documents.get_mut(uri)?;
        for change in changes {
            document.apply_change(change);
        }
        document.version = version;
        Some(document.clone())
    }

    pub fn close(&self, uri: &Url) -> Option<TextDocument> {
        lock(&self.documents).remove(uri)
    }

    pub fn get(&self, uri: &Url) -> Option<TextDocument> {
        lock(&self.documents).get(uri).cloned()
    }

    pub fn all(&self) -> Vec<TextDocument> {
        lock(&self.documents).values().cloned().collect()
    }
}
