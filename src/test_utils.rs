//! Shared test utilities for ssm-lsp.
//!
//! This module provides a recording [`Notifier`] and a scriptable
//! [`FormatBackend`]. It is only compiled when running tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tower_lsp::lsp_types::{
    Color, ColorInformation, ColorPresentation, CompletionItem, CompletionList, Diagnostic, DocumentSymbol,
    FoldingRange, FormattingOptions, Hover, Position, Range, SelectionRange, SymbolInformation, TextEdit, Url,
};

use crate::document::TextDocument;
use crate::error::{Result, ServiceError};
use crate::model::DocumentModel;
use crate::notifier::Notifier;
use crate::service::{FormatBackend, ResultLimit, ValidationSettings};
use crate::util::lock;

/// A published `textDocument/publishDiagnostics`.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub uri: Url,
    pub diagnostics: Vec<Diagnostic>,
    pub version: Option<i32>,
}

/// Records everything sent to the client.
#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<String>>,
    published: Mutex<Vec<Published>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    /// `ssm/resultLimitReached` messages, in order.
    pub fn notifications(&self) -> Vec<String> {
        lock(&self.notifications).clone()
    }

    pub fn published(&self) -> Vec<Published> {
        lock(&self.published).clone()
    }

    pub fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish_diagnostics(&self, uri: Url, diagnostics: Vec<Diagnostic>, version: Option<i32>) {
        lock(&self.published).push(Published {
            uri,
            diagnostics,
            version,
        });
    }

    async fn result_limit_reached(&self, message: String) {
        lock(&self.notifications).push(message);
    }

    async fn log_error(&self, message: String) {
        lock(&self.errors).push(message);
    }
}

/// A backend that records calls and returns scripted results.
///
/// `validate` returns the configured diagnostics (or fails when told to)
/// and remembers the text it was given. `hover` fails when requests are set
/// to fail. `resolve` applies the configured edit, leaving the item
/// unchanged when none is set.
pub struct MockBackend {
    name: &'static str,
    calls: Mutex<Vec<&'static str>>,
    diagnostics: Mutex<Vec<Diagnostic>>,
    validated: Mutex<Vec<String>>,
    fail_validation: AtomicBool,
    fail_requests: AtomicBool,
    resolve_detail: Mutex<Option<String>>,
    resolve_label: Mutex<Option<String>>,
    known_schema: Mutex<Option<Url>>,
}

impl MockBackend {
    pub fn new(name: &'static str) -> Self {
        MockBackend {
            name,
            calls: Mutex::new(Vec::new()),
            diagnostics: Mutex::new(Vec::new()),
            validated: Mutex::new(Vec::new()),
            fail_validation: AtomicBool::new(false),
            fail_requests: AtomicBool::new(false),
            resolve_detail: Mutex::new(None),
            resolve_label: Mutex::new(None),
            known_schema: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    /// Texts passed to `validate`, in order.
    pub fn validated(&self) -> Vec<String> {
        lock(&self.validated).clone()
    }

    pub fn set_diagnostics(&self, diagnostics: Vec<Diagnostic>) {
        *lock(&self.diagnostics) = diagnostics;
    }

    pub fn set_fail_validation(&self, fail: bool) {
        self.fail_validation.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    pub fn set_resolve_detail(&self, detail: Option<&str>) {
        *lock(&self.resolve_detail) = detail.map(str::to_string);
    }

    /// Relabel resolved items; `Some("")` clears the label.
    pub fn set_resolve_label(&self, label: Option<&str>) {
        *lock(&self.resolve_label) = label.map(str::to_string);
    }

    pub fn set_known_schema(&self, uri: Option<Url>) {
        *lock(&self.known_schema) = uri;
    }

    fn record(&self, call: &'static str) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl FormatBackend for MockBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn parse(&self, document: &TextDocument) -> DocumentModel {
        self.record("parse");
        DocumentModel::parse(document)
    }

    async fn validate(
        &self,
        document: &TextDocument,
        _model: &DocumentModel,
        _settings: &ValidationSettings,
    ) -> Result<Vec<Diagnostic>> {
        self.record("validate");
        lock(&self.validated).push(document.text());
        if self.fail_validation.load(Ordering::SeqCst) {
            return Err(ServiceError::Backend {
                backend: self.name,
                message: "validation failed".to_string(),
            });
        }
        Ok(lock(&self.diagnostics).clone())
    }

    async fn complete(
        &self,
        _document: &TextDocument,
        _position: Position,
        _model: &DocumentModel,
    ) -> Result<Option<CompletionList>> {
        self.record("complete");
        Ok(None)
    }

    async fn resolve(&self, item: CompletionItem) -> Result<CompletionItem> {
        self.record("resolve");
        let mut item = item;
        if let Some(detail) = lock(&self.resolve_detail).clone() {
            item.detail = Some(detail);
        }
        if let Some(label) = lock(&self.resolve_label).clone() {
            item.label = label;
        }
        Ok(item)
    }

    async fn hover(
        &self,
        _document: &TextDocument,
        _position: Position,
        _model: &DocumentModel,
    ) -> Result<Option<Hover>> {
        self.record("hover");
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(ServiceError::Backend {
                backend: self.name,
                message: "hover failed".to_string(),
            });
        }
        Ok(None)
    }

    fn document_symbols(
        &self,
        _document: &TextDocument,
        _model: &DocumentModel,
        _limit: &ResultLimit,
    ) -> Result<Vec<SymbolInformation>> {
        self.record("document_symbols");
        Ok(Vec::new())
    }

    fn document_symbols2(
        &self,
        _document: &TextDocument,
        _model: &DocumentModel,
        _limit: &ResultLimit,
    ) -> Result<Vec<DocumentSymbol>> {
        self.record("document_symbols2");
        Ok(Vec::new())
    }

    fn format(
        &self,
        _document: &TextDocument,
        _model: &DocumentModel,
        _range: Range,
        _options: &FormattingOptions,
    ) -> Result<Vec<TextEdit>> {
        self.record("format");
        Ok(Vec::new())
    }

    async fn document_colors(
        &self,
        _document: &TextDocument,
        _model: &DocumentModel,
        _limit: &ResultLimit,
    ) -> Result<Vec<ColorInformation>> {
        self.record("document_colors");
        Ok(Vec::new())
    }

    fn color_presentations(
        &self,
        _document: &TextDocument,
        _model: &DocumentModel,
        _color: Color,
        _range: Range,
    ) -> Result<Vec<ColorPresentation>> {
        self.record("color_presentations");
        Ok(Vec::new())
    }

    fn folding_ranges(
        &self,
        _document: &TextDocument,
        _model: &DocumentModel,
        _limit: &ResultLimit,
    ) -> Result<Vec<FoldingRange>> {
        self.record("folding_ranges");
        Ok(Vec::new())
    }

    fn selection_ranges(
        &self,
        _document: &TextDocument,
        _positions: &[Position],
        _model: &DocumentModel,
    ) -> Result<Vec<SelectionRange>> {
        self.record("selection_ranges");
        Ok(Vec::new())
    }

    fn reset_schema(&self, uri: &Url) -> bool {
        self.record("reset_schema");
        lock(&self.known_schema).as_ref() == Some(uri)
    }
}
