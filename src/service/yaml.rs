//! Backend for `ssm-yaml` documents. YAML has no color literals, so the
//! color operations return nothing.

use async_trait::async_trait;
use tower_lsp::lsp_types::{
    Color, ColorInformation, ColorPresentation, CompletionItem, CompletionList, Diagnostic, DocumentSymbol,
    FoldingRange, FormattingOptions, Hover, Position, Range, SelectionRange, SymbolInformation, TextEdit, Url,
};

use super::{FormatBackend, ResultLimit, ValidationSettings};
use crate::document::{Encoding, TextDocument};
use crate::error::Result;
use crate::model::{self, DocumentModel};
use crate::schema::SchemaStore;
use crate::{completion, diagnostics, folding, formatting, hover, selection, symbol};

pub struct YamlBackend {
    schemas: SchemaStore,
}

impl YamlBackend {
    pub fn new(schemas: SchemaStore) -> Self {
        YamlBackend { schemas }
    }
}

#[async_trait]
impl FormatBackend for YamlBackend {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn parse(&self, document: &TextDocument) -> DocumentModel {
        model::yaml::parse(&document.text())
    }

    async fn validate(
        &self,
        _document: &TextDocument,
        model: &DocumentModel,
        settings: &ValidationSettings,
    ) -> Result<Vec<Diagnostic>> {
        let schema = self.schemas.get()?;
        Ok(diagnostics::diagnostics(&schema, model, settings))
    }

    async fn complete(
        &self,
        document: &TextDocument,
        position: Position,
        model: &DocumentModel,
    ) -> Result<Option<CompletionList>> {
        let schema = self.schemas.get()?;
        Ok(Some(completion::yaml::complete(&schema.schema, document, model, position)))
    }

    async fn resolve(&self, item: CompletionItem) -> Result<CompletionItem> {
        Ok(completion::resolve(item, Encoding::Indented))
    }

    async fn hover(
        &self,
        _document: &TextDocument,
        position: Position,
        model: &DocumentModel,
    ) -> Result<Option<Hover>> {
        let schema = self.schemas.get()?;
        Ok(hover::hover(&schema.schema, model, position))
    }

    fn document_symbols(
        &self,
        document: &TextDocument,
        model: &DocumentModel,
        limit: &ResultLimit,
    ) -> Result<Vec<SymbolInformation>> {
        Ok(symbol::document_symbols(document.uri(), model, limit))
    }

    fn document_symbols2(
        &self,
        _document: &TextDocument,
        model: &DocumentModel,
        limit: &ResultLimit,
    ) -> Result<Vec<DocumentSymbol>> {
        Ok(symbol::document_symbols2(model, limit))
    }

    fn format(
        &self,
        document: &TextDocument,
        _model: &DocumentModel,
        range: Range,
        _options: &FormattingOptions,
    ) -> Result<Vec<TextEdit>> {
        Ok(formatting::format_yaml(document, range))
    }

    async fn document_colors(
        &self,
        _document: &TextDocument,
        _model: &DocumentModel,
        _limit: &ResultLimit,
    ) -> Result<Vec<ColorInformation>> {
        Ok(Vec::new())
    }

    fn color_presentations(
        &self,
        _document: &TextDocument,
        _model: &DocumentModel,
        _color: Color,
        _range: Range,
    ) -> Result<Vec<ColorPresentation>> {
        Ok(Vec::new())
    }

    fn folding_ranges(
        &self,
        _document: &TextDocument,
        model: &DocumentModel,
        limit: &ResultLimit,
    ) -> Result<Vec<FoldingRange>> {
        Ok(folding::folding_ranges(model, limit))
    }

    fn selection_ranges(
        &self,
        _document: &TextDocument,
        positions: &[Position],
        model: &DocumentModel,
    ) -> Result<Vec<SelectionRange>> {
        Ok(selection::selection_ranges(model, positions))
    }

    fn reset_schema(&self, uri: &Url) -> bool {
        self.schemas.reset(uri)
    }
}
