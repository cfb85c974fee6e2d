//! One language-service contract, two backends.
//!
//! [`LanguageService`] routes every call to the [`FormatBackend`] for the
//! document's [`Encoding`]. Two operations consult both backends:
//!
//! | Operation | Rule |
//! |-----------|------|
//! | [`LanguageService::reset_schema`] | both are reset, result is `json \|\| yaml` |
//! | [`LanguageService::resolve`] | the JSON result wins if it changed the item and has a label |
//!
//! Validation results are normalized to [`DiagnosticSeverity::ERROR`]
//! whatever severity the backend chose.

pub mod json;
pub mod yaml;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tower_lsp::lsp_types::{
    Color, ColorInformation, ColorPresentation, CompletionItem, CompletionList, Diagnostic, DiagnosticSeverity,
    DocumentSymbol, FoldingRange, FormattingOptions, Hover, Position, Range, SelectionRange, SymbolInformation,
    TextEdit, Url,
};

use crate::document::{Encoding, TextDocument};
use crate::error::Result;
use crate::model::DocumentModel;
use crate::schema::SchemaStore;
use crate::warnings::LimitTrigger;

/// How a tolerated syntax deviation is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityLevel {
    Ignore,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationSettings {
    pub comments: SeverityLevel,
    pub trailing_commas: SeverityLevel,
}

impl ValidationSettings {
    /// Comments and trailing commas are errors.
    pub fn strict() -> Self {
        ValidationSettings {
            comments: SeverityLevel::Error,
            trailing_commas: SeverityLevel::Error,
        }
    }
}

impl Default for ValidationSettings {
    fn default() -> Self {
        ValidationSettings {
            comments: SeverityLevel::Ignore,
            trailing_commas: SeverityLevel::Ignore,
        }
    }
}

/// Upper bound on the number of results a producer returns.
#[derive(Clone, Default)]
pub struct ResultLimit {
    pub limit: Option<usize>,
    pub on_exceeded: Option<LimitTrigger>,
}

impl ResultLimit {
    pub fn new(limit: Option<usize>, on_exceeded: LimitTrigger) -> Self {
        ResultLimit {
            limit,
            on_exceeded: Some(on_exceeded),
        }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Truncate `items` to the limit, invoking the callback if anything was cut.
    pub fn apply<T>(&self, items: &mut Vec<T>) {
        if let Some(limit) = self.limit.filter(|&limit| items.len() > limit) {
            items.truncate(limit);
            self.exceeded();
        }
    }

    pub fn exceeded(&self) {
        if let Some(trigger) = &self.on_exceeded {
            trigger();
        }
    }
}

impl std::fmt::Debug for ResultLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultLimit")
            .field("limit", &self.limit)
            .field("on_exceeded", &self.on_exceeded.is_some())
            .finish()
    }
}

/// The narrow contract an encoding backend implements.
#[async_trait]
pub trait FormatBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn parse(&self, document: &TextDocument) -> DocumentModel;

    async fn validate(
        &self,
        document: &TextDocument,
        model: &DocumentModel,
        settings: &ValidationSettings,
    ) -> Result<Vec<Diagnostic>>;

    async fn complete(
        &self,
        document: &TextDocument,
        position: Position,
        model: &DocumentModel,
    ) -> Result<Option<CompletionList>>;

    async fn resolve(&self, item: CompletionItem) -> Result<CompletionItem>;

    async fn hover(&self, document: &TextDocument, position: Position, model: &DocumentModel)
        -> Result<Option<Hover>>;

    fn document_symbols(
        &self,
        document: &TextDocument,
        model: &DocumentModel,
        limit: &ResultLimit,
    ) -> Result<Vec<SymbolInformation>>;

    fn document_symbols2(
        &self,
        document: &TextDocument,
        model: &DocumentModel,
        limit: &ResultLimit,
    ) -> Result<Vec<DocumentSymbol>>;

    fn format(
        &self,
        document: &TextDocument,
        model: &DocumentModel,
        range: Range,
        options: &FormattingOptions,
    ) -> Result<Vec<TextEdit>>;

    async fn document_colors(
        &self,
        document: &TextDocument,
        model: &DocumentModel,
        limit: &ResultLimit,
    ) -> Result<Vec<ColorInformation>>;

    fn color_presentations(
        &self,
        document: &TextDocument,
        model: &DocumentModel,
        color: Color,
        range: Range,
    ) -> Result<Vec<ColorPresentation>>;

    fn folding_ranges(
        &self,
        document: &TextDocument,
        model: &DocumentModel,
        limit: &ResultLimit,
    ) -> Result<Vec<FoldingRange>>;

    fn selection_ranges(
        &self,
        document: &TextDocument,
        positions: &[Position],
        model: &DocumentModel,
    ) -> Result<Vec<SelectionRange>>;

    /// Drop cached schema state for `uri`. Returns whether the uri was known.
    fn reset_schema(&self, uri: &Url) -> bool;
}

/// Routes each call to the backend for the document's encoding.
#[derive(Clone)]
pub struct LanguageService {
    json: Arc<dyn FormatBackend>,
    yaml: Arc<dyn FormatBackend>,
}

impl LanguageService {
    pub fn new(json: Arc<dyn FormatBackend>, yaml: Arc<dyn FormatBackend>) -> Self {
        LanguageService { json, yaml }
    }

    /// The built-in JSON and YAML backends, each with its own schema store.
    pub fn builtin(schema_path: Option<PathBuf>) -> Self {
        Self::new(
            Arc::new(json::JsonBackend::new(SchemaStore::new(schema_path.clone()))),
            Arc::new(yaml::YamlBackend::new(SchemaStore::new(schema_path))),
        )
    }

    fn backend(&self, document: &TextDocument) -> &dyn FormatBackend {
        match document.encoding() {
            Encoding::Structured => self.json.as_ref(),
            Encoding::Indented => self.yaml.as_ref(),
        }
    }

    pub fn parse(&self, document: &TextDocument) -> DocumentModel {
        self.backend(document).parse(document)
    }

    pub async fn validate(
        &self,
        document: &TextDocument,
        model: &DocumentModel,
        settings: &ValidationSettings,
    ) -> Result<Vec<Diagnostic>> {
        let diagnostics = self.backend(document).validate(document, model, settings).await?;
        Ok(diagnostics
            .into_iter()
            .map(|diagnostic| Diagnostic {
                severity: Some(DiagnosticSeverity::ERROR),
                ..diagnostic
            })
            .collect())
    }

    pub async fn complete(
        &self,
        document: &TextDocument,
        position: Position,
        model: &DocumentModel,
    ) -> Result<Option<CompletionList>> {
        self.backend(document).complete(document, position, model).await
    }

    pub async fn resolve(&self, item: CompletionItem) -> Result<CompletionItem> {
        let json_result = self.json.resolve(item.clone()).await?;
        if json_result != item && !json_result.label.is_empty() {
            return Ok(json_result);
        }
        self.yaml.resolve(item).await
    }

    pub async fn hover(
        &self,
        document: &TextDocument,
        position: Position,
        model: &DocumentModel,
    ) -> Result<Option<Hover>> {
        self.backend(document).hover(document, position, model).await
    }

    pub fn find_document_symbols(
        &self,
        document: &TextDocument,
        model: &DocumentModel,
        limit: &ResultLimit,
    ) -> Result<Vec<SymbolInformation>> {
        self.backend(document).document_symbols(document, model, limit)
    }

    pub fn find_document_symbols2(
        &self,
        document: &TextDocument,
        model: &DocumentModel,
        limit: &ResultLimit,
    ) -> Result<Vec<DocumentSymbol>> {
        self.backend(document).document_symbols2(document, model, limit)
    }

    pub fn format(
        &self,
        document: &TextDocument,
        model: &DocumentModel,
        range: Range,
        options: &FormattingOptions,
    ) -> Result<Vec<TextEdit>> {
        self.backend(document).format(document, model, range, options)
    }

    pub async fn find_document_colors(
        &self,
        document: &TextDocument,
        model: &DocumentModel,
        limit: &ResultLimit,
    ) -> Result<Vec<ColorInformation>> {
        self.backend(document).document_colors(document, model, limit).await
    }

    pub fn get_color_presentations(
        &self,
        document: &TextDocument,
        model: &DocumentModel,
        color: Color,
        range: Range,
    ) -> Result<Vec<ColorPresentation>> {
        self.backend(document).color_presentations(document, model, color, range)
    }

    pub fn get_folding_ranges(
        &self,
        document: &TextDocument,
        model: &DocumentModel,
        limit: &ResultLimit,
    ) -> Result<Vec<FoldingRange>> {
        self.backend(document).folding_ranges(document, model, limit)
    }

    pub fn get_selection_ranges(
        &self,
        document: &TextDocument,
        positions: &[Position],
        model: &DocumentModel,
    ) -> Result<Vec<SelectionRange>> {
        self.backend(document).selection_ranges(document, positions, model)
    }

    /// Reset `uri` in both backends.
    pub fn reset_schema(&self, uri: &Url) -> bool {
        let json = self.json.reset_schema(uri);
        let yaml = self.yaml.reset_schema(uri);
        json || yaml
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn document(language_id: &str) -> TextDocument {
        TextDocument::new(Url::parse("file:///workspace/doc").unwrap(), language_id, 1, "")
    }

    fn service() -> (LanguageService, Arc<MockBackend>, Arc<MockBackend>) {
        let json = Arc::new(MockBackend::new("json"));
        let yaml = Arc::new(MockBackend::new("yaml"));
        (LanguageService::new(json.clone(), yaml.clone()), json, yaml)
    }

    #[tokio::test]
    async fn test_routes_by_encoding() {
        let (service, json, yaml) = service();

        let doc = document("ssm-json");
        let model = service.parse(&doc);
        service.validate(&doc, &model, &ValidationSettings::strict()).await.unwrap();
        let doc = document("ssm-yaml");
        service.validate(&doc, &model, &ValidationSettings::strict()).await.unwrap();
        service.hover(&doc, Position::new(0, 0), &model).await.unwrap();

        assert_eq!(json.calls(), vec!["parse", "validate"]);
        assert_eq!(yaml.calls(), vec!["validate", "hover"]);
    }

    #[tokio::test]
    async fn test_validate_forces_error_severity() {
        let (service, json, _) = service();
        json.set_diagnostics(vec![
            Diagnostic {
                severity: Some(DiagnosticSeverity::WARNING),
                message: "warned".into(),
                ..Default::default()
            },
            Diagnostic {
                severity: None,
                message: "unset".into(),
                ..Default::default()
            },
        ]);
        let doc = document("ssm-json");
        let model = service.parse(&doc);

        let diagnostics = service.validate(&doc, &model, &ValidationSettings::strict()).await.unwrap();

        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics
            .iter()
            .all(|d| d.severity == Some(DiagnosticSeverity::ERROR)));
    }

    #[tokio::test]
    async fn test_resolve_prefers_changed_json_result() {
        let (service, json, _) = service();
        json.set_resolve_detail(Some("from json"));

        let item = CompletionItem::new_simple("name".into(), String::new());
        let resolved = service.resolve(item).await.unwrap();

        assert_eq!(resolved.detail.as_deref(), Some("from json"));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_yaml() {
        let (service, json, yaml) = service();
        yaml.set_resolve_detail(Some("from yaml"));

        let item = CompletionItem::new_simple("name".into(), String::new());
        let resolved = service.resolve(item).await.unwrap();

        assert_eq!(resolved.detail.as_deref(), Some("from yaml"));
        assert_eq!(json.calls(), vec!["resolve"], "JSON backend is always consulted first");
    }

    #[tokio::test]
    async fn test_resolve_ignores_json_result_without_label() {
        let (service, json, yaml) = service();
        json.set_resolve_label(Some(""));
        yaml.set_resolve_detail(Some("from yaml"));

        let item = CompletionItem::new_simple("name".into(), String::new());
        let resolved = service.resolve(item).await.unwrap();

        assert_eq!(resolved.label, "name");
        assert_eq!(resolved.detail.as_deref(), Some("from yaml"));
        assert_eq!(yaml.calls(), vec!["resolve"]);
    }

    #[test]
    fn test_reset_schema_consults_both() {
        let (service, json, yaml) = service();
        let uri = Url::parse("file:///schema.json").unwrap();

        json.set_known_schema(Some(uri.clone()));
        assert!(service.reset_schema(&uri));
        assert_eq!(yaml.calls(), vec!["reset_schema"], "Both backends are reset");

        json.set_known_schema(None);
        assert!(!service.reset_schema(&uri));
    }

    #[test]
    fn test_result_limit_apply() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let limit = ResultLimit::new(
            Some(2),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let mut items = vec![1, 2];
        limit.apply(&mut items);
        assert_eq!(hits.load(Ordering::SeqCst), 0, "At the limit is not over it");

        let mut items = vec![1, 2, 3];
        limit.apply(&mut items);
        assert_eq!(items, vec![1, 2]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
