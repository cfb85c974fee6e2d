//! tower-lsp wiring.
//!
//! [`Backend`] is what `LspService` drives. Everything that only exists
//! after `initialize` (settings, client support, the cache and the
//! schedulers) lives in a [`Session`], so a request arriving early simply
//! finds no session and answers with an empty result.
//!
//! Every request runs under a [`CancellationToken`] derived from
//!
//! ```text
//! session token ──▶ per-document token ──▶ request token
//! ```
//!
//! An edit or close replaces the document's token, which cancels every
//! request still computing on the old text. Shutdown cancels the session
//! token and with it everything else.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tower_lsp::jsonrpc::{self, ErrorCode};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::cache::DocumentModelCache;
use crate::config::{min_limit, ClientSupport, InitializationOptions, Settings};
use crate::document::{DocumentStore, TextDocument};
use crate::error::ServiceError;
use crate::model::DocumentModel;
use crate::notifier::Notifier;
use crate::runner::{run_safe, run_safe_async, ErrorLog, Outcome};
use crate::service::{LanguageService, ResultLimit};
use crate::util::lock;
use crate::validation::DelayedValidation;
use crate::warnings::LimitExceededWarnings;

/// Custom request: validate a document now and return its diagnostics.
pub const VALIDATE_METHOD: &str = "ssm/validate";

/// `"`, `-`, `$` and every lowercase letter, so YAML keys complete as typed.
pub fn trigger_characters() -> Vec<String> {
    ['"', '-', '$']
        .into_iter()
        .chain('a'..='z')
        .map(String::from)
        .collect()
}

pub fn capabilities(settings: &Settings, support: &ClientSupport) -> ServerCapabilities {
    ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::INCREMENTAL)),
        completion_provider: support.snippets.then(|| CompletionOptions {
            resolve_provider: Some(true),
            trigger_characters: Some(trigger_characters()),
            ..Default::default()
        }),
        hover_provider: Some(HoverProviderCapability::Simple(true)),
        document_symbol_provider: Some(OneOf::Left(true)),
        document_range_formatting_provider: settings.provide_formatter.then_some(OneOf::Left(true)),
        color_provider: Some(ColorProviderCapability::Simple(true)),
        folding_range_provider: Some(FoldingRangeProviderCapability::Simple(true)),
        selection_range_provider: Some(SelectionRangeProviderCapability::Simple(true)),
        ..Default::default()
    }
}

/// Per-process state created at `initialize`.
pub struct Session {
    settings: Settings,
    support: ClientSupport,
    documents: Arc<DocumentStore>,
    cache: Arc<DocumentModelCache<DocumentModel>>,
    service: LanguageService,
    validation: DelayedValidation,
    warnings: LimitExceededWarnings,
    notifier: Arc<dyn Notifier>,
    errors: ErrorLog,
    cancel: CancellationToken,
    document_tokens: Mutex<HashMap<Url, CancellationToken>>,
}

impl Session {
    /// Must be called from within a tokio runtime.
    pub fn new(settings: Settings, support: ClientSupport, notifier: Arc<dyn Notifier>) -> Self {
        let service = LanguageService::builtin(settings.schema_path.clone());
        Self::with_service(settings, support, notifier, service)
    }

    /// Must be called from within a tokio runtime.
    pub fn with_service(
        settings: Settings,
        support: ClientSupport,
        notifier: Arc<dyn Notifier>,
        service: LanguageService,
    ) -> Self {
        let documents = Arc::new(DocumentStore::new());
        let parser = service.clone();
        let cache = Arc::new(DocumentModelCache::new(
            settings.cache.max_entries,
            settings.cleanup_interval(),
            move |document: &TextDocument| parser.parse(document),
        ));
        let validation = DelayedValidation::new(
            documents.clone(),
            cache.clone(),
            service.clone(),
            notifier.clone(),
            settings.validation_delay(),
        );
        let warnings = LimitExceededWarnings::new(notifier.clone());
        let errors = ErrorLog::forward_to(notifier.clone());

        Session {
            settings,
            support,
            documents,
            cache,
            service,
            validation,
            warnings,
            notifier,
            errors,
            cancel: CancellationToken::new(),
            document_tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn cache(&self) -> &DocumentModelCache<DocumentModel> {
        &self.cache
    }

    // ========================================================================
    // Document lifecycle
    // ========================================================================

    pub fn did_open(&self, item: TextDocumentItem) {
        let uri = item.uri.clone();
        self.documents
            .open(TextDocument::new(item.uri, &item.language_id, item.version, &item.text));
        self.content_changed(&uri);
    }

    pub fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        if self
            .documents
            .change(&uri, params.text_document.version, &params.content_changes)
            .is_none()
        {
            tracing::warn!("change for {uri} which is not open");
            return;
        }
        self.content_changed(&uri);
    }

    fn content_changed(&self, uri: &Url) {
        self.cancel_document_requests(uri, true);
        self.warnings.cancel(uri);
        self.validation.trigger_validation(uri);
    }

    pub async fn did_close(&self, uri: Url) {
        self.cancel_document_requests(&uri, false);
        self.documents.close(&uri);
        self.warnings.cancel(&uri);
        self.validation.clean_pending_validation(&uri);
        self.cache.on_document_removed(&uri);
        self.notifier.publish_diagnostics(uri, Vec::new(), None).await;
    }

    /// Reset the schema for every changed file; if any was a schema in use,
    /// revalidate every open document.
    pub fn did_change_watched_files(&self, changes: Vec<FileEvent>) {
        let mut reset = false;
        for change in &changes {
            if self.service.reset_schema(&change.uri) {
                tracing::info!("schema {} changed", change.uri);
                reset = true;
            }
        }
        if reset {
            for document in self.documents.all() {
                self.validation.trigger_validation(document.uri());
            }
        }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.cache.dispose();
    }

    fn cancel_document_requests(&self, uri: &Url, keep: bool) {
        let mut tokens = lock(&self.document_tokens);
        let previous = if keep {
            tokens.insert(uri.clone(), self.cancel.child_token())
        } else {
            tokens.remove(uri)
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    /// Only open documents get a per-document token; a request for any
    /// other uri hangs off the session token directly.
    fn request_token(&self, uri: &Url) -> CancellationToken {
        if self.documents.get(uri).is_none() {
            return self.cancel.child_token();
        }
        lock(&self.document_tokens)
            .entry(uri.clone())
            .or_insert_with(|| self.cancel.child_token())
            .child_token()
    }

    /// The open document and its parsed model.
    fn snapshot(&self, uri: &Url) -> Result<Option<(TextDocument, Arc<DocumentModel>)>, ServiceError> {
        let Some(document) = self.documents.get(uri) else {
            return Ok(None);
        };
        let model = self.cache.get(&document)?;
        Ok(Some((document, model)))
    }

    fn limit(&self, uri: &Url, limit: Option<usize>, feature: &str) -> ResultLimit {
        match limit {
            Some(max_results) => {
                ResultLimit::new(Some(max_results), self.warnings.on_result_limit_exceeded(uri, max_results, feature))
            }
            None => ResultLimit::unbounded(),
        }
    }

    // ========================================================================
    // Requests
    // ========================================================================

    pub async fn validate(&self, uri: &Url) -> Result<Vec<Diagnostic>, ServiceError> {
        match self.documents.get(uri) {
            Some(document) => self.validation.validate_text_document(&document).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn completion(&self, params: CompletionParams) -> Outcome<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let message = format!("Error while computing completions for {uri}");
        run_safe_async(&self.request_token(&uri), &self.errors, None, &message, || async {
            let Some((document, model)) = self.snapshot(&uri)? else {
                return Ok(None);
            };
            let list = self.service.complete(&document, position, &model).await?;
            Ok::<_, ServiceError>(list.map(CompletionResponse::List))
        })
        .await
    }

    pub async fn completion_resolve(&self, item: CompletionItem) -> Outcome<CompletionItem> {
        let fallback = item.clone();
        run_safe_async(
            &self.cancel.child_token(),
            &self.errors,
            fallback,
            "Error while resolving completion proposal",
            || self.service.resolve(item),
        )
        .await
    }

    pub async fn hover(&self, params: HoverParams) -> Outcome<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let message = format!("Error while computing hover for {uri}");
        run_safe_async(&self.request_token(&uri), &self.errors, None, &message, || async {
            let Some((document, model)) = self.snapshot(&uri)? else {
                return Ok(None);
            };
            self.service.hover(&document, position, &model).await
        })
        .await
    }

    pub fn document_symbol(&self, params: DocumentSymbolParams) -> Outcome<Option<DocumentSymbolResponse>> {
        let uri = params.text_document.uri;
        let message = format!("Error while computing document symbols for {uri}");
        run_safe(&self.request_token(&uri), &self.errors, None, &message, || {
            let Some((document, model)) = self.snapshot(&uri)? else {
                return Ok(None);
            };
            let limit = self.limit(&uri, self.settings.result_limit, "document symbols");
            let response = if self.support.hierarchical_symbols {
                DocumentSymbolResponse::Nested(self.service.find_document_symbols2(&document, &model, &limit)?)
            } else {
                DocumentSymbolResponse::Flat(self.service.find_document_symbols(&document, &model, &limit)?)
            };
            Ok::<_, ServiceError>(Some(response))
        })
    }

    pub fn range_formatting(&self, params: DocumentRangeFormattingParams) -> Outcome<Option<Vec<TextEdit>>> {
        let uri = params.text_document.uri;
        let message = format!("Error while formatting range for {uri}");
        run_safe(&self.request_token(&uri), &self.errors, None, &message, || {
            let Some((document, model)) = self.snapshot(&uri)? else {
                return Ok(None);
            };
            let edits = self.service.format(&document, &model, params.range, &params.options)?;
            Ok::<_, ServiceError>(Some(edits))
        })
    }

    pub async fn document_color(&self, params: DocumentColorParams) -> Outcome<Vec<ColorInformation>> {
        let uri = params.text_document.uri;
        let message = format!("Error while computing document colors for {uri}");
        run_safe_async(&self.request_token(&uri), &self.errors, Vec::new(), &message, || async {
            let Some((document, model)) = self.snapshot(&uri)? else {
                return Ok(Vec::new());
            };
            let limit = self.limit(&uri, self.settings.result_limit, "document colors");
            self.service.find_document_colors(&document, &model, &limit).await
        })
        .await
    }

    pub fn color_presentation(&self, params: ColorPresentationParams) -> Outcome<Vec<ColorPresentation>> {
        let uri = params.text_document.uri;
        let message = format!("Error while computing color presentations for {uri}");
        run_safe(&self.request_token(&uri), &self.errors, Vec::new(), &message, || {
            let Some((document, model)) = self.snapshot(&uri)? else {
                return Ok(Vec::new());
            };
            self.service
                .get_color_presentations(&document, &model, params.color, params.range)
        })
    }

    pub fn folding_range(&self, params: FoldingRangeParams) -> Outcome<Option<Vec<FoldingRange>>> {
        let uri = params.text_document.uri;
        let message = format!("Error while computing folding ranges for {uri}");
        run_safe(&self.request_token(&uri), &self.errors, None, &message, || {
            let Some((document, model)) = self.snapshot(&uri)? else {
                return Ok(None);
            };
            let range_limit = min_limit(self.settings.folding_range_limit, self.support.folding_range_limit);
            let limit = self.limit(&uri, range_limit, "folding ranges");
            Ok::<_, ServiceError>(Some(self.service.get_folding_ranges(&document, &model, &limit)?))
        })
    }

    pub fn selection_range(&self, params: SelectionRangeParams) -> Outcome<Option<Vec<SelectionRange>>> {
        let uri = params.text_document.uri;
        let message = format!("Error while computing selection ranges for {uri}");
        run_safe(&self.request_token(&uri), &self.errors, None, &message, || {
            let Some((document, model)) = self.snapshot(&uri)? else {
                return Ok(None);
            };
            let ranges = self
                .service
                .get_selection_ranges(&document, &params.positions, &model)?;
            Ok::<_, ServiceError>(Some(ranges))
        })
    }
}

pub struct Backend {
    client: Client,
    errors: ErrorLog,
    session: Mutex<Option<Arc<Session>>>,
}

impl Backend {
    /// Must be called from within a tokio runtime.
    pub fn new(client: Client) -> Self {
        let errors = ErrorLog::forward_to(Arc::new(client.clone()));
        Backend {
            client,
            errors,
            session: Mutex::new(None),
        }
    }

    /// The client's error channel, for failures outside any request.
    pub fn errors(&self) -> ErrorLog {
        self.errors.clone()
    }

    fn session(&self) -> Option<Arc<Session>> {
        lock(&self.session).clone()
    }

    /// `ssm/validate`: the uri's diagnostics, `[]` when it is not open.
    pub async fn validate_document(&self, uri: Url) -> jsonrpc::Result<Vec<Diagnostic>> {
        let Some(session) = self.session() else {
            return Ok(Vec::new());
        };
        session.validate(&uri).await.map_err(|err| jsonrpc::Error {
            code: ErrorCode::InternalError,
            message: err.to_string().into(),
            data: None,
        })
    }
}

fn root_dir(params: &InitializeParams) -> Option<PathBuf> {
    #[allow(deprecated)]
    let root_uri = params
        .workspace_folders
        .as_ref()
        .and_then(|folders| folders.first())
        .map(|folder| &folder.uri)
        .or(params.root_uri.as_ref());
    root_uri.and_then(|uri| uri.to_file_path().ok())
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> jsonrpc::Result<InitializeResult> {
        let options = InitializationOptions::from_value(params.initialization_options.as_ref());
        let root = root_dir(&params);
        let settings = match Settings::new(root.as_deref(), &options) {
            Ok(settings) => settings,
            Err(err) => {
                tracing::error!("failed to load settings, using defaults: {err}");
                self.client
                    .log_message(MessageType::ERROR, format!("Failed to load settings: {err}"))
                    .await;
                Settings::default()
            }
        };
        let support = ClientSupport::new(&params.capabilities);
        tracing::debug!("settings {settings:?}, client {support:?}");

        let capabilities = capabilities(&settings, &support);
        let notifier: Arc<dyn Notifier> = Arc::new(self.client.clone());
        *lock(&self.session) = Some(Arc::new(Session::new(settings, support, notifier)));

        Ok(InitializeResult {
            capabilities,
            server_info: Some(ServerInfo {
                name: "ssm-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        tracing::info!("initialized");
        self.client.log_message(MessageType::INFO, "ssm-lsp initialized").await;
    }

    async fn shutdown(&self) -> jsonrpc::Result<()> {
        if let Some(session) = self.session() {
            session.shutdown();
        }
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        if let Some(session) = self.session() {
            session.did_open(params.text_document);
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        if let Some(session) = self.session() {
            session.did_change(params);
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        if let Some(session) = self.session() {
            session.did_close(params.text_document.uri).await;
        }
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        if let Some(session) = self.session() {
            session.did_change_watched_files(params.changes);
        }
    }

    async fn completion(&self, params: CompletionParams) -> jsonrpc::Result<Option<CompletionResponse>> {
        match self.session() {
            Some(session) => session.completion(params).await.into_response(),
            None => Ok(None),
        }
    }

    async fn completion_resolve(&self, item: CompletionItem) -> jsonrpc::Result<CompletionItem> {
        match self.session() {
            Some(session) => session.completion_resolve(item).await.into_response(),
            None => Ok(item),
        }
    }

    async fn hover(&self, params: HoverParams) -> jsonrpc::Result<Option<Hover>> {
        match self.session() {
            Some(session) => session.hover(params).await.into_response(),
            None => Ok(None),
        }
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> jsonrpc::Result<Option<DocumentSymbolResponse>> {
        match self.session() {
            Some(session) => session.document_symbol(params).into_response(),
            None => Ok(None),
        }
    }

    async fn range_formatting(
        &self,
        params: DocumentRangeFormattingParams,
    ) -> jsonrpc::Result<Option<Vec<TextEdit>>> {
        match self.session() {
            Some(session) => session.range_formatting(params).into_response(),
            None => Ok(None),
        }
    }

    async fn document_color(&self, params: DocumentColorParams) -> jsonrpc::Result<Vec<ColorInformation>> {
        match self.session() {
            Some(session) => session.document_color(params).await.into_response(),
            None => Ok(Vec::new()),
        }
    }

    async fn color_presentation(
        &self,
        params: ColorPresentationParams,
    ) -> jsonrpc::Result<Vec<ColorPresentation>> {
        match self.session() {
            Some(session) => session.color_presentation(params).into_response(),
            None => Ok(Vec::new()),
        }
    }

    async fn folding_range(&self, params: FoldingRangeParams) -> jsonrpc::Result<Option<Vec<FoldingRange>>> {
        match self.session() {
            Some(session) => session.folding_range(params).into_response(),
            None => Ok(None),
        }
    }

    async fn selection_range(
        &self,
        params: SelectionRangeParams,
    ) -> jsonrpc::Result<Option<Vec<SelectionRange>>> {
        match self.session() {
            Some(session) => session.selection_range(params).into_response(),
            None => Ok(None),
        }
    }
}
