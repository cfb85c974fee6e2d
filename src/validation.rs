//! Debounced per-document validation.
//!
//! Every edit calls [`DelayedValidation::trigger_validation`], which replaces
//! the document's pending timer. When a timer fires, the document is read
//! back from the [`DocumentStore`] so the pass always sees the text as it is
//! then, not as it was when the edit arrived.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tower_lsp::lsp_types::{Diagnostic, Url};

use crate::cache::DocumentModelCache;
use crate::document::{DocumentStore, TextDocument};
use crate::error::Result;
use crate::model::DocumentModel;
use crate::notifier::Notifier;
use crate::runner::format_error;
use crate::service::{LanguageService, ValidationSettings};
use crate::timer::KeyedTimers;

struct Inner {
    documents: Arc<DocumentStore>,
    cache: Arc<DocumentModelCache<DocumentModel>>,
    service: LanguageService,
    notifier: Arc<dyn Notifier>,
    delay: Duration,
    timers: KeyedTimers<Url>,
}

#[derive(Clone)]
pub struct DelayedValidation {
    inner: Arc<Inner>,
}

impl DelayedValidation {
    pub fn new(
        documents: Arc<DocumentStore>,
        cache: Arc<DocumentModelCache<DocumentModel>>,
        service: LanguageService,
        notifier: Arc<dyn Notifier>,
        delay: Duration,
    ) -> Self {
        DelayedValidation {
            inner: Arc::new(Inner {
                documents,
                cache,
                service,
                notifier,
                delay,
                timers: KeyedTimers::new(),
            }),
        }
    }

    /// Validate `uri` once the delay has passed without another trigger.
    ///
    /// Must be called from within a tokio runtime.
    pub fn trigger_validation(&self, uri: &Url) {
        let weak = Arc::downgrade(&self.inner);
        let fired = uri.clone();
        self.inner.timers.schedule(uri.clone(), self.inner.delay, async move {
            validate_later(weak, fired).await;
        });
    }

    /// Drop the pending pass for `uri` without running it.
    pub fn clean_pending_validation(&self, uri: &Url) {
        if self.inner.timers.cancel(uri) {
            tracing::debug!("dropped pending validation for {uri}");
        }
    }

    pub fn is_pending(&self, uri: &Url) -> bool {
        self.inner.timers.is_pending(uri)
    }

    /// Validate now and publish the result.
    ///
    /// A failing backend is logged and its error returned; nothing is
    /// published in that case, so the client keeps its previous diagnostics.
    pub async fn validate_text_document(&self, document: &TextDocument) -> Result<Vec<Diagnostic>> {
        validate(&self.inner, document).await
    }
}

async fn validate_later(inner: Weak<Inner>, uri: Url) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let Some(document) = inner.documents.get(&uri) else {
        tracing::debug!("{uri} was closed before its validation ran");
        return;
    };
    // Already logged and reported by `validate`
    let _ = validate(&inner, &document).await;
}

async fn validate(inner: &Inner, document: &TextDocument) -> Result<Vec<Diagnostic>> {
    let uri = document.uri();
    let result = async {
        let model = inner.cache.get(document)?;
        inner
            .service
            .validate(document, &model, &ValidationSettings::strict())
            .await
    }
    .await;

    match result {
        Ok(diagnostics) => {
            tracing::debug!("{uri} v{}: {} diagnostics", document.version(), diagnostics.len());
            inner
                .notifier
                .publish_diagnostics(uri.clone(), diagnostics.clone(), Some(document.version()))
                .await;
            Ok(diagnostics)
        }
        Err(err) => {
            let message = format_error(&format!("Error while validating {uri}"), &err);
            tracing::error!("{message}");
            inner.notifier.log_error(message).await;
            Err(err)
        }
    }
}
