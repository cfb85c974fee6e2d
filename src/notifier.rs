//! Outbound messages to the editor.
//!
//! The scheduler and the throttle only need three things from the client,
//! so they depend on [`Notifier`] instead of `tower_lsp::Client` directly.

use async_trait::async_trait;
use tower_lsp::lsp_types::notification::Notification;
use tower_lsp::lsp_types::{Diagnostic, MessageType, Url};
use tower_lsp::Client;

/// `ssm/resultLimitReached`: a document's results were truncated.
#[derive(Debug)]
pub enum ResultLimitReached {}

impl Notification for ResultLimitReached {
    type Params = String;
    const METHOD: &'static str = "ssm/resultLimitReached";
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish_diagnostics(&self, uri: Url, diagnostics: Vec<Diagnostic>, version: Option<i32>);

    async fn result_limit_reached(&self, message: String);

    async fn log_error(&self, message: String);
}

#[async_trait]
impl Notifier for Client {
    async fn publish_diagnostics(&self, uri: Url, diagnostics: Vec<Diagnostic>, version: Option<i32>) {
        Client::publish_diagnostics(self, uri, diagnostics, version).await;
    }

    async fn result_limit_reached(&self, message: String) {
        self.send_notification::<ResultLimitReached>(message).await;
    }

    async fn log_error(&self, message: String) {
        self.log_message(MessageType::ERROR, message).await;
    }
}
