//! Cancellation-aware execution of request handlers.
//!
//! Every externally triggered request runs through [`run_safe`] or
//! [`run_safe_async`]. The cancellation token is checked before the work
//! starts and again once it completes; a failure inside the work is sent to
//! the client's error channel through an [`ErrorLog`] and replaced by the
//! caller's fallback value, so a single bad request never reaches the
//! transport as an internal error.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_lsp::jsonrpc::{self, ErrorCode};

use crate::notifier::Notifier;

/// Sink for failures that must reach the editor.
///
/// Messages are queued on an unbounded channel, so reporting never blocks
/// and works from synchronous code such as a panic hook.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    sender: mpsc::UnboundedSender<String>,
}

impl ErrorLog {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (ErrorLog { sender }, receiver)
    }

    /// Forward every reported message to `notifier.log_error`.
    ///
    /// Must be called from within a tokio runtime. The forwarding task ends
    /// once every clone of the returned log is dropped.
    pub fn forward_to(notifier: Arc<dyn Notifier>) -> Self {
        let (log, mut receiver) = Self::channel();
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                notifier.log_error(message).await;
            }
        });
        log
    }

    pub fn error(&self, message: String) {
        tracing::error!("{message}");
        if self.sender.send(message).is_err() {
            tracing::debug!("client error channel closed");
        }
    }
}

/// Result of a guarded request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Cancelled => None,
        }
    }

    /// Map to a JSON-RPC response; cancellation becomes `RequestCancelled`.
    pub fn into_response(self) -> jsonrpc::Result<T> {
        match self {
            Outcome::Completed(value) => Ok(value),
            Outcome::Cancelled => Err(request_cancelled()),
        }
    }
}

pub fn request_cancelled() -> jsonrpc::Error {
    jsonrpc::Error {
        code: ErrorCode::RequestCancelled,
        message: "Request cancelled".into(),
        data: None,
    }
}

pub fn format_error(message: &str, err: &dyn Display) -> String {
    format!("{message}: {err}")
}

fn cancelled<T>() -> Outcome<T> {
    tracing::debug!("cancelled");
    Outcome::Cancelled
}

/// Run synchronous work under a cancellation token.
pub fn run_safe<T, E, F>(
    token: &CancellationToken,
    errors: &ErrorLog,
    error_value: T,
    error_message: &str,
    func: F,
) -> Outcome<T>
where
    E: Display,
    F: FnOnce() -> Result<T, E>,
{
    if token.is_cancelled() {
        return cancelled();
    }

    match func() {
        Ok(_) if token.is_cancelled() => cancelled(),
        Ok(result) => Outcome::Completed(result),
        Err(err) => {
            errors.error(format_error(error_message, &err));
            Outcome::Completed(error_value)
        }
    }
}

/// Run asynchronous work under a cancellation token.
///
/// Yields once before starting so that edits queued behind this request get
/// the chance to cancel it first.
pub async fn run_safe_async<T, E, F, Fut>(
    token: &CancellationToken,
    errors: &ErrorLog,
    error_value: T,
    error_message: &str,
    func: F,
) -> Outcome<T>
where
    E: Display,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    tokio::task::yield_now().await;
    if token.is_cancelled() {
        return cancelled();
    }

    match func().await {
        Ok(_) if token.is_cancelled() => cancelled(),
        Ok(result) => Outcome::Completed(result),
        Err(err) => {
            errors.error(format_error(error_message, &err));
            Outcome::Completed(error_value)
        }
    }
}
