//! Merged "results truncated" notifications.
//!
//! Several features can hit their result limit on the same document in quick
//! succession (symbols, then folding ranges, then colors). Rather than one
//! notification each, [`LimitExceededWarnings`] collects the feature names
//! for a short window and sends a single `ssm/resultLimitReached` message.
//!
//! Per document the throttle moves through three states:
//!
//! | State | Trigger | Timer fires | `cancel` |
//! |-------|---------|-------------|----------|
//! | absent | record feature, start timer | - | no-op |
//! | pending | add feature, restart timer | notify, become delivered | remove |
//! | delivered | ignored | - | remove |

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tower_lsp::lsp_types::Url;

use crate::notifier::Notifier;
use crate::timer::KeyedTimers;
use crate::util::{basename, lock};

/// Window during which limit hits on one document are merged.
pub const WARNING_DELAY: Duration = Duration::from_millis(2000);

/// Callback handed to a backend; invoke it when a result limit is hit.
pub type LimitTrigger = Arc<dyn Fn() + Send + Sync>;

struct PendingWarning {
    features: Vec<String>,
    max_results: usize,
    delivered: bool,
}

struct Inner {
    notifier: Arc<dyn Notifier>,
    delay: Duration,
    pending: Mutex<HashMap<Url, PendingWarning>>,
    timers: KeyedTimers<Url>,
}

#[derive(Clone)]
pub struct LimitExceededWarnings {
    inner: Arc<Inner>,
}

impl LimitExceededWarnings {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self::with_delay(notifier, WARNING_DELAY)
    }

    pub fn with_delay(notifier: Arc<dyn Notifier>, delay: Duration) -> Self {
        LimitExceededWarnings {
            inner: Arc::new(Inner {
                notifier,
                delay,
                pending: Mutex::new(HashMap::new()),
                timers: KeyedTimers::new(),
            }),
        }
    }

    /// Build the trigger a backend calls when `feature` is truncated to
    /// `max_results` items on `uri`.
    ///
    /// The trigger must be invoked from within a tokio runtime.
    pub fn on_result_limit_exceeded(&self, uri: &Url, max_results: usize, feature: &str) -> LimitTrigger {
        let inner = Arc::downgrade(&self.inner);
        let uri = uri.clone();
        let feature = feature.to_string();
        Arc::new(move || {
            if let Some(inner) = inner.upgrade() {
                record(&inner, &uri, max_results, &feature);
            }
        })
    }

    /// Forget everything about `uri`; the next limit hit starts a fresh window.
    pub fn cancel(&self, uri: &Url) {
        self.inner.timers.cancel(uri);
        lock(&self.inner.pending).remove(uri);
    }

    pub fn is_pending(&self, uri: &Url) -> bool {
        self.inner.timers.is_pending(uri)
    }
}

fn record(inner: &Arc<Inner>, uri: &Url, max_results: usize, feature: &str) {
    let mut pending = lock(&inner.pending);
    match pending.get_mut(uri) {
        Some(warning) if warning.delivered => return,
        Some(warning) => {
            if !warning.features.iter().any(|f| f == feature) {
                warning.features.push(feature.to_string());
            }
        }
        None => {
            pending.insert(
                uri.clone(),
                PendingWarning {
                    features: vec![feature.to_string()],
                    max_results,
                    delivered: false,
                },
            );
        }
    }

    let weak = Arc::downgrade(inner);
    let fired = uri.clone();
    inner.timers.schedule(uri.clone(), inner.delay, async move {
        deliver(weak, fired).await;
    });
}

async fn deliver(inner: Weak<Inner>, uri: Url) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let message = {
        let mut pending = lock(&inner.pending);
        let Some(warning) = pending.get_mut(&uri) else {
            return;
        };
        if warning.delivered {
            return;
        }
        warning.delivered = true;
        format!(
            "{}: For performance reasons, {} have been limited to {} items.",
            basename(&uri),
            warning.features.join(" and "),
            warning.max_results
        )
    };
    tracing::info!("{message}");
    inner.notifier.result_limit_reached(message).await;
}
