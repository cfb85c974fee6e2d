//! Bounded, time-aware cache of parsed document models.
//!
//! # Eviction
//!
//! | Trigger | Evicts |
//! |---------|--------|
//! | live count reaches `max_entries` on insert | the least recently accessed other entry |
//! | periodic sweep every `cleanup_interval` | every entry idle for longer than the interval |
//! | [`DocumentModelCache::on_document_removed`] | that document's entry |
//!
//! A cached model is reused only while the document's version *and*
//! encoding are unchanged; anything else reparses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tower_lsp::lsp_types::Url;

use crate::document::{Encoding, TextDocument};
use crate::error::{Result, ServiceError};
use crate::util::lock;

type ParseFn<T> = Box<dyn Fn(&TextDocument) -> T + Send + Sync>;

struct CachedModel<T> {
    version: i32,
    encoding: Encoding,
    model: Arc<T>,
    last_access: Instant,
}

struct CacheState<T> {
    models: HashMap<Url, CachedModel<T>>,
    disposed: bool,
}

pub struct DocumentModelCache<T> {
    state: Arc<Mutex<CacheState<T>>>,
    max_entries: usize,
    parse: ParseFn<T>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<T> DocumentModelCache<T>
where
    T: Send + Sync + 'static,
{
    /// Create a cache. A zero `cleanup_interval` disables the idle sweep.
    ///
    /// Must be called from within a tokio runtime when the sweep is enabled.
    pub fn new<F>(max_entries: usize, cleanup_interval: Duration, parse: F) -> Self
    where
        F: Fn(&TextDocument) -> T + Send + Sync + 'static,
    {
        let state = Arc::new(Mutex::new(CacheState {
            models: HashMap::new(),
            disposed: false,
        }));

        let sweeper = (!cleanup_interval.is_zero())
            .then(|| spawn_sweeper(Arc::downgrade(&state), cleanup_interval));

        DocumentModelCache {
            state,
            max_entries,
            parse: Box::new(parse),
            sweeper: Mutex::new(sweeper),
        }
    }

    /// Parsed model for the document, reparsing only when its identity changed.
    pub fn get(&self, document: &TextDocument) -> Result<Arc<T>> {
        let mut state = lock(&self.state);
        if state.disposed {
            return Err(ServiceError::CacheDisposed);
        }

        let now = Instant::now();
        if let Some(cached) = state.models.get_mut(document.uri()) {
            if cached.version == document.version() && cached.encoding == document.encoding() {
                cached.last_access = now;
                return Ok(Arc::clone(&cached.model));
            }
        }

        let model = Arc::new((self.parse)(document));
        state.models.insert(
            document.uri().clone(),
            CachedModel {
                version: document.version(),
                encoding: document.encoding(),
                model: Arc::clone(&model),
                last_access: now,
            },
        );

        if state.models.len() >= self.max_entries {
            let oldest = state
                .models
                .iter()
                .filter(|(uri, _)| *uri != document.uri())
                .min_by_key(|(_, cached)| cached.last_access)
                .map(|(uri, _)| uri.clone());
            if let Some(uri) = oldest {
                tracing::debug!("evicting least recently used model {uri}");
                state.models.remove(&uri);
            }
        }

        Ok(model)
    }

    /// Drop the entry for a closed document.
    pub fn on_document_removed(&self, uri: &Url) -> bool {
        lock(&self.state).models.remove(uri).is_some()
    }

    /// Stop the sweep and clear every entry. The cache refuses `get` afterwards.
    pub fn dispose(&self) {
        if let Some(sweeper) = lock(&self.sweeper).take() {
            sweeper.abort();
        }
        let mut state = lock(&self.state);
        state.models.clear();
        state.disposed = true;
    }

    pub fn contains(&self, uri: &Url) -> bool {
        lock(&self.state).models.contains_key(uri)
    }

    pub fn len(&self) -> usize {
        lock(&self.state).models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for DocumentModelCache<T> {
    fn drop(&mut self) {
        if let Some(sweeper) = lock(&self.sweeper).take() {
            sweeper.abort();
        }
    }
}

fn spawn_sweeper<T>(state: Weak<Mutex<CacheState<T>>>, interval: Duration) -> JoinHandle<()>
where
    T: Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            let Some(state) = state.upgrade() else {
                break;
            };
            let removed = sweep(&mut lock(&state), interval);
            if removed > 0 {
                tracing::debug!("swept {removed} idle document models");
            }
        }
    })
}

fn sweep<T>(state: &mut CacheState<T>, max_idle: Duration) -> usize {
    let now = Instant::now();
    let before = state.models.len();
    state
        .models
        .retain(|_, cached| now.saturating_duration_since(cached.last_access) <= max_idle);
    before - state.models.len()
}
