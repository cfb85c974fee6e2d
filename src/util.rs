use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// State behind these locks is only ever mutated in short synchronous
/// sections, so a poisoned guard still holds consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Last path segment of a uri, used in user-facing messages.
pub(crate) fn basename(uri: &tower_lsp::lsp_types::Url) -> &str {
    uri.path().rsplit('/').next().unwrap_or_default()
}
