//! ssm-lsp: a Language Server for SSM Automation documents
//!
//! Automation documents can be authored as JSON or YAML against one shared
//! document schema. This crate mediates between the editor and the two
//! encoding-specific backends that understand those syntaxes.
//!
//! # Overview
//!
//! - **Model cache**: bounded, time-aware memoization of parsed documents
//! - **Delayed validation**: per-document debounced schema validation
//! - **Limit warnings**: merged "results truncated" notifications
//! - **Language service**: one contract, routed per document encoding
//! - **Action schemas**: per-action sub-schemas selected by a step's `action`
//!
//! # Architecture
//!
//! ```text
//! didChange ─▶ DelayedValidation ─▶ DocumentModelCache ─▶ LanguageService::validate ─▶ publish
//! request   ─▶ run_safe ─────────▶ DocumentModelCache ─▶ LanguageService::<op>
//! ```
//!
//! - [`cache`]: [`cache::DocumentModelCache`], keyed by uri, version and encoding
//! - [`validation`]: [`validation::DelayedValidation`] debounce scheduler
//! - [`warnings`]: [`warnings::LimitExceededWarnings`] notification throttle
//! - [`service`]: [`service::LanguageService`] dispatcher and the built-in backends
//! - [`schema`]: document schema data and the [`schema::ActionRegistry`]
//! - [`server`]: the tower-lsp [`server::Backend`] and its per-process [`server::Session`]
//!
//! ```ignore
//! use ssm_lsp::service::LanguageService;
//! use ssm_lsp::document::{Encoding, TextDocument};
//!
//! let service = LanguageService::builtin(None);
//! let document = TextDocument::new(uri, "ssm-yaml", 1, "schemaVersion: '0.3'\n");
//! let model = service.parse(&document);
//! ```

// Core mediation layer
pub mod cache;
pub mod runner;
pub mod timer;
pub mod validation;
pub mod warnings;

// Documents and their parsed models
pub mod document;
pub mod model;

// Language features
pub mod color;
pub mod completion;
pub mod diagnostics;
pub mod folding;
pub mod formatting;
pub mod hover;
pub mod selection;
pub mod symbol;

// Schema data and backends
pub mod schema;
pub mod service;

// Server wiring
pub mod config;
pub mod error;
pub mod notifier;
pub mod server;

mod util;

// Test utilities (only available in test builds)
#[cfg(test)]
pub mod test_utils;
