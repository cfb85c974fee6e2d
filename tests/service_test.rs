//! Integration tests for the ssm-lsp library public API.
//!
//! These drive the built-in backends the way the server does: parse through
//! the model cache, then call the language service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ssm_lsp::cache::DocumentModelCache;
use ssm_lsp::document::TextDocument;
use ssm_lsp::model::DocumentModel;
use ssm_lsp::schema::{ActionRegistry, DocumentSchema};
use ssm_lsp::service::{LanguageService, ResultLimit, ValidationSettings};
use tempfile::TempDir;
use tower_lsp::lsp_types::{
    Color, DiagnosticSeverity, FormattingOptions, Position, Range, Url,
};

fn document(language_id: &str, name: &str, version: i32, text: &str) -> TextDocument {
    let uri = Url::parse(&format!("file:///workspace/{name}")).unwrap();
    TextDocument::new(uri, language_id, version, text)
}

/// A cache wired to the service, counting parses.
fn cache_for(service: &LanguageService) -> (DocumentModelCache<DocumentModel>, Arc<AtomicUsize>) {
    let parses = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&parses);
    let parser = service.clone();
    let cache = DocumentModelCache::new(10, Duration::ZERO, move |doc: &TextDocument| {
        counter.fetch_add(1, Ordering::SeqCst);
        parser.parse(doc)
    });
    (cache, parses)
}

// ============================================================================
// Conditional step schemas
// ============================================================================

#[tokio::test]
async fn test_registered_action_applies_fragment() {
    let service = LanguageService::builtin(None);
    let doc = document(
        "ssm-yaml",
        "sleep.yaml",
        1,
        "schemaVersion: '0.3'\nmainSteps:\n  - name: wait\n    action: aws:sleep\n    inputs:\n      Duration: 5\n",
    );
    let model = service.parse(&doc);

    let diagnostics = service
        .validate(&doc, &model, &ValidationSettings::strict())
        .await
        .unwrap();

    assert_eq!(diagnostics.len(), 1, "{diagnostics:?}");
    assert_eq!(
        diagnostics[0].range,
        Range::new(Position::new(5, 16), Position::new(5, 17)),
        "Error points at the Duration value"
    );
}

#[tokio::test]
async fn test_unregistered_action_checks_base_only() {
    let service = LanguageService::builtin(None);
    let doc = document(
        "ssm-json",
        "custom.json",
        1,
        r#"{"schemaVersion": "0.3", "mainSteps": [{"name": "x", "action": "aws:custom", "inputs": {"Duration": 5}}]}"#,
    );
    let model = service.parse(&doc);

    let diagnostics = service
        .validate(&doc, &model, &ValidationSettings::strict())
        .await
        .unwrap();

    assert!(diagnostics.is_empty(), "No fragment applies: {diagnostics:?}");
}

#[tokio::test]
async fn test_base_schema_still_applies_with_fragment() {
    let service = LanguageService::builtin(None);
    let doc = document(
        "ssm-json",
        "missing.json",
        1,
        r#"{"schemaVersion": "0.3", "mainSteps": [{"action": "aws:sleep", "inputs": {"Duration": "PT1M"}}]}"#,
    );
    let model = service.parse(&doc);

    let diagnostics = service
        .validate(&doc, &model, &ValidationSettings::strict())
        .await
        .unwrap();

    assert_eq!(diagnostics.len(), 1, "Missing step name: {diagnostics:?}");
    assert!(diagnostics.iter().all(|d| d.severity == Some(DiagnosticSeverity::ERROR)));
}

#[test]
fn test_registry_lists_every_action() {
    let registry = ActionRegistry::builtin().unwrap();

    assert_eq!(registry.len(), 14);
    assert!(registry.lookup("aws:executeAwsApi").is_some());
    assert!(registry.lookup("aws:custom").is_none());
}

// ============================================================================
// Cache and service together
// ============================================================================

#[tokio::test]
async fn test_cached_model_reused_across_requests() {
    let service = LanguageService::builtin(None);
    let (cache, parses) = cache_for(&service);
    let doc = document("ssm-json", "doc.json", 1, "{\"schemaVersion\": \"0.3\"}");

    let first = cache.get(&doc).unwrap();
    let _ = service.hover(&doc, Position::new(0, 4), &first).await.unwrap();
    let second = cache.get(&doc).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(parses.load(Ordering::SeqCst), 1);

    let reopened = document("ssm-yaml", "doc.json", 1, "schemaVersion: '0.3'\n");
    let third = cache.get(&reopened).unwrap();
    assert!(!Arc::ptr_eq(&first, &third), "Encoding change reparses");
    assert_eq!(parses.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_json_features_end_to_end() {
    let service = LanguageService::builtin(None);
    let text = "{\n  \"description\": \"#ff0000\",\n  \"mainSteps\": [\n    {\"name\": \"a\", \"action\": \"aws:pause\", \"inputs\": {}}\n  ]\n}";
    let doc = document("ssm-json", "features.json", 1, text);
    let model = service.parse(&doc);
    let unbounded = ResultLimit::unbounded();

    let colors = service.find_document_colors(&doc, &model, &unbounded).await.unwrap();
    assert_eq!(colors.len(), 1);
    assert_eq!(colors[0].color.red, 1.0);

    let presentations = service
        .get_color_presentations(&doc, &model, colors[0].color, colors[0].range)
        .unwrap();
    assert_eq!(presentations[0].label, "#ff0000");

    let folding = service.get_folding_ranges(&doc, &model, &unbounded).unwrap();
    assert!(!folding.is_empty());

    let symbols = service.find_document_symbols2(&doc, &model, &unbounded).unwrap();
    assert_eq!(
        symbols.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        vec!["description", "mainSteps"]
    );

    let selection = service
        .get_selection_ranges(&doc, &[Position::new(1, 5)], &model)
        .unwrap();
    assert_eq!(selection.len(), 1);
}

#[tokio::test]
async fn test_yaml_colors_are_unsupported() {
    let service = LanguageService::builtin(None);
    let doc = document("ssm-yaml", "colors.yaml", 1, "description: '#ff0000'\n");
    let model = service.parse(&doc);

    let colors = service
        .find_document_colors(&doc, &model, &ResultLimit::unbounded())
        .await
        .unwrap();
    let presentations = service
        .get_color_presentations(
            &doc,
            &model,
            Color {
                red: 1.0,
                green: 0.0,
                blue: 0.0,
                alpha: 1.0,
            },
            Range::default(),
        )
        .unwrap();

    assert!(colors.is_empty());
    assert!(presentations.is_empty());
}

#[test]
fn test_yaml_format_trims_trailing_whitespace() {
    let service = LanguageService::builtin(None);
    let doc = document("ssm-yaml", "format.yaml", 1, "schemaVersion: '0.3'   \nmainSteps: []\n");
    let model = service.parse(&doc);

    let edits = service
        .format(&doc, &model, doc.full_range(), &FormattingOptions::default())
        .unwrap();

    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].range, Range::new(Position::new(0, 20), Position::new(0, 23)));
    assert!(edits[0].new_text.is_empty());
}

// ============================================================================
// Custom schema files
// ============================================================================

#[tokio::test]
async fn test_custom_schema_file_is_used_and_reset() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("schema.json");
    std::fs::write(
        &path,
        r#"{"type": "object", "required": ["owner"], "properties": {"owner": {"type": "string"}}}"#,
    )
    .unwrap();
    let service = LanguageService::builtin(Some(path.clone()));
    let doc = document("ssm-yaml", "custom.yaml", 1, "name: x\n");
    let model = service.parse(&doc);

    let diagnostics = service
        .validate(&doc, &model, &ValidationSettings::strict())
        .await
        .unwrap();
    assert_eq!(diagnostics.len(), 1, "Missing owner: {diagnostics:?}");

    let schema_uri = Url::from_file_path(&path).unwrap();
    assert!(service.reset_schema(&schema_uri));

    std::fs::write(&path, r#"{"type": "object"}"#).unwrap();
    let diagnostics = service
        .validate(&doc, &model, &ValidationSettings::strict())
        .await
        .unwrap();
    assert!(diagnostics.is_empty(), "Reloaded after reset");
}

#[test]
fn test_bundled_schema_inlines_fragments() {
    let schema = DocumentSchema::builtin().unwrap();
    let bundled = schema.bundled();

    let clauses = bundled
        .pointer("/definitions/step/allOf")
        .and_then(|v| v.as_array())
        .expect("allOf on the step definition");
    assert_eq!(clauses.len(), 14);
    assert_eq!(
        clauses[12].pointer("/if/properties/action/const").and_then(|v| v.as_str()),
        Some("aws:sleep")
    );
}
