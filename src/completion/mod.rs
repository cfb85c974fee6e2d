//! Schema-driven completion.
//!
//! Each encoding works out what is being completed from its own syntax
//! ([`json`] from the parsed tree, [`yaml`] from the indentation of the
//! lines above the cursor) and then asks this module for items:
//!
//! | Target | Items |
//! |--------|-------|
//! | Property name | properties of every schema applying to the enclosing object |
//! | Property value | `enum` / `const` / boolean literals, and action names for `action` |
//! | New step in `mainSteps` | one snippet per action that registers one |
//!
//! Documentation is attached lazily: items carry their description in
//! `data` and [`resolve`] moves it into `documentation`.

pub mod json;
pub mod yaml;

use std::borrow::Cow;

use serde_json::{json, Value};
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionTextEdit, Documentation, InsertTextFormat, MarkupContent,
    MarkupKind, Range, TextEdit,
};

use crate::document::Encoding;
use crate::hover::is_step_action;
use crate::model::{DocumentModel, Node, Segment};
use crate::schema::{self, DocumentSchema};

/// The document value completion works against. Falls back to the tolerant
/// tree when the document does not parse.
pub(crate) fn document_value(model: &DocumentModel) -> Option<Cow<'_, Value>> {
    match (&model.value, &model.root) {
        (Some(value), _) => Some(Cow::Borrowed(value)),
        (None, Some(root)) => Some(Cow::Owned(root.to_value())),
        (None, None) => None,
    }
}

pub(crate) fn value_at<'a>(value: Option<&'a Value>, path: &[Segment]) -> Option<&'a Value> {
    path.iter().try_fold(value?, |value, segment| match segment {
        Segment::Key(key) => value.get(key),
        Segment::Index(index) => value.get(index),
    })
}

pub(crate) fn is_steps(path: &[Segment]) -> bool {
    matches!(path, [Segment::Key(steps)] if steps == "mainSteps")
}

/// How a completion is written in one encoding.
pub(crate) trait Syntax {
    const ENCODING: Encoding;

    /// Text inserted for a property name.
    fn property(name: &str, replacing_key: bool) -> String;

    /// Label and inserted text for a literal value.
    fn literal(value: &Value) -> String;
}

pub(crate) fn property_items<S: Syntax>(
    schema: &DocumentSchema,
    path: &[Segment],
    document: Option<&Value>,
    existing: &[String],
    replace: Range,
    replacing_key: bool,
) -> Vec<CompletionItem> {
    let schemas = schema.schemas_at(path, document);
    schema::property_names(&schemas)
        .into_iter()
        .filter(|(name, _)| !existing.iter().any(|e| e == name))
        .map(|(name, description)| CompletionItem {
            label: name.to_string(),
            kind: Some(CompletionItemKind::PROPERTY),
            text_edit: Some(CompletionTextEdit::Edit(TextEdit::new(
                replace,
                S::property(name, replacing_key),
            ))),
            insert_text_format: Some(InsertTextFormat::SNIPPET),
            filter_text: replacing_key.then(|| S::property(name, true)),
            data: Some(item_data::<S>(description)),
            ..Default::default()
        })
        .collect()
}

pub(crate) fn value_items<S: Syntax>(
    schema: &DocumentSchema,
    path: &[Segment],
    document: Option<&Value>,
    replace: Range,
) -> Vec<CompletionItem> {
    let literals = schema::literal_values(&schema.schemas_at(path, document))
        .into_iter()
        .map(|value| (S::literal(&value), None, CompletionItemKind::VALUE));
    let actions: Vec<_> = if is_step_action(path) {
        schema
            .registry()
            .actions()
            .map(|action| {
                let description = action.schema.get("description").and_then(Value::as_str);
                (
                    S::literal(&Value::String(action.action.clone())),
                    description,
                    CompletionItemKind::ENUM_MEMBER,
                )
            })
            .collect()
    } else {
        Vec::new()
    };

    literals
        .chain(actions)
        .map(|(text, description, kind)| CompletionItem {
            label: text.clone(),
            kind: Some(kind),
            text_edit: Some(CompletionTextEdit::Edit(TextEdit::new(replace, text))),
            data: Some(item_data::<S>(description)),
            ..Default::default()
        })
        .collect()
}

/// One item per registered snippet; `render` turns a snippet body into the inserted text.
pub(crate) fn snippet_items<S: Syntax>(
    schema: &DocumentSchema,
    replace: Range,
    render: impl Fn(&Value) -> Option<String>,
) -> Vec<CompletionItem> {
    schema
        .registry()
        .snippets()
        .filter_map(|snippet| {
            Some(CompletionItem {
                label: snippet.label.clone(),
                kind: Some(CompletionItemKind::SNIPPET),
                text_edit: Some(CompletionTextEdit::Edit(TextEdit::new(replace, render(&snippet.body)?))),
                insert_text_format: Some(InsertTextFormat::SNIPPET),
                data: Some(item_data::<S>(Some(snippet.description.as_str()))),
                ..Default::default()
            })
        })
        .collect()
}

/// Indent every line after the first, so a multi-line insertion lines up
/// under the column it starts at.
pub(crate) fn indent_continuation(text: &str, indent: &str) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| match i {
            0 => line.to_string(),
            _ if line.is_empty() => String::new(),
            _ => format!("{indent}{line}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn item_data<S: Syntax>(description: Option<&str>) -> Value {
    json!({
        "encoding": S::ENCODING.name(),
        "description": description,
    })
}

/// Attach documentation to an item produced by `encoding`. Items from the
/// other encoding come back unchanged.
pub fn resolve(item: CompletionItem, encoding: Encoding) -> CompletionItem {
    let Some(data) = &item.data else {
        return item;
    };
    if data.get("encoding").and_then(Value::as_str) != Some(encoding.name()) || item.documentation.is_some() {
        return item;
    }
    let Some(description) = data.get("description").and_then(Value::as_str).map(str::to_string) else {
        return item;
    };
    CompletionItem {
        documentation: Some(Documentation::MarkupContent(MarkupContent {
            kind: MarkupKind::Markdown,
            value: description,
        })),
        ..item
    }
}

/// Keys already present in an object node.
pub(crate) fn existing_keys(node: Option<&Node>) -> Vec<String> {
    node.map(|node| node.properties().iter().map(|p| p.key.clone()).collect())
        .unwrap_or_default()
}
