//! Completion in JSON documents, driven by the parsed tree.

use serde_json::Value;
use tower_lsp::lsp_types::{CompletionItem, CompletionList, Position, Range};

use super::{
    document_value, existing_keys, indent_continuation, is_steps, property_items, snippet_items, value_items,
    Syntax,
};
use crate::document::{Encoding, TextDocument};
use crate::model::{DocumentModel, NodeKind, Segment};
use crate::schema::DocumentSchema;

struct Json;

impl Syntax for Json {
    const ENCODING: Encoding = Encoding::Structured;

    fn property(name: &str, replacing_key: bool) -> String {
        if replacing_key {
            format!("\"{name}\"")
        } else {
            format!("\"{name}\": $1")
        }
    }

    fn literal(value: &Value) -> String {
        serde_json::to_string(value).unwrap_or_default()
    }
}

enum Target {
    Key {
        path: Vec<Segment>,
        existing: Vec<String>,
        replace: Range,
        replacing_key: bool,
    },
    Value {
        path: Vec<Segment>,
        replace: Range,
    },
    Step {
        replace: Range,
    },
}

pub fn complete(
    schema: &DocumentSchema,
    document: &TextDocument,
    model: &DocumentModel,
    position: Position,
) -> CompletionList {
    let value = document_value(model);
    let value = value.as_deref();
    let items: Vec<CompletionItem> = match target(document, model, position) {
        Some(Target::Key {
            path,
            existing,
            replace,
            replacing_key,
        }) => property_items::<Json>(schema, &path, value, &existing, replace, replacing_key),
        Some(Target::Value { path, replace }) => value_items::<Json>(schema, &path, value, replace),
        Some(Target::Step { replace }) => {
            let indent = line_indent(document, position.line);
            snippet_items::<Json>(schema, replace, |body| {
                serde_json::to_string_pretty(body)
                    .ok()
                    .map(|text| indent_continuation(&text, &indent))
            })
        }
        None => Vec::new(),
    };
    CompletionList {
        is_incomplete: false,
        items,
    }
}

fn target(document: &TextDocument, model: &DocumentModel, position: Position) -> Option<Target> {
    let path = model.path_at(position)?;
    let here = Range::new(position, position);

    if let Some(key_range) = path.key_range {
        let parent = path.segments[..path.segments.len() - 1].to_vec();
        let current = match path.segments.last() {
            Some(Segment::Key(key)) => Some(key.as_str()),
            _ => None,
        };
        let existing = existing_keys(path.innermost())
            .into_iter()
            .filter(|key| Some(key.as_str()) != current)
            .collect();
        return Some(Target::Key {
            path: parent,
            existing,
            replace: key_range,
            replacing_key: true,
        });
    }

    let node = path.innermost()?;
    match &node.kind {
        NodeKind::Scalar(_) if !path.segments.is_empty() => Some(Target::Value {
            path: path.segments.clone(),
            replace: node.range,
        }),
        NodeKind::Scalar(_) => None,
        NodeKind::Object(properties) if previous_char(document, position) == Some(':') => {
            let property = properties.iter().filter(|p| p.key_range.end <= position).last()?;
            let mut segments = path.segments.clone();
            segments.push(Segment::Key(property.key.clone()));
            Some(Target::Value {
                path: segments,
                replace: here,
            })
        }
        NodeKind::Object(_) => Some(Target::Key {
            path: path.segments.clone(),
            existing: existing_keys(Some(node)),
            replace: here,
            replacing_key: false,
        }),
        NodeKind::Array(_) if is_steps(&path.segments) => Some(Target::Step { replace: here }),
        NodeKind::Array(items) => {
            let mut segments = path.segments.clone();
            segments.push(Segment::Index(items.len()));
            Some(Target::Value {
                path: segments,
                replace: here,
            })
        }
    }
}

fn previous_char(document: &TextDocument, position: Position) -> Option<char> {
    let offset = document.offset_at(position);
    let text = document.text();
    let mut before: Vec<char> = text.chars().take(offset).collect();
    while let Some(c) = before.pop() {
        if !c.is_whitespace() {
            return Some(c);
        }
    }
    None
}

fn line_indent(document: &TextDocument, line: u32) -> String {
    document
        .line(line)
        .unwrap_or_default()
        .chars()
        .take_while(|c| c.is_whitespace())
        .collect()
}
