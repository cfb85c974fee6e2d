//! Completion in YAML documents.
//!
//! While the user types, the line under the cursor is rarely valid YAML, so
//! the location is worked out from indentation instead of the parsed tree:
//! walking up from the cursor, each less indented `key:` line or `- ` item
//! adds a segment to the path.
//!
//! ```text
//! mainSteps:          Key("mainSteps")
//!   - name: wait      Index(0)
//!     inputs:         Key("inputs")
//!       Du|           <- property names of mainSteps/0/inputs
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tower_lsp::lsp_types::{CompletionItem, CompletionList, Position, Range};

use super::{document_value, indent_continuation, is_steps, property_items, snippet_items, value_at, value_items, Syntax};
use crate::document::{Encoding, TextDocument};
use crate::model::{DocumentModel, Segment};
use crate::schema::DocumentSchema;

static LINE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^("[^"]*"|'[^']*'|[^\s#'"][^:#]*?)\s*:(?:\s+(.*))?$"#).expect("valid regex")
});

static KEY_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\s*)(-\s+)?([A-Za-z0-9_.\-]*)$").expect("valid regex"));

static VALUE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(\s*)(-\s+)?("[^"]*"|'[^']*'|[^\s#'"][^:#]*?):\s+(.*)$"#).expect("valid regex")
});

struct Yaml;

impl Syntax for Yaml {
    const ENCODING: Encoding = Encoding::Indented;

    fn property(name: &str, _replacing_key: bool) -> String {
        format!("{name}: ")
    }

    fn literal(value: &Value) -> String {
        serde_yaml::to_string(value)
            .map(|text| text.trim_end().to_string())
            .unwrap_or_default()
    }
}

pub fn complete(
    schema: &DocumentSchema,
    document: &TextDocument,
    model: &DocumentModel,
    position: Position,
) -> CompletionList {
    CompletionList {
        is_incomplete: false,
        items: items(schema, document, model, position),
    }
}

fn items(
    schema: &DocumentSchema,
    document: &TextDocument,
    model: &DocumentModel,
    position: Position,
) -> Vec<CompletionItem> {
    let Some(line) = document.line(position.line) else {
        return Vec::new();
    };
    let cursor = byte_index(&line, position.character);
    let before = &line[..cursor];
    let value = document_value(model);
    let value = value.as_deref();
    let column = |byte: usize| Position::new(position.line, utf16_len(&line[..byte]));

    if let Some(caps) = VALUE_PREFIX.captures(before) {
        let (Some(key), Some(typed)) = (caps.get(3), caps.get(4)) else {
            return Vec::new();
        };
        let dash = caps.get(2).map(|m| m.start());
        let mut path = mapping_path(document, position.line, key.start(), dash);
        path.push(Segment::Key(unquote(key.as_str()).to_string()));
        let end = line.trim_end().len().max(cursor);
        let replace = Range::new(column(typed.start()), column(end));
        return value_items::<Yaml>(schema, &path, value, replace);
    }

    let Some(caps) = KEY_PREFIX.captures(before) else {
        return Vec::new();
    };
    let Some(word) = caps.get(3) else {
        return Vec::new();
    };
    let word_end = cursor
        + line[cursor..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
            .unwrap_or(line.len() - cursor);
    let replace = Range::new(column(word.start()), column(word_end));
    let dash = caps.get(2).map(|m| m.start());
    let path = mapping_path(document, position.line, word.start(), dash);

    let mut items = Vec::new();
    match dash {
        Some(_) if path.len() == 2 && is_steps(&path[..1]) => {
            let indent = " ".repeat(word.start());
            items.extend(snippet_items::<Yaml>(schema, replace, |body| render(body, &indent)));
        }
        None if is_steps(&path) => {
            let indent = " ".repeat(word.start() + 2);
            return snippet_items::<Yaml>(schema, replace, |body| {
                render(body, &indent).map(|text| format!("- {text}"))
            });
        }
        _ => {}
    }

    let existing: Vec<String> = value_at(value, &path)
        .and_then(Value::as_object)
        .map(|object| object.keys().cloned().collect())
        .unwrap_or_default();
    items.extend(property_items::<Yaml>(schema, &path, value, &existing, replace, false));
    items
}

/// Snippet body as YAML, continuation lines indented to line up with the first.
fn render(body: &Value, indent: &str) -> Option<String> {
    let text = serde_yaml::to_string(body).ok()?;
    Some(indent_continuation(text.trim_end(), indent))
}

/// Shape of one line, as far as nesting is concerned.
struct LineShape {
    indent: usize,
    dash: bool,
    /// Column where the content after any `- ` starts.
    content: usize,
    key: Option<String>,
    has_value: bool,
}

fn shape(line: &str) -> Option<LineShape> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let indent = line.len() - trimmed.len();
    let (dash, rest) = match trimmed.strip_prefix('-') {
        Some(rest) if rest.is_empty() || rest.starts_with([' ', '\t']) => (true, rest.trim_start()),
        _ => (false, trimmed),
    };
    let content = line.len() - rest.len();
    let (key, has_value) = match LINE_KEY.captures(rest) {
        Some(caps) => (
            caps.get(1).map(|m| unquote(m.as_str().trim_end()).to_string()),
            caps.get(2)
                .map(|v| v.as_str().trim())
                .is_some_and(|v| !v.is_empty() && !v.starts_with('#')),
        ),
        None => (None, !rest.is_empty()),
    };
    Some(LineShape {
        indent,
        dash,
        content,
        key,
        has_value,
    })
}

/// Index of the `- ` item at column `dash` on `line` among its siblings.
fn item_index(document: &TextDocument, line: u32, dash: usize) -> usize {
    let mut index = 0;
    for number in (0..line).rev() {
        let Some(text) = document.line(number) else {
            break;
        };
        let Some(shape) = shape(&text) else {
            continue;
        };
        if shape.indent < dash || (shape.indent == dash && !shape.dash) {
            break;
        }
        if shape.indent == dash && shape.dash {
            index += 1;
        }
    }
    index
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Seek {
    /// The key whose mapping holds a key at this column.
    Mapping(usize),
    /// The key whose sequence has its dashes at this column.
    Sequence(usize),
}

/// Path of the mapping a key at `column` on `line` belongs to. With `dash`
/// set, the key follows a `- ` at that column and the path ends in the item.
fn mapping_path(document: &TextDocument, line: u32, column: usize, dash: Option<usize>) -> Vec<Segment> {
    let mut reversed = Vec::new();
    let mut seek = match dash {
        Some(dash) => {
            reversed.push(Segment::Index(item_index(document, line, dash)));
            Seek::Sequence(dash)
        }
        None => Seek::Mapping(column),
    };

    for number in (0..line).rev() {
        if seek == Seek::Mapping(0) {
            break;
        }
        let Some(text) = document.line(number) else {
            break;
        };
        let Some(shape) = shape(&text) else {
            continue;
        };
        let parent = match seek {
            Seek::Mapping(column) => {
                if shape.content > column {
                    continue;
                }
                if shape.content == column {
                    if shape.dash {
                        reversed.push(Segment::Index(item_index(document, number, shape.indent)));
                        seek = Seek::Sequence(shape.indent);
                    }
                    continue;
                }
                shape.key.as_ref().filter(|_| !shape.has_value)
            }
            Seek::Sequence(column) => {
                if shape.indent > column || (shape.dash && shape.indent == column) {
                    continue;
                }
                shape
                    .key
                    .as_ref()
                    .filter(|_| !shape.has_value && shape.content <= column)
            }
        };
        let Some(key) = parent else {
            break;
        };
        reversed.push(Segment::Key(key.clone()));
        seek = if shape.dash {
            reversed.push(Segment::Index(item_index(document, number, shape.indent)));
            Seek::Sequence(shape.indent)
        } else {
            Seek::Mapping(shape.indent)
        };
    }

    reversed.reverse();
    reversed
}

fn unquote(key: &str) -> &str {
    key.strip_prefix('"')
        .and_then(|k| k.strip_suffix('"'))
        .or_else(|| key.strip_prefix('\'').and_then(|k| k.strip_suffix('\'')))
        .unwrap_or(key)
}

fn byte_index(line: &str, character: u32) -> usize {
    let mut units = 0;
    for (index, c) in line.char_indices() {
        if units >= character as usize {
            return index;
        }
        units += c.len_utf16();
    }
    line.len()
}

fn utf16_len(text: &str) -> u32 {
    text.encode_utf16().count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::{CompletionItemKind, CompletionTextEdit, TextEdit, Url};

    fn document(text: &str) -> TextDocument {
        TextDocument::new(Url::parse("file:///workspace/doc.yaml").unwrap(), "ssm-yaml", 1, text)
    }

    fn complete_at(text: &str, position: Position) -> Vec<CompletionItem> {
        let document = document(text);
        let model = DocumentModel::parse(&document);
        complete(&DocumentSchema::builtin().unwrap(), &document, &model, position).items
    }

    fn labels(items: &[CompletionItem]) -> Vec<&str> {
        items.iter().map(|item| item.label.as_str()).collect()
    }

    fn edit(item: &CompletionItem) -> &TextEdit {
        match item.text_edit.as_ref() {
            Some(CompletionTextEdit::Edit(edit)) => edit,
            other => panic!("unexpected text edit {other:?}"),
        }
    }

    // ========================================================================
    // Path from indentation
    // ========================================================================

    #[test]
    fn test_mapping_path_through_sequence_items() {
        let doc = document("mainSteps:\n  - name: a\n  - name: b\n    inputs:\n      Du\n");

        assert_eq!(
            mapping_path(&doc, 4, 6, None),
            vec![Segment::Key("mainSteps".into()), Segment::Index(1), Segment::Key("inputs".into())]
        );
        assert_eq!(
            mapping_path(&doc, 3, 4, None),
            vec![Segment::Key("mainSteps".into()), Segment::Index(1)]
        );
    }

    #[test]
    fn test_mapping_path_sequence_at_parent_indent() {
        let doc = document("mainSteps:\n- name: a\n- \n");

        assert_eq!(
            mapping_path(&doc, 2, 2, Some(0)),
            vec![Segment::Key("mainSteps".into()), Segment::Index(1)]
        );
    }

    #[test]
    fn test_shape_of_lines() {
        let item = shape("  - name: wait").unwrap();
        assert!(item.dash);
        assert_eq!((item.indent, item.content), (2, 4));
        assert_eq!(item.key.as_deref(), Some("name"));
        assert!(item.has_value);

        let opener = shape("    'inputs':  # comment").unwrap();
        assert_eq!(opener.key.as_deref(), Some("inputs"));
        assert!(!opener.has_value);

        assert!(shape("   ").is_none());
        assert!(shape("# heading").is_none());
    }

    // ========================================================================
    // Items
    // ========================================================================

    #[test]
    fn test_fragment_keys_in_inputs() {
        let text = "schemaVersion: '0.3'\nmainSteps:\n  - name: wait\n    action: aws:sleep\n    inputs:\n      Du\n";
        let items = complete_at(text, Position::new(5, 8));

        assert_eq!(labels(&items), vec!["Duration", "TimeStamp"]);
        assert_eq!(edit(&items[0]).range, Range::new(Position::new(5, 6), Position::new(5, 8)));
        assert_eq!(edit(&items[0]).new_text, "Duration: ");
    }

    #[test]
    fn test_step_keys_skip_existing() {
        let text = "mainSteps:\n  - name: wait\n    \n";
        let items = complete_at(text, Position::new(2, 4));
        let labels = labels(&items);

        assert!(labels.contains(&"action"), "{labels:?}");
        assert!(!labels.contains(&"name"));
        assert!(!labels.iter().any(|l| l.starts_with("Snippet")), "No snippets inside a step");
    }

    #[test]
    fn test_snippets_after_dash() {
        let text = "mainSteps:\n  - name: a\n    action: aws:pause\n    inputs: {}\n  - \n";
        let items = complete_at(text, Position::new(4, 4));

        let snippets: Vec<_> = items.iter().filter(|i| i.kind == Some(CompletionItemKind::SNIPPET)).collect();
        assert_eq!(snippets.len(), 7);
        assert!(labels(&items).contains(&"name"), "Step keys are offered alongside snippets");

        let sleep = snippets.iter().find(|i| i.label == "Snippet: aws:sleep").unwrap();
        let text = &edit(sleep).new_text;
        assert!(text.starts_with("name: "), "{text}");
        assert!(
            text.ends_with("\n    action: aws:sleep\n    inputs:\n      Duration: PT10M"),
            "Continuation lines sit under the first key: {text}"
        );
    }

    #[test]
    fn test_snippets_on_blank_line_add_dash() {
        let items = complete_at("mainSteps:\n  \n", Position::new(1, 2));

        assert_eq!(items.len(), 7);
        let sleep = items.iter().find(|i| i.label == "Snippet: aws:sleep").unwrap();
        let text = &edit(sleep).new_text;
        assert!(text.starts_with("- name: "), "{text}");
        assert!(text.contains("\n    action: aws:sleep\n"), "{text}");
    }

    #[test]
    fn test_action_values() {
        let items = complete_at("mainSteps:\n  - name: a\n    action: aws:\n", Position::new(2, 16));

        assert_eq!(items.len(), 14);
        let sleep = items.iter().find(|i| i.label == "aws:sleep").expect("aws:sleep offered");
        assert_eq!(edit(sleep).range, Range::new(Position::new(2, 12), Position::new(2, 16)));
    }

    #[test]
    fn test_enum_values_from_fragment() {
        let text = "mainSteps:\n  - name: stop\n    action: aws:changeInstanceState\n    inputs:\n      DesiredState: \n";
        let items = complete_at(text, Position::new(4, 20));

        assert_eq!(labels(&items), vec!["running", "stopped", "terminated"]);
    }

    #[test]
    fn test_schema_version_is_quoted() {
        let items = complete_at("schemaVersion: \n", Position::new(0, 15));

        assert_eq!(labels(&items), vec!["'0.3'"]);
    }
}
