//! Range formatting.
//!
//! JSON: the smallest object or array enclosing the requested range is
//! re-emitted with the client's indentation. Documents with comments,
//! trailing commas or syntax errors are left alone, since re-emitting the
//! value would drop them.
//!
//! YAML: trailing whitespace is trimmed on every line of the range.

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use tower_lsp::lsp_types::{FormattingOptions, Position, Range, TextEdit};

use crate::document::TextDocument;
use crate::error::{Result, ServiceError};
use crate::model::{contains, DocumentModel, Node, NodeKind};

pub fn format_json(
    document: &TextDocument,
    model: &DocumentModel,
    range: Range,
    options: &FormattingOptions,
) -> Result<Vec<TextEdit>> {
    let Some(root) = model.root.as_ref().filter(|_| model.issues.is_empty()) else {
        return Ok(Vec::new());
    };
    let node = enclosing_container(root, range);

    let indent_unit = if options.insert_spaces {
        " ".repeat(options.tab_size as usize)
    } else {
        "\t".to_string()
    };
    let base_indent: String = document
        .line(node.range.start.line)
        .unwrap_or_default()
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect();

    let pretty = pretty_print(&node.to_value(), &indent_unit)?;
    let formatted = pretty.lines().enumerate().fold(String::new(), |mut out, (i, line)| {
        if i > 0 {
            out.push('\n');
            out.push_str(&base_indent);
        }
        out.push_str(line);
        out
    });

    let text = document.text();
    let start = document.offset_at(node.range.start);
    let end = document.offset_at(node.range.end);
    let current: String = text.chars().skip(start).take(end - start).collect();
    if current == formatted {
        return Ok(Vec::new());
    }
    Ok(vec![TextEdit::new(node.range, formatted)])
}

fn enclosing_container(root: &Node, range: Range) -> &Node {
    let mut node = root;
    'descend: loop {
        for child in node.children() {
            let container = matches!(child.kind, NodeKind::Object(_) | NodeKind::Array(_));
            if container && contains(&child.range, range.start) && contains(&child.range, range.end) {
                node = child;
                continue 'descend;
            }
        }
        return node;
    }
}

fn pretty_print(value: &serde_json::Value, indent: &str) -> Result<String> {
    let mut buffer = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(indent.as_bytes()));
    value.serialize(&mut serializer)?;
    String::from_utf8(buffer).map_err(|err| ServiceError::Backend {
        backend: "json",
        message: err.to_string(),
    })
}

pub fn format_yaml(document: &TextDocument, range: Range) -> Vec<TextEdit> {
    let last = range.end.line.min(document.line_count().saturating_sub(1) as u32);
    (range.start.line..=last)
        .filter_map(|number| {
            let line = document.line(number)?;
            let trimmed = line.trim_end_matches([' ', '\t']);
            if trimmed.len() == line.len() {
                return None;
            }
            let utf16 = |s: &str| s.encode_utf16().count() as u32;
            Some(TextEdit::new(
                Range::new(Position::new(number, utf16(trimmed)), Position::new(number, utf16(&line))),
                String::new(),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::Url;

    fn document(language_id: &str, text: &str) -> (TextDocument, DocumentModel) {
        let document = TextDocument::new(Url::parse("file:///workspace/doc").unwrap(), language_id, 1, text);
        let model = DocumentModel::parse(&document);
        (document, model)
    }

    fn options(tab_size: u32) -> FormattingOptions {
        FormattingOptions {
            tab_size,
            insert_spaces: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_json_reformats_whole_document() {
        let (doc, model) = document("ssm-json", r#"{"schemaVersion":"0.3","mainSteps":[]}"#);

        let edits = format_json(&doc, &model, doc.full_range(), &options(2)).unwrap();

        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].new_text, "{\n  \"schemaVersion\": \"0.3\",\n  \"mainSteps\": []\n}");
    }

    #[test]
    fn test_json_formats_enclosing_object_only() {
        let text = "{\n  \"inputs\": {\"Duration\":\"PT1M\"},\n  \"name\":\"x\"\n}";
        let (doc, model) = document("ssm-json", text);
        let range = Range::new(Position::new(1, 15), Position::new(1, 20));

        let edits = format_json(&doc, &model, range, &options(4)).unwrap();

        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].range, Range::new(Position::new(1, 12), Position::new(1, 31)));
        assert_eq!(edits[0].new_text, "{\n      \"Duration\": \"PT1M\"\n  }");
    }

    #[test]
    fn test_json_with_comments_is_untouched() {
        let (doc, model) = document("ssm-json", "{\n// keep\n\"a\":1}");

        assert!(format_json(&doc, &model, doc.full_range(), &options(2)).unwrap().is_empty());
    }

    #[test]
    fn test_json_already_formatted() {
        let (doc, model) = document("ssm-json", "{\n  \"a\": 1\n}");

        assert!(format_json(&doc, &model, doc.full_range(), &options(2)).unwrap().is_empty());
    }

    #[test]
    fn test_yaml_trims_trailing_whitespace_in_range() {
        let (doc, _) = document("ssm-yaml", "a: 1  \nb: 2\t\nc: 3 \n");

        let edits = format_yaml(&doc, Range::new(Position::new(0, 0), Position::new(1, 0)));

        assert_eq!(
            edits,
            vec![
                TextEdit::new(Range::new(Position::new(0, 4), Position::new(0, 6)), String::new()),
                TextEdit::new(Range::new(Position::new(1, 4), Position::new(1, 5)), String::new()),
            ]
        );
    }
}
