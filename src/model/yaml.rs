//! YAML model: `serde_yaml` for values and syntax errors, plus an
//! indentation outline that recovers node ranges.
//!
//! The outline understands the block subset automation documents are
//! written in: mappings, sequences (including `- key: value` items and
//! sequences indented at the level of their parent key), plain and quoted
//! scalars, block scalars (`|`, `>`) and comments. Flow collections are kept
//! as single scalar nodes.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tower_lsp::lsp_types::{Position, Range};

use super::{DocumentModel, IssueKind, Node, NodeKind, Property, SyntaxIssue};
use crate::document::Encoding;

static PLAIN_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^([^\s'"\[\]{}|>&*!%@#,\-][^:]*?|-\S[^:]*?)[ \t]*:(?:[ \t]|$)"#)
        .expect("plain key pattern is valid")
});

pub fn parse(text: &str) -> DocumentModel {
    let mut issues = Vec::new();
    let value = match serde_yaml::from_str::<serde_yaml::Value>(text) {
        Ok(value) => Some(to_json(value)),
        Err(err) => {
            issues.push(error_issue(&err, text));
            None
        }
    };

    let mut outline = Outline {
        lines: scan_lines(text),
        index: 0,
    };
    let root = outline.parse_block(0);

    DocumentModel {
        encoding: Encoding::Indented,
        root,
        value,
        issues,
    }
}

/// Convert a YAML value to JSON. Non-string mapping keys are stringified.
pub fn to_json(value: serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;
    match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(items.into_iter().map(to_json).collect()),
        Yaml::Mapping(mapping) => Value::Object(
            mapping
                .into_iter()
                .map(|(key, value)| (key_string(key), to_json(value)))
                .collect(),
        ),
        Yaml::Tagged(tagged) => to_json(tagged.value),
    }
}

fn key_string(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Null => "null".to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn error_issue(err: &serde_yaml::Error, text: &str) -> SyntaxIssue {
    let range = match err.location() {
        Some(location) => {
            let line = location.line().saturating_sub(1);
            let raw = text.split('\n').nth(line).unwrap_or_default().trim_end_matches('\r');
            let column = location.column().saturating_sub(1);
            let start = raw.chars().take(column).map(char::len_utf16).sum::<usize>();
            let end = raw.encode_utf16().count().max(start);
            Range::new(
                Position::new(line as u32, start as u32),
                Position::new(line as u32, end as u32),
            )
        }
        None => Range::default(),
    };
    SyntaxIssue {
        kind: IssueKind::Syntax,
        range,
        message: err.to_string(),
    }
}

/// A non-blank line. `start` and `end` are byte offsets of the content
/// within `raw`, after indentation and with any comment removed.
#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    number: u32,
    raw: &'a str,
    start: usize,
    end: usize,
}

impl Line<'_> {
    fn content(&self) -> &str {
        &self.raw[self.start..self.end]
    }

    fn position(&self, byte: usize) -> Position {
        Position::new(self.number, self.raw[..byte].encode_utf16().count() as u32)
    }

    fn range(&self, start: usize, end: usize) -> Range {
        Range::new(self.position(start), self.position(end))
    }

    fn is_sequence_item(&self) -> bool {
        let content = self.content();
        content == "-" || content.starts_with("- ") || content.starts_with("-\t")
    }
}

fn scan_lines(text: &str) -> Vec<Line<'_>> {
    text.split('\n')
        .enumerate()
        .filter_map(|(number, raw)| {
            let raw = raw.strip_suffix('\r').unwrap_or(raw);
            let start = raw.len() - raw.trim_start().len();
            let end = start + strip_comment(&raw[start..]).trim_end().len();
            let content = &raw[start..end];
            let marker = content.starts_with("---") || content.starts_with("...") || content.starts_with('%');
            (end > start && !marker).then_some(Line {
                number: number as u32,
                raw,
                start,
                end,
            })
        })
        .collect()
}

/// Content before a `#` comment. Quotes only count when they open a token.
fn strip_comment(content: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut previous: Option<char> = None;
    for (index, c) in content.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => {
                let boundary = previous.map_or(true, |p| p.is_whitespace() || matches!(p, ':' | '-' | '[' | '{' | ','));
                if (c == '"' || c == '\'') && boundary {
                    quote = Some(c);
                } else if c == '#' && previous.map_or(true, char::is_whitespace) {
                    return &content[..index];
                }
            }
        }
        previous = Some(c);
    }
    content
}

struct KeyPart {
    key: String,
    start: usize,
    end: usize,
    value_start: usize,
}

fn split_key(line: &Line<'_>) -> Option<KeyPart> {
    if line.is_sequence_item() {
        return None;
    }
    let text = line.content();
    let first = text.chars().next()?;

    let (key, key_len, colon) = if first == '"' || first == '\'' {
        let close = text[1..].find(first)? + 1;
        let rest = &text[close + 1..];
        let trimmed = rest.trim_start();
        if !trimmed.starts_with(':') {
            return None;
        }
        let colon = close + 1 + (rest.len() - trimmed.len());
        (text[1..close].to_string(), close + 1, colon)
    } else {
        let captures = PLAIN_KEY.captures(text)?;
        let key = captures.get(1)?.as_str().trim_end();
        let colon = text[key.len()..].find(':')? + key.len();
        (key.to_string(), key.len(), colon)
    };

    let after = &text[colon + 1..];
    if !after.is_empty() && !after.starts_with([' ', '\t']) {
        return None;
    }
    let value_offset = colon + 1 + (after.len() - after.trim_start().len());
    Some(KeyPart {
        key,
        start: line.start,
        end: line.start + key_len,
        value_start: line.start + value_offset,
    })
}

/// Type a single-line scalar the way YAML would.
fn scalar_value(text: &str) -> Value {
    match serde_yaml::from_str::<serde_yaml::Value>(text) {
        Ok(value) => to_json(value),
        Err(_) => Value::String(text.to_string()),
    }
}

struct Outline<'a> {
    lines: Vec<Line<'a>>,
    index: usize,
}

impl Outline<'_> {
    fn parse_block(&mut self, min_indent: usize) -> Option<Node> {
        let line = *self.lines.get(self.index)?;
        if line.start < min_indent {
            return None;
        }
        if line.is_sequence_item() {
            Some(self.parse_sequence(line.start))
        } else if split_key(&line).is_some() {
            Some(self.parse_mapping(line.start))
        } else {
            Some(self.parse_plain_scalar(line, line.start, line.start))
        }
    }

    fn parse_sequence(&mut self, indent: usize) -> Node {
        let mut items = Vec::new();
        let mut range: Option<Range> = None;
        while let Some(line) = self.lines.get(self.index).copied() {
            if line.start != indent || !line.is_sequence_item() {
                break;
            }
            let after_dash = &line.raw[line.start + 1..line.end];
            let content = line.start + 1 + (after_dash.len() - after_dash.trim_start().len());
            let item = if content >= line.end {
                self.index += 1;
                self.parse_block(indent + 1)
                    .unwrap_or_else(|| Node::scalar(Value::Null, line.range(line.start, line.start + 1)))
            } else {
                // Reparse the rest of the line as if it started a block at `content`
                self.lines[self.index].start = content;
                match self.parse_block(content) {
                    Some(node) => node,
                    None => break,
                }
            };
            let start = range.map_or(line.position(line.start), |r| r.start);
            range = Some(Range::new(start, item.range.end));
            items.push(item);
        }
        Node {
            kind: NodeKind::Array(items),
            range: range.unwrap_or_default(),
        }
    }

    fn parse_mapping(&mut self, indent: usize) -> Node {
        let mut properties: Vec<Property> = Vec::new();
        let mut range: Option<Range> = None;
        while let Some(line) = self.lines.get(self.index).copied() {
            if line.start < indent {
                break;
            }
            let Some(part) = split_key(&line).filter(|_| line.start == indent) else {
                if line.start == indent && line.is_sequence_item() {
                    break;
                }
                // Stray content; skip it rather than lose the rest of the mapping
                self.index += 1;
                continue;
            };
            self.index += 1;
            let key_range = line.range(part.start, part.end);

            let value = if part.value_start < line.end {
                let text = &line.raw[part.value_start..line.end];
                if text.starts_with('|') || text.starts_with('>') {
                    Some(self.parse_block_scalar(line, part.value_start, indent))
                } else {
                    Some(self.parse_plain_scalar(line, part.value_start, indent))
                }
            } else {
                match self.lines.get(self.index).copied() {
                    Some(next) if next.start > indent => self.parse_block(indent + 1),
                    Some(next) if next.start == indent && next.is_sequence_item() => Some(self.parse_sequence(indent)),
                    _ => None,
                }
            };

            let end = value.as_ref().map_or(key_range.end, |v| v.range.end);
            let start = range.map_or(key_range.start, |r| r.start);
            range = Some(Range::new(start, end));
            properties.push(Property {
                key: part.key,
                key_range,
                value,
            });
        }
        Node {
            kind: NodeKind::Object(properties),
            range: range.unwrap_or_default(),
        }
    }

    /// A scalar starting at `start` on `line`, folding more indented continuation lines.
    fn parse_plain_scalar(&mut self, line: Line<'_>, start: usize, indent: usize) -> Node {
        if self.lines.get(self.index).is_some_and(|l| l.number == line.number) {
            self.index += 1;
        }
        let mut text = line.raw[start..line.end].to_string();
        let mut end = line.position(line.end);
        while let Some(next) = self.lines.get(self.index).filter(|l| l.start > indent) {
            text.push(' ');
            text.push_str(next.content());
            end = next.position(next.end);
            self.index += 1;
        }
        Node::scalar(scalar_value(&text), Range::new(line.position(start), end))
    }

    fn parse_block_scalar(&mut self, line: Line<'_>, start: usize, indent: usize) -> Node {
        let folded = line.raw[start..].starts_with('>');
        let mut end = line.position(line.end);
        let mut parts: Vec<&str> = Vec::new();
        while let Some(next) = self.lines.get(self.index).filter(|l| l.start > indent) {
            parts.push(next.content());
            end = next.position(next.end);
            self.index += 1;
        }
        let separator = if folded { " " } else { "\n" };
        let mut value = parts.join(separator);
        if !parts.is_empty() {
            value.push('\n');
        }
        Node::scalar(Value::String(value), Range::new(line.position(start), end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RUNBOOK: &str = "\
description: Restart an instance # trailing comment
schemaVersion: '0.3'
assumeRole: '{{ AutomationAssumeRole }}'
mainSteps:
  - name: stop
    action: aws:changeInstanceState
    inputs:
      InstanceIds:
        - i-123
      DesiredState: stopped
  - name: wait
    action: aws:sleep
";

    #[test]
    fn test_outline_matches_value() {
        let model = parse(RUNBOOK);

        assert!(model.issues.is_empty(), "{:?}", model.issues);
        let root = model.root.as_ref().unwrap();
        assert_eq!(Some(root.to_value()), model.value);
    }

    #[test]
    fn test_ranges_of_sequence_items() {
        let model = parse(RUNBOOK);
        let root = model.root.unwrap();
        let steps = root.get("mainSteps").unwrap();

        assert_eq!(steps.items().len(), 2);
        let first = &steps.items()[0];
        assert_eq!(first.range.start, Position::new(4, 4));
        assert_eq!(first.range.end, Position::new(9, 27));
        assert_eq!(
            first.properties()[1].key_range,
            Range::new(Position::new(5, 4), Position::new(5, 10))
        );
        assert_eq!(
            root.find_pointer("/mainSteps/0/inputs/InstanceIds/0").map(|(n, _)| n.range),
            Some(Range::new(Position::new(8, 10), Position::new(8, 15)))
        );
    }

    #[test]
    fn test_sequence_at_parent_indent() {
        let model = parse("mainSteps:\n- name: a\n  action: aws:pause\n- name: b\n");

        assert_eq!(
            model.root.unwrap().to_value(),
            json!({"mainSteps": [{"name": "a", "action": "aws:pause"}, {"name": "b"}]})
        );
    }

    #[test]
    fn test_block_scalar() {
        let model = parse("description: |\n  line one\n  line two\nschemaVersion: '0.3'\n");
        let root = model.root.unwrap();

        assert_eq!(root.get("description").and_then(Node::as_str), Some("line one\nline two\n"));
        assert_eq!(root.get("schemaVersion").and_then(Node::as_str), Some("0.3"));
    }

    #[test]
    fn test_syntax_error_location() {
        let model = parse("a: b\n  c: d\n");

        assert!(model.has_syntax_errors());
        assert!(model.value.is_none());
        assert_eq!(model.issues[0].range.start.line, 1);
        // The outline still recovers the readable part
        assert!(model.root.is_some());
    }

    #[test]
    fn test_comment_stripping_respects_quotes() {
        assert_eq!(strip_comment("a: '#not' # yes"), "a: '#not' ");
        assert_eq!(strip_comment("url: http://x/#frag"), "url: http://x/#frag");
        assert_eq!(strip_comment("# whole line"), "");
    }

    #[test]
    fn test_non_string_keys_are_stringified() {
        assert_eq!(to_json(serde_yaml::from_str("1: true\n").unwrap()), json!({"1": true}));
    }
}
