//! Tolerant JSON parser.
//!
//! Produces a [`Node`] tree even for broken input. Comments and trailing
//! commas are accepted but reported as [`IssueKind::Comment`] and
//! [`IssueKind::TrailingComma`]; whether those count as errors is up to the
//! validation settings.

use serde_json::{Number, Value};
use tower_lsp::lsp_types::{Position, Range};

use super::{DocumentModel, IssueKind, Node, NodeKind, Property, SyntaxIssue};
use crate::document::Encoding;

/// Containers nested deeper than this are skipped, as serde_json does.
const MAX_DEPTH: usize = 128;

pub fn parse(text: &str) -> DocumentModel {
    let mut parser = Parser::new(text);
    parser.advance();
    let root = if parser.token.kind == TokenKind::Eof {
        parser.issue_at_token("Expected a JSON object, array or literal.");
        None
    } else {
        let root = parser.parse_value();
        if parser.token.kind != TokenKind::Eof {
            parser.issue_at_token("End of file expected.");
        }
        root
    };
    let value = root.as_ref().map(Node::to_value);
    DocumentModel {
        encoding: Encoding::Structured,
        root,
        value,
        issues: parser.issues,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    Colon,
    Comma,
    String(String),
    Number(Number),
    Literal(Value),
    Unknown,
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    range: Range,
}

struct Parser {
    chars: Vec<char>,
    offset: usize,
    position: Position,
    token: Token,
    depth: usize,
    issues: Vec<SyntaxIssue>,
}

impl Parser {
    fn new(text: &str) -> Self {
        Parser {
            chars: text.chars().collect(),
            offset: 0,
            position: Position::new(0, 0),
            token: Token {
                kind: TokenKind::Eof,
                range: Range::default(),
            },
            depth: 0,
            issues: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.offset).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.offset + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += 1;
        if c == '\n' {
            self.position = Position::new(self.position.line + 1, 0);
        } else {
            self.position.character += c.len_utf16() as u32;
        }
        Some(c)
    }

    fn issue(&mut self, kind: IssueKind, range: Range, message: &str) {
        self.issues.push(SyntaxIssue {
            kind,
            range,
            message: message.to_string(),
        });
    }

    fn issue_at_token(&mut self, message: &str) {
        let range = self.token.range;
        self.issue(IssueKind::Syntax, range, message);
    }

    fn skip_trivia(&mut self) {
        loop {
            match (self.peek(), self.peek_next()) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    let start = self.position;
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.bump();
                    }
                    self.issue(IssueKind::Comment, Range::new(start, self.position), "Comments are not permitted in JSON.");
                }
                (Some('/'), Some('*')) => {
                    let start = self.position;
                    self.bump();
                    self.bump();
                    let mut closed = false;
                    while let Some(c) = self.bump() {
                        if c == '*' && self.peek() == Some('/') {
                            self.bump();
                            closed = true;
                            break;
                        }
                    }
                    let range = Range::new(start, self.position);
                    self.issue(IssueKind::Comment, range, "Comments are not permitted in JSON.");
                    if !closed {
                        self.issue(IssueKind::Syntax, range, "Unexpected end of comment.");
                    }
                }
                _ => break,
            }
        }
    }

    fn advance(&mut self) {
        self.skip_trivia();
        let start = self.position;
        let kind = match self.peek() {
            None => TokenKind::Eof,
            Some(c) => match c {
                '{' | '}' | '[' | ']' | ':' | ',' => {
                    self.bump();
                    match c {
                        '{' => TokenKind::OpenBrace,
                        '}' => TokenKind::CloseBrace,
                        '[' => TokenKind::OpenBracket,
                        ']' => TokenKind::CloseBracket,
                        ':' => TokenKind::Colon,
                        _ => TokenKind::Comma,
                    }
                }
                '"' => self.scan_string(start),
                '-' | '0'..='9' => self.scan_number(),
                c if c.is_alphabetic() => self.scan_word(),
                _ => {
                    self.bump();
                    TokenKind::Unknown
                }
            },
        };
        self.token = Token {
            kind,
            range: Range::new(start, self.position),
        };
    }

    fn scan_string(&mut self, start: Position) -> TokenKind {
        self.bump();
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    self.issue(IssueKind::Syntax, Range::new(start, self.position), "Unexpected end of string.");
                    break;
                }
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    match self.bump() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('r') => value.push('\r'),
                        Some('b') => value.push('\u{8}'),
                        Some('f') => value.push('\u{c}'),
                        Some('u') => {
                            let hex: String = (0..4).filter_map(|_| self.bump()).collect();
                            match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                                Some(c) => value.push(c),
                                None => self.issue(
                                    IssueKind::Syntax,
                                    Range::new(start, self.position),
                                    "Invalid unicode sequence in string.",
                                ),
                            }
                        }
                        Some(c @ ('"' | '\\' | '/')) => value.push(c),
                        _ => self.issue(
                            IssueKind::Syntax,
                            Range::new(start, self.position),
                            "Invalid escape character in string.",
                        ),
                    }
                }
                Some(c) => {
                    self.bump();
                    value.push(c);
                }
            }
        }
        TokenKind::String(value)
    }

    fn scan_number(&mut self) -> TokenKind {
        let mut text = String::new();
        while let Some(c) = self.peek().filter(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')) {
            self.bump();
            text.push(c);
        }
        match serde_json::from_str::<Number>(&text) {
            Ok(number) => TokenKind::Number(number),
            Err(_) => TokenKind::Unknown,
        }
    }

    fn scan_word(&mut self) -> TokenKind {
        let mut word = String::new();
        while let Some(c) = self.peek().filter(|c| c.is_alphanumeric()) {
            self.bump();
            word.push(c);
        }
        match word.as_str() {
            "true" => TokenKind::Literal(Value::Bool(true)),
            "false" => TokenKind::Literal(Value::Bool(false)),
            "null" => TokenKind::Literal(Value::Null),
            _ => TokenKind::Unknown,
        }
    }

    fn parse_value(&mut self) -> Option<Node> {
        let range = self.token.range;
        let node = match self.token.kind.clone() {
            TokenKind::OpenBrace | TokenKind::OpenBracket if self.depth >= MAX_DEPTH => {
                self.issue_at_token("Maximum nesting depth exceeded.");
                return Some(self.skip_container());
            }
            TokenKind::OpenBrace => return Some(self.nested(Self::parse_object)),
            TokenKind::OpenBracket => return Some(self.nested(Self::parse_array)),
            TokenKind::String(s) => Node::scalar(Value::String(s), range),
            TokenKind::Number(n) => Node::scalar(Value::Number(n), range),
            TokenKind::Literal(value) => Node::scalar(value, range),
            _ => {
                self.issue_at_token("Value expected.");
                return None;
            }
        };
        self.advance();
        Some(node)
    }

    fn nested(&mut self, parse: fn(&mut Self) -> Node) -> Node {
        self.depth += 1;
        let node = parse(self);
        self.depth -= 1;
        node
    }

    /// Consume a container without building it; returns it empty.
    fn skip_container(&mut self) -> Node {
        let start = self.token.range.start;
        let is_object = self.token.kind == TokenKind::OpenBrace;
        let mut open = 0usize;
        let end = loop {
            match self.token.kind {
                TokenKind::OpenBrace | TokenKind::OpenBracket => open += 1,
                TokenKind::CloseBrace | TokenKind::CloseBracket => {
                    open -= 1;
                    if open == 0 {
                        let end = self.token.range.end;
                        self.advance();
                        break end;
                    }
                }
                TokenKind::Eof => break self.token.range.start,
                _ => {}
            }
            self.advance();
        };
        if is_object {
            object(Vec::new(), start, end)
        } else {
            array(Vec::new(), start, end)
        }
    }

    fn parse_object(&mut self) -> Node {
        let start = self.token.range.start;
        let mut properties = Vec::new();
        self.advance();
        let mut needs_comma = false;
        loop {
            match self.token.kind.clone() {
                TokenKind::CloseBrace => {
                    let end = self.token.range.end;
                    self.advance();
                    return object(properties, start, end);
                }
                TokenKind::Eof => {
                    self.issue_at_token("Expected comma or closing brace.");
                    let end = self.token.range.start;
                    return object(properties, start, end);
                }
                TokenKind::Comma => {
                    if !needs_comma {
                        self.issue_at_token("Property expected.");
                    }
                    let comma = self.token.range;
                    self.advance();
                    if self.token.kind == TokenKind::CloseBrace && needs_comma {
                        self.issue(IssueKind::TrailingComma, comma, "Trailing comma.");
                    }
                    needs_comma = false;
                }
                TokenKind::String(key) => {
                    if needs_comma {
                        self.issue_at_token("Expected comma.");
                    }
                    let key_range = self.token.range;
                    self.advance();
                    let value = if self.token.kind == TokenKind::Colon {
                        self.advance();
                        self.parse_value()
                    } else {
                        self.issue_at_token("Colon expected.");
                        None
                    };
                    properties.push(Property { key, key_range, value });
                    needs_comma = true;
                }
                TokenKind::CloseBracket => {
                    // Mismatched bracket; let the enclosing array take it
                    self.issue_at_token("Expected comma or closing brace.");
                    let end = self.token.range.start;
                    return object(properties, start, end);
                }
                _ => {
                    self.issue_at_token("Property expected.");
                    self.advance();
                }
            }
        }
    }

    fn parse_array(&mut self) -> Node {
        let start = self.token.range.start;
        let mut items = Vec::new();
        self.advance();
        let mut needs_comma = false;
        loop {
            match self.token.kind {
                TokenKind::CloseBracket => {
                    let end = self.token.range.end;
                    self.advance();
                    return array(items, start, end);
                }
                TokenKind::Eof | TokenKind::CloseBrace => {
                    self.issue_at_token("Expected comma or closing bracket.");
                    let end = self.token.range.start;
                    return array(items, start, end);
                }
                TokenKind::Comma => {
                    if !needs_comma {
                        self.issue_at_token("Value expected.");
                    }
                    let comma = self.token.range;
                    self.advance();
                    if self.token.kind == TokenKind::CloseBracket && needs_comma {
                        self.issue(IssueKind::TrailingComma, comma, "Trailing comma.");
                    }
                    needs_comma = false;
                }
                _ => {
                    if needs_comma {
                        self.issue_at_token("Expected comma.");
                    }
                    match self.parse_value() {
                        Some(item) => items.push(item),
                        None => self.advance(),
                    }
                    needs_comma = true;
                }
            }
        }
    }
}

fn object(properties: Vec<Property>, start: Position, end: Position) -> Node {
    Node {
        kind: NodeKind::Object(properties),
        range: Range::new(start, end),
    }
}

fn array(items: Vec<Node>, start: Position, end: Position) -> Node {
    Node {
        kind: NodeKind::Array(items),
        range: Range::new(start, end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kinds(model: &DocumentModel) -> Vec<IssueKind> {
        model.issues.iter().map(|issue| issue.kind).collect()
    }

    #[test]
    fn test_parse_valid_document() {
        let model = parse("{\n  \"schemaVersion\": \"0.3\",\n  \"mainSteps\": [1, true, null, -2.5e3]\n}");

        assert!(model.issues.is_empty(), "{:?}", model.issues);
        assert_eq!(
            model.value,
            Some(json!({"schemaVersion": "0.3", "mainSteps": [1, true, null, -2500.0]}))
        );
        let root = model.root.unwrap();
        assert_eq!(root.range, Range::new(Position::new(0, 0), Position::new(3, 1)));
        assert_eq!(root.properties()[1].key_range, Range::new(Position::new(2, 2), Position::new(2, 13)));
    }

    #[test]
    fn test_comments_and_trailing_commas_are_reported() {
        let model = parse("{\n  // note\n  \"a\": [1, 2,],\n}");

        assert_eq!(
            kinds(&model),
            vec![IssueKind::Comment, IssueKind::TrailingComma, IssueKind::TrailingComma]
        );
        assert!(!model.has_syntax_errors());
        assert_eq!(model.value, Some(json!({"a": [1, 2]})));
    }

    #[test]
    fn test_recovers_from_missing_value() {
        let model = parse("{\"description\": , \"schemaVersion\": \"0.3\"}");

        assert!(model.has_syntax_errors());
        assert_eq!(model.value, Some(json!({"description": null, "schemaVersion": "0.3"})));
    }

    #[test]
    fn test_unterminated_document_keeps_partial_tree() {
        let model = parse("{\"mainSteps\": [{\"name\": \"a\"");

        assert!(model.has_syntax_errors());
        let root = model.root.unwrap();
        let steps = root.get("mainSteps").unwrap();
        assert_eq!(steps.items()[0].get("name").and_then(Node::as_str), Some("a"));
    }

    #[test]
    fn test_utf16_columns() {
        let model = parse("{\"\u{1F600}\": 1}");
        let root = model.root.unwrap();
        // The emoji occupies two UTF-16 code units
        assert_eq!(root.properties()[0].key_range.end, Position::new(0, 5));
    }

    #[test]
    fn test_deep_nesting_is_reported() {
        let text = format!("{{\"a\": {}1{}, \"b\": 2}}", "[".repeat(200), "]".repeat(200));
        let model = parse(&text);

        let messages: Vec<&str> = model.issues.iter().map(|issue| issue.message.as_str()).collect();
        assert_eq!(messages, vec!["Maximum nesting depth exceeded."]);
        let root = model.root.unwrap();
        let b = root.get("b").map(Node::to_value);
        assert_eq!(b, Some(json!(2)), "Parsing resumes after the skipped container");

        let mut depth = 0;
        let mut node = root.get("a").unwrap();
        while let Some(inner) = node.items().first() {
            depth += 1;
            node = inner;
        }
        assert_eq!(depth, MAX_DEPTH - 1, "The skipped array is kept empty");
    }

    #[test]
    fn test_unbalanced_deep_nesting_does_not_overflow() {
        let model = parse(&"[".repeat(100_000));

        assert!(model.has_syntax_errors());
        assert!(model
            .issues
            .iter()
            .any(|issue| issue.message == "Maximum nesting depth exceeded."));
        assert!(model.value.is_some());
    }

    #[test]
    fn test_empty_text() {
        let model = parse("   ");
        assert!(model.root.is_none());
        assert!(model.has_syntax_errors());
    }
}
