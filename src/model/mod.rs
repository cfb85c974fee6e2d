//! Parsed document models.
//!
//! Both encodings parse into the same [`DocumentModel`]: a [`Node`] tree
//! carrying an LSP range for every value and property key, a
//! `serde_json::Value` view used for schema validation, and the syntax
//! issues found while parsing.
//!
//! Parsing is tolerant. A broken document still yields as much of the tree
//! as could be recovered, so completion and symbols keep working while the
//! user is in the middle of typing.

pub mod json;
pub mod yaml;

use serde_json::Value;
use tower_lsp::lsp_types::{Position, Range};

use crate::document::{Encoding, TextDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Syntax,
    /// A comment in a JSON document.
    Comment,
    /// A trailing comma in a JSON object or array.
    TrailingComma,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxIssue {
    pub kind: IssueKind,
    pub range: Range,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: String,
    pub key_range: Range,
    pub value: Option<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Object(Vec<Property>),
    Array(Vec<Node>),
    Scalar(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub range: Range,
}

/// One step of a path from the root to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Where a position falls inside a tree.
#[derive(Debug)]
pub struct NodePath<'a> {
    pub segments: Vec<Segment>,
    /// Nodes from the root down to the innermost node containing the position.
    pub nodes: Vec<&'a Node>,
    /// Set when the position is on a property key; the key is the last segment.
    pub key_range: Option<Range>,
}

impl NodePath<'_> {
    pub fn innermost(&self) -> Option<&Node> {
        self.nodes.last().copied()
    }

    pub fn on_key(&self) -> bool {
        self.key_range.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct DocumentModel {
    pub encoding: Encoding,
    pub root: Option<Node>,
    pub value: Option<Value>,
    pub issues: Vec<SyntaxIssue>,
}

impl DocumentModel {
    pub fn parse(document: &TextDocument) -> Self {
        let text = document.text();
        match document.encoding() {
            Encoding::Structured => json::parse(&text),
            Encoding::Indented => yaml::parse(&text),
        }
    }

    pub fn has_syntax_errors(&self) -> bool {
        self.issues.iter().any(|issue| issue.kind == IssueKind::Syntax)
    }

    pub fn path_at(&self, position: Position) -> Option<NodePath<'_>> {
        self.root.as_ref().map(|root| root.path_at(position))
    }
}

pub fn contains(range: &Range, position: Position) -> bool {
    range.start <= position && position <= range.end
}

impl Node {
    pub fn scalar(value: Value, range: Range) -> Self {
        Node {
            kind: NodeKind::Scalar(value),
            range,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Scalar(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn properties(&self) -> &[Property] {
        match &self.kind {
            NodeKind::Object(properties) => properties,
            _ => &[],
        }
    }

    pub fn items(&self) -> &[Node] {
        match &self.kind {
            NodeKind::Array(items) => items,
            _ => &[],
        }
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.properties()
            .iter()
            .find(|p| p.key == key)
            .and_then(|p| p.value.as_ref())
    }

    /// Direct child nodes, in document order.
    pub fn children(&self) -> Vec<&Node> {
        match &self.kind {
            NodeKind::Object(properties) => properties.iter().filter_map(|p| p.value.as_ref()).collect(),
            NodeKind::Array(items) => items.iter().collect(),
            NodeKind::Scalar(_) => Vec::new(),
        }
    }

    pub fn to_value(&self) -> Value {
        match &self.kind {
            NodeKind::Object(properties) => Value::Object(
                properties
                    .iter()
                    .map(|p| {
                        let value = p.value.as_ref().map_or(Value::Null, Node::to_value);
                        (p.key.clone(), value)
                    })
                    .collect(),
            ),
            NodeKind::Array(items) => Value::Array(items.iter().map(Node::to_value).collect()),
            NodeKind::Scalar(value) => value.clone(),
        }
    }

    /// Resolve a JSON pointer (`/mainSteps/0/inputs`). Returns the node and,
    /// when it is a property value, the range of its key.
    pub fn find_pointer(&self, pointer: &str) -> Option<(&Node, Option<Range>)> {
        let mut node = self;
        let mut key_range = None;
        for token in pointer.split('/').skip(1) {
            let token = token.replace("~1", "/").replace("~0", "~");
            match &node.kind {
                NodeKind::Object(properties) => {
                    let property = properties.iter().find(|p| p.key == token)?;
                    key_range = Some(property.key_range);
                    node = property.value.as_ref()?;
                }
                NodeKind::Array(items) => {
                    node = items.get(token.parse::<usize>().ok()?)?;
                    key_range = None;
                }
                NodeKind::Scalar(_) => return None,
            }
        }
        Some((node, key_range))
    }

    pub fn path_at(&self, position: Position) -> NodePath<'_> {
        let mut path = NodePath {
            segments: Vec::new(),
            nodes: Vec::new(),
            key_range: None,
        };
        if !contains(&self.range, position) {
            return path;
        }
        let mut node = self;
        path.nodes.push(node);
        'descend: loop {
            match &node.kind {
                NodeKind::Object(properties) => {
                    for property in properties {
                        if contains(&property.key_range, position) {
                            path.segments.push(Segment::Key(property.key.clone()));
                            path.key_range = Some(property.key_range);
                            break 'descend;
                        }
                        if let Some(value) = property.value.as_ref().filter(|v| contains(&v.range, position)) {
                            path.segments.push(Segment::Key(property.key.clone()));
                            path.nodes.push(value);
                            node = value;
                            continue 'descend;
                        }
                    }
                    break;
                }
                NodeKind::Array(items) => match items.iter().position(|item| contains(&item.range, position)) {
                    Some(index) => {
                        path.segments.push(Segment::Index(index));
                        node = &items[index];
                        path.nodes.push(node);
                    }
                    None => break,
                },
                NodeKind::Scalar(_) => break,
            }
        }
        path
    }
}

/// Walk the tree depth first, calling `visit` with each node and its path.
pub fn walk<'a>(node: &'a Node, path: &mut Vec<Segment>, visit: &mut dyn FnMut(&'a Node, &[Segment]) -> bool) {
    if !visit(node, path) {
        return;
    }
    match &node.kind {
        NodeKind::Object(properties) => {
            for property in properties {
                if let Some(value) = &property.value {
                    path.push(Segment::Key(property.key.clone()));
                    walk(value, path, visit);
                    path.pop();
                }
            }
        }
        NodeKind::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                path.push(Segment::Index(index));
                walk(item, path, visit);
                path.pop();
            }
        }
        NodeKind::Scalar(_) => {}
    }
}
