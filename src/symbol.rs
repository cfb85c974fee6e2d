//! Document outline for SSM documents.
//!
//! Every property and array item becomes a symbol:
//!
//! | Node | Name | LSP Kind |
//! |------|------|----------|
//! | Object | key | `Module` |
//! | Array | key | `Array` |
//! | String / number / boolean | key | `String` / `Number` / `Boolean` |
//! | Step in `mainSteps` | the step's `name` | `Module`, detail is the action |
//!
//! Symbols are produced in document order. Once the result limit is reached
//! no further symbols are emitted and the limit's callback fires once.
//!
//! ```text
//! document_symbols2() → nested DocumentSymbol tree
//! document_symbols()  → flat SymbolInformation list with container names
//! ```

use serde_json::Value;
use tower_lsp::lsp_types::{DocumentSymbol, Location, Range, SymbolInformation, SymbolKind, Url};

use crate::model::{DocumentModel, Node, NodeKind, Property};
use crate::service::ResultLimit;

struct Budget {
    remaining: Option<usize>,
    exceeded: bool,
}

impl Budget {
    fn new(limit: &ResultLimit) -> Self {
        Budget {
            remaining: limit.limit,
            exceeded: false,
        }
    }

    fn take(&mut self) -> bool {
        match &mut self.remaining {
            Some(0) => {
                self.exceeded = true;
                false
            }
            Some(remaining) => {
                *remaining -= 1;
                true
            }
            None => true,
        }
    }
}

/// An entry in the outline before it is shaped into an LSP type.
struct Entry<'a> {
    name: String,
    detail: Option<String>,
    node: Option<&'a Node>,
    range: Range,
    selection_range: Range,
}

impl<'a> Entry<'a> {
    fn property(property: &'a Property) -> Self {
        let end = property.value.as_ref().map_or(property.key_range.end, |v| v.range.end);
        Entry {
            name: property.key.clone(),
            detail: None,
            node: property.value.as_ref(),
            range: Range::new(property.key_range.start, end),
            selection_range: property.key_range,
        }
    }

    fn item(index: usize, item: &'a Node) -> Self {
        let named = item.get("name").filter(|name| name.as_str().is_some());
        Entry {
            name: named.and_then(Node::as_str).map_or_else(|| index.to_string(), str::to_string),
            detail: item.get("action").and_then(Node::as_str).map(str::to_string),
            node: Some(item),
            range: item.range,
            selection_range: named.map_or(item.range, |name| name.range),
        }
    }

    fn kind(&self) -> SymbolKind {
        match self.node.map(|node| &node.kind) {
            Some(NodeKind::Object(_)) => SymbolKind::MODULE,
            Some(NodeKind::Array(_)) => SymbolKind::ARRAY,
            Some(NodeKind::Scalar(Value::String(_))) => SymbolKind::STRING,
            Some(NodeKind::Scalar(Value::Number(_))) => SymbolKind::NUMBER,
            Some(NodeKind::Scalar(Value::Bool(_))) => SymbolKind::BOOLEAN,
            _ => SymbolKind::VARIABLE,
        }
    }
}

fn entries(node: &Node) -> Vec<Entry<'_>> {
    match &node.kind {
        NodeKind::Object(properties) => properties.iter().map(Entry::property).collect(),
        NodeKind::Array(items) => items.iter().enumerate().map(|(i, item)| Entry::item(i, item)).collect(),
        NodeKind::Scalar(_) => Vec::new(),
    }
}

/// Hierarchical outline.
pub fn document_symbols2(model: &DocumentModel, limit: &ResultLimit) -> Vec<DocumentSymbol> {
    let Some(root) = &model.root else {
        return Vec::new();
    };
    let mut budget = Budget::new(limit);
    let symbols = nested(root, &mut budget);
    if budget.exceeded {
        limit.exceeded();
    }
    symbols
}

#[allow(deprecated)]
fn nested(node: &Node, budget: &mut Budget) -> Vec<DocumentSymbol> {
    let mut symbols = Vec::new();
    for entry in entries(node) {
        if !budget.take() {
            break;
        }
        let children = entry.node.map(|child| nested(child, budget)).filter(|c| !c.is_empty());
        symbols.push(DocumentSymbol {
            kind: entry.kind(),
            name: entry.name,
            detail: entry.detail,
            tags: None,
            deprecated: None,
            range: entry.range,
            selection_range: entry.selection_range,
            children,
        });
    }
    symbols
}

/// Flat outline; each symbol names its parent as container.
pub fn document_symbols(uri: &Url, model: &DocumentModel, limit: &ResultLimit) -> Vec<SymbolInformation> {
    let Some(root) = &model.root else {
        return Vec::new();
    };
    let mut budget = Budget::new(limit);
    let mut symbols = Vec::new();
    flat(uri, root, None, &mut budget, &mut symbols);
    if budget.exceeded {
        limit.exceeded();
    }
    symbols
}

#[allow(deprecated)]
fn flat(uri: &Url, node: &Node, container: Option<&str>, budget: &mut Budget, out: &mut Vec<SymbolInformation>) {
    for entry in entries(node) {
        if !budget.take() {
            return;
        }
        out.push(SymbolInformation {
            name: entry.name.clone(),
            kind: entry.kind(),
            tags: None,
            deprecated: None,
            location: Location::new(uri.clone(), entry.range),
            container_name: container.map(str::to_string),
        });
        if let Some(child) = entry.node {
            flat(uri, child, Some(&entry.name), budget, out);
        }
    }
}
