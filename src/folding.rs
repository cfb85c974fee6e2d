//! Folding ranges from the document tree.
//!
//! Any object, array or multi-line scalar that spans more than one line
//! folds. In JSON the fold ends on the line before the closing bracket; in
//! YAML it starts at the key or item line and runs to the last content line.

use tower_lsp::lsp_types::FoldingRange;

use crate::document::Encoding;
use crate::model::{DocumentModel, Node, NodeKind};
use crate::service::ResultLimit;

pub fn folding_ranges(model: &DocumentModel, limit: &ResultLimit) -> Vec<FoldingRange> {
    let Some(root) = &model.root else {
        return Vec::new();
    };
    let mut ranges = Vec::new();
    if model.encoding == Encoding::Structured {
        push_fold(&mut ranges, model.encoding, root.range.start.line, root);
    }
    collect(root, model.encoding, &mut ranges);

    ranges.sort_by_key(|range| (range.start_line, std::cmp::Reverse(range.end_line)));
    ranges.dedup_by_key(|range| range.start_line);
    limit.apply(&mut ranges);
    ranges
}

fn collect(node: &Node, encoding: Encoding, out: &mut Vec<FoldingRange>) {
    match &node.kind {
        NodeKind::Object(properties) => {
            for property in properties {
                if let Some(value) = &property.value {
                    let start = match encoding {
                        Encoding::Structured => value.range.start.line,
                        Encoding::Indented => property.key_range.start.line,
                    };
                    push_fold(out, encoding, start, value);
                    collect(value, encoding, out);
                }
            }
        }
        NodeKind::Array(items) => {
            for item in items {
                push_fold(out, encoding, item.range.start.line, item);
                collect(item, encoding, out);
            }
        }
        NodeKind::Scalar(_) => {}
    }
}

fn push_fold(out: &mut Vec<FoldingRange>, encoding: Encoding, start_line: u32, node: &Node) {
    let end_line = match (encoding, &node.kind) {
        (Encoding::Structured, NodeKind::Object(_) | NodeKind::Array(_)) => node.range.end.line.saturating_sub(1),
        _ => node.range.end.line,
    };
    if end_line > start_line {
        out.push(FoldingRange {
            start_line,
            end_line,
            ..Default::default()
        });
    }
}
