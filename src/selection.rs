//! Selection ranges: expand from the innermost value outwards.
//!
//! A property contributes two levels, its value and then `key: value`.

use tower_lsp::lsp_types::{Position, Range, SelectionRange};

use crate::model::{DocumentModel, Segment};

pub fn selection_ranges(model: &DocumentModel, positions: &[Position]) -> Vec<SelectionRange> {
    positions.iter().map(|&position| selection_range(model, position)).collect()
}

fn selection_range(model: &DocumentModel, position: Position) -> SelectionRange {
    let ranges = enclosing_ranges(model, position);
    let mut selection: Option<SelectionRange> = None;
    for range in ranges {
        if selection.as_ref().is_some_and(|s| s.range == range) {
            continue;
        }
        selection = Some(SelectionRange {
            range,
            parent: selection.map(Box::new),
        });
    }
    selection.unwrap_or(SelectionRange {
        range: Range::new(position, position),
        parent: None,
    })
}

/// Outermost first.
fn enclosing_ranges(model: &DocumentModel, position: Position) -> Vec<Range> {
    let Some(path) = model.path_at(position) else {
        return Vec::new();
    };
    let mut ranges = Vec::new();
    for (depth, node) in path.nodes.iter().enumerate() {
        ranges.push(node.range);
        let Some(Segment::Key(key)) = path.segments.get(depth) else {
            continue;
        };
        let Some(property) = node.properties().iter().find(|p| &p.key == key) else {
            continue;
        };
        let end = property.value.as_ref().map_or(property.key_range.end, |v| v.range.end);
        ranges.push(Range::new(property.key_range.start, end));
    }
    if let Some(key_range) = path.key_range {
        ranges.push(key_range);
    }
    ranges
}
