//! Hover provider for SSM documents.
//!
//! | Target | Shows |
//! |--------|-------|
//! | Property key | `description` of the property schema |
//! | Scalar value | `description` of the value's schema |
//! | `action` value of a step | description of the action's fragment |
//!
//! Hovering inside an object or array body shows nothing.

use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position, Range};

use crate::model::{DocumentModel, NodeKind, Segment};
use crate::schema::{self, DocumentSchema};

pub fn hover(schema: &DocumentSchema, model: &DocumentModel, position: Position) -> Option<Hover> {
    let path = model.path_at(position)?;

    let (description, range) = match path.key_range {
        Some(key_range) => (
            schema::description(&schema.schemas_at(&path.segments, model.value.as_ref())),
            key_range,
        ),
        None => {
            let node = path.innermost()?;
            let NodeKind::Scalar(value) = &node.kind else {
                return None;
            };
            let description = value
                .as_str()
                .filter(|_| is_step_action(&path.segments))
                .and_then(|action| schema.registry().lookup(action))
                .and_then(|action| action.schema.get("description"))
                .and_then(|d| d.as_str())
                .or_else(|| schema::description(&schema.schemas_at(&path.segments, model.value.as_ref())));
            (description, node.range)
        }
    };

    description.map(|description| markdown_hover(description, range))
}

/// `mainSteps/<i>/action`
pub(crate) fn is_step_action(segments: &[Segment]) -> bool {
    matches!(
        segments,
        [Segment::Key(steps), Segment::Index(_), Segment::Key(action)] if steps == "mainSteps" && action == "action"
    )
}

fn markdown_hover(text: &str, range: Range) -> Hover {
    Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: text.to_string(),
        }),
        range: Some(range),
    }
}
