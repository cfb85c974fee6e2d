//! Diagnostics for SSM documents.
//!
//! Two sources feed the list:
//!
//! | Source | Range |
//! |--------|-------|
//! | Syntax issues from the parser | where the parser found them |
//! | Schema violations | the offending value, or the key of a container value |
//!
//! Comments and trailing commas in JSON are reported according to
//! [`ValidationSettings`]; everything else is always reported.

use itertools::Itertools;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};

use crate::model::{DocumentModel, IssueKind, Node, NodeKind, SyntaxIssue};
use crate::schema::{CompiledSchema, SchemaError};
use crate::service::{SeverityLevel, ValidationSettings};

const SOURCE: &str = "ssm";

pub fn diagnostics(schema: &CompiledSchema, model: &DocumentModel, settings: &ValidationSettings) -> Vec<Diagnostic> {
    let mut diagnostics = syntax_diagnostics(model, settings);
    if let (Some(root), Some(value)) = (&model.root, &model.value) {
        diagnostics.extend(
            schema
                .validator
                .validate(value)
                .iter()
                .map(|error| schema_diagnostic(root, error)),
        );
    }
    diagnostics
        .into_iter()
        .unique_by(|d| {
            (
                (d.range.start.line, d.range.start.character),
                (d.range.end.line, d.range.end.character),
                d.message.clone(),
            )
        })
        .collect()
}

pub fn syntax_diagnostics(model: &DocumentModel, settings: &ValidationSettings) -> Vec<Diagnostic> {
    model
        .issues
        .iter()
        .filter_map(|issue| {
            let level = match issue.kind {
                IssueKind::Syntax => SeverityLevel::Error,
                IssueKind::Comment => settings.comments,
                IssueKind::TrailingComma => settings.trailing_commas,
            };
            let severity = match level {
                SeverityLevel::Ignore => return None,
                SeverityLevel::Warning => DiagnosticSeverity::WARNING,
                SeverityLevel::Error => DiagnosticSeverity::ERROR,
            };
            Some(issue_diagnostic(issue, severity))
        })
        .collect()
}

fn issue_diagnostic(issue: &SyntaxIssue, severity: DiagnosticSeverity) -> Diagnostic {
    Diagnostic {
        range: issue.range,
        message: issue.message.clone(),
        source: Some(SOURCE.into()),
        severity: Some(severity),
        ..Default::default()
    }
}

fn schema_diagnostic(root: &Node, error: &SchemaError) -> Diagnostic {
    Diagnostic {
        range: pointer_range(root, &error.pointer),
        message: error.message.clone(),
        source: Some(SOURCE.into()),
        severity: Some(DiagnosticSeverity::WARNING),
        ..Default::default()
    }
}

/// Range reported for a violation at `pointer`.
///
/// Falls back to the deepest existing ancestor when the pointer leads
/// nowhere in the tree.
pub fn pointer_range(root: &Node, pointer: &str) -> Range {
    let mut pointer = pointer;
    loop {
        if let Some((node, key_range)) = root.find_pointer(pointer) {
            return match (&node.kind, key_range) {
                (NodeKind::Scalar(_), _) => node.range,
                (_, Some(key_range)) => key_range,
                _ if pointer.is_empty() => root_range(root),
                _ => opening_range(node),
            };
        }
        match pointer.rfind('/') {
            Some(slash) => pointer = &pointer[..slash],
            None => return root_range(root),
        }
    }
}

fn root_range(root: &Node) -> Range {
    match root.properties().first() {
        Some(first) => first.key_range,
        None => opening_range(root),
    }
}

fn opening_range(node: &Node) -> Range {
    let start = node.range.start;
    let end = if node.range.end.line == start.line {
        node.range.end
    } else {
        Position::new(start.line, start.character + 1)
    };
    Range::new(start, end)
}
