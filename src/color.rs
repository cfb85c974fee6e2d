//! Hex color strings (`"#rgb"`, `"#rrggbb"`, with optional alpha) in JSON documents.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tower_lsp::lsp_types::{Color, ColorInformation, ColorPresentation, Range, TextEdit};

use crate::model::{walk, DocumentModel, NodeKind};
use crate::service::ResultLimit;

static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#([0-9A-Fa-f]{3,4}|[0-9A-Fa-f]{6}|[0-9A-Fa-f]{8})$").expect("valid regex"));

pub fn document_colors(model: &DocumentModel, limit: &ResultLimit) -> Vec<ColorInformation> {
    let Some(root) = &model.root else {
        return Vec::new();
    };
    let mut colors = Vec::new();
    walk(root, &mut Vec::new(), &mut |node, _| {
        if let NodeKind::Scalar(Value::String(text)) = &node.kind {
            if let Some(color) = parse_hex(text) {
                colors.push(ColorInformation {
                    range: node.range,
                    color,
                });
            }
        }
        true
    });
    limit.apply(&mut colors);
    colors
}

pub fn color_presentations(color: Color, range: Range) -> Vec<ColorPresentation> {
    let label = to_hex(color);
    vec![ColorPresentation {
        text_edit: Some(TextEdit::new(range, format!("\"{label}\""))),
        label,
        additional_text_edits: None,
    }]
}

fn parse_hex(text: &str) -> Option<Color> {
    if !HEX_COLOR.is_match(text) {
        return None;
    }
    let digits: Vec<u8> = text[1..]
        .chars()
        .filter_map(|c| c.to_digit(16))
        .map(|d| d as u8)
        .collect();
    let channels: Vec<u8> = match digits.len() {
        3 | 4 => digits.iter().map(|d| d * 17).collect(),
        _ => digits.chunks(2).map(|pair| pair[0] * 16 + pair[1]).collect(),
    };
    let channel = |i: usize| channels.get(i).map_or(1.0, |&c| f32::from(c) / 255.0);
    Some(Color {
        red: channel(0),
        green: channel(1),
        blue: channel(2),
        alpha: channel(3),
    })
}

fn to_hex(color: Color) -> String {
    let byte = |channel: f32| (channel.clamp(0.0, 1.0) * 255.0).round() as u8;
    let rgb = format!("#{:02x}{:02x}{:02x}", byte(color.red), byte(color.green), byte(color.blue));
    if color.alpha >= 1.0 {
        rgb
    } else {
        format!("{rgb}{:02x}", byte(color.alpha))
    }
}
