//! Pull `q <matrix> cm <path> Q` blocks out of decoded page content.

use std::fmt::Write;
use std::path::Path;

use lopdf::content::Operation;
use lopdf::{Document, Object};
use tracing::{debug, trace, warn};

use crate::analysis::{AnalysisWarning, RawBlock};
use crate::error::BlockError;
use crate::geo::{Affine, Rgb};
use crate::logging::PDF_CONTENT;

pub fn load_pdf<P: AsRef<Path>>(path: P) -> Result<Document, BlockError> {
    Ok(Document::load(path)?)
}

#[derive(Clone, Debug, Default)]
struct GraphicsState {
    ctm: Affine,
    fill: Option<Rgb>,
    stroke: Option<Rgb>,
}

/// Candidate block opened by `q` immediately followed by `cm`.
#[derive(Debug)]
struct OpenBlock {
    transform: Option<Affine>,
    commands: Vec<String>,
    draws: bool,
    fills: bool,
}

impl OpenBlock {
    fn new() -> Self {
        Self {
            transform: None,
            commands: Vec::new(),
            draws: false,
            fills: false,
        }
    }

    fn push(&mut self, op: &Operation) {
        self.draws |= matches!(op.operator.as_str(), "m" | "l" | "c" | "v" | "y" | "re");
        self.fills |= matches!(
            op.operator.as_str(),
            "f" | "F" | "f*" | "B" | "B*" | "b" | "b*"
        );
        self.commands.push(encode_operation(op));
    }

    fn finish(self, page: u32, gs: &GraphicsState) -> Option<RawBlock> {
        let transform = self.transform?;
        if !self.draws {
            return None;
        }
        let color = if self.fills { gs.fill } else { gs.stroke };
        Some(RawBlock {
            page,
            commands: self.commands.join("\n"),
            transform,
            color,
        })
    }
}

fn push_graphics_state(gs_stack: &mut Vec<GraphicsState>) {
    if let Some(current) = gs_stack.last() {
        gs_stack.push(current.clone());
    }
}

fn pop_graphics_state(gs_stack: &mut Vec<GraphicsState>) {
    if gs_stack.len() > 1 {
        gs_stack.pop();
    }
}

fn operand_as_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some(*f as f64),
        _ => None,
    }
}

fn operands_as_f32<const N: usize>(op: &Operation) -> Option<[f32; N]> {
    if op.operands.len() != N {
        return None;
    }
    let mut out = [0.0f32; N];
    for (slot, obj) in out.iter_mut().zip(&op.operands) {
        *slot = operand_as_f64(obj)? as f32;
    }
    Some(out)
}

fn matrix_from_operands(op: &Operation) -> Option<Affine> {
    if op.operands.len() != 6 {
        return None;
    }
    let mut m = [0.0; 6];
    for (slot, obj) in m.iter_mut().zip(&op.operands) {
        *slot = operand_as_f64(obj)?;
    }
    Some(Affine::from(m))
}

fn color_from_operands(op: &Operation) -> Option<Rgb> {
    match op.operator.as_str() {
        "g" | "G" => operands_as_f32::<1>(op).map(|[level]| Rgb::gray(level)),
        "rg" | "RG" => operands_as_f32::<3>(op).map(Rgb::from),
        "k" | "K" => operands_as_f32::<4>(op).map(|[c, m, y, k]| Rgb::from_cmyk(c, m, y, k)),
        // Component count picks the device space; patterns and other
        // non-numeric operands leave the colour unknown.
        "sc" | "scn" | "SC" | "SCN" => match op.operands.len() {
            1 => operands_as_f32::<1>(op).map(|[level]| Rgb::gray(level)),
            3 => operands_as_f32::<3>(op).map(Rgb::from),
            4 => operands_as_f32::<4>(op).map(|[c, m, y, k]| Rgb::from_cmyk(c, m, y, k)),
            _ => None,
        },
        // Selecting a device space resets the colour to black.
        "cs" | "CS" => match op.operands.first() {
            Some(Object::Name(name))
                if matches!(
                    name.as_slice(),
                    b"DeviceGray" | b"DeviceRGB" | b"DeviceCMYK"
                ) =>
            {
                Some(Rgb::BLACK)
            }
            _ => None,
        },
        _ => None,
    }
}

fn encode_operand(obj: &Object, out: &mut String) {
    match obj {
        Object::Integer(i) => {
            let _ = write!(out, "{}", i);
        }
        Object::Real(f) => {
            let _ = write!(out, "{}", f);
        }
        Object::Boolean(b) => {
            let _ = write!(out, "{}", b);
        }
        Object::Name(name) => {
            out.push('/');
            out.push_str(&String::from_utf8_lossy(name));
        }
        Object::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                encode_operand(item, out);
            }
            out.push(']');
        }
        Object::String(bytes, _) => {
            out.push('(');
            out.push_str(&String::from_utf8_lossy(bytes));
            out.push(')');
        }
        _ => out.push_str("null"),
    }
}

/// Serialize one operation back to content-stream text.
pub fn encode_operation(op: &Operation) -> String {
    let mut out = String::new();
    for operand in &op.operands {
        encode_operand(operand, &mut out);
        out.push(' ');
    }
    out.push_str(&op.operator);
    out
}

/// Leaf blocks on one page, in content order.
///
/// Nested `q`, a second `cm`, text objects, XObjects, inline images and
/// shadings inside a candidate disqualify it. Marked-content operators are
/// transparent.
pub fn extract_page_blocks(page: u32, operations: &[Operation]) -> Vec<RawBlock> {
    let mut gs_stack = vec![GraphicsState::default()];
    let mut open: Option<OpenBlock> = None;
    let mut blocks = Vec::new();

    for (i, op) in operations.iter().enumerate() {
        match op.operator.as_str() {
            "q" => {
                if open.take().is_some() {
                    trace!(target: PDF_CONTENT, page, op = i, "nested q, not a leaf block");
                }
                push_graphics_state(&mut gs_stack);
                if operations.get(i + 1).map(|next| next.operator == "cm") == Some(true) {
                    open = Some(OpenBlock::new());
                }
            }
            "Q" => {
                if let (Some(block), Some(gs)) = (open.take(), gs_stack.last()) {
                    if let Some(raw) = block.finish(page, gs) {
                        blocks.push(raw);
                    }
                }
                pop_graphics_state(&mut gs_stack);
            }
            "cm" => {
                let Some(matrix) = matrix_from_operands(op) else {
                    warn!(target: PDF_CONTENT, page, op = i, "malformed cm operands");
                    open = None;
                    continue;
                };
                let Some(gs) = gs_stack.last_mut() else {
                    continue;
                };
                gs.ctm = matrix.then(&gs.ctm);
                let ctm = gs.ctm;
                if let Some(block) = open.as_mut() {
                    if block.transform.is_none() && block.commands.is_empty() {
                        block.transform = Some(ctm);
                    } else {
                        open = None;
                    }
                }
            }
            "g" | "rg" | "k" | "sc" | "scn" | "cs" | "G" | "RG" | "K" | "SC" | "SCN" | "CS" => {
                let color = color_from_operands(op);
                if let Some(gs) = gs_stack.last_mut() {
                    if op.operator.chars().all(|c| c.is_ascii_lowercase()) {
                        gs.fill = color;
                    } else {
                        gs.stroke = color;
                    }
                }
                if let Some(block) = open.as_mut() {
                    block.push(op);
                }
            }
            "BMC" | "BDC" | "EMC" | "MP" | "DP" => {}
            "BT" | "ET" | "Tj" | "TJ" | "'" | "\"" | "Do" | "BI" | "ID" | "EI" | "sh" => {
                open = None;
            }
            _ => {
                if let Some(block) = open.as_mut() {
                    block.push(op);
                }
            }
        }
    }

    blocks
}

/// Blocks from every page in page order. Pages whose content cannot be
/// decoded are skipped with a warning.
pub fn extract_blocks(doc: &Document) -> (Vec<RawBlock>, Vec<AnalysisWarning>) {
    let mut blocks = Vec::new();
    let mut warnings = Vec::new();

    for (page, page_id) in doc.get_pages() {
        match doc.get_and_decode_page_content(page_id) {
            Ok(content) => {
                let page_blocks = extract_page_blocks(page, &content.operations);
                debug!(
                    target: PDF_CONTENT,
                    page,
                    operations = content.operations.len(),
                    blocks = page_blocks.len(),
                    "extracted drawing blocks"
                );
                blocks.extend(page_blocks);
            }
            Err(e) => {
                warn!(target: PDF_CONTENT, page, error = %e, "failed to decode page content");
                warnings.push(AnalysisWarning::UnreadablePage {
                    page,
                    reason: e.to_string(),
                });
            }
        }
    }

    (blocks, warnings)
}
