//! Canonical signatures for path-drawing command blocks.
//!
//! A block such as `0 0 m\n10.50 0 l  10.5 10 l h S` becomes
//! `0 0 m 10.5 0 l 10.5 10 l h S`: one space between tokens and every
//! numeric operand in its shortest decimal spelling. Two blocks that draw
//! the same geometry with the same operators then compare equal as strings.

use once_cell::sync::Lazy;
use regex::Regex;
use smallvec::SmallVec;

use crate::config::MatchStrictness;
use crate::error::ParseError;
use crate::geo::{Point, Rect};

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)$").expect("number pattern compiles"));

const CLOSING_OPERATORS: &[&str] = &["h", "re", "s", "f", "F", "f*", "b", "B", "b*", "B*"];

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBlock {
    pub signature: String,
    /// Envelope of all path points in the block's own coordinate space.
    pub local_bbox: Rect,
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    Exact(usize),
    Any,
}

#[derive(Debug, Clone, Copy)]
struct OperatorSpec {
    arity: Arity,
    numeric: bool,
    draws: bool,
}

const fn spec(arity: Arity, numeric: bool, draws: bool) -> OperatorSpec {
    OperatorSpec {
        arity,
        numeric,
        draws,
    }
}

fn operator_spec(operator: &str) -> OperatorSpec {
    use Arity::*;
    match operator {
        "m" | "l" => spec(Exact(2), true, true),
        "c" => spec(Exact(6), true, true),
        "v" | "y" | "re" => spec(Exact(4), true, true),
        "h" | "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" | "n" | "W" | "W*" => {
            spec(Exact(0), true, false)
        }
        "w" | "J" | "j" | "M" | "g" | "G" | "i" => spec(Exact(1), true, false),
        "rg" | "RG" => spec(Exact(3), true, false),
        "k" | "K" => spec(Exact(4), true, false),
        "d" => spec(Exact(2), false, false),
        "gs" | "ri" | "cs" | "CS" => spec(Exact(1), false, false),
        _ => spec(Any, false, false),
    }
}

#[derive(Debug, Clone)]
struct Operand {
    text: String,
    value: Option<f64>,
}

/// Splits on whitespace and around array delimiters.
fn tokenize(commands: &str) -> impl Iterator<Item = &str> {
    commands.split_whitespace().flat_map(|word| {
        let mut pieces: SmallVec<[&str; 4]> = SmallVec::new();
        let mut start = 0;
        for (i, ch) in word.char_indices() {
            if ch == '[' || ch == ']' {
                if start < i {
                    pieces.push(&word[start..i]);
                }
                pieces.push(&word[i..i + 1]);
                start = i + 1;
            }
        }
        if start < word.len() {
            pieces.push(&word[start..]);
        }
        pieces.into_iter()
    })
}

pub fn is_number(token: &str) -> bool {
    NUMBER.is_match(token)
}

fn strip_decimal(token: &str) -> String {
    let (negative, unsigned) = match token.as_bytes().first() {
        Some(b'-') => (true, &token[1..]),
        Some(b'+') => (false, &token[1..]),
        _ => (false, token),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let int_part = int_part.trim_start_matches('0');
    let frac_part = frac_part.trim_end_matches('0');

    let mut out = String::with_capacity(token.len());
    if negative && !(int_part.is_empty() && frac_part.is_empty()) {
        out.push('-');
    }
    out.push_str(if int_part.is_empty() { "0" } else { int_part });
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

/// Canonical spelling of a numeric token, `None` if `token` is not a number.
///
/// Under [`MatchStrictness::Exact`] only the spelling changes (sign, leading
/// and trailing zeros), never the value.
pub fn canonical_number(token: &str, strictness: MatchStrictness) -> Option<String> {
    if !is_number(token) {
        return None;
    }
    match strictness {
        MatchStrictness::Exact => Some(strip_decimal(token)),
        MatchStrictness::Tolerant { decimals } => {
            let value: f64 = token.parse().ok()?;
            Some(strip_decimal(&format!("{:.*}", decimals as usize, value)))
        }
    }
}

pub fn is_closed(signature: &str) -> bool {
    signature
        .split_whitespace()
        .any(|token| CLOSING_OPERATORS.contains(&token))
}

fn path_points(operator: &str, values: &[f64]) -> SmallVec<[Point; 3]> {
    match (operator, values) {
        ("re", [x, y, w, h]) => {
            SmallVec::from_slice(&[Point::new(*x, *y), Point::new(x + w, y + h)])
        }
        (_, values) => values
            .chunks_exact(2)
            .map(|xy| Point::new(xy[0], xy[1]))
            .collect(),
    }
}

/// Normalize one block of drawing commands into its dedup signature.
pub fn normalize(
    commands: &str,
    strictness: MatchStrictness,
) -> Result<NormalizedBlock, ParseError> {
    let mut parts: Vec<String> = Vec::new();
    let mut operands: SmallVec<[Operand; 6]> = SmallVec::new();
    let mut arrays: Vec<Vec<String>> = Vec::new();
    let mut points: Vec<Point> = Vec::new();
    let mut closed = false;

    for token in tokenize(commands) {
        if token == "[" {
            arrays.push(Vec::new());
            continue;
        }
        if token == "]" {
            let items = arrays.pop().ok_or(ParseError::UnbalancedArray)?;
            let text = format!("[{}]", items.join(" "));
            match arrays.last_mut() {
                Some(outer) => outer.push(text),
                None => operands.push(Operand { text, value: None }),
            }
            continue;
        }

        if is_number(token) && !token.parse::<f64>().is_ok_and(f64::is_finite) {
            return Err(ParseError::NonFiniteOperand(token.to_string()));
        }
        let number = canonical_number(token, strictness);
        if let Some(items) = arrays.last_mut() {
            items.push(number.unwrap_or_else(|| token.to_string()));
            continue;
        }
        if let Some(text) = number {
            let value = text.parse().ok();
            operands.push(Operand { text, value });
            continue;
        }
        if token.starts_with('/') {
            operands.push(Operand {
                text: token.to_string(),
                value: None,
            });
            continue;
        }

        let operator = token;
        let spec = operator_spec(operator);
        if let Arity::Exact(expected) = spec.arity {
            if operands.len() != expected {
                return Err(ParseError::Arity {
                    operator: operator.to_string(),
                    expected,
                    found: operands.len(),
                });
            }
        }
        if spec.numeric {
            if let Some(bad) = operands.iter().find(|o| o.value.is_none()) {
                return Err(ParseError::NonNumericOperand {
                    operator: operator.to_string(),
                    operand: bad.text.clone(),
                });
            }
        }
        if spec.draws {
            let values: SmallVec<[f64; 6]> = operands.iter().filter_map(|o| o.value).collect();
            points.extend(path_points(operator, &values));
        }
        closed |= CLOSING_OPERATORS.contains(&operator);

        for operand in operands.drain(..) {
            parts.push(operand.text);
        }
        parts.push(operator.to_string());
    }

    if !arrays.is_empty() {
        return Err(ParseError::UnbalancedArray);
    }
    if !operands.is_empty() {
        return Err(ParseError::Truncated(operands.len()));
    }
    if parts.is_empty() {
        return Err(ParseError::Empty);
    }
    let local_bbox = Rect::enclosing(points).ok_or(ParseError::NoGeometry)?;

    Ok(NormalizedBlock {
        signature: parts.join(" "),
        local_bbox,
        closed,
    })
}
