//! Error types for blockscan.
//!
//! `ParseError` is local to one command block and never aborts a run.
//! `ConfigError` and `BlockError::Invariant` are fatal and stop the pipeline
//! before any output is produced.

use thiserror::Error;

/// Why a single drawing-command block could not be normalized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command block")]
    Empty,

    #[error("operator `{operator}` expects {expected} operands, got {found}")]
    Arity {
        operator: String,
        expected: usize,
        found: usize,
    },

    #[error("operator `{operator}` has a non-numeric operand `{operand}`")]
    NonNumericOperand { operator: String, operand: String },

    #[error("truncated block: {0} operand(s) without an operator")]
    Truncated(usize),

    #[error("numeric operand `{0}` does not fit a finite float")]
    NonFiniteOperand(String),

    #[error("unbalanced array delimiter")]
    UnbalancedArray,

    #[error("block draws no path geometry")]
    NoGeometry,
}

/// Rejected configuration values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("search radius must be a positive finite number, got {0}")]
    SearchRadius(f64),

    #[error("quantization tolerance must be a positive finite number, got {0}")]
    QuantizationTolerance(f64),

    #[error("minimum support must be at least 1")]
    MinSupport,

    #[error("minimum group size must be at least 2, got {0}")]
    MinGroupSize(usize),

    #[error("minimum shape repeats must be at least 1")]
    MinShapeRepeats,

    #[error("tolerant matching supports at most {max} decimals, got {found}")]
    Decimals { max: u8, found: u8 },
}

/// Top-level error for a document run.
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("registry invariant violated: {0}")]
    Invariant(String),

    #[error("pdf error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = BlockError> = std::result::Result<T, E>;
