pub mod analysis;
pub mod cluster;
pub mod config;
pub mod content;
pub mod error;
pub mod geo;
pub mod grouping;
pub mod logging;
pub mod normalize;
pub mod registry;
pub mod spatial;
pub mod transform;

use std::path::Path;

use lopdf::Document;
use tracing::info;

pub use crate::analysis::{analyze_blocks, AnalysisWarning, DocumentAnalysis, RawBlock};
pub use crate::config::{AnalysisConfig, MatchStrictness};
pub use crate::error::{BlockError, ConfigError, ParseError};
use crate::content::{extract_blocks, load_pdf};
use crate::logging::PDF_CONTENT;

/// Recover repeated blocks and block groups from an in-memory PDF.
///
/// # Arguments
/// * `pdf_bytes` - The PDF file contents as bytes
/// * `config` - Matching and clustering parameters, validated before parsing
pub fn analyze_pdf(pdf_bytes: &[u8], config: &AnalysisConfig) -> Result<DocumentAnalysis, BlockError> {
    config.validate()?;
    let doc = Document::load_mem(pdf_bytes)?;
    analyze_document(&doc, config)
}

/// Same as [`analyze_pdf`], reading from `path` and recording its file name.
pub fn analyze_pdf_file<P: AsRef<Path>>(
    path: P,
    config: &AnalysisConfig,
) -> Result<DocumentAnalysis, BlockError> {
    config.validate()?;
    let path = path.as_ref();
    let doc = load_pdf(path)?;
    let analysis = analyze_document(&doc, config)?;
    Ok(match path.file_name() {
        Some(name) => analysis.with_source(name.to_string_lossy()),
        None => analysis,
    })
}

pub fn analyze_document(doc: &Document, config: &AnalysisConfig) -> Result<DocumentAnalysis, BlockError> {
    let (blocks, mut warnings) = extract_blocks(doc);
    info!(target: PDF_CONTENT, blocks = blocks.len(), "content streams read");

    let mut analysis = analyze_blocks(&blocks, config)?;
    analysis.metadata.pages = doc.get_pages().len();
    warnings.append(&mut analysis.warnings);
    analysis.warnings = warnings;
    Ok(analysis)
}
