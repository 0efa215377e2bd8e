use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use blockscan::{analyze_pdf_file, AnalysisConfig, MatchStrictness};

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about,
    long_about = "Recover repeated CAD blocks and block groups from PDF drawings.",
    arg_required_else_help = true
)]
pub struct Args {
    /// Path to the PDF file to process
    pub pdf_path: String,

    /// Optional output file path. If omitted, writes to stdout.
    #[clap(short, long)]
    pub output: Option<String>,

    /// Pretty print the JSON output
    #[clap(short, long)]
    pub pretty: bool,

    /// JSON file with analysis settings; flags below override it
    #[clap(short, long)]
    pub config: Option<String>,

    /// Neighbourhood search radius in user-space units
    #[clap(long)]
    pub radius: Option<f64>,

    /// Displacement quantization bucket width
    #[clap(long)]
    pub tolerance: Option<f64>,

    /// Instance pairs needed before a relative signature is accepted
    #[clap(long)]
    pub min_support: Option<u32>,

    /// Smallest group emitted
    #[clap(long)]
    pub min_group_size: Option<usize>,

    /// Match operands rounded to this many decimals instead of exactly
    #[clap(long)]
    pub decimals: Option<u8>,

    /// Enable debug logging for every pipeline stage
    #[clap(long)]
    pub debug_ops: bool,

    /// Directory for the debug log file
    #[clap(long)]
    pub log_dir: Option<String>,
}

fn expand(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).with_context(|| format!("expanding {}", path))?;
    Ok(PathBuf::from(expanded.into_owned()))
}

impl Args {
    fn analysis_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let path = expand(path)?;
                AnalysisConfig::from_path(&path)
                    .with_context(|| format!("loading config {}", path.display()))?
            }
            None => AnalysisConfig::default(),
        };
        if let Some(radius) = self.radius {
            config.search_radius = radius;
        }
        if let Some(tolerance) = self.tolerance {
            config.quantization_tolerance = tolerance;
        }
        if let Some(min_support) = self.min_support {
            config.min_support = min_support;
        }
        if let Some(min_group_size) = self.min_group_size {
            config.min_group_size = min_group_size;
        }
        if let Some(decimals) = self.decimals {
            config.strictness = MatchStrictness::Tolerant { decimals };
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let _guard = match &args.log_dir {
        Some(dir) => blockscan::logging::init_logging_with_dir(args.debug_ops, expand(dir)?)?,
        None => blockscan::logging::init_logging(args.debug_ops),
    };

    let config = args.analysis_config()?;
    let pdf_path = expand(&args.pdf_path)?;
    let analysis = analyze_pdf_file(&pdf_path, &config)
        .with_context(|| format!("analyzing {}", pdf_path.display()))?;
    let json = analysis.to_json(args.pretty)?;

    match &args.output {
        Some(path) => {
            let path = expand(path)?;
            fs::write(&path, json)?;
            info!("Output written to: {}", path.display());
        }
        None => println!("{}", json),
    }

    let meta = &analysis.metadata;
    info!(
        pages = meta.pages,
        shapes = meta.unique_shapes,
        instances = meta.total_instances,
        group_types = meta.group_types,
        groups = meta.group_instances,
        warnings = analysis.warnings.len(),
        "analysis complete"
    );
    Ok(())
}
