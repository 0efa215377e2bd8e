use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Once;

use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    filter::EnvFilter, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

// Log targets
pub const BLOCK_PARSE: &str = "block_parse";
pub const SHAPE_REGISTRY: &str = "shape_registry";
pub const SPATIAL_INDEX: &str = "spatial_index";
pub const RELATIVE_SIGNATURES: &str = "relative_signatures";
pub const GROUPING: &str = "grouping";
pub const PDF_CONTENT: &str = "pdf_content";

const DEBUG_TARGETS: &[&str] = &[
    BLOCK_PARSE,
    SHAPE_REGISTRY,
    SPATIAL_INDEX,
    RELATIVE_SIGNATURES,
    GROUPING,
    PDF_CONTENT,
];

static INIT: Once = Once::new();

fn debug_filter(level: &str) -> EnvFilter {
    DEBUG_TARGETS
        .iter()
        .fold(EnvFilter::new("warn"), |filter, target| {
            match format!("{}={}", target, level).parse() {
                Ok(directive) => filter.add_directive(directive),
                Err(_) => filter,
            }
        })
}

fn console_filter(debug_ops: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug_ops {
            debug_filter("debug")
        } else {
            EnvFilter::new("info")
        }
    })
}

/// Log to stderr, keeping stdout free for JSON output. `RUST_LOG` wins over
/// `debug_ops` when set.
pub fn init_logging(debug_ops: bool) -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(writer)
                    .with_filter(console_filter(debug_ops)),
            )
            .init();
    });

    guard
}

/// Log to stderr and write the pipeline targets to `blockscan-debug.log` in `log_dir`.
pub fn init_logging_with_dir(debug_ops: bool, log_dir: PathBuf) -> io::Result<WorkerGuard> {
    fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::NEVER, log_dir, "blockscan-debug.log");
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(non_blocking_appender)
        .with_filter(debug_filter(if debug_ops { "trace" } else { "debug" }));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(io::stderr)
        .with_filter(console_filter(debug_ops));

    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(file_layer)
            .with(console_layer)
            .init();
    });

    Ok(guard)
}
