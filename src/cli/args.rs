use clap::Parser;
use std::path::PathBuf;

use crate::config::defaults::{
    DEFAULT_CONTENT_STREAM_LEVEL, DEFAULT_FALLBACK_THRESHOLD, DEFAULT_IMAGE_QUALITY,
};

#[derive(Parser, Debug)]
#[command(name = "pdf-shrink")]
#[command(
    author,
    version,
    about = "Reduce PDF file size by recompressing content streams and images"
)]
pub struct Args {
    /// Input PDF file path
    #[arg(required = true)]
    pub input: PathBuf,

    /// Output PDF file path (defaults to <input>-compressed.pdf)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Lossless content stream compression level (0 = passthrough, 9 = maximum)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONTENT_STREAM_LEVEL, value_parser = clap::value_parser!(u8).range(0..=9))]
    pub level: u8,

    /// Image quality (0 = smallest file, 100 = leave images untouched)
    #[arg(short = 'q', long, default_value_t = DEFAULT_IMAGE_QUALITY, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub quality: u8,

    /// Quality at or below which non-photographic images are converted to JPEG
    #[arg(long, default_value_t = DEFAULT_FALLBACK_THRESHOLD, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub fallback_threshold: u8,

    /// Overwrite the output file if it already exists
    #[arg(short, long)]
    pub force: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Get the output path, defaulting to `<stem>-compressed.pdf` next to the input
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let stem = self
                .input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "output".to_string());
            self.input.with_file_name(format!("{}-compressed.pdf", stem))
        })
    }

    /// Log level selected by the `-v` count
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        }
    }
}

/// Format a byte count as megabytes with two decimals
pub fn format_megabytes(bytes: usize) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}
