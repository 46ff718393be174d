//! Pipeline driver: bytes in, compressed bytes and size metrics out
//!
//! A run moves through `Idle -> Parsing -> Rebuilding -> Serializing -> Done`.
//! Any fatal error ends the run; per-image problems never do, they are
//! returned in [`PipelineResult::diagnostics`].

use crate::compress::DocumentRebuilder;
use crate::config::CompressionSettings;
use crate::error::PipelineError;
use crate::model::{Diagnostics, SourceDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Parsing,
    Rebuilding,
    Serializing,
    Done,
}

/// Output of a successful run
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub output_bytes: Vec<u8>,
    pub original_size_bytes: usize,
    /// Length of the fully serialized output
    pub compressed_size_bytes: usize,
    pub page_count: usize,
    pub diagnostics: Diagnostics,
}

impl PipelineResult {
    /// Bytes saved, zero if the output grew
    pub fn bytes_saved(&self) -> usize {
        self.original_size_bytes
            .saturating_sub(self.compressed_size_bytes)
    }

    /// Size reduction in percent; negative when the output is larger
    pub fn reduction_percent(&self) -> f64 {
        if self.original_size_bytes == 0 {
            return 0.0;
        }
        let original = self.original_size_bytes as f64;
        (original - self.compressed_size_bytes as f64) / original * 100.0
    }
}

/// Compress a PDF held in memory.
///
/// `content_stream_level` is the lossless level (0-9), `image_quality` the
/// lossy image target (0-100, where 100 leaves images untouched).
pub fn run(
    input: &[u8],
    content_stream_level: u8,
    image_quality: u8,
) -> Result<PipelineResult, PipelineError> {
    let settings = CompressionSettings::new(content_stream_level, image_quality)?;
    run_with_settings(input, &settings)
}

/// Compress a PDF held in memory with fully specified settings
pub fn run_with_settings(
    input: &[u8],
    settings: &CompressionSettings,
) -> Result<PipelineResult, PipelineError> {
    let mut stage = Stage::Idle;
    let original_size_bytes = input.len();

    enter(&mut stage, Stage::Parsing);
    let source = SourceDocument::load(input)?;
    log::info!(
        "Parsed {} pages from {} byte PDF (version {})",
        source.page_count(),
        original_size_bytes,
        source.version()
    );

    enter(&mut stage, Stage::Rebuilding);
    let rebuilder = DocumentRebuilder::new(*settings);
    let (mut output, report) = rebuilder.rebuild(&source);
    debug_assert_eq!(output.page_count(), source.page_count());

    enter(&mut stage, Stage::Serializing);
    let output_bytes = output.to_bytes()?;
    let compressed_size_bytes = output_bytes.len();

    enter(&mut stage, Stage::Done);
    log::info!(
        "Compressed {} -> {} bytes ({} images recoded, {} skipped, {} failed)",
        original_size_bytes,
        compressed_size_bytes,
        report.diagnostics.recoded(),
        report.diagnostics.skipped(),
        report.diagnostics.failed()
    );

    Ok(PipelineResult {
        output_bytes,
        original_size_bytes,
        compressed_size_bytes,
        page_count: report.pages,
        diagnostics: report.diagnostics,
    })
}

fn enter(stage: &mut Stage, next: Stage) {
    log::debug!("Pipeline stage {:?} -> {:?}", stage, next);
    *stage = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    fn result(original: usize, compressed: usize) -> PipelineResult {
        PipelineResult {
            output_bytes: Vec::new(),
            original_size_bytes: original,
            compressed_size_bytes: compressed,
            page_count: 0,
            diagnostics: Diagnostics::new(),
        }
    }

    #[test]
    fn test_reduction_metrics() {
        let shrunk = result(1000, 250);
        assert_eq!(shrunk.bytes_saved(), 750);
        assert!((shrunk.reduction_percent() - 75.0).abs() < 1e-9);

        let grown = result(100, 120);
        assert_eq!(grown.bytes_saved(), 0);
        assert!((grown.reduction_percent() + 20.0).abs() < 1e-9);

        assert_eq!(result(0, 10).reduction_percent(), 0.0);
    }

    #[test]
    fn test_invalid_settings_fail_before_parsing() {
        let err = run(b"%PDF-1.4", 12, 50).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidSettings(ConfigError::ContentLevelOutOfRange(12))
        ));
        assert_eq!(err.stage(), Stage::Idle);
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        let err = run(b"this is not a pdf", 9, 75).unwrap_err();
        assert!(matches!(err, PipelineError::DocumentParse(_)));
        assert_eq!(err.stage(), Stage::Parsing);
    }

    #[test]
    fn test_empty_input_is_a_parse_error() {
        assert!(matches!(
            run(&[], 9, 75),
            Err(PipelineError::DocumentParse(_))
        ));
    }
}
