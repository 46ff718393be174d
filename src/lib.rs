pub mod cli;
pub mod compress;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;

pub use config::CompressionSettings;
pub use error::{ConfigError, ImageRecodeError, PipelineError};
pub use model::{Diagnostic, Diagnostics, ImageOutcome};
pub use pipeline::{run, run_with_settings, PipelineResult, Stage};

/// High-level API for shrinking a PDF file held in memory.
///
/// This is the recommended entry point for library consumers. Content streams
/// are recompressed losslessly at `settings.content_stream_level()`, embedded
/// images are recoded at `settings.image_quality()`, and duplicate objects are
/// merged before the document is serialized.
///
/// Image problems never fail the call. Inspect
/// [`PipelineResult::diagnostics`] to find out which images were recoded,
/// skipped or left untouched after an error.
///
/// # Arguments
///
/// * `input` - Raw bytes of the source PDF
/// * `settings` - Validated compression settings
///
/// # Returns
///
/// The compressed document and size metrics, or a PipelineError if the input
/// cannot be parsed or the output cannot be written.
///
/// # Example
///
/// ```no_run
/// use pdf_shrink::{compress_pdf, CompressionSettings};
///
/// let input = std::fs::read("scan.pdf").unwrap();
/// let settings = CompressionSettings::new(9, 50).unwrap();
///
/// let result = compress_pdf(&input, &settings).unwrap();
/// for warning in result.diagnostics.warnings() {
///     eprintln!("{}", warning);
/// }
///
/// std::fs::write("scan-compressed.pdf", &result.output_bytes).unwrap();
/// ```
pub fn compress_pdf(
    input: &[u8],
    settings: &CompressionSettings,
) -> Result<PipelineResult, PipelineError> {
    run_with_settings(input, settings)
}
