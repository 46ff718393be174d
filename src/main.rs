use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::Path;

use pdf_shrink::cli::{format_megabytes, Args};
use pdf_shrink::config::CompressionSettings;
use pdf_shrink::pipeline::run_with_settings;

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level())
        .init();

    let output_path = args.output_path();
    check_output_path(&args.input, &output_path, args.force)?;

    // Build settings before touching the input so bad flags fail fast
    let settings = CompressionSettings::from_args(&args)
        .with_context(|| "Invalid compression settings")?;

    // Read input file
    let input = fs::read(&args.input)
        .with_context(|| format!("Failed to read input file: {}", args.input.display()))?;

    log::info!(
        "Compressing {} (content level {}, image quality {})",
        args.input.display(),
        settings.content_stream_level(),
        settings.image_quality()
    );

    let result = run_with_settings(&input, &settings)
        .with_context(|| format!("Failed to compress {}", args.input.display()))?;

    // Write output
    fs::write(&output_path, &result.output_bytes)
        .with_context(|| format!("Failed to write output file: {}", output_path.display()))?;

    for warning in result.diagnostics.warnings() {
        eprintln!("warning: {}", warning);
    }

    println!("Original size:   {}", format_megabytes(result.original_size_bytes));
    println!("Compressed size: {}", format_megabytes(result.compressed_size_bytes));
    println!("Reduction:       {:.1}%", result.reduction_percent());
    println!(
        "Successfully wrote {} pages to {}",
        result.page_count,
        output_path.display()
    );

    Ok(())
}

/// Refuse to clobber the input, or an existing output unless forced
fn check_output_path(input: &Path, output: &Path, force: bool) -> Result<()> {
    if !output.exists() {
        return Ok(());
    }

    let same_file = match (fs::canonicalize(input), fs::canonicalize(output)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if same_file {
        anyhow::bail!(
            "Output path {} is the input file; choose a different output",
            output.display()
        );
    }
    if !force {
        anyhow::bail!(
            "Output file {} already exists (use --force to overwrite)",
            output.display()
        );
    }
    Ok(())
}
