//! Whole-document rebuild: every page in order, then object table cleanup

use crate::config::CompressionSettings;
use crate::model::{Diagnostics, OutputDocument, SourceDocument};

use super::helpers::{optimize, OptimizeStats};
use super::page_rewriter::PageRewriter;

/// Summary of a rebuild
#[derive(Debug, Clone, Default)]
pub struct RebuildReport {
    pub pages: usize,
    pub streams_recompressed: usize,
    pub optimize: OptimizeStats,
    pub diagnostics: Diagnostics,
}

pub struct DocumentRebuilder {
    rewriter: PageRewriter,
}

impl DocumentRebuilder {
    pub fn new(settings: CompressionSettings) -> Self {
        Self {
            rewriter: PageRewriter::new(settings),
        }
    }

    /// Build the output document from `source`, one page at a time
    pub fn rebuild(&self, source: &SourceDocument) -> (OutputDocument, RebuildReport) {
        let mut output = OutputDocument::new(source);
        let mut report = RebuildReport::default();

        for page in source.pages() {
            let handle = output.append_page(source, page);
            let page_report = self.rewriter.rewrite(&mut output, handle);
            report.streams_recompressed += page_report.streams_recompressed;
            report.diagnostics.extend(page_report.diagnostics);
        }
        report.pages = output.page_count();

        report.optimize = optimize(output.document_mut());
        log::info!(
            "Rebuilt {} pages: {} content streams recompressed, {} duplicate and {} orphaned objects removed",
            report.pages,
            report.streams_recompressed,
            report.optimize.duplicates_removed,
            report.optimize.orphans_removed
        );

        (output, report)
    }
}
