//! The compression stages, leaves first: image recoding, page rewriting,
//! document rebuilding

pub mod helpers;
pub mod image_recoder;
pub mod page_rewriter;
pub mod rebuilder;

pub use image_recoder::{ImageRecoder, RecodeOutcome};
pub use page_rewriter::{PageReport, PageRewriter};
pub use rebuilder::{DocumentRebuilder, RebuildReport};
