pub mod diagnostics;
pub mod document;
pub mod filter;
pub mod image;

pub use diagnostics::{Diagnostic, Diagnostics, ImageOutcome, SkipReason};
pub use document::{OutputDocument, PageHandle, SourceDocument, SourcePage};
pub use filter::{ColorSpace, FilterTag, PhotoCodec};
pub use image::{EmbeddedImage, RecodedImage};
