//! Non-fatal per-image outcomes returned alongside a successful run

use std::fmt;

use lopdf::ObjectId;

use crate::error::ImageRecodeError;

use super::filter::FilterTag;

/// Why an image was deliberately left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Non-photographic image and the quality is above the JPEG fallback threshold
    AboveFallbackThreshold { quality: u8, threshold: u8 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AboveFallbackThreshold { quality, threshold } => write!(
                f,
                "non-photographic image kept lossless at quality {} (converted only at {} or below)",
                quality, threshold
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageOutcome {
    Recoded {
        from: FilterTag,
        to: FilterTag,
        original_len: usize,
        new_len: usize,
    },
    Skipped(SkipReason),
    Failed(ImageRecodeError),
}

/// Outcome for one image on one page
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Zero-based page index
    pub page_index: usize,
    pub image_name: String,
    pub object_id: ObjectId,
    pub outcome: ImageOutcome,
}

impl Diagnostic {
    /// Log level a host should report this record at
    pub fn level(&self) -> log::Level {
        match self.outcome {
            ImageOutcome::Failed(_) => log::Level::Warn,
            ImageOutcome::Recoded { .. } | ImageOutcome::Skipped(_) => log::Level::Info,
        }
    }

    pub fn is_warning(&self) -> bool {
        self.level() <= log::Level::Warn
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {}, image {}: ", self.page_index + 1, self.image_name)?;
        match &self.outcome {
            ImageOutcome::Recoded {
                from,
                to,
                original_len,
                new_len,
            } => write!(
                f,
                "re-encoded {} -> {} ({} -> {} bytes)",
                from, to, original_len, new_len
            ),
            ImageOutcome::Skipped(reason) => write!(f, "skipped, {}", reason),
            ImageOutcome::Failed(err) => write!(f, "left uncompressed, {}", err),
        }
    }
}

/// Ordered diagnostics: page order, then image order within a page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    pub fn recoded(&self) -> usize {
        self.count(|o| matches!(o, ImageOutcome::Recoded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ImageOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ImageOutcome::Failed(_)))
    }

    /// Records a host should surface as warnings
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.is_warning())
    }

    fn count(&self, pred: impl Fn(&ImageOutcome) -> bool) -> usize {
        self.entries.iter().filter(|d| pred(&d.outcome)).count()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
