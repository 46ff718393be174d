//! Per-page rewriting: lossless content streams, then lossy images

use lopdf::{Object, ObjectId};

use crate::config::CompressionSettings;
use crate::error::ImageRecodeError;
use crate::model::filter::filter_names;
use crate::model::{
    Diagnostic, Diagnostics, EmbeddedImage, ImageOutcome, OutputDocument, PageHandle,
};

use super::helpers::flate;
use super::image_recoder::{ImageRecoder, RecodeOutcome};

/// What rewriting one page produced
#[derive(Debug, Clone)]
pub struct PageReport {
    pub page: PageHandle,
    /// Content streams whose encoding was replaced
    pub streams_recompressed: usize,
    pub diagnostics: Diagnostics,
}

pub struct PageRewriter {
    settings: CompressionSettings,
    recoder: ImageRecoder,
}

impl PageRewriter {
    pub fn new(settings: CompressionSettings) -> Self {
        Self {
            recoder: ImageRecoder::new(&settings),
            settings,
        }
    }

    /// Rewrite a page that has just been appended to `output`
    pub fn rewrite(&self, output: &mut OutputDocument, page: PageHandle) -> PageReport {
        let streams_recompressed = self.compress_content_streams(output, page);

        let mut diagnostics = Diagnostics::new();
        if self.settings.recodes_images() {
            // Snapshot first: replacing images must not disturb the iteration
            let images = output.page_images(page);
            log::debug!("Page {}: {} images", page.index + 1, images.len());

            for image in images {
                if !output.claim_image(image.object_id) {
                    log::debug!(
                        "Page {}: image {} already handled on an earlier page",
                        page.index + 1,
                        image.name
                    );
                    continue;
                }

                let diagnostic = Diagnostic {
                    page_index: page.index,
                    image_name: image.name.clone(),
                    object_id: image.object_id,
                    outcome: self.recode_image(output, &image),
                };
                log::log!(diagnostic.level(), "{}", diagnostic);
                diagnostics.push(diagnostic);
            }
        }

        PageReport {
            page,
            streams_recompressed,
            diagnostics,
        }
    }

    fn recode_image(&self, output: &mut OutputDocument, image: &EmbeddedImage) -> ImageOutcome {
        match self.recoder.recode(image) {
            Ok(RecodeOutcome::Encoded(recoded)) => {
                let new_len = recoded.data.len();
                if output.replace_image(image.object_id, &recoded) {
                    ImageOutcome::Recoded {
                        from: image.filter,
                        to: recoded.filter,
                        original_len: image.data.len(),
                        new_len,
                    }
                } else {
                    ImageOutcome::Failed(ImageRecodeError::Unsupported(
                        "image object is not a stream".to_string(),
                    ))
                }
            }
            Ok(RecodeOutcome::Skipped(reason)) => ImageOutcome::Skipped(reason),
            Err(err) => ImageOutcome::Failed(err),
        }
    }

    /// Re-deflate the page's content streams at the configured level.
    /// Returns how many streams were replaced.
    fn compress_content_streams(&self, output: &mut OutputDocument, page: PageHandle) -> usize {
        let level = self.settings.content_stream_level();
        if level == 0 {
            return 0;
        }

        let mut replaced = 0;
        for id in output.content_stream_ids(page) {
            let Some(encoded) = recompressed_content(output, id, level) else {
                continue;
            };
            if let Some(stream) = output.stream_mut(id) {
                stream.dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
                stream.dict.remove(b"DecodeParms");
                stream.set_content(encoded);
                replaced += 1;
            }
        }

        if replaced > 0 {
            log::debug!(
                "Page {}: recompressed {} content streams at level {}",
                page.index + 1,
                replaced,
                level
            );
        }
        replaced
    }
}

/// Deflate a content stream at `level`, if that is lossless and smaller
fn recompressed_content(output: &OutputDocument, id: ObjectId, level: u8) -> Option<Vec<u8>> {
    let doc = output.document();
    let Ok(Object::Stream(stream)) = doc.get_object(id) else {
        return None;
    };

    let filters = filter_names(doc, stream.dict.get(b"Filter").ok());
    let plain = match filters.as_slice() {
        [] => stream.content.clone(),
        [only] if only == b"FlateDecode" && !stream.dict.has(b"DecodeParms") => {
            match flate::inflate(&stream.content) {
                Ok(plain) => plain,
                Err(e) => {
                    log::debug!("Leaving unreadable content stream {:?}: {}", id, e);
                    return None;
                }
            }
        }
        _ => return None,
    };

    let encoded = match flate::deflate(&plain, level) {
        Ok(encoded) => encoded,
        Err(e) => {
            log::debug!("Failed to deflate content stream {:?}: {}", id, e);
            return None;
        }
    };
    (encoded.len() < stream.content.len()).then_some(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SkipReason, SourceDocument};
    use lopdf::{dictionary, Dictionary, Document, Stream};

    const CONTENT: &[u8] =
        b"q 200 0 0 100 50 600 cm /Im0 Do Q BT /F1 12 Tf 72 700 Td (Hello) Tj ET\n";

    fn one_page_document(content: Stream, image: Option<Stream>) -> SourceDocument {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(content);

        let mut resources = Dictionary::new();
        if let Some(image) = image {
            let image_id = doc.add_object(image);
            resources.set("XObject", dictionary! { "Im0" => Object::Reference(image_id) });
        }

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => Object::Reference(content_id),
            "Resources" => resources,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog));
        SourceDocument::from_document(doc).unwrap()
    }

    fn plain_content(content: &[u8]) -> Stream {
        Stream::new(Dictionary::new(), content.to_vec())
    }

    fn gray_image_sized(size: i64) -> Stream {
        let pixels: Vec<u8> = (0..size * size).map(|i| (i % 256) as u8).collect();
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => size,
                "Height" => size,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            pixels,
        )
    }

    fn gray_image() -> Stream {
        gray_image_sized(32)
    }

    fn rewrite(source: &SourceDocument, level: u8, quality: u8) -> (OutputDocument, PageReport) {
        let settings = CompressionSettings::new(level, quality).unwrap();
        let rewriter = PageRewriter::new(settings);
        let mut output = OutputDocument::new(source);
        let page = source.pages().next().unwrap();
        let handle = output.append_page(source, page);
        let report = rewriter.rewrite(&mut output, handle);
        (output, report)
    }

    fn content_of(output: &OutputDocument, handle: PageHandle) -> Stream {
        let id = output.content_stream_ids(handle)[0];
        match output.document().get_object(id) {
            Ok(Object::Stream(stream)) => stream.clone(),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_content_stream_compressed_losslessly() {
        let long = CONTENT.repeat(40);
        let source = one_page_document(plain_content(&long), None);
        let (output, report) = rewrite(&source, 9, 100);

        assert_eq!(report.streams_recompressed, 1);
        let stream = content_of(&output, report.page);
        assert!(stream.content.len() < long.len());
        assert_eq!(flate::inflate(&stream.content).unwrap(), long);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_level_zero_is_passthrough() {
        let long = CONTENT.repeat(40);
        let source = one_page_document(plain_content(&long), None);
        let (output, report) = rewrite(&source, 0, 100);

        assert_eq!(report.streams_recompressed, 0);
        assert_eq!(content_of(&output, report.page).content, long);
    }

    #[test]
    fn test_weakly_deflated_stream_recompressed() {
        let long = CONTENT.repeat(40);
        let stored = flate::deflate(&long, 0).unwrap();
        let stream = Stream::new(dictionary! { "Filter" => "FlateDecode" }, stored.clone());
        let source = one_page_document(stream, None);
        let (output, report) = rewrite(&source, 9, 100);

        let stream = content_of(&output, report.page);
        assert!(stream.content.len() < stored.len());
        assert_eq!(flate::inflate(&stream.content).unwrap(), long);
    }

    #[test]
    fn test_foreign_filter_left_alone() {
        let stream = Stream::new(
            dictionary! { "Filter" => "ASCIIHexDecode" },
            b"414243>".to_vec(),
        );
        let source = one_page_document(stream, None);
        let (output, report) = rewrite(&source, 9, 100);

        assert_eq!(report.streams_recompressed, 0);
        assert_eq!(content_of(&output, report.page).content, b"414243>".to_vec());
    }

    #[test]
    fn test_quality_100_skips_images_entirely() {
        let source = one_page_document(plain_content(CONTENT), Some(gray_image()));
        let (_, report) = rewrite(&source, 9, 100);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_image_recoded_below_threshold() {
        let source = one_page_document(plain_content(CONTENT), Some(gray_image()));
        let (output, report) = rewrite(&source, 9, 30);

        assert_eq!(report.diagnostics.len(), 1);
        let diagnostic = report.diagnostics.iter().next().unwrap();
        assert_eq!(diagnostic.image_name, "Im0");
        assert!(matches!(
            diagnostic.outcome,
            ImageOutcome::Recoded { to, .. } if to.is_photographic()
        ));

        let images = output.page_images(report.page);
        assert_eq!(images[0].filters, vec![b"DCTDecode".to_vec()]);
    }

    #[test]
    fn test_image_skipped_above_threshold() {
        let source = one_page_document(plain_content(CONTENT), Some(gray_image()));
        let (output, report) = rewrite(&source, 9, 70);

        let diagnostic = report.diagnostics.iter().next().unwrap();
        assert_eq!(
            diagnostic.outcome,
            ImageOutcome::Skipped(SkipReason::AboveFallbackThreshold {
                quality: 70,
                threshold: 40
            })
        );
        let images = output.page_images(report.page);
        assert_eq!(images[0].data, gray_image().content);
    }

    #[test]
    fn test_broken_image_becomes_diagnostic() {
        let mut broken = gray_image();
        broken.set_content(vec![1, 2, 3]);
        let source = one_page_document(plain_content(CONTENT), Some(broken));
        let (output, report) = rewrite(&source, 9, 10);

        assert_eq!(report.diagnostics.failed(), 1);
        assert_eq!(output.page_count(), 1);
        let images = output.page_images(report.page);
        assert_eq!(images[0].data, vec![1, 2, 3]);
    }

    #[test]
    fn test_every_image_visited_once_in_resource_order() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let im0 = doc.add_object(gray_image_sized(16));
        let im1 = doc.add_object(gray_image_sized(24));
        let im2 = doc.add_object(gray_image_sized(40));
        let form = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im2" => Object::Reference(im2) },
                },
            },
            b"q 100 0 0 100 0 0 cm /Im2 Do Q".to_vec(),
        ));
        let content = doc.add_object(plain_content(b"/Im0 Do /Im1 Do /Fm0 Do"));
        let page = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "Contents" => Object::Reference(content),
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => Object::Reference(im0),
                    "Im1" => Object::Reference(im1),
                    "Fm0" => Object::Reference(form),
                },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page)],
                "Count" => 1,
            }),
        );
        let catalog = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog));
        let source = SourceDocument::from_document(doc).unwrap();

        let (output, report) = rewrite(&source, 9, 30);

        let names: Vec<&str> = report
            .diagnostics
            .iter()
            .map(|d| d.image_name.as_str())
            .collect();
        assert_eq!(names, vec!["Im0", "Im1", "Im2"]);
        assert_eq!(report.diagnostics.recoded(), 3);

        let images = output.page_images(report.page);
        assert_eq!(images.len(), 3);
        for (image, diagnostic) in images.iter().zip(report.diagnostics.iter()) {
            assert_eq!(image.object_id, diagnostic.object_id);
            assert_eq!(image.filters, vec![b"DCTDecode".to_vec()]);
            match diagnostic.outcome {
                ImageOutcome::Recoded { new_len, .. } => assert_eq!(image.data.len(), new_len),
                ref other => panic!("expected recode, got {:?}", other),
            }
        }
    }
}
