//! Source and output documents
//!
//! The source is a read-only `lopdf::Document` parsed from the input bytes.
//! The output is a fresh document built page by page: appending a page deep
//! copies everything it references, so nothing the source keeps but no page
//! uses ever reaches the output.

use std::collections::{HashMap, HashSet};

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::error::PipelineError;

use super::filter::resolve;
use super::image::{EmbeddedImage, RecodedImage};

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// US Letter, used when neither the page nor its ancestors declare a MediaBox
const DEFAULT_MEDIA_BOX: [i64; 4] = [0, 0, 612, 792];

/// Page-tree nesting deeper than this is treated as a cycle
const MAX_TREE_DEPTH: usize = 64;

/// One page of the source document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePage {
    pub index: usize,
    pub id: ObjectId,
}

/// Parsed, read-only input document
#[derive(Debug)]
pub struct SourceDocument {
    doc: Document,
    page_ids: Vec<ObjectId>,
}

impl SourceDocument {
    /// Parse a PDF from memory
    pub fn load(bytes: &[u8]) -> Result<Self, PipelineError> {
        let doc = Document::load_mem(bytes).map_err(|e| PipelineError::DocumentParse(e.to_string()))?;
        Self::from_document(doc)
    }

    pub fn from_document(doc: Document) -> Result<Self, PipelineError> {
        if doc.is_encrypted() {
            return Err(PipelineError::DocumentParse(
                "encrypted documents are not supported".to_string(),
            ));
        }
        if doc.catalog().is_err() {
            return Err(PipelineError::DocumentParse(
                "document has no catalog".to_string(),
            ));
        }

        let page_ids = doc.get_pages().into_values().collect();
        Ok(Self { doc, page_ids })
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Pages in document order
    pub fn pages(&self) -> impl Iterator<Item = SourcePage> + '_ {
        self.page_ids
            .iter()
            .enumerate()
            .map(|(index, &id)| SourcePage { index, id })
    }

    pub fn version(&self) -> &str {
        &self.doc.version
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }
}

/// Explicit handle to a page already appended to an [`OutputDocument`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHandle {
    pub index: usize,
    pub id: ObjectId,
}

/// Output document under construction
#[derive(Debug)]
pub struct OutputDocument {
    doc: Document,
    pages_id: ObjectId,
    page_count: usize,
    /// Output ids reserved for every source page, so links between pages
    /// resolve no matter which page is copied first
    reserved_pages: HashMap<ObjectId, ObjectId>,
    /// Source object id to output object id
    copied: HashMap<ObjectId, ObjectId>,
    /// Image objects already recoded or reported on an earlier page
    handled_images: HashSet<ObjectId>,
}

impl OutputDocument {
    /// Create an empty output document with the source's version and metadata
    pub fn new(source: &SourceDocument) -> Self {
        let mut doc = Document::with_version(source.version().to_string());
        let pages_id = doc.new_object_id();
        let reserved_pages = source
            .pages()
            .map(|page| (page.id, doc.new_object_id()))
            .collect();

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => Vec::<Object>::new(),
                "Count" => 0,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut output = Self {
            doc,
            pages_id,
            page_count: 0,
            reserved_pages,
            copied: HashMap::new(),
            handled_images: HashSet::new(),
        };

        let source_doc = source.document();
        if let Ok(Object::Reference(info_id)) = source_doc.trailer.get(b"Info") {
            if let Some(new_info) = output.copy_reference(source_doc, *info_id) {
                output.doc.trailer.set("Info", Object::Reference(new_info));
            }
        }

        output
    }

    /// Copy a source page (and everything it references) to the end of the
    /// output page list.
    pub fn append_page(&mut self, source: &SourceDocument, page: SourcePage) -> PageHandle {
        let src = source.document();
        let new_id = match self.reserved_pages.get(&page.id) {
            Some(&id) => id,
            None => self.doc.new_object_id(),
        };
        self.copied.insert(page.id, new_id);

        let mut dict = src
            .get_dictionary(page.id)
            .cloned()
            .unwrap_or_else(|_| Dictionary::new());
        for key in INHERITABLE_KEYS {
            if !dict.has(key) {
                if let Some(value) = inherited_attribute(src, page.id, key) {
                    dict.set(key.to_vec(), value);
                }
            }
        }
        if !dict.has(b"MediaBox") {
            dict.set(
                "MediaBox",
                DEFAULT_MEDIA_BOX
                    .iter()
                    .map(|&v| Object::Integer(v))
                    .collect::<Vec<_>>(),
            );
        }
        dict.remove(b"Parent");
        dict.set("Type", "Page");

        let mut copy = self.copy_dictionary(src, &dict);
        copy.set("Parent", Object::Reference(self.pages_id));
        self.doc.objects.insert(new_id, Object::Dictionary(copy));

        if let Ok(pages) = self.doc.get_dictionary_mut(self.pages_id) {
            if let Ok(Object::Array(kids)) = pages.get_mut(b"Kids") {
                kids.push(Object::Reference(new_id));
            }
            pages.set("Count", Object::Integer(self.page_count as i64 + 1));
        }

        let handle = PageHandle {
            index: self.page_count,
            id: new_id,
        };
        self.page_count += 1;
        handle
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Ids of the content streams of a page, in drawing order
    pub fn content_stream_ids(&self, page: PageHandle) -> Vec<ObjectId> {
        let Ok(dict) = self.doc.get_dictionary(page.id) else {
            return Vec::new();
        };
        match dict.get(b"Contents") {
            Ok(Object::Reference(id)) => match self.doc.get_object(*id) {
                // Contents may point at an array of stream references
                Ok(Object::Array(items)) => references(items),
                _ => vec![*id],
            },
            Ok(Object::Array(items)) => references(items),
            _ => Vec::new(),
        }
    }

    /// Snapshot every image XObject reachable from the page's resources,
    /// including images nested in form XObjects.
    pub fn page_images(&self, page: PageHandle) -> Vec<EmbeddedImage> {
        let mut images = Vec::new();
        let mut seen = HashSet::new();
        if let Ok(dict) = self.doc.get_dictionary(page.id) {
            if let Ok(resources) = dict.get(b"Resources") {
                self.collect_images(resources, &mut images, &mut seen, 0);
            }
        }
        images
    }

    fn collect_images(
        &self,
        resources: &Object,
        images: &mut Vec<EmbeddedImage>,
        seen: &mut HashSet<ObjectId>,
        depth: usize,
    ) {
        if depth > MAX_TREE_DEPTH {
            return;
        }
        let Object::Dictionary(resources) = resolve(&self.doc, resources) else {
            return;
        };
        let Some(Object::Dictionary(xobjects)) = resources
            .get(b"XObject")
            .ok()
            .map(|x| resolve(&self.doc, x))
        else {
            return;
        };

        for (name, value) in xobjects.iter() {
            let Object::Reference(id) = value else {
                continue;
            };
            if !seen.insert(*id) {
                continue;
            }
            let Ok(Object::Stream(stream)) = self.doc.get_object(*id) else {
                continue;
            };
            match stream.dict.get(b"Subtype") {
                Ok(Object::Name(subtype)) if subtype == b"Image" => {
                    let name = String::from_utf8_lossy(name);
                    images.push(EmbeddedImage::from_stream(&self.doc, &name, *id, stream));
                }
                Ok(Object::Name(subtype)) if subtype == b"Form" => {
                    if let Ok(form_resources) = stream.dict.get(b"Resources") {
                        self.collect_images(form_resources, images, seen, depth + 1);
                    }
                }
                _ => {}
            }
        }
    }

    /// Mark an image as handled; false if an earlier page already handled it
    pub fn claim_image(&mut self, id: ObjectId) -> bool {
        self.handled_images.insert(id)
    }

    /// Swap new encoded data into an image stream. False if the object is
    /// not a stream.
    pub fn replace_image(&mut self, id: ObjectId, recoded: &RecodedImage) -> bool {
        match self.stream_mut(id) {
            Some(stream) => {
                recoded.apply_to(stream);
                true
            }
            None => false,
        }
    }

    pub fn stream_mut(&mut self, id: ObjectId) -> Option<&mut Stream> {
        match self.doc.get_object_mut(id) {
            Ok(Object::Stream(stream)) => Some(stream),
            _ => None,
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Serialize the document
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, PipelineError> {
        let mut output = Vec::new();
        self.doc
            .save_to(&mut output)
            .map_err(|e| PipelineError::Serialization(e.to_string()))?;
        Ok(output)
    }

    fn copy_reference(&mut self, src: &Document, id: ObjectId) -> Option<ObjectId> {
        if let Some(&mapped) = self.copied.get(&id).or_else(|| self.reserved_pages.get(&id)) {
            return Some(mapped);
        }
        let target = src.get_object(id).ok()?;

        let new_id = self.doc.new_object_id();
        // Registered before recursing so reference cycles terminate
        self.copied.insert(id, new_id);
        let copy = self.copy_object(src, target);
        self.doc.objects.insert(new_id, copy);
        Some(new_id)
    }

    fn copy_object(&mut self, src: &Document, obj: &Object) -> Object {
        match obj {
            Object::Reference(id) => match self.copy_reference(src, *id) {
                Some(new_id) => Object::Reference(new_id),
                None => Object::Null,
            },
            Object::Array(items) => {
                Object::Array(items.iter().map(|item| self.copy_object(src, item)).collect())
            }
            Object::Dictionary(dict) => Object::Dictionary(self.copy_dictionary(src, dict)),
            Object::Stream(stream) => {
                let mut copy = stream.clone();
                copy.dict = self.copy_dictionary(src, &stream.dict);
                Object::Stream(copy)
            }
            other => other.clone(),
        }
    }

    fn copy_dictionary(&mut self, src: &Document, dict: &Dictionary) -> Dictionary {
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            copy.set(key.clone(), self.copy_object(src, value));
        }
        copy
    }
}

/// Look up an inheritable attribute on the page's ancestors
fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        let parent_id = match current.get(b"Parent") {
            Ok(Object::Reference(id)) => *id,
            _ => return None,
        };
        current = doc.get_dictionary(parent_id).ok()?;
        if let Ok(value) = current.get(key) {
            return Some(value.clone());
        }
    }
    None
}

fn references(items: &[Object]) -> Vec<ObjectId> {
    items
        .iter()
        .filter_map(|item| match item {
            Object::Reference(id) => Some(*id),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two pages under an intermediate Pages node that carries the resources
    fn nested_document() -> Document {
        let mut doc = Document::with_version("1.6");
        let root_pages = doc.new_object_id();
        let inner_pages = doc.new_object_id();

        let font = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => Object::Reference(font) },
        });

        let mut kids = Vec::new();
        for text in ["BT /F1 12 Tf (one) Tj ET", "BT /F1 12 Tf (two) Tj ET"] {
            let content = doc.add_object(Stream::new(Dictionary::new(), text.as_bytes().to_vec()));
            let page = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(inner_pages),
                "Contents" => Object::Reference(content),
            });
            kids.push(Object::Reference(page));
        }

        doc.objects.insert(
            inner_pages,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Parent" => Object::Reference(root_pages),
                "Kids" => kids,
                "Count" => 2,
                "Resources" => Object::Reference(resources),
            }),
        );
        doc.objects.insert(
            root_pages,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(inner_pages)],
                "Count" => 2,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let info = doc.add_object(dictionary! {
            "Title" => Object::string_literal("Nested"),
        });
        // Unreferenced by any page
        doc.add_object(dictionary! { "Orphan" => true });

        let catalog = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(root_pages),
        });
        doc.trailer.set("Root", Object::Reference(catalog));
        doc.trailer.set("Info", Object::Reference(info));
        doc
    }

    #[test]
    fn test_append_preserves_order_and_count() {
        let source = SourceDocument::from_document(nested_document()).unwrap();
        assert_eq!(source.page_count(), 2);

        let mut output = OutputDocument::new(&source);
        let handles: Vec<PageHandle> = source
            .pages()
            .map(|page| output.append_page(&source, page))
            .collect();

        assert_eq!(output.page_count(), 2);
        assert_eq!(handles[0].index, 0);
        assert_eq!(handles[1].index, 1);
        assert_eq!(output.document().get_pages().len(), 2);

        let second = output.content_stream_ids(handles[1]);
        assert_eq!(second.len(), 1);
        let Ok(Object::Stream(stream)) = output.document().get_object(second[0]) else {
            panic!("content stream missing");
        };
        assert_eq!(stream.content, b"BT /F1 12 Tf (two) Tj ET".to_vec());
    }

    #[test]
    fn test_append_materialises_inherited_attributes() {
        let source = SourceDocument::from_document(nested_document()).unwrap();
        let mut output = OutputDocument::new(&source);
        let first = source.pages().next().unwrap();
        let handle = output.append_page(&source, first);

        let page = output.document().get_dictionary(handle.id).unwrap();
        assert!(page.has(b"Resources"));
        let media_box = page.get(b"MediaBox").unwrap();
        assert_eq!(
            media_box,
            &Object::Array(vec![0.into(), 0.into(), 595.into(), 842.into()])
        );
    }

    #[test]
    fn test_shared_objects_copied_once() {
        let source = SourceDocument::from_document(nested_document()).unwrap();
        let mut output = OutputDocument::new(&source);
        let handles: Vec<PageHandle> = source
            .pages()
            .map(|page| output.append_page(&source, page))
            .collect();

        let resources_of = |handle: PageHandle| {
            output
                .document()
                .get_dictionary(handle.id)
                .unwrap()
                .get(b"Resources")
                .unwrap()
                .clone()
        };
        assert_eq!(resources_of(handles[0]), resources_of(handles[1]));
    }

    #[test]
    fn test_orphans_are_never_copied() {
        let source = SourceDocument::from_document(nested_document()).unwrap();
        let mut output = OutputDocument::new(&source);
        for page in source.pages() {
            output.append_page(&source, page);
        }
        let has_orphan = output.document().objects.values().any(|obj| match obj {
            Object::Dictionary(dict) => dict.has(b"Orphan"),
            _ => false,
        });
        assert!(!has_orphan);
        assert!(output.document().trailer.has(b"Info"));
    }

    #[test]
    fn test_rejects_garbage() {
        let err = SourceDocument::load(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, PipelineError::DocumentParse(_)));
    }
}
