//! Embedded raster images and their in-place replacement

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use super::filter::{filter_names, resolve, ColorSpace, FilterTag};

/// Snapshot of one image XObject as found on a page.
///
/// Taken before any replacement so the page's image list can be mutated
/// while iterating the snapshot.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    /// Resource name the image is drawn under (e.g. `Im0`)
    pub name: String,
    pub object_id: ObjectId,
    pub width: i64,
    pub height: i64,
    pub bits_per_component: Option<i64>,
    pub color_space: Option<ColorSpace>,
    /// Raw `/Filter` chain
    pub filters: Vec<Vec<u8>>,
    pub filter: FilterTag,
    pub decode_parms: Option<Dictionary>,
    pub image_mask: bool,
    pub has_decode_array: bool,
    /// Encoded stream bytes, exactly as stored
    pub data: Vec<u8>,
}

impl EmbeddedImage {
    pub fn from_stream(doc: &Document, name: &str, object_id: ObjectId, stream: &Stream) -> Self {
        let dict = &stream.dict;
        let integer = |key: &[u8]| match dict.get(key).ok().map(|v| resolve(doc, v)) {
            Some(Object::Integer(n)) => Some(*n),
            Some(Object::Real(r)) => Some(*r as i64),
            _ => None,
        };

        let filters = filter_names(doc, dict.get(b"Filter").ok());
        let filter = FilterTag::from_filters(&filters);

        let decode_parms = match dict.get(b"DecodeParms").ok().map(|v| resolve(doc, v)) {
            Some(Object::Dictionary(parms)) => Some(parms.clone()),
            Some(Object::Array(items)) => items.iter().find_map(|item| match resolve(doc, item) {
                Object::Dictionary(parms) => Some(parms.clone()),
                _ => None,
            }),
            _ => None,
        };

        let image_mask = matches!(
            dict.get(b"ImageMask").ok().map(|v| resolve(doc, v)),
            Some(Object::Boolean(true))
        );

        Self {
            name: name.to_string(),
            object_id,
            width: integer(b"Width").unwrap_or(0),
            height: integer(b"Height").unwrap_or(0),
            bits_per_component: integer(b"BitsPerComponent"),
            color_space: dict
                .get(b"ColorSpace")
                .ok()
                .map(|cs| ColorSpace::resolve(doc, cs)),
            filters,
            filter,
            decode_parms,
            image_mask,
            has_decode_array: dict.has(b"Decode"),
            data: stream.content.clone(),
        }
    }

    /// Number of color components declared by the image's color space
    pub fn components(&self) -> Option<usize> {
        self.color_space.as_ref().and_then(ColorSpace::components)
    }
}

/// Newly encoded image data ready to be swapped into an image stream
#[derive(Debug, Clone, PartialEq)]
pub struct RecodedImage {
    pub data: Vec<u8>,
    pub filter: FilterTag,
    /// Replacement `/ColorSpace`; `None` keeps the original entry
    pub color_space: Option<&'static str>,
}

impl RecodedImage {
    /// Replace the stream's data and declare the new encoding.
    ///
    /// Width, height, `/SMask` and every other key survive; predictor and
    /// decode parameters that described the old encoding are dropped.
    pub fn apply_to(&self, stream: &mut Stream) {
        let dict = &mut stream.dict;
        match self.filter.pdf_name() {
            Some(name) => dict.set("Filter", Object::Name(name.as_bytes().to_vec())),
            None => {
                dict.remove(b"Filter");
            }
        }
        dict.remove(b"DecodeParms");
        dict.set("BitsPerComponent", Object::Integer(8));

        if let Some(color_space) = self.color_space {
            dict.set("ColorSpace", Object::Name(color_space.as_bytes().to_vec()));
            dict.remove(b"Decode");
        }

        // Keep lopdf from re-deflating JPEG data on save
        stream.allows_compression = false;
        stream.set_content(self.data.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn image_stream() -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 4,
                "Height" => 2,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Decode" => vec![1.into(), 0.into()],
                "SMask" => Object::Reference((9, 0)),
            },
            vec![0u8; 8],
        )
    }

    #[test]
    fn test_snapshot_reads_dictionary() {
        let doc = Document::with_version("1.5");
        let image = EmbeddedImage::from_stream(&doc, "Im0", (5, 0), &image_stream());
        assert_eq!(image.name, "Im0");
        assert_eq!(image.width, 4);
        assert_eq!(image.height, 2);
        assert_eq!(image.bits_per_component, Some(8));
        assert_eq!(image.color_space, Some(ColorSpace::DeviceGray));
        assert_eq!(image.filter, FilterTag::Other);
        assert!(image.has_decode_array);
        assert!(!image.image_mask);
        assert_eq!(image.data.len(), 8);
    }

    #[test]
    fn test_apply_replaces_encoding() {
        let mut stream = image_stream();
        let recoded = RecodedImage {
            data: vec![0xFF, 0xD8, 0xFF, 0xD9],
            filter: FilterTag::JPEG,
            color_space: Some("DeviceRGB"),
        };
        recoded.apply_to(&mut stream);

        assert_eq!(stream.content, vec![0xFF, 0xD8, 0xFF, 0xD9]);
        assert_eq!(
            stream.dict.get(b"Filter").unwrap(),
            &Object::Name(b"DCTDecode".to_vec())
        );
        assert_eq!(
            stream.dict.get(b"ColorSpace").unwrap(),
            &Object::Name(b"DeviceRGB".to_vec())
        );
        assert!(!stream.dict.has(b"Decode"));
        assert!(stream.dict.has(b"SMask"));
        assert_eq!(stream.dict.get(b"Length").unwrap(), &Object::Integer(4));
    }

    #[test]
    fn test_apply_keeps_color_space() {
        let mut stream = image_stream();
        let recoded = RecodedImage {
            data: vec![1, 2, 3],
            filter: FilterTag::JPEG,
            color_space: None,
        };
        recoded.apply_to(&mut stream);
        assert_eq!(
            stream.dict.get(b"ColorSpace").unwrap(),
            &Object::Name(b"DeviceGray".to_vec())
        );
        assert!(stream.dict.has(b"Decode"));
    }
}
