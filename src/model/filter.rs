//! Image encoding and color space identification

use std::fmt;

use lopdf::{Document, Object};

use crate::compress::helpers::flate;

/// Photographic codec family whose quality is tunable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhotoCodec {
    /// DCTDecode
    Jpeg,
    /// JPXDecode
    Jpeg2000,
}

/// Encoding family of an image stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterTag {
    Photographic(PhotoCodec),
    /// Raw, Flate, LZW, CCITT, JBIG2 or a filter chain
    Other,
}

impl FilterTag {
    pub const JPEG: FilterTag = FilterTag::Photographic(PhotoCodec::Jpeg);
    pub const JPEG2000: FilterTag = FilterTag::Photographic(PhotoCodec::Jpeg2000);

    /// Classify a stream's filter chain. Only a lone DCT or JPX filter counts
    /// as photographic.
    pub fn from_filters(filters: &[Vec<u8>]) -> Self {
        match filters {
            [only] if only == b"DCTDecode" => FilterTag::JPEG,
            [only] if only == b"JPXDecode" => FilterTag::JPEG2000,
            _ => FilterTag::Other,
        }
    }

    pub fn is_photographic(&self) -> bool {
        matches!(self, FilterTag::Photographic(_))
    }

    /// The `/Filter` name written for this tag, if it maps to exactly one
    pub fn pdf_name(&self) -> Option<&'static str> {
        match self {
            FilterTag::Photographic(PhotoCodec::Jpeg) => Some("DCTDecode"),
            FilterTag::Photographic(PhotoCodec::Jpeg2000) => Some("JPXDecode"),
            FilterTag::Other => None,
        }
    }
}

impl fmt::Display for FilterTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pdf_name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "other"),
        }
    }
}

/// Read the `/Filter` entry of a stream dictionary as a list of names
pub fn filter_names(doc: &Document, filter: Option<&Object>) -> Vec<Vec<u8>> {
    let Some(filter) = filter.map(|f| resolve(doc, f)) else {
        return Vec::new();
    };
    match filter {
        Object::Name(name) => vec![name.clone()],
        Object::Array(items) => items
            .iter()
            .filter_map(|item| match resolve(doc, item) {
                Object::Name(name) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Color space of an image, resolved far enough to convert samples to RGB
#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRGB,
    DeviceCMYK,
    Indexed {
        base: Box<ColorSpace>,
        hival: u8,
        lookup: Vec<u8>,
    },
    /// Lab, Separation, DeviceN, Pattern and anything unreadable
    Unsupported(String),
}

impl ColorSpace {
    /// Resolve a `/ColorSpace` value. CalGray/CalRGB and ICCBased spaces map
    /// onto the device space with the same component count.
    pub fn resolve(doc: &Document, obj: &Object) -> ColorSpace {
        match resolve(doc, obj) {
            Object::Name(name) => Self::from_family(name),
            Object::Array(items) => Self::from_array(doc, items),
            other => ColorSpace::Unsupported(format!("{:?}", other)),
        }
    }

    fn from_family(name: &[u8]) -> ColorSpace {
        match name {
            b"DeviceGray" | b"G" | b"CalGray" => ColorSpace::DeviceGray,
            b"DeviceRGB" | b"RGB" | b"CalRGB" => ColorSpace::DeviceRGB,
            b"DeviceCMYK" | b"CMYK" => ColorSpace::DeviceCMYK,
            other => ColorSpace::Unsupported(String::from_utf8_lossy(other).into_owned()),
        }
    }

    fn from_array(doc: &Document, items: &[Object]) -> ColorSpace {
        let family = match items.first().map(|f| resolve(doc, f)) {
            Some(Object::Name(name)) => name.as_slice(),
            _ => return ColorSpace::Unsupported("empty color space array".to_string()),
        };

        match family {
            b"ICCBased" => Self::from_icc(doc, items.get(1)),
            b"Indexed" | b"I" => Self::from_indexed(doc, &items[1..]),
            b"CalGray" | b"CalRGB" | b"DeviceGray" | b"DeviceRGB" | b"DeviceCMYK" => {
                Self::from_family(family)
            }
            other => ColorSpace::Unsupported(String::from_utf8_lossy(other).into_owned()),
        }
    }

    fn from_icc(doc: &Document, profile: Option<&Object>) -> ColorSpace {
        let Some(Object::Stream(stream)) = profile.map(|p| resolve(doc, p)) else {
            return ColorSpace::Unsupported("ICCBased without profile stream".to_string());
        };

        match stream.dict.get(b"N").ok().map(|n| resolve(doc, n)) {
            Some(Object::Integer(1)) => ColorSpace::DeviceGray,
            Some(Object::Integer(3)) => ColorSpace::DeviceRGB,
            Some(Object::Integer(4)) => ColorSpace::DeviceCMYK,
            _ => match stream.dict.get(b"Alternate") {
                Ok(alternate) => Self::resolve(doc, alternate),
                Err(_) => ColorSpace::Unsupported("ICCBased with unknown /N".to_string()),
            },
        }
    }

    fn from_indexed(doc: &Document, operands: &[Object]) -> ColorSpace {
        let [base, hival, lookup, ..] = operands else {
            return ColorSpace::Unsupported("truncated Indexed color space".to_string());
        };

        let base = Self::resolve(doc, base);
        if matches!(base, ColorSpace::Indexed { .. } | ColorSpace::Unsupported(_)) {
            return ColorSpace::Unsupported(format!("Indexed over {}", base));
        }

        let hival = match resolve(doc, hival) {
            Object::Integer(n) if (0..=255).contains(n) => *n as u8,
            _ => return ColorSpace::Unsupported("Indexed hival out of range".to_string()),
        };

        let lookup = match resolve(doc, lookup) {
            Object::String(bytes, _) => bytes.clone(),
            Object::Stream(stream) => {
                let filters = filter_names(doc, stream.dict.get(b"Filter").ok());
                match filters.as_slice() {
                    [] => stream.content.clone(),
                    [only] if only == b"FlateDecode" => match flate::inflate(&stream.content) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            return ColorSpace::Unsupported(format!("unreadable lookup table: {}", e))
                        }
                    },
                    _ => return ColorSpace::Unsupported("encoded lookup table".to_string()),
                }
            }
            _ => return ColorSpace::Unsupported("missing Indexed lookup table".to_string()),
        };

        ColorSpace::Indexed {
            base: Box::new(base),
            hival,
            lookup,
        }
    }

    /// Number of color components per sample
    pub fn components(&self) -> Option<usize> {
        match self {
            ColorSpace::DeviceGray => Some(1),
            ColorSpace::DeviceRGB => Some(3),
            ColorSpace::DeviceCMYK => Some(4),
            ColorSpace::Indexed { .. } => Some(1),
            ColorSpace::Unsupported(_) => None,
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorSpace::DeviceGray => write!(f, "DeviceGray"),
            ColorSpace::DeviceRGB => write!(f, "DeviceRGB"),
            ColorSpace::DeviceCMYK => write!(f, "DeviceCMYK"),
            ColorSpace::Indexed { base, .. } => write!(f, "Indexed({})", base),
            ColorSpace::Unsupported(name) => write!(f, "{}", name),
        }
    }
}

/// Follow a reference chain; unresolvable references come back unchanged
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    let mut current = obj;
    // Bounded to survive reference cycles
    for _ in 0..32 {
        match current {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(target) => current = target,
                Err(_) => return current,
            },
            _ => return current,
        }
    }
    current
}
