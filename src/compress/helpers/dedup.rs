//! Whole-document object table optimization

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};

/// Counts from one optimization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    pub duplicates_removed: usize,
    pub orphans_removed: usize,
}

/// Collapse identical objects, then drop everything unreachable from the trailer.
pub fn optimize(doc: &mut Document) -> OptimizeStats {
    let duplicates_removed = collapse_identical_objects(doc);
    let orphans_removed = doc.prune_objects().len();
    OptimizeStats {
        duplicates_removed,
        orphans_removed,
    }
}

/// Merge structurally identical indirect objects into the lowest-numbered
/// copy and repoint every reference at it.
///
/// Runs until nothing changes, since merging children can make their
/// parents identical. Page tree nodes and the catalog are never merged.
pub fn collapse_identical_objects(doc: &mut Document) -> usize {
    let mut total = 0;

    loop {
        let replacements = find_duplicates(doc);
        if replacements.is_empty() {
            break;
        }

        for id in replacements.keys() {
            doc.objects.remove(id);
        }
        for object in doc.objects.values_mut() {
            rewrite_references(object, &replacements);
        }
        for (_, value) in doc.trailer.iter_mut() {
            rewrite_references(value, &replacements);
        }

        log::debug!("Merged {} duplicate objects", replacements.len());
        total += replacements.len();
    }

    total
}

fn find_duplicates(doc: &Document) -> HashMap<ObjectId, ObjectId> {
    let mut buckets: HashMap<u64, Vec<(ObjectId, Vec<u8>)>> = HashMap::new();
    let mut replacements = HashMap::new();

    // BTreeMap order, so the lowest id of each group survives
    for (&id, object) in doc.objects.iter() {
        if is_structural(object) {
            continue;
        }
        let key = canonical_key(object);
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);

        let bucket = buckets.entry(hasher.finish()).or_default();
        let duplicate_of = bucket
            .iter()
            .find(|(_, existing)| *existing == key)
            .map(|(keep, _)| *keep);
        match duplicate_of {
            Some(keep) => {
                replacements.insert(id, keep);
            }
            None => bucket.push((id, key)),
        }
    }

    replacements
}

fn is_structural(object: &Object) -> bool {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        _ => return false,
    };
    matches!(
        dict.get(b"Type"),
        Ok(Object::Name(name)) if name == b"Page" || name == b"Pages" || name == b"Catalog"
    )
}

/// Byte encoding that is equal exactly when two objects are structurally equal
pub fn canonical_key(object: &Object) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(object, &mut out);
    out
}

fn write_canonical(object: &Object, out: &mut Vec<u8>) {
    match object {
        Object::Null => out.push(b'n'),
        Object::Boolean(value) => {
            out.push(b'b');
            out.push(u8::from(*value));
        }
        Object::Integer(value) => {
            out.push(b'i');
            out.extend_from_slice(&value.to_le_bytes());
        }
        Object::Real(value) => {
            out.push(b'r');
            out.extend_from_slice(&value.to_bits().to_le_bytes());
        }
        Object::Name(name) => {
            out.push(b'/');
            write_bytes(name, out);
        }
        Object::String(bytes, format) => {
            out.push(match format {
                StringFormat::Hexadecimal => b'h',
                _ => b's',
            });
            write_bytes(bytes, out);
        }
        Object::Array(items) => {
            out.push(b'[');
            out.extend_from_slice(&(items.len() as u64).to_le_bytes());
            for item in items {
                write_canonical(item, out);
            }
        }
        Object::Dictionary(dict) => {
            out.push(b'<');
            write_dictionary(dict, out);
        }
        Object::Stream(stream) => {
            out.push(b'S');
            write_dictionary(&stream.dict, out);
            write_bytes(&stream.content, out);
        }
        Object::Reference((number, generation)) => {
            out.push(b'R');
            out.extend_from_slice(&number.to_le_bytes());
            out.extend_from_slice(&generation.to_le_bytes());
        }
    }
}

fn write_dictionary(dict: &Dictionary, out: &mut Vec<u8>) {
    let mut entries: Vec<(&Vec<u8>, &Object)> = dict
        .iter()
        // Length follows the content
        .filter(|(key, _)| key.as_slice() != b"Length")
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    out.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    for (key, value) in entries {
        write_bytes(key, out);
        write_canonical(value, out);
    }
}

fn write_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn rewrite_references(object: &mut Object, replacements: &HashMap<ObjectId, ObjectId>) {
    match object {
        Object::Reference(id) => {
            if let Some(&target) = replacements.get(id) {
                *id = target;
            }
        }
        Object::Array(items) => {
            for item in items.iter_mut() {
                rewrite_references(item, replacements);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                rewrite_references(value, replacements);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                rewrite_references(value, replacements);
            }
        }
        _ => {}
    }
}
