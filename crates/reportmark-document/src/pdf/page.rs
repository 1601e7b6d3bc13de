// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page access: handles into decoded documents and the page-tree lookups
// (inherited attributes, content streams) the compositor needs.

use lopdf::{Dictionary, Document, Object, ObjectId};
use reportmark_core::error::{ReportmarkError, Result};

/// US Letter, used when neither a page nor its ancestors declare a media box.
pub const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Attributes a page may inherit from its ancestors in the page tree.
pub const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guards against cyclic /Parent chains in malformed files.
const MAX_TREE_DEPTH: usize = 32;

/// A decoded document that contributes pages to the output.
#[derive(Debug, Clone, Copy)]
pub struct SourceDocument<'a> {
    /// Distinguishes sources within one assembly.
    pub key: usize,
    pub document: &'a Document,
}

/// One page of a decoded document.
#[derive(Debug, Clone, Copy)]
pub struct SourcePage<'a> {
    pub source: SourceDocument<'a>,
    pub page_id: ObjectId,
    /// 1-indexed position within its own document.
    pub number: u32,
}

impl PartialEq for SourcePage<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.source.key == other.source.key
            && std::ptr::eq(self.source.document, other.source.document)
            && self.page_id == other.page_id
    }
}

impl Eq for SourcePage<'_> {}

impl<'a> SourcePage<'a> {
    /// All pages of `source` in page order.
    pub fn all(source: SourceDocument<'a>) -> Vec<SourcePage<'a>> {
        source
            .document
            .get_pages()
            .into_iter()
            .map(|(number, page_id)| SourcePage {
                source,
                page_id,
                number,
            })
            .collect()
    }

    /// First page of `source`, if it has any.
    pub fn first(source: SourceDocument<'a>) -> Option<SourcePage<'a>> {
        Self::all(source).into_iter().next()
    }

    pub fn document(&self) -> &'a Document {
        self.source.document
    }

    pub fn dictionary(&self) -> Result<&'a Dictionary> {
        self.document()
            .get_object(self.page_id)
            .and_then(Object::as_dict)
            .map_err(|err| {
                ReportmarkError::Pdf(format!("page {:?} is not a dictionary: {}", self.page_id, err))
            })
    }

    /// Value of `key` on the page or its nearest ancestor.
    pub fn inherited(&self, key: &[u8]) -> Option<&'a Object> {
        let document = self.document();
        let mut node = self.dictionary().ok()?;
        for _ in 0..MAX_TREE_DEPTH {
            if let Ok(value) = node.get(key) {
                return Some(value);
            }
            node = match node.get(b"Parent") {
                Ok(Object::Reference(parent)) => document.get_object(*parent).ok()?.as_dict().ok()?,
                _ => return None,
            };
        }
        None
    }

    /// Effective media box as `[llx, lly, urx, ury]`.
    pub fn media_box(&self) -> [f32; 4] {
        self.inherited(b"MediaBox")
            .and_then(|value| rectangle(self.document(), value))
            .unwrap_or(DEFAULT_MEDIA_BOX)
    }

    /// Effective resources dictionary (resolved through a reference).
    pub fn resources(&self) -> Option<&'a Dictionary> {
        let value = self.inherited(b"Resources")?;
        resolve(self.document(), value).as_dict().ok()
    }

    /// Decoded bytes of every content stream, concatenated in order.
    pub fn content_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        for stream_object in self.content_objects()? {
            let Object::Stream(stream) = resolve(self.document(), &stream_object) else {
                return Err(ReportmarkError::Pdf(format!(
                    "content of page {:?} is not a stream",
                    self.page_id
                )));
            };
            let data = if stream.dict.get(b"Filter").is_ok() {
                stream.decompressed_content().map_err(|err| {
                    ReportmarkError::Pdf(format!("failed to decompress content stream: {}", err))
                })?
            } else {
                stream.content.clone()
            };
            bytes.extend_from_slice(&data);
            bytes.push(b'\n');
        }
        Ok(bytes)
    }

    /// The page's content streams as they appear in /Contents: references
    /// or direct streams, with an indirect array flattened.
    pub fn content_objects(&self) -> Result<Vec<Object>> {
        let dict = self.dictionary()?;
        let Ok(contents) = dict.get(b"Contents") else {
            return Ok(Vec::new());
        };
        let items = match resolve(self.document(), contents) {
            Object::Array(items) => items.clone(),
            Object::Stream(_) => vec![contents.clone()],
            other => {
                return Err(ReportmarkError::Pdf(format!(
                    "unexpected /Contents object {}",
                    kind_name(other)
                )));
            }
        };
        Ok(items)
    }
}

static NULL: Object = Object::Null;

/// Follow a single level of indirection. Dangling references resolve to Null.
pub fn resolve<'a>(document: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => document.get_object(*id).unwrap_or(&NULL),
        other => other,
    }
}

fn kind_name(object: &Object) -> &'static str {
    match object {
        Object::Null => "null",
        Object::Boolean(_) => "boolean",
        Object::Integer(_) | Object::Real(_) => "number",
        Object::Name(_) => "name",
        Object::String(..) => "string",
        Object::Array(_) => "array",
        Object::Dictionary(_) => "dictionary",
        Object::Stream(_) => "stream",
        Object::Reference(_) => "reference",
    }
}

/// Parse a 4-number rectangle, normalising corner order.
pub fn rectangle(document: &Document, value: &Object) -> Option<[f32; 4]> {
    let Object::Array(items) = resolve(document, value) else {
        return None;
    };
    if items.len() != 4 {
        return None;
    }
    let mut numbers = [0.0f32; 4];
    for (slot, item) in numbers.iter_mut().zip(items) {
        *slot = number(resolve(document, item))?;
    }
    let [x0, y0, x1, y1] = numbers;
    Some([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)])
}

pub fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::fixtures;

    fn source(document: &Document) -> SourceDocument<'_> {
        SourceDocument { key: 0, document }
    }

    #[test]
    fn attributes_inherit_from_page_tree() {
        let document = Document::load_mem(&fixtures::inherited_attributes_pdf()).unwrap();
        let page = SourcePage::first(source(&document)).unwrap();
        assert_eq!(page.media_box(), [0.0, 0.0, 595.0, 842.0]);
        assert_eq!(page.inherited(b"Rotate").and_then(|r| r.as_i64().ok()), Some(90));
        assert!(page.resources().is_some());
    }

    #[test]
    fn missing_media_box_defaults_to_letter() {
        let document = Document::load_mem(&fixtures::no_media_box_pdf()).unwrap();
        let page = SourcePage::first(source(&document)).unwrap();
        assert_eq!(page.media_box(), DEFAULT_MEDIA_BOX);
    }

    #[test]
    fn content_bytes_decompress_filtered_streams() {
        let mut document = Document::load_mem(&fixtures::text_pdf(&["hello"])).unwrap();
        document.compress();
        let page = SourcePage::first(source(&document)).unwrap();
        let bytes = page.content_bytes().unwrap();
        assert!(fixtures::contains(&bytes, b"(hello) Tj"));
    }

    #[test]
    fn pages_compare_by_identity() {
        let document = Document::load_mem(&fixtures::text_pdf(&["a", "b"])).unwrap();
        let pages = SourcePage::all(source(&document));
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0], pages[0]);
        assert_ne!(pages[0], pages[1]);
        assert_eq!(pages[1].number, 2);
    }

    #[test]
    fn rectangle_normalises_corners() {
        let document = Document::with_version("1.7");
        let value = Object::Array(vec![
            Object::Integer(100),
            Object::Real(50.0),
            Object::Integer(0),
            Object::Integer(0),
        ]);
        assert_eq!(rectangle(&document, &value), Some([0.0, 0.0, 100.0, 50.0]));
    }
}
