// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Object copier: moves object graphs from a decoded source document into the
// output document, copying every indirect object at most once.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::warn;

/// Copies objects from one source document into a target document.
///
/// Indirect objects are memoised so resources shared between pages (fonts,
/// images) are written once. Page objects of the source are assigned target
/// ids up front, so links between pages of the same source survive; page
/// tree nodes are never copied.
pub struct ObjectCopier<'s> {
    source: &'s Document,
    map: HashMap<ObjectId, ObjectId>,
}

impl<'s> ObjectCopier<'s> {
    /// Copier that will not emit any page of `source` as a page.
    pub fn new(source: &'s Document) -> Self {
        Self {
            source,
            map: HashMap::new(),
        }
    }

    /// Copier that reserves a target id for every page of `source`, in page
    /// order. Use when the whole document ends up in the output.
    pub fn with_reserved_pages(source: &'s Document, target: &mut Document) -> Self {
        let mut copier = Self::new(source);
        for page_id in source.get_pages().into_values() {
            let reserved = target.new_object_id();
            copier.map.insert(page_id, reserved);
        }
        copier
    }

    /// Target id reserved for a source page, if any.
    pub fn reserved_page(&self, page_id: ObjectId) -> Option<ObjectId> {
        self.map.get(&page_id).copied()
    }

    /// Copy an indirect object, returning a reference into `target`.
    pub fn copy_reference(&mut self, target: &mut Document, id: ObjectId) -> Object {
        if let Some(mapped) = self.map.get(&id) {
            return Object::Reference(*mapped);
        }

        let source = self.source;
        let object = match source.get_object(id) {
            Ok(object) => object,
            Err(err) => {
                warn!(?id, %err, "Cannot resolve reference, using Null");
                return Object::Null;
            }
        };

        // A link to a page that is not part of the output would drag the
        // whole source page tree along with it.
        if is_page_node(object) {
            return Object::Null;
        }

        // Register before recursing so cycles terminate.
        let new_id = target.new_object_id();
        self.map.insert(id, new_id);
        let copied = self.copy_object(target, object);
        target.objects.insert(new_id, copied);
        Object::Reference(new_id)
    }

    /// Copy a direct object, following any references it contains.
    pub fn copy_object(&mut self, target: &mut Document, object: &Object) -> Object {
        match object {
            Object::Dictionary(dict) => Object::Dictionary(self.copy_dictionary(target, dict, &[])),
            Object::Array(items) => Object::Array(
                items
                    .iter()
                    .map(|item| self.copy_object(target, item))
                    .collect(),
            ),
            Object::Reference(id) => self.copy_reference(target, *id),
            Object::Stream(stream) => Object::Stream(self.copy_stream(target, stream)),
            // Boolean, Integer, Real, String, Name, Null
            other => other.clone(),
        }
    }

    /// Copy a dictionary, leaving out `skip` keys.
    pub fn copy_dictionary(
        &mut self,
        target: &mut Document,
        dict: &Dictionary,
        skip: &[&[u8]],
    ) -> Dictionary {
        let mut copied = Dictionary::new();
        for (key, value) in dict.iter() {
            if skip.contains(&key.as_slice()) {
                continue;
            }
            copied.set(key.clone(), self.copy_object(target, value));
        }
        copied
    }

    fn copy_stream(&mut self, target: &mut Document, stream: &Stream) -> Stream {
        let dict = self.copy_dictionary(target, &stream.dict, &[]);
        let mut copied = Stream::new(dict, stream.content.clone());
        copied.allows_compression = stream.allows_compression;
        copied
    }
}

fn is_page_node(object: &Object) -> bool {
    let Ok(dict) = object.as_dict() else {
        return false;
    };
    matches!(dict.get(b"Type").and_then(Object::as_name), Ok(b"Page") | Ok(b"Pages"))
}
