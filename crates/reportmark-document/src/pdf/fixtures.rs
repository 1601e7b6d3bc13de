// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Synthetic PDFs for unit tests, built directly with lopdf.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};

fn helvetica_resources(doc: &mut Document) -> Object {
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    Object::Reference(resources_id)
}

fn text_stream(doc: &mut Document, text: &str) -> Object {
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![100.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let bytes = content.encode().unwrap_or_default();
    Object::Reference(doc.add_object(Stream::new(Dictionary::new(), bytes)))
}

fn finish(
    mut doc: Document,
    pages_id: lopdf::ObjectId,
    mut pages: Dictionary,
    kids: Vec<Object>,
) -> Vec<u8> {
    pages.set("Type", "Pages");
    pages.set("Count", kids.len() as i64);
    pages.set("Kids", kids);
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// One Letter page per entry, each showing its text. All pages share one
/// resources object.
pub fn text_pdf(texts: &[&str]) -> Vec<u8> {
    sized_text_pdf(texts, [0, 0, 612, 792])
}

/// Like [`text_pdf`] with an explicit media box on every page.
pub fn sized_text_pdf(texts: &[&str], media_box: [i64; 4]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let resources = helvetica_resources(&mut doc);

    let mut kids = Vec::new();
    for text in texts {
        let contents = text_stream(&mut doc, text);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => contents,
            "Resources" => resources.clone(),
            "MediaBox" => media_box.iter().map(|&v| Object::Integer(v)).collect::<Vec<_>>(),
        });
        kids.push(Object::Reference(page_id));
    }
    finish(doc, pages_id, Dictionary::new(), kids)
}

/// A well-formed document whose page tree is empty.
pub fn empty_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    finish(doc, pages_id, Dictionary::new(), Vec::new())
}

/// One page that declares nothing itself: A4 media box, rotation 90 and
/// resources all live on the page tree root.
pub fn inherited_attributes_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let resources = helvetica_resources(&mut doc);
    let contents = text_stream(&mut doc, "inherited");
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => contents,
    });
    let root = dictionary! {
        "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(595), Object::Integer(842)],
        "Rotate" => Object::Integer(90),
        "Resources" => resources,
    };
    finish(doc, pages_id, root, vec![Object::Reference(page_id)])
}

/// One page without a media box anywhere in its ancestry.
pub fn no_media_box_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let resources = helvetica_resources(&mut doc);
    let contents = text_stream(&mut doc, "unsized");
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => contents,
        "Resources" => resources,
    });
    finish(doc, pages_id, Dictionary::new(), vec![Object::Reference(page_id)])
}

/// Decoded content of every page of `bytes`, in page order.
pub fn page_texts(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .into_values()
        .map(|page_id| String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).into_owned())
        .collect()
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle)
}

/// Text shown by the background form of every page of `bytes`, or `None`
/// for pages without one.
pub fn page_backgrounds(bytes: &[u8]) -> Vec<Option<String>> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .into_values()
        .map(|page_id| {
            let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
            let resources = deref(&doc, page.get(b"Resources").ok()?).as_dict().ok()?;
            let xobjects = deref(&doc, resources.get(b"XObject").ok()?).as_dict().ok()?;
            let (_, form) = xobjects
                .iter()
                .find(|(name, _)| name.starts_with(super::writer::BACKGROUND_XOBJECT.as_bytes()))?;
            let stream = deref(&doc, form).as_stream().ok()?;
            let content = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            Some(shown_text(&content))
        })
        .collect()
}

fn deref<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap(),
        other => other,
    }
}

fn shown_text(content: &[u8]) -> String {
    let text = String::from_utf8_lossy(content);
    let start = text.find('(').map_or(0, |i| i + 1);
    let end = text[start..].find(')').map_or(text.len(), |i| start + i);
    text[start..end].to_string()
}
