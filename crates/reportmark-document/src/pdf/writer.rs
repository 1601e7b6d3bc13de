// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page writer: materialises compiled pages into a fresh output document.
//
// Each background becomes a Form XObject written once per output document and
// drawn, wrapped in `q`/`Q`, ahead of the content page's own streams. The
// content page keeps its media box, crop box and rotation.

use std::collections::HashMap;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use reportmark_core::WatermarkFit;
use reportmark_core::error::{ReportmarkError, Result};
use tracing::{debug, warn};

use super::compositor::CompiledPage;
use super::copier::ObjectCopier;
use super::page::{INHERITABLE, SourceDocument, SourcePage, resolve};

/// Resource name prefix of the background form on composited pages.
pub const BACKGROUND_XOBJECT: &str = "RmBackground";

/// Attributes a composited page keeps from its content page.
const PAGE_GEOMETRY: [&[u8]; 3] = [b"MediaBox", b"CropBox", b"Rotate"];

#[derive(Debug, Clone, Copy)]
struct Form {
    id: ObjectId,
    bbox: [f32; 4],
}

/// Builds the output document page by page, in call order.
pub struct PageWriter<'a> {
    output: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    copiers: HashMap<usize, ObjectCopier<'a>>,
    forms: HashMap<&'a str, Form>,
    fit: WatermarkFit,
}

impl<'a> PageWriter<'a> {
    pub fn new(version: &str, fit: WatermarkFit) -> Self {
        let mut output = Document::with_version(version);
        let pages_id = output.new_object_id();
        Self {
            output,
            pages_id,
            kids: Vec::new(),
            copiers: HashMap::new(),
            forms: HashMap::new(),
            fit,
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append every page of `source` unchanged.
    pub fn write_document(&mut self, source: SourceDocument<'a>) {
        for page in SourcePage::all(source) {
            self.write(CompiledPage::Passthrough(page));
        }
    }

    /// Append one compiled page.
    ///
    /// A composited page that cannot be built is written as passthrough; a
    /// page that cannot be copied at all is dropped. Both are logged.
    pub fn write(&mut self, page: CompiledPage<'a>) {
        if let CompiledPage::Composited { content, background, digest } = page {
            match self.write_composited(content, background, digest) {
                Ok(()) => return,
                Err(err) => {
                    warn!(page = content.number, digest, %err, "Compositing failed; page left unbranded");
                }
            }
        }
        let content = page.content();
        if let Err(err) = self.write_passthrough(content) {
            warn!(page = content.number, %err, "Page could not be copied; dropped from output");
        }
    }

    /// Carry the document information dictionary of `source` over.
    pub fn carry_info(&mut self, source: SourceDocument<'a>) {
        let Ok(info) = source.document.trailer.get(b"Info") else {
            return;
        };
        let copier = copier_for(&mut self.copiers, &mut self.output, source, true);
        let copied = copier.copy_object(&mut self.output, info);
        if !matches!(copied, Object::Null) {
            self.output.trailer.set("Info", copied);
        }
    }

    /// Close the page tree and return the output document.
    pub fn finish(mut self) -> Document {
        let count = self.kids.len() as i64;
        self.output.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.output.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.output.trailer.set("Root", catalog_id);
        debug!(pages = count, forms = self.forms.len(), "Output document built");
        self.output
    }

    fn write_passthrough(&mut self, page: SourcePage<'a>) -> Result<()> {
        let dict = page.dictionary()?;
        let copier = copier_for(&mut self.copiers, &mut self.output, page.source, true);
        let mut copied = copier.copy_dictionary(&mut self.output, dict, &[b"Parent"]);
        for key in INHERITABLE {
            materialize(&mut copied, copier, &mut self.output, page, key);
        }
        self.insert_page(page, copied);
        Ok(())
    }

    fn write_composited(
        &mut self,
        content: SourcePage<'a>,
        background: SourcePage<'a>,
        digest: &'a str,
    ) -> Result<()> {
        let form = self.form(background, digest)?;

        // Everything fallible happens before the first object is written for
        // the page.
        let dict = content.dictionary()?;
        let streams = content.content_objects()?;
        let source_resources = content.resources();
        let source_xobjects = source_resources
            .and_then(|resources| resources.get(b"XObject").ok())
            .and_then(|value| resolve(content.document(), value).as_dict().ok());
        let name = unused_name(source_xobjects);
        let matrix = placement(self.fit, form.bbox, content.media_box());
        let draw_bytes = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new("cm", matrix.into_iter().map(Object::Real).collect()),
                Operation::new("Do", vec![Object::Name(name.clone().into_bytes())]),
                Operation::new("Q", vec![]),
            ],
        }
        .encode()
        .map_err(|err| ReportmarkError::Pdf(format!("cannot encode background draw: {}", err)))?;

        let copier = copier_for(&mut self.copiers, &mut self.output, content.source, true);
        let mut page = copier.copy_dictionary(
            &mut self.output,
            dict,
            &[b"Parent", b"Contents", b"Resources"],
        );
        for key in PAGE_GEOMETRY {
            materialize(&mut page, copier, &mut self.output, content, key);
        }

        let mut resources = source_resources
            .map(|source| copier.copy_dictionary(&mut self.output, source, &[b"XObject"]))
            .unwrap_or_else(Dictionary::new);
        let mut xobjects = source_xobjects
            .map(|source| copier.copy_dictionary(&mut self.output, source, &[]))
            .unwrap_or_else(Dictionary::new);
        xobjects.set(name, Object::Reference(form.id));
        resources.set("XObject", xobjects);

        let draw_id = self.output.add_object(Stream::new(Dictionary::new(), draw_bytes));
        let mut contents = vec![Object::Reference(draw_id)];
        for stream in &streams {
            // Content streams must be indirect inside an array.
            match copier.copy_object(&mut self.output, stream) {
                Object::Stream(direct) => {
                    contents.push(Object::Reference(self.output.add_object(direct)));
                }
                copied => contents.push(copied),
            }
        }
        page.set("Contents", contents);
        page.set("Resources", resources);
        self.insert_page(content, page);
        Ok(())
    }

    /// Form XObject for the background page, created on first use.
    fn form(&mut self, background: SourcePage<'a>, digest: &'a str) -> Result<Form> {
        if let Some(form) = self.forms.get(digest) {
            return Ok(*form);
        }

        let bytes = background.content_bytes()?;
        let bbox = background.media_box();
        let copier = copier_for(&mut self.copiers, &mut self.output, background.source, false);
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "FormType" => 1,
            "BBox" => bbox.iter().map(|&v| Object::Real(v)).collect::<Vec<_>>(),
        };
        if let Some(resources) = background.resources() {
            dict.set("Resources", copier.copy_dictionary(&mut self.output, resources, &[]));
        }
        let id = self.output.add_object(Stream::new(dict, bytes));
        let form = Form { id, bbox };
        self.forms.insert(digest, form);
        debug!(digest, ?id, "Background form created");
        Ok(form)
    }

    fn insert_page(&mut self, page: SourcePage<'a>, mut dict: Dictionary) {
        dict.set("Parent", self.pages_id);
        let id = self
            .copiers
            .get(&page.source.key)
            .and_then(|copier| copier.reserved_page(page.page_id))
            .unwrap_or_else(|| self.output.new_object_id());
        self.output.objects.insert(id, Object::Dictionary(dict));
        self.kids.push(Object::Reference(id));
    }
}

fn copier_for<'c, 'a>(
    copiers: &'c mut HashMap<usize, ObjectCopier<'a>>,
    output: &mut Document,
    source: SourceDocument<'a>,
    reserve_pages: bool,
) -> &'c mut ObjectCopier<'a> {
    copiers.entry(source.key).or_insert_with(|| {
        if reserve_pages {
            ObjectCopier::with_reserved_pages(source.document, output)
        } else {
            ObjectCopier::new(source.document)
        }
    })
}

/// Copy an inherited attribute onto the page itself when it is missing.
fn materialize(
    dict: &mut Dictionary,
    copier: &mut ObjectCopier<'_>,
    output: &mut Document,
    page: SourcePage<'_>,
    key: &[u8],
) {
    if dict.has(key) {
        return;
    }
    if let Some(value) = page.inherited(key) {
        dict.set(key.to_vec(), copier.copy_object(output, value));
    }
}

fn unused_name(xobjects: Option<&Dictionary>) -> String {
    let taken = |name: &str| xobjects.is_some_and(|dict| dict.has(name.as_bytes()));
    let mut name = BACKGROUND_XOBJECT.to_string();
    let mut suffix = 1;
    while taken(&name) {
        name = format!("{}{}", BACKGROUND_XOBJECT, suffix);
        suffix += 1;
    }
    name
}

/// `cm` operands mapping the background bbox onto the content media box.
fn placement(fit: WatermarkFit, bbox: [f32; 4], media_box: [f32; 4]) -> [f32; 6] {
    let (sx, sy) = match fit {
        WatermarkFit::Original => (1.0, 1.0),
        WatermarkFit::Stretch => (
            scale(media_box[2] - media_box[0], bbox[2] - bbox[0]),
            scale(media_box[3] - media_box[1], bbox[3] - bbox[1]),
        ),
    };
    [
        sx,
        0.0,
        0.0,
        sy,
        media_box[0] - bbox[0] * sx,
        media_box[1] - bbox[1] * sy,
    ]
}

fn scale(target: f32, extent: f32) -> f32 {
    if extent.abs() < f32::EPSILON {
        1.0
    } else {
        target / extent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::compositor::{Background, PageCompositor};
    use crate::pdf::fixtures;

    fn load(bytes: &[u8]) -> Document {
        Document::load_mem(bytes).unwrap()
    }

    fn save(document: Document) -> Vec<u8> {
        let mut document = document;
        let mut bytes = Vec::new();
        document.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn passthrough_pages_keep_their_content() {
        let content = load(&fixtures::text_pdf(&["one", "two"]));
        let mut writer = PageWriter::new("1.7", WatermarkFit::Original);
        writer.write_document(SourceDocument { key: 0, document: &content });
        assert_eq!(writer.page_count(), 2);

        let texts = fixtures::page_texts(&save(writer.finish()));
        assert_eq!(texts.len(), 2);
        assert!(texts[0].contains("(one) Tj"));
        assert!(texts[1].contains("(two) Tj"));
    }

    #[test]
    fn inherited_attributes_are_materialised() {
        let content = load(&fixtures::inherited_attributes_pdf());
        let mut writer = PageWriter::new("1.7", WatermarkFit::Original);
        writer.write_document(SourceDocument { key: 0, document: &content });
        let output = load(&save(writer.finish()));

        let page_id = *output.get_pages().get(&1).unwrap();
        let page = output.get_object(page_id).unwrap().as_dict().unwrap();
        assert_eq!(page.get(b"Rotate").unwrap().as_i64().unwrap(), 90);
        assert!(page.has(b"MediaBox"));
        assert!(page.has(b"Resources"));
    }

    #[test]
    fn composited_page_draws_background_first() {
        let content = load(&fixtures::text_pdf(&["content"]));
        let background = load(&fixtures::text_pdf(&["watermark"]));
        let content_page = SourcePage::first(SourceDocument { key: 0, document: &content }).unwrap();
        let compiled = PageCompositor.composite(
            content_page,
            Some(Background {
                digest: "wm",
                source: SourceDocument { key: 1, document: &background },
            }),
        );

        let mut writer = PageWriter::new("1.7", WatermarkFit::Original);
        writer.write(compiled);
        let bytes = save(writer.finish());

        let texts = fixtures::page_texts(&bytes);
        let draw = texts[0].find("/RmBackground Do").unwrap();
        let text = texts[0].find("(content) Tj").unwrap();
        assert!(draw < text);
        assert_eq!(fixtures::page_backgrounds(&bytes), vec![Some("watermark".to_string())]);
    }

    #[test]
    fn background_form_is_shared_between_pages() {
        let content = load(&fixtures::text_pdf(&["a", "b", "c"]));
        let background = load(&fixtures::text_pdf(&["watermark"]));
        let background = Background {
            digest: "wm",
            source: SourceDocument { key: 1, document: &background },
        };

        let mut writer = PageWriter::new("1.7", WatermarkFit::Original);
        for page in SourcePage::all(SourceDocument { key: 0, document: &content }) {
            writer.write(PageCompositor.composite(page, Some(background)));
        }
        let output = writer.finish();
        let forms = output
            .objects
            .values()
            .filter(|object| {
                object
                    .as_stream()
                    .ok()
                    .and_then(|stream| stream.dict.get(b"Subtype").ok())
                    .and_then(|subtype| subtype.as_name().ok())
                    == Some(b"Form".as_slice())
            })
            .count();
        assert_eq!(forms, 1);
    }

    #[test]
    fn media_box_and_rotation_come_from_content() {
        let content = load(&fixtures::inherited_attributes_pdf());
        let background = load(&fixtures::sized_text_pdf(&["wm"], [0, 0, 300, 300]));
        let content_page = SourcePage::first(SourceDocument { key: 0, document: &content }).unwrap();
        let compiled = PageCompositor.composite(
            content_page,
            Some(Background {
                digest: "wm",
                source: SourceDocument { key: 1, document: &background },
            }),
        );

        let mut writer = PageWriter::new("1.7", WatermarkFit::Stretch);
        writer.write(compiled);
        let output = load(&save(writer.finish()));
        let page = SourcePage::first(SourceDocument { key: 0, document: &output }).unwrap();
        assert_eq!(page.media_box(), [0.0, 0.0, 595.0, 842.0]);
        assert_eq!(page.inherited(b"Rotate").and_then(|r| r.as_i64().ok()), Some(90));
    }

    #[test]
    fn existing_xobject_names_are_not_clobbered() {
        let mut xobjects = Dictionary::new();
        assert_eq!(unused_name(None), "RmBackground");
        xobjects.set("RmBackground", Object::Null);
        xobjects.set("RmBackground1", Object::Null);
        assert_eq!(unused_name(Some(&xobjects)), "RmBackground2");
    }

    #[test]
    fn placement_translates_or_stretches() {
        let bbox = [10.0, 20.0, 110.0, 220.0];
        let media = [0.0, 0.0, 200.0, 400.0];
        assert_eq!(
            placement(WatermarkFit::Original, bbox, media),
            [1.0, 0.0, 0.0, 1.0, -10.0, -20.0]
        );
        assert_eq!(
            placement(WatermarkFit::Stretch, bbox, media),
            [2.0, 0.0, 0.0, 2.0, -20.0, -40.0]
        );
    }
}
