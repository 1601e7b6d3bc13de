// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document assembly: decode the content PDF, brand every page, add the
// prepend/append documents and encode the result.
//
// A branding defect never costs the caller the report. Only a content PDF
// that cannot be decoded is an error; every other failure degrades the
// affected page or insertion and is logged.

use std::cell::RefCell;
use std::collections::HashMap;

use lopdf::Document;
use reportmark_core::error::{ReportmarkError, Result};
use reportmark_core::{
    BackgroundResolver, Blob, CachedResolver, EngineConfig, PageSelector, ReportContext,
    WatermarkProbe,
};
use tracing::{debug, info, instrument, warn};

use super::codec::{ActiveCodec, LopdfProbe, PdfCodec};
use super::compositor::{Background, PageCompositor};
use super::page::{SourceDocument, SourcePage};
use super::writer::PageWriter;

/// Key of the content document among the sources of one assembly.
const CONTENT_KEY: usize = 0;

/// Turns a content PDF plus a [`ReportContext`] into the branded PDF.
///
/// Holds configuration only; every call owns its decoded documents and
/// scratch files, so one assembler can serve concurrent calls.
#[derive(Debug, Clone)]
pub struct DocumentAssembler {
    config: EngineConfig,
    codec: ActiveCodec,
    compositor: PageCompositor,
}

impl Default for DocumentAssembler {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl DocumentAssembler {
    pub fn new(config: EngineConfig) -> Self {
        let codec = ActiveCodec::from_config(&config);
        Self {
            config,
            codec,
            compositor: PageCompositor,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A resolution cache that judges backgrounds with this assembler's codec,
    /// sized from the configuration. Share it between calls with
    /// [`assemble_with_cache`](Self::assemble_with_cache).
    pub fn resolution_cache(&self) -> CachedResolver<LopdfProbe> {
        CachedResolver::new(
            LopdfProbe::new(self.codec.clone()),
            self.config.resolution_cache_capacity,
        )
    }

    /// Brand `content_pdf` for `context`.
    ///
    /// Fails only with [`ReportmarkError::ContentDecode`].
    #[instrument(skip_all, fields(report_id = %context.report_id, input_bytes = content_pdf.len()))]
    pub fn assemble(&self, content_pdf: &[u8], context: &ReportContext) -> Result<Vec<u8>> {
        let library = WatermarkLibrary::new(&self.codec);
        let resolver = BackgroundResolver::new(&library);
        let prepared = resolver.prepare(context);
        self.run(content_pdf, context, &library, |index, count| {
            prepared.resolve(index, count)
        })
    }

    /// Like [`assemble`](Self::assemble), resolving through a shared cache.
    #[instrument(skip_all, fields(report_id = %context.report_id, input_bytes = content_pdf.len()))]
    pub fn assemble_with_cache(
        &self,
        content_pdf: &[u8],
        context: &ReportContext,
        cache: &CachedResolver<LopdfProbe>,
    ) -> Result<Vec<u8>> {
        let library = WatermarkLibrary::new(&self.codec);
        let scoped = cache.scope(context);
        self.run(content_pdf, context, &library, |index, count| {
            scoped.resolve(index, count)
        })
    }

    fn run<F>(
        &self,
        content_pdf: &[u8],
        context: &ReportContext,
        library: &WatermarkLibrary<'_>,
        resolve: F,
    ) -> Result<Vec<u8>>
    where
        F: Fn(usize, usize) -> Option<Blob>,
    {
        if !context.settings.apply_background {
            debug!("Backgrounds disabled for report; returning content unchanged");
            return Ok(content_pdf.to_vec());
        }

        let content = self
            .codec
            .decode(content_pdf)
            .map_err(|err| ReportmarkError::ContentDecode(err.to_string()))?;
        let page_count = self.codec.page_count(&content);

        let resolved: Vec<Option<Blob>> = (0..page_count)
            .map(|index| resolve(index, page_count))
            .collect();
        for blob in resolved.iter().flatten() {
            library.load(blob);
        }
        let backgrounds = library.take_documents();
        let prepends = self.insertions(context, &PageSelector::Prepend);
        let appends = self.insertions(context, &PageSelector::Append);

        let mut writer = PageWriter::new(&self.config.pdf_version, self.config.watermark_fit);
        let mut next_key = CONTENT_KEY + 1;
        let mut next_source = |document| {
            let source = SourceDocument {
                key: next_key,
                document,
            };
            next_key += 1;
            source
        };

        for document in &prepends {
            writer.write_document(next_source(document));
        }

        let content_source = SourceDocument {
            key: CONTENT_KEY,
            document: &content,
        };
        let mut background_sources: HashMap<&str, SourceDocument<'_>> = HashMap::new();
        let mut branded = 0usize;
        for (page, blob) in SourcePage::all(content_source).into_iter().zip(&resolved) {
            let background = blob.as_ref().and_then(|blob| {
                let digest = blob.digest();
                let document = backgrounds.get(digest)?.as_ref()?;
                let source = *background_sources
                    .entry(digest)
                    .or_insert_with(|| next_source(document));
                Some(Background { digest, source })
            });
            let compiled = self.compositor.composite(page, background);
            if compiled.is_composited() {
                branded += 1;
            }
            writer.write(compiled);
        }

        for document in &appends {
            writer.write_document(next_source(document));
        }
        writer.carry_info(content_source);

        let output_pages = writer.page_count();
        let mut output = writer.finish();
        output.prune_objects();
        output.renumber_objects();
        if self.config.compress_output {
            output.compress();
        }

        match self.codec.encode(&mut output) {
            Ok(bytes) => {
                info!(
                    content_pages = page_count,
                    branded,
                    prepended = prepends.len(),
                    appended = appends.len(),
                    output_pages,
                    output_bytes = bytes.len(),
                    "Report assembled"
                );
                Ok(bytes)
            }
            Err(err) => {
                warn!(%err, "Failed to encode assembled report; returning content unchanged");
                Ok(content_pdf.to_vec())
            }
        }
    }

    /// Decoded documents of the in-scope `selector` rules, in rule order.
    fn insertions(&self, context: &ReportContext, selector: &PageSelector) -> Vec<Document> {
        context
            .insertion_rules(selector)
            .into_iter()
            .enumerate()
            .filter_map(|(position, rule)| {
                let Some(blob) = rule.watermark_bytes.as_ref() else {
                    debug!(?selector, position, "Insertion rule has no document");
                    return None;
                };
                match self.codec.decode_watermark(blob) {
                    Ok(document) => Some(document),
                    Err(err) => {
                        warn!(?selector, position, %err, "Insertion document skipped");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Decoded backgrounds of one assembly, keyed by blob digest.
///
/// Doubles as the [`WatermarkProbe`] of an uncached resolution, so every
/// distinct background is decoded once per call.
struct WatermarkLibrary<'c> {
    codec: &'c ActiveCodec,
    documents: RefCell<HashMap<String, Option<Document>>>,
}

impl<'c> WatermarkLibrary<'c> {
    fn new(codec: &'c ActiveCodec) -> Self {
        Self {
            codec,
            documents: RefCell::new(HashMap::new()),
        }
    }

    /// Decode `blob` unless already known; returns whether it has pages.
    fn load(&self, blob: &Blob) -> bool {
        if let Some(known) = self.documents.borrow().get(blob.digest()) {
            return known.is_some();
        }
        let document = match self.codec.decode_watermark(blob) {
            Ok(document) => Some(document),
            Err(err) => {
                warn!(%err, "Background PDF rejected");
                None
            }
        };
        let usable = document.is_some();
        self.documents
            .borrow_mut()
            .insert(blob.digest().to_string(), document);
        usable
    }

    fn take_documents(&self) -> HashMap<String, Option<Document>> {
        self.documents.take()
    }
}

impl WatermarkProbe for WatermarkLibrary<'_> {
    fn is_usable(&self, blob: &Blob) -> bool {
        self.load(blob)
    }
}
