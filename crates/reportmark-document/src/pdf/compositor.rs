// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page compositor: pairs one content page with at most one background page.
//
// Compositing is a plan, not a copy. `composite` returns a `CompiledPage`
// borrowing the decoded documents, and `PageWriter` materialises it into the
// output document.

use tracing::warn;

use super::page::{SourceDocument, SourcePage};

/// A decoded background document together with the digest of its bytes.
#[derive(Debug, Clone, Copy)]
pub struct Background<'a> {
    pub digest: &'a str,
    pub source: SourceDocument<'a>,
}

/// One output page before it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompiledPage<'a> {
    /// The page is emitted exactly as it appears in its source.
    Passthrough(SourcePage<'a>),
    /// `background` is drawn first, then `content` on top of it.
    Composited {
        content: SourcePage<'a>,
        background: SourcePage<'a>,
        digest: &'a str,
    },
}

impl<'a> CompiledPage<'a> {
    /// The page whose geometry and position the output page takes.
    pub fn content(&self) -> SourcePage<'a> {
        match self {
            CompiledPage::Passthrough(page) => *page,
            CompiledPage::Composited { content, .. } => *content,
        }
    }

    pub fn is_composited(&self) -> bool {
        matches!(self, CompiledPage::Composited { .. })
    }
}

/// Merges exactly one content page with at most one background.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageCompositor;

impl PageCompositor {
    /// Plan the output page for `content`.
    ///
    /// Without a background the content page passes through unchanged. The
    /// background's first page is used; a background without pages also
    /// degrades to passthrough.
    pub fn composite<'a>(
        &self,
        content: SourcePage<'a>,
        background: Option<Background<'a>>,
    ) -> CompiledPage<'a> {
        let Some(background) = background else {
            return CompiledPage::Passthrough(content);
        };
        match SourcePage::first(background.source) {
            Some(first) => CompiledPage::Composited {
                content,
                background: first,
                digest: background.digest,
            },
            None => {
                warn!(
                    digest = background.digest,
                    page = content.number,
                    "Background PDF has no pages; page left unbranded"
                );
                CompiledPage::Passthrough(content)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::fixtures;
    use lopdf::Document;

    #[test]
    fn no_background_is_passthrough() {
        let document = Document::load_mem(&fixtures::text_pdf(&["content"])).unwrap();
        let content = SourcePage::first(SourceDocument { key: 0, document: &document }).unwrap();
        let compiled = PageCompositor.composite(content, None);
        assert_eq!(compiled, CompiledPage::Passthrough(content));
        assert_eq!(compiled.content(), content);
        assert!(!compiled.is_composited());
    }

    #[test]
    fn background_first_page_is_used() {
        let content_doc = Document::load_mem(&fixtures::text_pdf(&["content"])).unwrap();
        let background_doc = Document::load_mem(&fixtures::text_pdf(&["bg1", "bg2"])).unwrap();
        let content = SourcePage::first(SourceDocument { key: 0, document: &content_doc }).unwrap();
        let source = SourceDocument { key: 1, document: &background_doc };

        let compiled = PageCompositor.composite(content, Some(Background { digest: "d", source }));
        match compiled {
            CompiledPage::Composited { content: c, background, digest } => {
                assert_eq!(c, content);
                assert_eq!(background.number, 1);
                assert_eq!(digest, "d");
            }
            other => panic!("expected composited page, got {:?}", other),
        }
    }

    #[test]
    fn empty_background_degrades_to_passthrough() {
        let content_doc = Document::load_mem(&fixtures::text_pdf(&["content"])).unwrap();
        let empty = Document::load_mem(&fixtures::empty_pdf()).unwrap();
        let content = SourcePage::first(SourceDocument { key: 0, document: &content_doc }).unwrap();
        let background = Background {
            digest: "empty",
            source: SourceDocument { key: 1, document: &empty },
        };
        assert_eq!(
            PageCompositor.composite(content, Some(background)),
            CompiledPage::Passthrough(content)
        );
    }
}
