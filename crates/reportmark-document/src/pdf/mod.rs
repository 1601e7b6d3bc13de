// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — scratch files, the lopdf codec, page compositing, and
// whole-document assembly.

pub mod assembler;
pub mod codec;
pub mod compositor;
pub mod copier;
pub mod page;
pub mod scratch;
pub mod writer;

#[cfg(test)]
mod fixtures;

pub use assembler::DocumentAssembler;
pub use codec::{ActiveCodec, LopdfCodec, LopdfProbe, PdfCodec};
pub use compositor::{Background, CompiledPage, PageCompositor};
pub use page::{SourceDocument, SourcePage};
pub use scratch::ScratchFile;
pub use writer::PageWriter;
