// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// reportmark-document — PDF side of the Reportmark branding engine.
//
// Decodes rendered reports with lopdf, lays the resolved background under each
// page, inserts cover and trailer documents, and re-encodes the result. All
// temporary files go through `ScratchFile`.

pub mod pdf;

// Re-export the primary structs so callers can use `reportmark_document::DocumentAssembler` etc.
pub use pdf::assembler::DocumentAssembler;
pub use pdf::codec::{LopdfCodec, LopdfProbe};
pub use pdf::compositor::PageCompositor;
pub use pdf::scratch::ScratchFile;
