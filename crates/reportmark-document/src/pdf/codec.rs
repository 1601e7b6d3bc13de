// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF codec: the one seam between the engine and its PDF library.
//
// The binding is chosen at build time (`ActiveCodec`); there is no runtime
// probing of library versions. The lopdf binding spools through scratch files
// when configured to, so every decode/encode sits inside a `ScratchFile`
// guard.

use std::path::PathBuf;

use lopdf::Document;
use reportmark_core::error::{ReportmarkError, Result};
use reportmark_core::{Blob, EngineConfig, WatermarkProbe};
use tracing::{debug, instrument, warn};

use super::scratch::ScratchFile;

/// Decode/encode contract of a PDF library binding.
pub trait PdfCodec {
    type Document;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Document>;

    fn page_count(&self, document: &Self::Document) -> usize;

    fn encode(&self, document: &mut Self::Document) -> Result<Vec<u8>>;
}

/// The binding compiled into this build.
pub type ActiveCodec = LopdfCodec;

/// [`PdfCodec`] backed by `lopdf`.
#[derive(Debug, Clone, Default)]
pub struct LopdfCodec {
    spool_to_disk: bool,
    scratch_dir: Option<PathBuf>,
}

impl LopdfCodec {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            spool_to_disk: config.spool_to_disk,
            scratch_dir: config.scratch_dir.clone(),
        }
    }

    /// In-memory codec that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            spool_to_disk: false,
            scratch_dir: None,
        }
    }

    /// Decode a background or insertion document, which must have pages.
    pub fn decode_watermark(&self, blob: &Blob) -> Result<Document> {
        let document = self
            .decode(blob.as_bytes())
            .map_err(|err| ReportmarkError::Watermark(format!("{}: {}", blob.digest(), err)))?;
        if self.page_count(&document) == 0 {
            return Err(ReportmarkError::Watermark(format!(
                "{}: document has no pages",
                blob.digest()
            )));
        }
        Ok(document)
    }
}

impl LopdfCodec {
    /// A scratch file when spooling, or `None` to work in memory. Scratch
    /// I/O is an optimisation; failing to get one never fails the call.
    fn scratch(&self) -> Option<ScratchFile> {
        if !self.spool_to_disk {
            return None;
        }
        ScratchFile::create(self.scratch_dir.as_deref())
            .inspect_err(|err| warn!(%err, "Scratch file unavailable; working in memory"))
            .ok()
    }

    /// `bytes` spooled to a scratch file, or `None` to decode from memory.
    fn spool(&self, bytes: &[u8]) -> Option<ScratchFile> {
        if !self.spool_to_disk {
            return None;
        }
        ScratchFile::with_contents(self.scratch_dir.as_deref(), bytes)
            .inspect_err(|err| warn!(%err, "Cannot spool PDF; decoding from memory"))
            .ok()
    }
}

impl PdfCodec for LopdfCodec {
    type Document = Document;

    #[instrument(level = "debug", skip_all, fields(bytes_len = bytes.len(), spooled = self.spool_to_disk))]
    fn decode(&self, bytes: &[u8]) -> Result<Document> {
        let document = match self.spool(bytes) {
            Some(scratch) => Document::load(scratch.path()),
            None => Document::load_mem(bytes),
        }
        .map_err(|err| ReportmarkError::Pdf(format!("failed to load PDF: {}", err)))?;

        debug!(pages = document.get_pages().len(), "PDF decoded");
        Ok(document)
    }

    fn page_count(&self, document: &Document) -> usize {
        document.get_pages().len()
    }

    #[instrument(level = "debug", skip_all, fields(spooled = self.spool_to_disk))]
    fn encode(&self, document: &mut Document) -> Result<Vec<u8>> {
        let output = if let Some(mut scratch) = self.scratch() {
            scratch
                .write_with(|writer| {
                    document
                        .save_to(writer)
                        .map_err(|err| std::io::Error::other(err.to_string()))
                })
                .map_err(|err| ReportmarkError::Encode(err.to_string()))?;
            scratch.read_all()?
        } else {
            let mut output = Vec::new();
            document
                .save_to(&mut output)
                .map_err(|err| ReportmarkError::Encode(err.to_string()))?;
            output
        };

        debug!(output_bytes = output.len(), "PDF encoded");
        Ok(output)
    }
}

/// [`WatermarkProbe`] that decodes the blob and checks for at least one page.
///
/// Stateless; suitable for a long-lived `CachedResolver`.
#[derive(Debug, Clone, Default)]
pub struct LopdfProbe {
    codec: LopdfCodec,
}

impl LopdfProbe {
    pub fn new(codec: LopdfCodec) -> Self {
        Self { codec }
    }
}

impl WatermarkProbe for LopdfProbe {
    fn is_usable(&self, blob: &Blob) -> bool {
        match self.codec.decode_watermark(blob) {
            Ok(_) => true,
            Err(err) => {
                warn!(%err, "Background PDF rejected");
                false
            }
        }
    }
}
