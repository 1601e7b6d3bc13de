// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scratch files: scoped, file-backed byte buffers for decode/encode
// round-trips. The backing file is removed when the guard drops, on every
// exit path. Removal failures are logged and never propagated.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use reportmark_core::error::{ReportmarkError, Result};
use tempfile::TempPath;
use tracing::{debug, warn};

/// A temporary file owned by the current call.
///
/// Each `assemble` call acquires its own guards; handles are never shared
/// between calls.
pub struct ScratchFile {
    file: Option<File>,
    path: Option<TempPath>,
}

impl ScratchFile {
    /// Create an empty scratch file in `dir`, or the system temp dir.
    pub fn create(dir: Option<&Path>) -> Result<Self> {
        let dir: PathBuf = dir.map_or_else(std::env::temp_dir, Path::to_path_buf);
        let named = tempfile::Builder::new()
            .prefix("reportmark-")
            .suffix(".pdf")
            .tempfile_in(&dir)
            .map_err(|err| {
                ReportmarkError::Io(std::io::Error::new(
                    err.kind(),
                    format!("cannot create scratch file in {}: {}", dir.display(), err),
                ))
            })?;
        let (file, path) = named.into_parts();
        debug!(path = %path.display(), "Scratch file acquired");
        Ok(Self {
            file: Some(file),
            path: Some(path),
        })
    }

    /// Create a scratch file holding `bytes`.
    pub fn with_contents(dir: Option<&Path>, bytes: &[u8]) -> Result<Self> {
        let mut scratch = Self::create(dir)?;
        scratch.write_with(|writer| writer.write_all(bytes))?;
        Ok(scratch)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        // Only `release` and `Drop` take the path, and both consume the guard.
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Run `write` against a buffered writer over the backing file and flush.
    pub fn write_with<F>(&mut self, write: F) -> Result<()>
    where
        F: FnOnce(&mut BufWriter<&mut File>) -> std::io::Result<()>,
    {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| ReportmarkError::Io(std::io::Error::other("scratch file closed")))?;
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Read the whole backing file.
    pub fn read_all(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.path())?)
    }

    /// Release the backing file now instead of at drop.
    pub fn release(mut self) {
        self.cleanup();
    }

    fn cleanup(&mut self) {
        // Close the handle first; some platforms refuse to delete open files.
        drop(self.file.take());
        let Some(path) = self.path.take() else {
            return;
        };
        let shown = path.display().to_string();
        match path.close() {
            Ok(()) => debug!(path = %shown, "Scratch file released"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %shown, "Scratch file already removed")
            }
            Err(err) => warn!(path = %shown, %err, "Failed to remove scratch file"),
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        self.cleanup();
    }
}
