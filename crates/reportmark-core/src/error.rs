// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Reportmark.

use thiserror::Error;

/// Top-level error type for all Reportmark operations.
///
/// Only [`ReportmarkError::ContentDecode`] ever reaches the caller of
/// `DocumentAssembler::assemble`; every other variant is caught inside the
/// assembler and degrades the affected page or document part to passthrough.
#[derive(Debug, Error)]
pub enum ReportmarkError {
    // -- Fatal --
    #[error("content PDF could not be decoded: {0}")]
    ContentDecode(String),

    // -- Recoverable branding errors --
    #[error("background PDF unusable: {0}")]
    Watermark(String),

    #[error("page expression invalid: {0}")]
    Expression(String),

    // -- PDF plumbing --
    #[error("PDF operation failed: {0}")]
    Pdf(String),

    #[error("PDF encoding failed: {0}")]
    Encode(String),

    // -- Environment / configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReportmarkError {
    /// True for the one error class that aborts an assembly.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ContentDecode(_))
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ReportmarkError>;
