// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReportmarkError, Result};

/// How a background page is placed under a content page whose media box has
/// a different size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkFit {
    /// Background drawn at its own size, anchored at the content page's
    /// lower-left corner.
    #[default]
    Original,
    /// Background scaled to cover the content page's media box.
    Stretch,
}

/// Settings for the compositing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Decode and encode through file-backed scratch buffers.
    pub spool_to_disk: bool,
    /// Directory for scratch files; the system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
    /// Flate-compress streams in the assembled output.
    pub compress_output: bool,
    pub watermark_fit: WatermarkFit,
    /// PDF header version of the assembled output.
    pub pdf_version: String,
    /// Maximum number of memoised resolutions held by a `CachedResolver`.
    pub resolution_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            spool_to_disk: true,
            scratch_dir: None,
            compress_output: true,
            watermark_fit: WatermarkFit::Original,
            pdf_version: "1.7".to_string(),
            resolution_cache_capacity: 4096,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    fn validate(&self) -> Result<()> {
        let version_ok = matches!(
            self.pdf_version.as_str(),
            "1.3" | "1.4" | "1.5" | "1.6" | "1.7" | "2.0"
        );
        if !version_ok {
            return Err(ReportmarkError::Config(format!(
                "unsupported pdf_version {:?}",
                self.pdf_version
            )));
        }
        if let Some(dir) = &self.scratch_dir
            && !dir.is_dir()
        {
            return Err(ReportmarkError::Config(format!(
                "scratch_dir {} is not a directory",
                dir.display()
            )));
        }
        Ok(())
    }
}
