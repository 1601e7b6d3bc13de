// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reportmark — Core types, error definitions, and background resolution
// shared by the document crate.

pub mod cache;
pub mod config;
pub mod error;
pub mod expression;
pub mod resolver;
pub mod types;

pub use cache::{CacheStats, CachedResolver, ResolutionKey, ScopedResolver};
pub use config::{EngineConfig, WatermarkFit};
pub use error::ReportmarkError;
pub use expression::PageExpression;
pub use resolver::{AcceptAll, BackgroundResolver, PreparedResolver, WatermarkProbe};
pub use types::*;
