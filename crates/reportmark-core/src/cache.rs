// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Memoised background resolution for hot bulk-printing paths.
//
// Keys always carry the full (report, company, language) tuple plus a digest
// of the configuration, so one tenant's or language's background can never
// be served to another.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::resolver::{BackgroundResolver, PreparedResolver, WatermarkProbe};
use crate::types::{Blob, CompanyId, LanguageCode, ReportContext, ReportId};

/// Cache key for one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolutionKey {
    pub report_id: ReportId,
    pub company_id: Option<CompanyId>,
    pub language: Option<LanguageCode>,
    /// [`ReportContext::configuration_digest`] of the resolving context.
    pub configuration: String,
    /// `(page_index, page_count)` for page-dependent modes, else `None`.
    pub position: Option<(usize, usize)>,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// A [`BackgroundResolver`] with a bounded, thread-safe memo table.
pub struct CachedResolver<P> {
    resolver: BackgroundResolver<P>,
    entries: Mutex<HashMap<ResolutionKey, Option<Blob>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<P: WatermarkProbe> CachedResolver<P> {
    pub fn new(probe: P, capacity: usize) -> Self {
        Self {
            resolver: BackgroundResolver::new(probe),
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Bind a context for a run of page resolutions. The configuration
    /// digest and the prepared rules are computed once here rather than per
    /// page.
    pub fn scope<'a>(&'a self, context: &'a ReportContext) -> ScopedResolver<'a, P> {
        ScopedResolver {
            cache: self,
            prepared: self.resolver.prepare(context),
            configuration: context.configuration_digest(),
        }
    }

    /// One-off resolution; prefer [`CachedResolver::scope`] in loops.
    pub fn resolve(
        &self,
        context: &ReportContext,
        page_index: usize,
        page_count: usize,
    ) -> Option<Blob> {
        self.scope(context).resolve(page_index, page_count)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.lock().len(),
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ResolutionKey, Option<Blob>>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A [`CachedResolver`] bound to one [`ReportContext`].
pub struct ScopedResolver<'a, P> {
    cache: &'a CachedResolver<P>,
    prepared: PreparedResolver<'a, P>,
    configuration: String,
}

impl<P: WatermarkProbe> ScopedResolver<'_, P> {
    pub fn resolve(&self, page_index: usize, page_count: usize) -> Option<Blob> {
        let key = self.key(page_index, page_count);

        if let Some(cached) = self.cache.lock().get(&key) {
            self.cache.hits.fetch_add(1, Ordering::Relaxed);
            return cached.clone();
        }

        // Resolve outside the lock; the probe may decode PDFs.
        self.cache.misses.fetch_add(1, Ordering::Relaxed);
        let resolved = self.prepared.resolve(page_index, page_count);

        let mut entries = self.cache.lock();
        if entries.len() >= self.cache.capacity {
            debug!(capacity = self.cache.capacity, "Resolution cache full; clearing");
            entries.clear();
        }
        entries.insert(key, resolved.clone());
        resolved
    }

    fn key(&self, page_index: usize, page_count: usize) -> ResolutionKey {
        let context = self.prepared.context();
        let position = if context.settings.source.is_page_dependent() {
            Some((page_index, page_count))
        } else if page_index < page_count {
            None
        } else {
            // Out-of-range positions resolve to nothing in every mode.
            Some((page_index, page_count))
        };
        ResolutionKey {
            report_id: context.report_id,
            company_id: context.company_id,
            language: context.language.clone(),
            configuration: self.configuration.clone(),
            position,
        }
    }
}
