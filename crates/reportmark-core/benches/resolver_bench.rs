// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for background resolution in the reportmark-core crate.
// Compares the plain resolver against the memoised one on a 200-page report
// using every per-page selector kind.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use reportmark_core::{
    AcceptAll, BackgroundResolver, BackgroundSource, Blob, CachedResolver, PageSelector,
    ReportBackgroundRule, ReportContext, ReportId,
};

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn dynamic_context() -> ReportContext {
    let report = ReportId(1);
    let rule = |selector, tag: &str| {
        ReportBackgroundRule::new(report, selector).with_watermark(Blob::new(tag.as_bytes().to_vec()))
    };
    ReportContext::new(report)
        .with_source(BackgroundSource::ReportDynamicBasic)
        .with_rule(rule(PageSelector::FirstPage, "first"))
        .with_rule(rule(PageSelector::LastPage, "last"))
        .with_rule(rule(PageSelector::Fixed(3), "third"))
        .with_rule(rule(
            PageSelector::ExpressionMatch("page % 10 == 0 and page != page_count".into()),
            "tenth",
        ))
        .with_rule(rule(PageSelector::Remaining, "rest"))
}

fn bench_resolution(c: &mut Criterion) {
    let ctx = dynamic_context();
    let pages = 200;

    c.bench_function("resolve 200 pages (uncached)", |b| {
        let resolver = BackgroundResolver::new(AcceptAll);
        b.iter(|| {
            for i in 0..pages {
                black_box(resolver.resolve(black_box(&ctx), i, pages));
            }
        });
    });

    c.bench_function("resolve 200 pages (cached, warm)", |b| {
        let cache = CachedResolver::new(AcceptAll, 4096);
        b.iter(|| {
            let scoped = cache.scope(black_box(&ctx));
            for i in 0..pages {
                black_box(scoped.resolve(i, pages));
            }
        });
    });
}

criterion_group!(benches, bench_resolution);
criterion_main!(benches);
