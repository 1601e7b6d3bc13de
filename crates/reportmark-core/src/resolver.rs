// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Background resolution: decides which background (if any) underlies a page.
//
// The per-page mode is an ordered list of priority tiers evaluated first to
// last; the first tier holding a rule with a usable background wins. The
// static and per-company-language modes ignore page position entirely.

use tracing::{debug, warn};

use crate::error::ReportmarkError;
use crate::expression::PageExpression;
use crate::types::{
    BackgroundSource, Blob, LanguageBackground, LanguageCode, PageSelector, ReportBackgroundRule,
    ReportContext,
};

/// Decides whether a background blob is usable, i.e. decodes to a PDF with
/// at least one page. Unusable blobs are treated exactly like absent ones.
pub trait WatermarkProbe {
    fn is_usable(&self, blob: &Blob) -> bool;
}

impl<P: WatermarkProbe + ?Sized> WatermarkProbe for &P {
    fn is_usable(&self, blob: &Blob) -> bool {
        (**self).is_usable(blob)
    }
}

/// Probe that accepts every non-empty blob without decoding it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl WatermarkProbe for AcceptAll {
    fn is_usable(&self, blob: &Blob) -> bool {
        !blob.is_empty()
    }
}

/// Position of a page within the content document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PagePosition {
    index: usize,
    count: usize,
}

/// Priority tiers of [`BackgroundSource::ReportDynamicBasic`], highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    FirstPage,
    LastPage,
    Fixed,
    Expression,
    Remaining,
}

const PAGE_TIERS: [Tier; 5] = [
    Tier::FirstPage,
    Tier::LastPage,
    Tier::Fixed,
    Tier::Expression,
    Tier::Remaining,
];

impl Tier {
    /// Whether `rule` belongs to this tier and claims the page at `position`.
    fn claims(self, rule: &CandidateRule<'_>, position: PagePosition) -> bool {
        match (self, &rule.rule.selector) {
            (Tier::FirstPage, PageSelector::FirstPage) => position.index == 0,
            (Tier::LastPage, PageSelector::LastPage) => position.index + 1 == position.count,
            (Tier::Fixed, PageSelector::Fixed(number)) => {
                usize::try_from(*number).is_ok_and(|n| n == position.index + 1)
            }
            (Tier::Expression, PageSelector::ExpressionMatch(_)) => {
                let Some(expression) = &rule.expression else {
                    return false;
                };
                match expression.evaluate(position.index + 1, position.count) {
                    Ok(matched) => matched,
                    Err(err) => {
                        let err = ReportmarkError::from(err);
                        warn!(
                            expression = expression.source(),
                            page = position.index + 1,
                            %err,
                            "Page expression failed; treating as no match"
                        );
                        false
                    }
                }
            }
            (Tier::Remaining, PageSelector::Remaining) => true,
            _ => false,
        }
    }
}

/// A rule in scope for one context, with its page expression parsed.
#[derive(Debug)]
struct CandidateRule<'c> {
    rule: &'c ReportBackgroundRule,
    expression: Option<PageExpression>,
}

impl<'c> CandidateRule<'c> {
    /// `None` when the rule's expression does not parse; such a rule can
    /// never claim a page.
    fn new(rule: &'c ReportBackgroundRule) -> Option<Self> {
        let expression = match &rule.selector {
            PageSelector::ExpressionMatch(source) => match PageExpression::parse(source) {
                Ok(expression) => Some(expression),
                Err(err) => {
                    let err = ReportmarkError::from(err);
                    warn!(expression = %source, %err, "Page expression invalid; rule never matches");
                    return None;
                }
            },
            _ => None,
        };
        Some(Self { rule, expression })
    }
}

/// Pure background decision logic.
///
/// Holds only a [`WatermarkProbe`]; everything else comes from the
/// [`ReportContext`] passed to each call.
#[derive(Debug, Clone, Default)]
pub struct BackgroundResolver<P = AcceptAll> {
    probe: P,
}

impl<P: WatermarkProbe> BackgroundResolver<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Background for the page at `page_index` (0-based) of a
    /// `page_count`-page document, or `None` to leave the page unbranded.
    ///
    /// Resolving many pages of one document? [`prepare`](Self::prepare)
    /// once and resolve through the result.
    pub fn resolve(
        &self,
        context: &ReportContext,
        page_index: usize,
        page_count: usize,
    ) -> Option<Blob> {
        self.prepare(context).resolve(page_index, page_count)
    }

    /// Bind `context`: select and order its candidate rules and parse their
    /// page expressions, once for every page resolved afterwards.
    pub fn prepare<'c>(&'c self, context: &'c ReportContext) -> PreparedResolver<'c, P> {
        let candidates = match context.settings.source {
            BackgroundSource::ReportDynamicBasic => language_ordered(context, |rule| {
                !rule.selector.is_insertion() && context.scopes(rule)
            })
            .into_iter()
            .filter_map(CandidateRule::new)
            .collect(),
            BackgroundSource::ReportDynamicPerCompanyLanguage => match context.company_id {
                Some(company_id) => language_ordered(context, |rule| {
                    !rule.selector.is_insertion()
                        && rule.report_id == context.report_id
                        && rule.company_id == Some(company_id)
                        && context.scopes(rule)
                })
                .into_iter()
                .map(|rule| CandidateRule {
                    rule,
                    expression: None,
                })
                .collect(),
                None => Vec::new(),
            },
            BackgroundSource::CompanyDefault | BackgroundSource::ReportFixed => Vec::new(),
        };
        PreparedResolver {
            resolver: self,
            context,
            candidates,
        }
    }

    fn company_default(&self, context: &ReportContext) -> Option<Blob> {
        if context.company_id.is_none() {
            debug!(report = %context.report_id, "No company in context; company background skipped");
            return None;
        }
        self.lookup_table(&context.company_backgrounds, context.language.as_ref())
    }

    // -- Helpers --------------------------------------------------------------

    /// The rule's own background, else the company default when the rule
    /// asks for it.
    fn rule_background(&self, context: &ReportContext, rule: &ReportBackgroundRule) -> Option<Blob> {
        self.usable(rule.watermark_bytes.as_ref()).or_else(|| {
            if rule.fallback_to_company {
                self.company_default(context)
            } else {
                None
            }
        })
    }

    /// Exact-language entry first, then the language-agnostic entry.
    fn lookup_table(
        &self,
        table: &[LanguageBackground],
        language: Option<&LanguageCode>,
    ) -> Option<Blob> {
        let exact = language.and_then(|lang| {
            table
                .iter()
                .filter(|entry| entry.language.as_ref() == Some(lang))
                .find_map(|entry| self.usable(entry.watermark_bytes.as_ref()))
        });
        exact.or_else(|| {
            table
                .iter()
                .filter(|entry| entry.language.is_none())
                .find_map(|entry| self.usable(entry.watermark_bytes.as_ref()))
        })
    }

    fn usable(&self, blob: Option<&Blob>) -> Option<Blob> {
        let blob = blob?;
        if self.probe.is_usable(blob) {
            Some(blob.clone())
        } else {
            debug!(bytes = blob.len(), "Background blob unusable; falling through");
            None
        }
    }
}

/// A [`BackgroundResolver`] bound to one [`ReportContext`].
#[derive(Debug)]
pub struct PreparedResolver<'c, P> {
    resolver: &'c BackgroundResolver<P>,
    context: &'c ReportContext,
    /// Exact-language rules first, then language-agnostic, each in rule order.
    candidates: Vec<CandidateRule<'c>>,
}

impl<'c, P: WatermarkProbe> PreparedResolver<'c, P> {
    pub fn context(&self) -> &'c ReportContext {
        self.context
    }

    /// See [`BackgroundResolver::resolve`].
    pub fn resolve(&self, page_index: usize, page_count: usize) -> Option<Blob> {
        if page_index >= page_count {
            return None;
        }

        let context = self.context;
        let resolved = match context.settings.source {
            BackgroundSource::CompanyDefault => self.resolver.company_default(context),
            BackgroundSource::ReportFixed => self.resolver.lookup_table(
                &context.settings.fixed_backgrounds,
                context.language.as_ref(),
            ),
            BackgroundSource::ReportDynamicBasic => self.resolve_page_rules(PagePosition {
                index: page_index,
                count: page_count,
            }),
            BackgroundSource::ReportDynamicPerCompanyLanguage => self.resolve_company_language(),
        };

        debug!(
            report = %context.report_id,
            source = ?context.settings.source,
            page_index,
            page_count,
            resolved = resolved.is_some(),
            "Background resolved"
        );
        resolved
    }

    fn resolve_page_rules(&self, position: PagePosition) -> Option<Blob> {
        PAGE_TIERS.iter().find_map(|tier| {
            self.candidates
                .iter()
                .filter(|candidate| tier.claims(candidate, position))
                .find_map(|candidate| self.resolver.rule_background(self.context, candidate.rule))
        })
    }

    fn resolve_company_language(&self) -> Option<Blob> {
        if self.context.company_id.is_none() {
            debug!(report = %self.context.report_id, "No company in context; per-company background skipped");
            return None;
        }
        self.candidates
            .iter()
            .find_map(|candidate| self.resolver.rule_background(self.context, candidate.rule))
    }
}

/// Rules accepted by `filter`, exact-language matches before
/// language-agnostic ones, each group in rule order.
fn language_ordered<'a>(
    context: &'a ReportContext,
    filter: impl Fn(&ReportBackgroundRule) -> bool,
) -> Vec<&'a ReportBackgroundRule> {
    let (exact, agnostic): (Vec<_>, Vec<_>) = context
        .rules
        .iter()
        .filter(|rule| filter(rule))
        .partition(|rule| rule.language.is_some());
    exact.into_iter().chain(agnostic).collect()
}
