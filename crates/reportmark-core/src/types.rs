// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for report branding: identifiers, blobs, rules, and the
// per-call report context.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Identifier of a report definition in the configuration store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReportId(pub u64);

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the company a report is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompanyId(pub u64);

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A language code such as `"fr"` or `"en_US"`. Compared exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LanguageCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Immutable PDF byte buffer. Cloning shares the underlying allocation.
///
/// Serialised as a lowercase hex string so a rule table can travel as JSON.
#[derive(Clone)]
pub struct Blob(Arc<BlobInner>);

struct BlobInner {
    bytes: Box<[u8]>,
    digest: OnceLock<String>,
}

impl Blob {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Arc::new(BlobInner {
            bytes: bytes.into().into_boxed_slice(),
            digest: OnceLock::new(),
        }))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0.bytes
    }

    pub fn len(&self) -> usize {
        self.0.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.bytes.is_empty()
    }

    /// SHA-256 of the contents as lowercase hex, computed once per
    /// allocation. Two blobs with the same digest are the same background.
    pub fn digest(&self) -> &str {
        self.0
            .digest
            .get_or_init(|| hex::encode(Sha256::digest(&self.0.bytes)))
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Blob {}

impl std::hash::Hash for Blob {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blob({} bytes)", self.len())
    }
}

impl AsRef<[u8]> for Blob {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for Blob {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

impl Serialize for Blob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.as_bytes()))
    }
}

impl<'de> Deserialize<'de> for Blob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(encoded.trim())
            .map(Blob::new)
            .map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Which pages (or which document slot) a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PageSelector {
    /// A specific 1-indexed page number.
    Fixed(u32),
    FirstPage,
    LastPage,
    /// Every page not claimed by a higher-priority selector.
    Remaining,
    /// Pages for which the page expression evaluates true.
    ExpressionMatch(String),
    /// Whole document inserted before the content.
    Prepend,
    /// Whole document inserted after the content.
    Append,
}

impl PageSelector {
    /// Prepend/Append rules insert documents instead of backing pages.
    pub fn is_insertion(&self) -> bool {
        matches!(self, Self::Prepend | Self::Append)
    }
}

/// One branding rule as loaded from the configuration store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportBackgroundRule {
    pub report_id: ReportId,
    pub selector: PageSelector,
    #[serde(default)]
    pub watermark_bytes: Option<Blob>,
    /// Use the company default background when `watermark_bytes` is absent
    /// or unusable.
    #[serde(default)]
    pub fallback_to_company: bool,
    /// `None` applies to every language.
    #[serde(default)]
    pub language: Option<LanguageCode>,
    /// `None` applies to every company.
    #[serde(default)]
    pub company_id: Option<CompanyId>,
}

impl ReportBackgroundRule {
    pub fn new(report_id: ReportId, selector: PageSelector) -> Self {
        Self {
            report_id,
            selector,
            watermark_bytes: None,
            fallback_to_company: false,
            language: None,
            company_id: None,
        }
    }

    pub fn with_watermark(mut self, blob: impl Into<Blob>) -> Self {
        self.watermark_bytes = Some(blob.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<LanguageCode>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn for_company(mut self, company_id: CompanyId) -> Self {
        self.company_id = Some(company_id);
        self
    }

    pub fn falling_back_to_company(mut self) -> Self {
        self.fallback_to_company = true;
        self
    }
}

/// Top-level strategy that decides how a background is picked for a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundSource {
    /// The requesting company's default background table.
    #[default]
    CompanyDefault,
    /// The report's own fixed background table.
    ReportFixed,
    /// Per-page rules (first/last/fixed/expression/remaining).
    ReportDynamicBasic,
    /// One rule per (company, language), ignoring page position.
    ReportDynamicPerCompanyLanguage,
}

impl BackgroundSource {
    /// Whether the resolved background can differ from page to page.
    pub fn is_page_dependent(&self) -> bool {
        matches!(self, Self::ReportDynamicBasic)
    }
}

/// One entry of a static background table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageBackground {
    /// `None` is the language-agnostic entry.
    #[serde(default)]
    pub language: Option<LanguageCode>,
    #[serde(default)]
    pub watermark_bytes: Option<Blob>,
}

impl LanguageBackground {
    pub fn agnostic(blob: impl Into<Blob>) -> Self {
        Self {
            language: None,
            watermark_bytes: Some(blob.into()),
        }
    }

    pub fn for_language(language: impl Into<LanguageCode>, blob: impl Into<Blob>) -> Self {
        Self {
            language: Some(language.into()),
            watermark_bytes: Some(blob.into()),
        }
    }
}

/// Per-report branding settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSettings {
    /// Master switch. When off the content PDF is returned untouched.
    #[serde(default = "default_apply_background")]
    pub apply_background: bool,
    #[serde(default)]
    pub source: BackgroundSource,
    /// Used when `source` is [`BackgroundSource::ReportFixed`].
    #[serde(default)]
    pub fixed_backgrounds: Vec<LanguageBackground>,
}

fn default_apply_background() -> bool {
    true
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            apply_background: true,
            source: BackgroundSource::default(),
            fixed_backgrounds: Vec::new(),
        }
    }
}

/// Everything one `assemble` call needs to know about who is printing what.
///
/// Immutable for the duration of the call; replaces any ambient "current
/// company / current language" state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportContext {
    pub report_id: ReportId,
    #[serde(default)]
    pub company_id: Option<CompanyId>,
    #[serde(default)]
    pub language: Option<LanguageCode>,
    /// Ordered rule set. Order breaks ties inside a priority tier.
    #[serde(default)]
    pub rules: Vec<ReportBackgroundRule>,
    #[serde(default)]
    pub settings: ReportSettings,
    /// Default background table of the requesting company.
    #[serde(default)]
    pub company_backgrounds: Vec<LanguageBackground>,
}

impl ReportContext {
    pub fn new(report_id: ReportId) -> Self {
        Self {
            report_id,
            company_id: None,
            language: None,
            rules: Vec::new(),
            settings: ReportSettings::default(),
            company_backgrounds: Vec::new(),
        }
    }

    pub fn with_company(mut self, company_id: CompanyId) -> Self {
        self.company_id = Some(company_id);
        self
    }

    pub fn with_language(mut self, language: impl Into<LanguageCode>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_source(mut self, source: BackgroundSource) -> Self {
        self.settings.source = source;
        self
    }

    pub fn with_rule(mut self, rule: ReportBackgroundRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Parse a context handed over by the configuration store as JSON.
    pub fn from_json_str(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Whether `rule` is in scope for this report, company, and language.
    pub fn scopes(&self, rule: &ReportBackgroundRule) -> bool {
        rule.report_id == self.report_id
            && rule.company_id.is_none_or(|id| Some(id) == self.company_id)
            && rule
                .language
                .as_ref()
                .is_none_or(|lang| Some(lang) == self.language.as_ref())
    }

    /// In-scope rules with the given insertion selector, in rule order.
    pub fn insertion_rules(&self, selector: &PageSelector) -> Vec<&ReportBackgroundRule> {
        self.rules
            .iter()
            .filter(|rule| &rule.selector == selector && self.scopes(rule))
            .collect()
    }

    /// SHA-256 over the rule set, settings, and company table. Blobs enter
    /// through their memoised [`Blob::digest`], so repeated calls hash a few
    /// bytes per background rather than the backgrounds themselves.
    ///
    /// Used as part of cache keys so an edited configuration never hits a
    /// stale entry.
    pub fn configuration_digest(&self) -> String {
        let mut hasher = ConfigurationHasher::default();
        hasher.count(self.rules.len());
        for rule in &self.rules {
            let ReportBackgroundRule {
                report_id,
                selector,
                watermark_bytes,
                fallback_to_company,
                language,
                company_id,
            } = rule;
            hasher.value(&(report_id, selector, fallback_to_company, language, company_id));
            hasher.blob(watermark_bytes.as_ref());
        }

        let ReportSettings {
            apply_background,
            source,
            fixed_backgrounds,
        } = &self.settings;
        hasher.value(&(apply_background, source));
        hasher.table(fixed_backgrounds);
        hasher.table(&self.company_backgrounds);
        hasher.finish()
    }
}

/// Length-prefixed SHA-256 framing for [`ReportContext::configuration_digest`].
#[derive(Default)]
struct ConfigurationHasher(Sha256);

impl ConfigurationHasher {
    fn count(&mut self, len: usize) {
        self.0.update((len as u64).to_be_bytes());
    }

    fn field(&mut self, bytes: &[u8]) {
        self.count(bytes.len());
        self.0.update(bytes);
    }

    fn value<T: Serialize>(&mut self, value: &T) {
        // Serialising these plain data types cannot fail; an empty field
        // keeps the digest well-defined regardless.
        self.field(&serde_json::to_vec(value).unwrap_or_default());
    }

    /// An absent blob hashes as an empty field; a present one, even empty,
    /// as its 64-character digest.
    fn blob(&mut self, blob: Option<&Blob>) {
        self.field(blob.map_or(&[][..], |blob| blob.digest().as_bytes()));
    }

    fn table(&mut self, table: &[LanguageBackground]) {
        self.count(table.len());
        for entry in table {
            self.value(&entry.language);
            self.blob(entry.watermark_bytes.as_ref());
        }
    }

    fn finish(self) -> String {
        hex::encode(self.0.finalize())
    }
}
