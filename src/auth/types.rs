use serde::Serialize;

use super::{dkim::DkimValidationResult, dmarc::DmarcValidationResult, spf::SpfLimits, spf::SpfValidationResult};
use crate::dns::ResolverOptions;
use crate::score::ScoreBreakdown;

/// Everything learned about one domain, plus its score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainReport {
    pub domain: String,
    pub spf: SpfValidationResult,
    pub dkim: Vec<DkimValidationResult>,
    pub dmarc: DmarcValidationResult,
    pub score: ScoreBreakdown,
}

impl DomainReport {
    pub(crate) fn new(
        domain: String,
        spf: SpfValidationResult,
        dkim: Vec<DkimValidationResult>,
        dmarc: DmarcValidationResult,
        score: ScoreBreakdown,
    ) -> Self {
        Self {
            domain,
            spf,
            dkim,
            dmarc,
            score,
        }
    }

    /// First valid DKIM selector, in probing order.
    pub fn dkim_match(&self) -> Option<&DkimValidationResult> {
        self.dkim.iter().find(|result| result.valid)
    }

    /// SPF and DMARC valid and at least one DKIM selector found.
    pub fn is_fully_valid(&self) -> bool {
        self.spf.valid && self.dmarc.valid && self.dkim_match().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthLookupOptions {
    dkim_selectors: Vec<String>,
    resolver: ResolverOptions,
    spf_limits: SpfLimits,
}

impl AuthLookupOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dkim_selector(mut self, selector: impl Into<String>) -> Self {
        if let Some(normalized) = normalize_selector(selector.into()) {
            if !self.dkim_selectors.contains(&normalized) {
                self.dkim_selectors.push(normalized);
            }
        }
        self
    }

    pub fn with_dkim_selectors<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for selector in selectors {
            self = self.with_dkim_selector(selector);
        }
        self
    }

    pub fn with_resolver_options(mut self, resolver: ResolverOptions) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_spf_limits(mut self, limits: SpfLimits) -> Self {
        self.spf_limits = limits;
        self
    }

    pub fn dkim_selectors(&self) -> &[String] {
        &self.dkim_selectors
    }

    pub fn resolver_options(&self) -> &ResolverOptions {
        &self.resolver
    }

    pub fn spf_limits(&self) -> &SpfLimits {
        &self.spf_limits
    }
}

fn normalize_selector(input: String) -> Option<String> {
    let trimmed = input.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}
