//! Recursive SPF evaluation.
//!
//! [`SpfEvaluator`] fetches the SPF record of a domain, parses it and follows
//! `include` and `redirect` targets one at a time, in record order. The walk is
//! bounded by [`SpfLimits`]: a maximum depth, a budget of include/redirect
//! lookups shared by the whole tree, and a deadline per evaluated node. Cycles
//! are detected through the chain of domains already on the path.
//!
//! No sender IP is matched; the evaluator only reports whether the published
//! policy exists, parses, and which `all` qualifier is finally in effect.

mod record;

pub use record::{SpfParseError, SpfQualifier, SpfRecord};

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::dns::{DomainName, LookupTxt};

pub const DEFAULT_MAX_DEPTH: usize = 5;
/// Ceiling on include/redirect lookups, mirroring RFC 7208 §4.6.4.
pub const DEFAULT_MAX_INCLUDES: usize = 10;
pub const DEFAULT_EVALUATION_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpfLimits {
    pub max_depth: usize,
    pub max_includes: usize,
    pub evaluation_timeout: Duration,
}

impl Default for SpfLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_includes: DEFAULT_MAX_INCLUDES,
            evaluation_timeout: DEFAULT_EVALUATION_TIMEOUT,
        }
    }
}

impl SpfLimits {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_includes(mut self, max_includes: usize) -> Self {
        self.max_includes = max_includes;
        self
    }

    pub fn with_evaluation_timeout(mut self, timeout: Duration) -> Self {
        self.evaluation_timeout = timeout;
        self
    }
}

/// Outcome of evaluating one domain, with the subtree it pulled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpfValidationResult {
    pub domain: String,
    pub valid: bool,
    pub record: Option<String>,
    pub parsed: Option<SpfRecord>,
    /// Effective `all` term: the record's own, or the redirect target's.
    pub all_mechanisms: Vec<String>,
    pub includes: Vec<SpfValidationResult>,
    pub redirect: Option<Box<SpfValidationResult>>,
    pub dns_lookup_count: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl SpfValidationResult {
    fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            valid: true,
            record: None,
            parsed: None,
            all_mechanisms: Vec::new(),
            includes: Vec::new(),
            redirect: None,
            dns_lookup_count: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn failed(domain: impl Into<String>, error: impl Into<String>) -> Self {
        let mut result = Self::new(domain);
        result.fail(error);
        result
    }

    fn fail(&mut self, error: impl Into<String>) {
        self.valid = false;
        self.errors.push(error.into());
    }

    /// Qualifier currently in effect, if any.
    pub fn effective_qualifier(&self) -> Option<SpfQualifier> {
        self.all_mechanisms
            .first()
            .and_then(|term| SpfQualifier::from_all_term(term))
    }

    /// Bubble a child's findings up, prefixed with how it was reached.
    fn absorb(&mut self, relation: &str, child: &SpfValidationResult) {
        self.dns_lookup_count += child.dns_lookup_count;
        let prefix = |message: &String| format!("{relation} {}: {message}", child.domain);
        self.errors.extend(child.errors.iter().map(prefix));
        self.warnings.extend(child.warnings.iter().map(prefix));
    }
}

type NodeFuture<'a> = Pin<Box<dyn Future<Output = SpfValidationResult> + Send + 'a>>;

pub struct SpfEvaluator<'r, R> {
    resolver: &'r R,
    limits: SpfLimits,
}

impl<'r, R> SpfEvaluator<'r, R>
where
    R: LookupTxt + Sync,
{
    pub fn new(resolver: &'r R) -> Self {
        Self::with_limits(resolver, SpfLimits::default())
    }

    pub fn with_limits(resolver: &'r R, limits: SpfLimits) -> Self {
        Self { resolver, limits }
    }

    pub fn limits(&self) -> &SpfLimits {
        &self.limits
    }

    pub async fn evaluate(&self, domain: &str) -> SpfValidationResult {
        self.evaluate_from(domain, 0, Vec::new(), 0).await
    }

    /// Evaluate `domain` as if reached at `depth`, after `visited`, with
    /// `include_count` include/redirect lookups already spent.
    pub async fn evaluate_from(
        &self,
        domain: &str,
        depth: usize,
        visited: Vec<String>,
        include_count: usize,
    ) -> SpfValidationResult {
        let mut spent = include_count;
        self.node(domain.to_string(), depth, visited, &mut spent)
            .await
    }

    fn node<'a>(
        &'a self,
        domain: String,
        depth: usize,
        visited: Vec<String>,
        spent: &'a mut usize,
    ) -> NodeFuture<'a> {
        Box::pin(async move {
            let trimmed = domain.trim();
            let cleaned = trimmed.strip_suffix('.').unwrap_or(trimmed).to_ascii_lowercase();

            if depth > self.limits.max_depth {
                return SpfValidationResult::failed(
                    cleaned,
                    format!(
                        "maximum recursion depth ({}) exceeded",
                        self.limits.max_depth
                    ),
                );
            }
            if visited.contains(&cleaned) {
                let chain = visited
                    .iter()
                    .chain(std::iter::once(&cleaned))
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return SpfValidationResult::failed(
                    cleaned,
                    format!("circular reference detected: {chain}"),
                );
            }
            if *spent > self.limits.max_includes {
                return SpfValidationResult::failed(
                    cleaned,
                    format!(
                        "too many include/redirect lookups ({} > {})",
                        *spent, self.limits.max_includes
                    ),
                );
            }
            let name = match DomainName::parse(&domain) {
                Ok(name) => name,
                Err(err) => return SpfValidationResult::failed(cleaned, err.to_string()),
            };

            let budget = self.limits.evaluation_timeout;
            match tokio::time::timeout(budget, self.validate(name, depth, visited, spent)).await {
                Ok(result) => result,
                Err(_elapsed) => SpfValidationResult::failed(
                    cleaned,
                    format!("SPF evaluation timed out after {} ms", budget.as_millis()),
                ),
            }
        })
    }

    async fn validate(
        &self,
        name: DomainName,
        depth: usize,
        mut visited: Vec<String>,
        spent: &mut usize,
    ) -> SpfValidationResult {
        let domain = name.as_str();
        debug!(domain, depth, "evaluating SPF");

        let answers = match self.resolver.lookup_txt(domain).await {
            Ok(answers) => answers,
            Err(err) if err.is_name_not_found() => {
                return SpfValidationResult::failed(domain, format!("no SPF record found ({err})"));
            }
            Err(err) => {
                return SpfValidationResult::failed(domain, format!("DNS lookup failed: {err}"));
            }
        };

        let candidates: Vec<&str> = answers
            .iter()
            .map(|answer| answer.trim())
            .filter(|answer| is_spf_record(answer))
            .collect();
        let Some(text) = candidates.first() else {
            return SpfValidationResult::failed(domain, "no SPF record found");
        };

        let mut result = SpfValidationResult::new(domain);
        result.record = Some(text.to_string());
        if candidates.len() > 1 {
            result.fail(format!(
                "multiple SPF records found ({}); evaluating the first",
                candidates.len()
            ));
        }

        let (record, warnings) = match SpfRecord::parse(domain, text) {
            Ok(parsed) => parsed,
            Err(err) => {
                result.fail(format!("invalid SPF record: {err}"));
                return result;
            }
        };
        result.warnings.extend(warnings);
        result.dns_lookup_count = 1;

        match record.all {
            Some(SpfQualifier::Pass) => result
                .warnings
                .push("+all authorizes every host on the internet".to_string()),
            Some(SpfQualifier::Neutral) => result
                .warnings
                .push("?all asserts nothing about unlisted hosts".to_string()),
            _ => {}
        }
        if record.all.is_some() && record.redirect.is_some() {
            result
                .warnings
                .push("redirect is ignored by receivers when 'all' is present".to_string());
        }

        visited.push(domain.to_string());
        let mut includes_ok = true;
        for target in &record.include {
            if *spent >= self.limits.max_includes {
                result.fail(format!(
                    "include/redirect budget of {} exhausted at include {target}",
                    self.limits.max_includes
                ));
                includes_ok = false;
                break;
            }
            *spent += 1;
            let child = self
                .node(target.clone(), depth + 1, visited.clone(), spent)
                .await;
            result.absorb("include", &child);
            if !child.valid {
                result.valid = false;
                includes_ok = false;
            }
            result.includes.push(child);
        }

        let mut effective = record.all;
        if let (true, Some(target)) = (includes_ok, &record.redirect) {
            if *spent >= self.limits.max_includes {
                result.fail(format!(
                    "include/redirect budget of {} exhausted at redirect {target}",
                    self.limits.max_includes
                ));
            } else {
                *spent += 1;
                let child = self
                    .node(target.clone(), depth + 1, visited.clone(), spent)
                    .await;
                result.absorb("redirect", &child);
                if child.valid {
                    effective = child.effective_qualifier();
                } else {
                    result.valid = false;
                }
                result.redirect = Some(Box::new(child));
            }
        }

        result.all_mechanisms = effective
            .map(|qualifier| vec![qualifier.as_all_term().to_string()])
            .unwrap_or_default();
        result.parsed = Some(record);
        result
    }
}

/// `v=spf1` followed by whitespace or end of record, case-insensitive.
fn is_spf_record(text: &str) -> bool {
    text.get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("v=spf1"))
        && text[6..].chars().next().is_none_or(char::is_whitespace)
}
