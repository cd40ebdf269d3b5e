//! Weighted compliance score.
//!
//! Each category is the sum of its own `details` entries, clamped to
//! `0..=cap`. Bonus points count towards the cap rather than on top of it,
//! so the best reachable total stays below 100.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::auth::{DkimValidationResult, DmarcValidationResult, SpfQualifier, SpfValidationResult};
use crate::auth::spf::SpfLimits;

pub const SPF_CAP: i32 = 30;
pub const DKIM_CAP: i32 = 30;
pub const DMARC_CAP: i32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Spf,
    Dkim,
    Dmarc,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Spf, Category::Dkim, Category::Dmarc];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spf => "spf",
            Self::Dkim => "dkim",
            Self::Dmarc => "dmarc",
        }
    }

    pub fn cap(self) -> i32 {
        match self {
            Self::Spf => SPF_CAP,
            Self::Dkim => DKIM_CAP,
            Self::Dmarc => DMARC_CAP,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub total: i32,
    pub spf: i32,
    pub dkim: i32,
    pub dmarc: i32,
    /// `category.criterion` → points awarded (negative for penalties).
    pub details: BTreeMap<String, i32>,
    pub reasons: BTreeMap<Category, String>,
    pub recommendations: BTreeMap<Category, String>,
}

impl ScoreBreakdown {
    pub fn category(&self, category: Category) -> i32 {
        match category {
            Category::Spf => self.spf,
            Category::Dkim => self.dkim,
            Category::Dmarc => self.dmarc,
        }
    }
}

/// Explanation for one category: why it scored as it did, and what to change.
struct Verdict {
    reason: String,
    recommendation: String,
}

impl Verdict {
    fn new(reason: impl Into<String>, recommendation: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            recommendation: recommendation.into(),
        }
    }
}

struct Details(BTreeMap<String, i32>);

impl Details {
    fn award(&mut self, category: Category, criterion: &str, points: i32) {
        self.0
            .insert(format!("{}.{criterion}", category.as_str()), points);
    }

    fn total(&self, category: Category) -> i32 {
        let prefix = format!("{}.", category.as_str());
        self.0
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, points)| points)
            .sum::<i32>()
            .clamp(0, category.cap())
    }
}

/// Score with the default SPF limits.
pub fn score(
    spf: &SpfValidationResult,
    dkim: &[DkimValidationResult],
    dmarc: &DmarcValidationResult,
) -> ScoreBreakdown {
    score_with_limits(spf, dkim, dmarc, &SpfLimits::default())
}

/// `limits` should be the ones the SPF tree was evaluated with; `spf.lookups`
/// is judged against its include/redirect budget.
pub fn score_with_limits(
    spf: &SpfValidationResult,
    dkim: &[DkimValidationResult],
    dmarc: &DmarcValidationResult,
    limits: &SpfLimits,
) -> ScoreBreakdown {
    let mut details = Details(BTreeMap::new());
    let verdicts = [
        (Category::Spf, score_spf(spf, limits, &mut details)),
        (Category::Dkim, score_dkim(dkim, &mut details)),
        (Category::Dmarc, score_dmarc(dmarc, &mut details)),
    ];

    let mut reasons = BTreeMap::new();
    let mut recommendations = BTreeMap::new();
    for (category, verdict) in verdicts {
        reasons.insert(category, verdict.reason);
        recommendations.insert(category, verdict.recommendation);
    }

    let spf_total = details.total(Category::Spf);
    let dkim_total = details.total(Category::Dkim);
    let dmarc_total = details.total(Category::Dmarc);

    ScoreBreakdown {
        total: spf_total + dkim_total + dmarc_total,
        spf: spf_total,
        dkim: dkim_total,
        dmarc: dmarc_total,
        details: details.0,
        reasons,
        recommendations,
    }
}

fn score_spf(spf: &SpfValidationResult, limits: &SpfLimits, details: &mut Details) -> Verdict {
    let exists = spf.record.is_some();
    let qualifier = spf.effective_qualifier();
    // the root record's own lookup is not part of the include/redirect budget
    let followed = spf.dns_lookup_count.saturating_sub(1);
    let lookups_ok = followed <= limits.max_includes;

    details.award(Category::Spf, "exists", if exists { 10 } else { 0 });
    details.award(Category::Spf, "syntax", if spf.valid { 5 } else { 0 });
    details.award(
        Category::Spf,
        "all",
        match qualifier {
            Some(SpfQualifier::Fail) => 10,
            Some(SpfQualifier::SoftFail) => 5,
            Some(SpfQualifier::Neutral) | None => 0,
            Some(SpfQualifier::Pass) => -10,
        },
    );
    details.award(
        Category::Spf,
        "lookups",
        if spf.valid && lookups_ok { 5 } else { 0 },
    );

    if !exists {
        return Verdict::new(
            spf.errors
                .first()
                .cloned()
                .unwrap_or_else(|| "no SPF record published".to_string()),
            "publish a TXT record such as 'v=spf1 include:<provider> -all'",
        );
    }
    if qualifier == Some(SpfQualifier::Pass) {
        return Verdict::new(
            "SPF ends in +all, which authorizes every host to send",
            "replace +all with -all (or ~all while rolling out)",
        );
    }
    if !spf.valid {
        return Verdict::new(
            format!(
                "SPF record is invalid: {}",
                spf.errors.first().map_or("unknown error", String::as_str)
            ),
            "fix the reported SPF errors",
        );
    }
    match qualifier {
        None => Verdict::new(
            "SPF record has no effective all mechanism",
            "end the record with -all",
        ),
        Some(SpfQualifier::Neutral) => Verdict::new(
            "?all says nothing about unlisted senders",
            "end the record with -all, or ~all while rolling out",
        ),
        Some(SpfQualifier::SoftFail) => Verdict::new(
            "~all only soft-fails unlisted senders",
            "move to -all once every sender is listed",
        ),
        _ if !lookups_ok => Verdict::new(
            format!(
                "SPF evaluation follows {followed} include/redirect lookups (limit {})",
                limits.max_includes
            ),
            "flatten or remove include mechanisms",
        ),
        _ => Verdict::new("SPF record is valid and ends in -all", "no change needed"),
    }
}

fn score_dkim(dkim: &[DkimValidationResult], details: &mut Details) -> Verdict {
    let valid: Vec<&DkimValidationResult> = dkim.iter().filter(|result| result.valid).collect();
    let strong = valid.iter().any(|result| result.has_strong_key());

    details.award(Category::Dkim, "exists", if valid.is_empty() { 0 } else { 15 });
    details.award(Category::Dkim, "key_strength", if strong { 10 } else { 0 });
    details.award(
        Category::Dkim,
        "multiple_selectors",
        if valid.len() >= 2 { 5 } else { 0 },
    );

    let Some(best) = valid.iter().max_by_key(|result| result.key_bits.unwrap_or(0)) else {
        let probed = dkim
            .iter()
            .map(|result| result.selector.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Verdict::new(
            if probed.is_empty() {
                "no DKIM selector was probed".to_string()
            } else {
                format!("no valid DKIM record for selectors: {probed}")
            },
            "publish a DKIM public key and sign outgoing mail",
        );
    };

    if !strong {
        return match best.key_bits {
            Some(bits) if bits < 1024 => Verdict::new(
                format!("DKIM key for '{}' is only {bits} bits", best.selector),
                "rotate to a 2048-bit RSA key immediately",
            ),
            Some(bits) => Verdict::new(
                format!("DKIM key for '{}' is {bits} bits", best.selector),
                "rotate to a 2048-bit RSA or an Ed25519 key",
            ),
            None => Verdict::new(
                format!("DKIM key strength for '{}' is unknown", best.selector),
                "publish a 2048-bit RSA or an Ed25519 key",
            ),
        };
    }
    if valid.len() < 2 {
        return Verdict::new(
            format!("only one valid DKIM selector ('{}')", best.selector),
            "publish a second selector to allow key rotation",
        );
    }
    if valid.iter().any(|result| result.testing) {
        return Verdict::new(
            "a DKIM key is still flagged as testing (t=y)",
            "remove t=y once signing is verified",
        );
    }
    Verdict::new(
        format!("{} valid DKIM selectors with a strong key", valid.len()),
        "no change needed",
    )
}

fn score_dmarc(dmarc: &DmarcValidationResult, details: &mut Details) -> Verdict {
    let exists = dmarc.record.is_some();
    let policy = dmarc.policy.as_deref().filter(|_| dmarc.valid);

    details.award(Category::Dmarc, "exists", if exists { 10 } else { 0 });
    details.award(
        Category::Dmarc,
        "policy",
        match policy {
            Some("reject") => 15,
            Some("quarantine") => 10,
            _ => 0,
        },
    );
    details.award(
        Category::Dmarc,
        "reporting",
        if dmarc.rua.is_empty() { 0 } else { 5 },
    );

    if !exists {
        return Verdict::new(
            dmarc
                .error
                .clone()
                .unwrap_or_else(|| "no DMARC record published".to_string()),
            "publish 'v=DMARC1; p=none; rua=mailto:<address>' at _dmarc and tighten from there",
        );
    }
    match policy {
        None => Verdict::new(
            format!(
                "DMARC record is invalid: {}",
                dmarc.error.as_deref().unwrap_or("unknown error")
            ),
            "fix the DMARC record so receivers can apply it",
        ),
        Some("none") => Verdict::new(
            "p=none only monitors and never protects",
            "move to p=quarantine, then p=reject",
        ),
        Some("quarantine") => Verdict::new(
            "p=quarantine sends failing mail to spam",
            "move to p=reject once reports are clean",
        ),
        _ if dmarc.rua.is_empty() => Verdict::new(
            "no aggregate report address (rua)",
            "add rua=mailto:<address> to receive reports",
        ),
        _ if dmarc.percentage.is_some_and(|pct| pct < 100) => Verdict::new(
            "policy only covers part of the failing mail (pct < 100)",
            "raise pct to 100",
        ),
        _ => Verdict::new("DMARC enforces p=reject with reporting", "no change needed"),
    }
}
