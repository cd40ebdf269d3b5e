use std::collections::HashMap;

use serde::Serialize;
use tracing::{error, warn};

use crate::dns::{DomainName, LookupTxt};

const POLICIES: [&str; 3] = ["none", "quarantine", "reject"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DmarcValidationResult {
    pub domain: String,
    pub valid: bool,
    pub record: Option<String>,
    pub policy: Option<String>,
    pub error: Option<String>,
    pub subdomain_policy: Option<String>,
    pub percentage: Option<u8>,
    pub rua: Vec<String>,
    pub ruf: Vec<String>,
    pub dkim_alignment: Option<String>,
    pub spf_alignment: Option<String>,
    pub warnings: Vec<String>,
}

impl DmarcValidationResult {
    fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            valid: false,
            record: None,
            policy: None,
            error: None,
            subdomain_policy: None,
            percentage: None,
            rua: Vec::new(),
            ruf: Vec::new(),
            dkim_alignment: None,
            spf_alignment: None,
            warnings: Vec::new(),
        }
    }

    fn invalid(mut self, error: impl Into<String>) -> Self {
        self.valid = false;
        self.error = Some(error.into());
        self
    }
}

pub struct DmarcValidator<'r, R> {
    resolver: &'r R,
}

impl<'r, R> DmarcValidator<'r, R>
where
    R: LookupTxt + Sync,
{
    pub fn new(resolver: &'r R) -> Self {
        Self { resolver }
    }

    /// Look up and validate the policy record at `_dmarc.<domain>`.
    pub async fn validate(&self, domain: &str) -> DmarcValidationResult {
        let result = DmarcValidationResult::new(domain);
        let name = match DomainName::parse(domain).and_then(|domain| domain.child("_dmarc")) {
            Ok(name) => name,
            Err(err) => return result.invalid(err.to_string()),
        };

        let answers = match self.resolver.lookup_txt(name.as_str()).await {
            Ok(answers) => answers,
            Err(err) if err.is_name_not_found() => {
                warn!(%name, "DMARC record not published");
                return result.invalid(format!("no DMARC record found ({err})"));
            }
            Err(err) => {
                error!(%name, error = %err, "DMARC lookup failed");
                return result.invalid(format!("DNS lookup failed: {err}"));
            }
        };

        let mut records: Vec<&str> = answers
            .iter()
            .map(|answer| answer.trim())
            .filter(|answer| is_dmarc_record(answer))
            .collect();
        let Some(record) = records.first().copied() else {
            return result.invalid(format!("no DMARC record found at {name}"));
        };

        let mut result = result;
        records.dedup();
        if records.len() > 1 {
            result.warnings.push(format!(
                "{} DMARC records published; receivers may ignore all of them",
                records.len()
            ));
        }
        result.record = Some(record.to_string());

        let tags = parse_tags(record);
        apply_optional_tags(&mut result, &tags);

        let Some(policy) = tags.get("p") else {
            return result.invalid("missing required policy (p) tag");
        };
        let policy = policy.to_ascii_lowercase();
        if !POLICIES.contains(&policy.as_str()) {
            return result.invalid(format!("invalid policy value '{policy}'"));
        }

        result.policy = Some(policy);
        result.valid = true;
        result
    }
}

/// Starts with `v=DMARC1`, followed by `;`, whitespace or end of record.
fn is_dmarc_record(text: &str) -> bool {
    const VERSION: &str = "v=dmarc1";
    text.get(..VERSION.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(VERSION))
        && text[VERSION.len()..]
            .chars()
            .next()
            .is_none_or(|c| c == ';' || c.is_whitespace())
}

fn apply_optional_tags(result: &mut DmarcValidationResult, tags: &HashMap<String, String>) {
    if let Some(sp) = tags.get("sp") {
        let sp = sp.to_ascii_lowercase();
        if POLICIES.contains(&sp.as_str()) {
            result.subdomain_policy = Some(sp);
        } else {
            result
                .warnings
                .push(format!("ignoring invalid subdomain policy '{sp}'"));
        }
    }

    if let Some(pct) = tags.get("pct") {
        match pct.parse::<u8>() {
            Ok(value) if value <= 100 => {
                if value < 100 {
                    result
                        .warnings
                        .push(format!("policy applies to {value}% of failing mail only"));
                }
                result.percentage = Some(value);
            }
            _ => result
                .warnings
                .push(format!("ignoring invalid pct value '{pct}'")),
        }
    }

    result.rua = report_uris(tags.get("rua"), "rua", &mut result.warnings);
    result.ruf = report_uris(tags.get("ruf"), "ruf", &mut result.warnings);

    result.dkim_alignment = alignment(tags.get("adkim"), "adkim", &mut result.warnings);
    result.spf_alignment = alignment(tags.get("aspf"), "aspf", &mut result.warnings);
}

fn report_uris(value: Option<&String>, tag: &str, warnings: &mut Vec<String>) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };
    value
        .split(',')
        .map(str::trim)
        .filter(|uri| !uri.is_empty())
        .inspect(|uri| {
            if !uri.to_ascii_lowercase().starts_with("mailto:") {
                warnings.push(format!("{tag} address '{uri}' is not a mailto: URI"));
            }
        })
        .map(str::to_string)
        .collect()
}

fn alignment(value: Option<&String>, tag: &str, warnings: &mut Vec<String>) -> Option<String> {
    let mode = value?.to_ascii_lowercase();
    if mode == "r" || mode == "s" {
        Some(mode)
    } else {
        warnings.push(format!("ignoring invalid {tag} mode '{mode}'"));
        None
    }
}

fn parse_tags(record: &str) -> HashMap<String, String> {
    let mut tags = HashMap::new();
    for part in record.split(';') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        let (key, value) = trimmed.split_once('=').unwrap_or((trimmed, ""));
        tags.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::{is_dmarc_record, parse_tags};

    #[test]
    fn version_tag_must_lead_and_terminate() {
        assert!(is_dmarc_record("v=DMARC1; p=reject"));
        assert!(is_dmarc_record("V=dmarc1 ; p=none"));
        assert!(is_dmarc_record("v=DMARC1"));
        assert!(!is_dmarc_record("v=DMARC10; p=reject"));
        assert!(!is_dmarc_record("xv=DMARC1; p=reject"));
        assert!(!is_dmarc_record("note v=DMARC1; p=reject"));
    }

    #[test]
    fn first_equals_splits_key_from_value() {
        let tags = parse_tags("v=DMARC1; p=reject; rua=mailto:a@example.com?x=y");
        assert_eq!(tags["rua"], "mailto:a@example.com?x=y");
        assert_eq!(tags["v"], "DMARC1");
    }

    #[test]
    fn keys_lowercased_and_empty_parts_skipped() {
        let tags = parse_tags(" P = quarantine ;; ");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags["p"], "quarantine");
    }
}
