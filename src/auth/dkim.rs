use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{error, warn};

use crate::dns::{DomainName, LookupTxt};

static SELECTOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,63}$").expect("selector pattern compiles"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DkimValidationResult {
    pub selector: String,
    pub domain: String,
    pub valid: bool,
    pub record: Option<String>,
    pub error: Option<String>,
    pub key_type: Option<String>,
    /// Estimated from the encoded key length for RSA keys.
    pub key_bits: Option<u32>,
    pub testing: bool,
}

impl DkimValidationResult {
    fn new(selector: &str, domain: &str) -> Self {
        Self {
            selector: selector.to_string(),
            domain: domain.to_string(),
            valid: false,
            record: None,
            error: None,
            key_type: None,
            key_bits: None,
            testing: false,
        }
    }

    fn invalid(mut self, error: impl Into<String>) -> Self {
        self.valid = false;
        self.error = Some(error.into());
        self
    }

    /// Ed25519 keys, or RSA keys of at least 2048 bits.
    pub fn has_strong_key(&self) -> bool {
        self.key_type.as_deref() == Some("ed25519") || self.key_bits.is_some_and(|bits| bits >= 2048)
    }
}

pub fn is_valid_selector(selector: &str) -> bool {
    SELECTOR_RE.is_match(selector)
}

pub struct DkimValidator<'r, R> {
    resolver: &'r R,
}

impl<'r, R> DkimValidator<'r, R>
where
    R: LookupTxt + Sync,
{
    pub fn new(resolver: &'r R) -> Self {
        Self { resolver }
    }

    /// Look up `selector._domainkey.domain` and validate the DKIM key record.
    pub async fn validate(&self, selector: &str, domain: &str) -> DkimValidationResult {
        let selector = selector.trim();
        let result = DkimValidationResult::new(selector, domain);

        if !is_valid_selector(selector) {
            return result.invalid(format!("invalid DKIM selector '{selector}'"));
        }
        let name = match DomainName::parse(domain)
            .and_then(|domain| domain.child(&format!("{selector}._domainkey")))
        {
            Ok(name) => name,
            Err(err) => return result.invalid(err.to_string()),
        };

        let answers = match self.resolver.lookup_txt(name.as_str()).await {
            Ok(answers) => answers,
            Err(err) if err.is_name_not_found() => {
                warn!(selector, %name, "DKIM selector not published");
                return result.invalid(format!(
                    "no DKIM record found for selector '{selector}' (NXDOMAIN: {name} does not exist)"
                ));
            }
            Err(err) => {
                error!(selector, %name, error = %err, "DKIM lookup failed");
                return result.invalid(format!("DNS lookup failed: {err}"));
            }
        };

        let Some(record) = find_dkim_record(&answers) else {
            return result.invalid(format!(
                "no DKIM record found for selector '{selector}' at {name}"
            ));
        };

        let tags = parse_tags(&record);
        let mut result = result;
        result.record = Some(record);
        result.testing = tags.testing;
        let key_type = tags.key_type.unwrap_or_else(|| "rsa".to_string());

        let public_key = tags.public_key.unwrap_or_default();
        if public_key.is_empty() {
            result.key_type = Some(key_type);
            return result.invalid("public key (p=) is empty: key revoked or missing");
        }

        result.key_bits = match key_type.as_str() {
            "rsa" => Some(estimate_rsa_bits(&public_key)),
            "ed25519" => Some(256),
            _ => None,
        };
        result.key_type = Some(key_type);
        result.valid = true;
        result
    }

    /// Validate each selector in order.
    pub async fn probe(&self, domain: &str, selectors: &[String]) -> Vec<DkimValidationResult> {
        let mut results = Vec::with_capacity(selectors.len());
        for selector in selectors {
            results.push(self.validate(selector, domain).await);
        }
        results
    }
}

/// First answer carrying `v=DKIM1` followed by `;`, from the version tag on.
fn find_dkim_record(answers: &[String]) -> Option<String> {
    answers.iter().find_map(|answer| {
        let lower = answer.to_ascii_lowercase();
        let start = lower.find("v=dkim1")?;
        lower[start + "v=dkim1".len()..]
            .trim_start()
            .starts_with(';')
            .then(|| answer[start..].trim().to_string())
    })
}

#[derive(Debug, Default)]
struct ParsedTags {
    key_type: Option<String>,
    public_key: Option<String>,
    testing: bool,
}

fn parse_tags(record: &str) -> ParsedTags {
    let mut tags = ParsedTags::default();

    for part in record.split(';') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "k" => tags.key_type = Some(value.to_ascii_lowercase()),
            "p" => {
                tags.public_key = Some(value.chars().filter(|c| !c.is_whitespace()).collect())
            }
            "t" => {
                tags.testing = value
                    .split(':')
                    .any(|flag| flag.trim().eq_ignore_ascii_case("y"))
            }
            _ => {}
        }
    }

    tags
}

/// Rough RSA modulus size from the base64 SubjectPublicKeyInfo length.
fn estimate_rsa_bits(public_key: &str) -> u32 {
    let encoded = public_key.trim_end_matches('=').len();
    let der_len = encoded * 3 / 4;
    match der_len {
        len if len >= 550 => 4096,
        len if len >= 422 => 3072,
        len if len >= 294 => 2048,
        len if len >= 162 => 1024,
        len if len >= 94 => 512,
        len => (len * 8) as u32,
    }
}

#[cfg(test)]
pub(crate) fn rsa_key(bits: u32) -> String {
    let encoded_len = match bits {
        2048 => 392,
        1024 => 216,
        _ => 128,
    };
    let head = "MIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQ";
    let tail = "IDAQAB";
    format!(
        "{head}{}{tail}",
        "A".repeat(encoded_len - head.len() - tail.len())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_pattern() {
        assert!(is_valid_selector("selector1"));
        assert!(is_valid_selector("s_2024-01"));
        assert!(!is_valid_selector(""));
        assert!(!is_valid_selector("bad.selector"));
        assert!(!is_valid_selector(&"a".repeat(64)));
    }

    #[test]
    fn finds_record_with_version_tag() {
        let answers = vec![
            "unrelated".to_string(),
            "junk v=DKIM1 ; k=rsa; p=abc".to_string(),
        ];
        assert_eq!(
            find_dkim_record(&answers).as_deref(),
            Some("v=DKIM1 ; k=rsa; p=abc")
        );
    }

    #[test]
    fn version_without_semicolon_not_matched() {
        let answers = vec!["v=DKIM1 k=rsa p=abc".to_string()];
        assert!(find_dkim_record(&answers).is_none());
    }

    #[test]
    fn key_size_estimates() {
        assert_eq!(estimate_rsa_bits(&rsa_key(1024)), 1024);
        assert_eq!(estimate_rsa_bits(&rsa_key(2048)), 2048);
        assert_eq!(estimate_rsa_bits(&rsa_key(512)), 512);
    }

    #[test]
    fn testing_flag_parsed() {
        let tags = parse_tags("v=DKIM1; t=s:y; p=abc");
        assert!(tags.testing);
        assert_eq!(tags.public_key.as_deref(), Some("abc"));
    }
}
