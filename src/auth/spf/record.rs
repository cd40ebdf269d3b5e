use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::Serialize;
use thiserror::Error;

use crate::dns::DomainName;

/// Structural problems that make an SPF record unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpfParseError {
    #[error("record must start with 'v=spf1' (found '{found}')")]
    InvalidVersion { found: String },
    #[error("unknown mechanism '{term}'")]
    UnknownMechanism { term: String },
    #[error("mechanism '{term}' requires a value")]
    MissingValue { term: String },
    #[error("modifier '{name}' appears more than once")]
    DuplicateModifier { name: String },
}

/// Qualifier of the `all` mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpfQualifier {
    #[serde(rename = "+all")]
    Pass,
    #[serde(rename = "-all")]
    Fail,
    #[serde(rename = "~all")]
    SoftFail,
    #[serde(rename = "?all")]
    Neutral,
}

impl SpfQualifier {
    /// Only the four explicit spellings are recognised; a bare `all` is not.
    pub fn from_all_term(term: &str) -> Option<Self> {
        match term.to_ascii_lowercase().as_str() {
            "+all" => Some(Self::Pass),
            "-all" => Some(Self::Fail),
            "~all" => Some(Self::SoftFail),
            "?all" => Some(Self::Neutral),
            _ => None,
        }
    }

    pub fn as_all_term(self) -> &'static str {
        match self {
            Self::Pass => "+all",
            Self::Fail => "-all",
            Self::SoftFail => "~all",
            Self::Neutral => "?all",
        }
    }
}

/// Parsed form of one `v=spf1` record. Target lists keep record order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpfRecord {
    pub all: Option<SpfQualifier>,
    pub ip4: Vec<String>,
    pub ip6: Vec<String>,
    pub a: Vec<String>,
    pub mx: Vec<String>,
    pub include: Vec<String>,
    pub exists: Vec<String>,
    pub redirect: Option<String>,
    pub exp: Option<String>,
    pub modifiers: BTreeMap<String, String>,
}

impl SpfRecord {
    /// Parse `text` published at `domain`.
    ///
    /// Returns the record together with non-fatal findings (dropped targets,
    /// deprecated mechanisms, ignored `all` spellings).
    pub fn parse(domain: &str, text: &str) -> Result<(Self, Vec<String>), SpfParseError> {
        let mut terms = text.split_whitespace();
        let version = terms.next().unwrap_or_default();
        if !version.eq_ignore_ascii_case("v=spf1") {
            return Err(SpfParseError::InvalidVersion {
                found: version.to_string(),
            });
        }

        let mut record = SpfRecord::default();
        let mut warnings = Vec::new();
        let mut redirect_seen = false;
        let mut exp_seen = false;

        for term in terms {
            if let Some((name, value)) = split_modifier(term) {
                match name.as_str() {
                    "redirect" => {
                        if std::mem::replace(&mut redirect_seen, true) {
                            return Err(SpfParseError::DuplicateModifier { name: name.clone() });
                        }
                        match DomainName::parse(value) {
                            Ok(target) => record.redirect = Some(target.into_string()),
                            Err(_) => warnings
                                .push(format!("omitting redirect with invalid target '{value}'")),
                        }
                    }
                    "exp" => {
                        if std::mem::replace(&mut exp_seen, true) {
                            return Err(SpfParseError::DuplicateModifier { name: name.clone() });
                        }
                        match DomainName::parse(value) {
                            Ok(target) => record.exp = Some(target.into_string()),
                            Err(_) => {
                                warnings.push(format!("dropping exp with invalid target '{value}'"))
                            }
                        }
                    }
                    _ => {
                        record.modifiers.insert(name.clone(), value.to_string());
                    }
                }
                continue;
            }

            let body = term.trim_start_matches(['+', '-', '~', '?']);
            let (mechanism, value) = match body.split_once(':') {
                Some((mechanism, value)) => (mechanism.to_ascii_lowercase(), Some(value)),
                None => match body.split_once('/') {
                    Some((mechanism, _cidr)) => (mechanism.to_ascii_lowercase(), None),
                    None => (body.to_ascii_lowercase(), None),
                },
            };

            match mechanism.as_str() {
                "all" => match SpfQualifier::from_all_term(term) {
                    Some(qualifier) if record.all.is_none() => record.all = Some(qualifier),
                    Some(_) => warnings.push(format!("ignoring extra '{term}' mechanism")),
                    None => warnings.push(format!(
                        "ignoring '{term}': expected one of +all, -all, ~all, ?all"
                    )),
                },
                "ip4" => {
                    let value = required(term, value)?;
                    if valid_network::<Ipv4Addr>(value, 32) {
                        record.ip4.push(value.to_string());
                    } else {
                        warnings.push(format!("dropping ip4 with invalid network '{value}'"));
                    }
                }
                "ip6" => {
                    let value = required(term, value)?;
                    if valid_network::<Ipv6Addr>(value, 128) {
                        record.ip6.push(value.to_ascii_lowercase());
                    } else {
                        warnings.push(format!("dropping ip6 with invalid network '{value}'"));
                    }
                }
                "a" | "mx" => {
                    let target = match value {
                        Some(value) => strip_cidr(value),
                        None => domain,
                    };
                    let list = if mechanism == "a" {
                        &mut record.a
                    } else {
                        &mut record.mx
                    };
                    match DomainName::parse(target) {
                        Ok(target) => list.push(target.into_string()),
                        Err(_) => warnings.push(format!(
                            "dropping {mechanism} with invalid target '{target}'"
                        )),
                    }
                }
                "include" => {
                    let value = required(term, value)?;
                    match DomainName::parse(value) {
                        Ok(target) => record.include.push(target.into_string()),
                        Err(_) => {
                            warnings.push(format!("omitting include with invalid target '{value}'"))
                        }
                    }
                }
                "exists" => {
                    let value = required(term, value)?;
                    match DomainName::parse(value) {
                        Ok(target) => record.exists.push(target.into_string()),
                        Err(_) => {
                            warnings.push(format!("dropping exists with invalid target '{value}'"))
                        }
                    }
                }
                "ptr" => warnings.push("ptr mechanism is deprecated (RFC 7208 §5.5)".to_string()),
                _ => {
                    return Err(SpfParseError::UnknownMechanism {
                        term: term.to_string(),
                    });
                }
            }
        }

        Ok((record, warnings))
    }
}

/// `name=value` where `name` is an SPF modifier name (`ALPHA *( ALPHA / DIGIT / "-" / "_" / "." )`).
fn split_modifier(term: &str) -> Option<(String, &str)> {
    let (name, value) = term.split_once('=')?;
    let mut chars = name.chars();
    let starts_alpha = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    (starts_alpha && rest_ok).then(|| (name.to_ascii_lowercase(), value))
}

fn required<'t>(term: &str, value: Option<&'t str>) -> Result<&'t str, SpfParseError> {
    value
        .filter(|value| !value.is_empty())
        .ok_or_else(|| SpfParseError::MissingValue {
            term: term.to_string(),
        })
}

fn strip_cidr(value: &str) -> &str {
    value.split_once('/').map_or(value, |(target, _)| target)
}

fn valid_network<A: std::str::FromStr>(value: &str, max_prefix: u8) -> bool {
    let (addr, prefix) = match value.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (value, None),
    };
    let prefix_ok = prefix.is_none_or(|prefix| {
        prefix
            .parse::<u8>()
            .is_ok_and(|length| length <= max_prefix)
    });
    prefix_ok && addr.parse::<A>().is_ok()
}
