use std::fmt;

use serde::Serialize;

use super::DnsError;

/// Longest presentation-format name accepted by the resolver.
pub const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// A cleaned, syntactically valid DNS name.
///
/// Cleaning trims whitespace and a trailing dot, lowercases ASCII input and
/// converts internationalized names to their ASCII (punycode) form. Labels may
/// contain underscores so that service names such as `_dmarc.example.com` or
/// `_spf.example.net` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DomainName(String);

impl DomainName {
    pub fn parse(input: &str) -> Result<Self, DnsError> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(DnsError::invalid_input(input, "name is empty"));
        }

        let ascii = if trimmed.is_ascii() {
            trimmed.to_ascii_lowercase()
        } else {
            idna::domain_to_ascii(trimmed)
                .map_err(|_| DnsError::invalid_input(input, "IDNA conversion failed"))?
        };

        if ascii.len() > MAX_NAME_LEN {
            return Err(DnsError::invalid_input(
                input,
                format!("length {} > {MAX_NAME_LEN}", ascii.len()),
            ));
        }

        for label in ascii.split('.') {
            check_label(input, label)?;
        }

        Ok(Self(ascii))
    }

    /// Prefix `label` (e.g. `_dmarc` or `s1._domainkey`) to this name.
    pub fn child(&self, label: &str) -> Result<Self, DnsError> {
        Self::parse(&format!("{}.{}", label.trim_end_matches('.'), self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

fn check_label(input: &str, label: &str) -> Result<(), DnsError> {
    if label.is_empty() {
        return Err(DnsError::invalid_input(input, "empty label"));
    }
    if label.len() > MAX_LABEL_LEN {
        return Err(DnsError::invalid_input(
            input,
            format!("label '{label}' length {} > {MAX_LABEL_LEN}", label.len()),
        ));
    }
    if label.starts_with('-') || label.ends_with('-') {
        return Err(DnsError::invalid_input(
            input,
            format!("label '{label}' cannot start/end with '-'"),
        ));
    }
    if !label
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(DnsError::invalid_input(
            input,
            format!("label '{label}' has invalid chars"),
        ));
    }
    Ok(())
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DomainName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
