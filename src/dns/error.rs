use thiserror::Error;

use super::RecordType;

/// Errors raised by the DNS-over-HTTPS resolver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    #[error("invalid query name '{name}': {reason}")]
    InvalidInput { name: String, reason: String },
    #[error("{name} does not exist (NXDOMAIN)")]
    NameNotFound { name: String },
    #[error("{record_type} query for {name} timed out after {budget_ms} ms")]
    Timeout {
        name: String,
        record_type: RecordType,
        budget_ms: u128,
    },
    #[error("DoH transport failure for {name}{}: {message}", status_suffix(.status))]
    Transport {
        name: String,
        status: Option<u16>,
        message: String,
    },
    #[error("{record_type} resolution failed for {name} (DNS status {status})")]
    Resolution {
        name: String,
        record_type: RecordType,
        status: u32,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" (HTTP {code})"))
        .unwrap_or_default()
}

impl DnsError {
    pub(crate) fn invalid_input(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn name_not_found(name: impl Into<String>) -> Self {
        Self::NameNotFound { name: name.into() }
    }

    pub(crate) fn transport(
        name: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::Transport {
            name: name.into(),
            status,
            message: message.into(),
        }
    }

    /// `true` for NXDOMAIN, which callers report at warning level.
    pub fn is_name_not_found(&self) -> bool {
        matches!(self, Self::NameNotFound { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
