use thiserror::Error;

use crate::dns::DnsError;

/// Errors that stop a domain check before any record is validated.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid domain: {source}")]
    InvalidDomain {
        #[source]
        source: DnsError,
    },
    #[error("HTTP client initialization failed: {source}")]
    ClientInit {
        #[source]
        source: reqwest::Error,
    },
}

impl AuthError {
    pub(crate) fn invalid_domain(source: DnsError) -> Self {
        Self::InvalidDomain { source }
    }

    pub(crate) fn client_init(source: reqwest::Error) -> Self {
        Self::ClientInit { source }
    }
}
