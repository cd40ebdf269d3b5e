//! SPF, DKIM and DMARC record validation.
//!
//! Validators never fail: DNS and record problems end up in the `error`/
//! `errors` fields of their results. Only an unusable top-level domain or a
//! resolver that cannot be built abort a check.

pub mod dkim;
pub mod dmarc;
mod error;
pub mod spf;
mod types;

#[cfg(test)]
pub(crate) mod stub;

pub use dkim::{DkimValidationResult, DkimValidator};
pub use dmarc::{DmarcValidationResult, DmarcValidator};
pub use error::AuthError;
pub use spf::{SpfEvaluator, SpfLimits, SpfQualifier, SpfRecord, SpfValidationResult};
pub use types::{AuthLookupOptions, DomainReport};

use tracing::info;

use crate::dns::{DohResolver, DomainName, LookupTxt};
use crate::score;

/// Check `domain` against the DoH endpoint configured in `options`.
pub async fn check_domain(
    domain: &str,
    options: &AuthLookupOptions,
) -> Result<DomainReport, AuthError> {
    let resolver =
        DohResolver::new(options.resolver_options().clone()).map_err(AuthError::client_init)?;
    check_with_resolver(&resolver, domain, options).await
}

pub async fn check_with_resolver<R>(
    resolver: &R,
    domain: &str,
    options: &AuthLookupOptions,
) -> Result<DomainReport, AuthError>
where
    R: LookupTxt + Sync,
{
    let name = DomainName::parse(domain).map_err(AuthError::invalid_domain)?;
    let ascii = name.as_str();

    let spf = SpfEvaluator::with_limits(resolver, options.spf_limits().clone())
        .evaluate(ascii)
        .await;
    let dkim = DkimValidator::new(resolver)
        .probe(ascii, options.dkim_selectors())
        .await;
    let dmarc = DmarcValidator::new(resolver).validate(ascii).await;

    let breakdown = score::score_with_limits(&spf, &dkim, &dmarc, options.spf_limits());
    info!(domain = ascii, total = breakdown.total, "domain checked");

    Ok(DomainReport::new(
        name.into_string(),
        spf,
        dkim,
        dmarc,
        breakdown,
    ))
}
