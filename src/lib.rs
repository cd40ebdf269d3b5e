#![forbid(unsafe_code)]
//! mailauth_lib: SPF/DKIM/DMARC audit over DNS-over-HTTPS, with scoring.

pub mod auth;
pub mod dns;
pub mod score;

pub use auth::{
    AuthError, AuthLookupOptions, DkimValidationResult, DkimValidator, DmarcValidationResult,
    DmarcValidator, DomainReport, SpfEvaluator, SpfLimits, SpfQualifier, SpfRecord,
    SpfValidationResult, check_domain, check_with_resolver,
};
pub use dns::{DnsError, DohResolver, DomainName, LookupTxt, MxRecord, RecordType, ResolverOptions};
pub use score::{Category, ScoreBreakdown, score, score_with_limits};
