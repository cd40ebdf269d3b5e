//! DNS-over-HTTPS resolution.
//!
//! [`DohResolver`] issues `application/dns-json` queries against a DoH
//! endpoint. Every query runs under the configured deadline; when it expires
//! the request future is dropped, which aborts the underlying HTTP exchange.
//!
//! A/AAAA and TXT lookups propagate failures to the caller. MX and CNAME
//! lookups are supplementary signals and degrade to an empty result.

mod error;
mod name;
mod options;
mod txt;
mod types;

pub use error::DnsError;
pub use name::{DomainName, MAX_NAME_LEN};
pub use options::{DEFAULT_DOH_ENDPOINT, DEFAULT_MAX_URL_LEN, DEFAULT_QUERY_TIMEOUT, ResolverOptions};
pub use txt::{MAX_SEGMENT_LEN, parse_mx, reconstruct_txt};
pub use types::{MxRecord, RecordType};

use std::future::Future;

use reqwest::{Client, Url, header::ACCEPT};
use tracing::{debug, error, trace, warn};

use types::{DohAnswer, DohResponse};

const DNS_JSON: &str = "application/dns-json";
const BODY_EXCERPT_LEN: usize = 512;

/// TXT lookups, the only query the record validators need.
///
/// Implemented by [`DohResolver`]; tests plug in stubs.
pub trait LookupTxt {
    fn lookup_txt(&self, name: &str)
    -> impl Future<Output = Result<Vec<String>, DnsError>> + Send;
}

#[derive(Debug, Clone)]
pub struct DohResolver {
    client: Client,
    options: ResolverOptions,
}

impl DohResolver {
    pub fn new(options: ResolverOptions) -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(&options.user_agent).build()?;
        Ok(Self::with_client(client, options))
    }

    pub fn with_client(client: Client, options: ResolverOptions) -> Self {
        Self { client, options }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Raw answer data for `name`/`record_type`, filtered on the RR type.
    pub async fn resolve(
        &self,
        name: &str,
        record_type: RecordType,
    ) -> Result<Vec<String>, DnsError> {
        let answers = self.query(name, record_type).await?;
        Ok(answers.into_iter().map(|answer| answer.data).collect())
    }

    pub async fn resolve_a(&self, name: &str) -> Result<Vec<String>, DnsError> {
        self.resolve(name, RecordType::A).await
    }

    pub async fn resolve_aaaa(&self, name: &str) -> Result<Vec<String>, DnsError> {
        self.resolve(name, RecordType::Aaaa).await
    }

    /// TXT answers, one reconstructed string per answer.
    pub async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        let answers = self.query(name, RecordType::Txt).await?;
        Ok(answers
            .iter()
            .map(|answer| reconstruct_txt(&answer.data))
            .collect())
    }

    /// MX records sorted by preference. Lookup failures yield an empty list.
    pub async fn resolve_mx(&self, name: &str) -> Vec<MxRecord> {
        match self.query(name, RecordType::Mx).await {
            Ok(answers) => txt::collect_mx(name, answers.iter().map(|a| a.data.as_str())),
            Err(err) => {
                debug!(query = name, error = %err, "MX lookup failed, treating as empty");
                Vec::new()
            }
        }
    }

    /// CNAME targets without trailing dot. Lookup failures yield an empty list.
    pub async fn resolve_cname(&self, name: &str) -> Vec<String> {
        match self.query(name, RecordType::Cname).await {
            Ok(answers) => answers
                .iter()
                .map(|answer| txt::normalize_exchange(&answer.data))
                .filter(|target| !target.is_empty())
                .collect(),
            Err(err) => {
                debug!(query = name, error = %err, "CNAME lookup failed, treating as empty");
                Vec::new()
            }
        }
    }

    async fn query(
        &self,
        name: &str,
        record_type: RecordType,
    ) -> Result<Vec<DohAnswer>, DnsError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DnsError::invalid_input(name, "name is empty"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(DnsError::invalid_input(
                name,
                format!("length {} > {MAX_NAME_LEN}", name.len()),
            ));
        }

        let url = Url::parse_with_params(
            &self.options.endpoint,
            &[("name", name), ("type", record_type.as_str())],
        )
        .map_err(|err| DnsError::invalid_input(name, format!("cannot build query URL: {err}")))?;
        if url.as_str().len() > self.options.max_url_len {
            return Err(DnsError::invalid_input(
                name,
                format!(
                    "query URL length {} > {}",
                    url.as_str().len(),
                    self.options.max_url_len
                ),
            ));
        }

        debug!(query = name, %record_type, "DoH query");
        let response = match tokio::time::timeout(
            self.options.query_timeout,
            self.exchange(name, url),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                error!(query = name, %record_type, error = %err, "DoH exchange failed");
                return Err(err);
            }
            Err(_elapsed) => {
                let err = DnsError::Timeout {
                    name: name.to_string(),
                    record_type,
                    budget_ms: self.options.query_timeout_ms(),
                };
                error!(query = name, %record_type, error = %err, "DoH query timed out");
                return Err(err);
            }
        };

        match response.status {
            0 => {}
            3 => {
                warn!(query = name, %record_type, "NXDOMAIN");
                return Err(DnsError::name_not_found(name));
            }
            status => {
                let err = DnsError::Resolution {
                    name: name.to_string(),
                    record_type,
                    status,
                };
                error!(query = name, %record_type, error = %err, "DNS resolution error");
                return Err(err);
            }
        }

        let code = record_type.code();
        let answers: Vec<DohAnswer> = response
            .answer
            .into_iter()
            .filter(|answer| answer.record_type == code)
            .collect();
        for answer in &answers {
            trace!(owner = %answer.name, ttl = answer.ttl, data = %answer.data, "DoH answer");
        }
        Ok(answers)
    }

    async fn exchange(&self, name: &str, url: Url) -> Result<DohResponse, DnsError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, DNS_JSON)
            .send()
            .await
            .map_err(|err| DnsError::transport(name, None, err.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| DnsError::transport(name, Some(status.as_u16()), err.to_string()))?;

        if !status.is_success() {
            let excerpt: String = String::from_utf8_lossy(&body)
                .trim()
                .chars()
                .take(BODY_EXCERPT_LEN)
                .collect();
            return Err(DnsError::transport(name, Some(status.as_u16()), excerpt));
        }

        serde_json::from_slice::<DohResponse>(&body).map_err(|err| {
            DnsError::transport(
                name,
                Some(status.as_u16()),
                format!("invalid DoH response: {err}"),
            )
        })
    }
}

impl LookupTxt for DohResolver {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        self.resolve_txt(name).await
    }
}

#[cfg(test)]
mod tests;
