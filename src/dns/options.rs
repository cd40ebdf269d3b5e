use std::time::Duration;

/// Public DoH endpoint used when none is configured.
pub const DEFAULT_DOH_ENDPOINT: &str = "https://cloudflare-dns.com/dns-query";
/// Budget for one DNS query (request + response body).
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(5_000);
/// Longest query URL dispatched to the endpoint.
pub const DEFAULT_MAX_URL_LEN: usize = 2_048;

/// Configuration knobs for [`DohResolver`](super::DohResolver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    pub endpoint: String,
    pub query_timeout: Duration,
    pub max_url_len: usize,
    pub user_agent: String,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_DOH_ENDPOINT.to_string(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            max_url_len: DEFAULT_MAX_URL_LEN,
            user_agent: concat!("mailauth_lib/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ResolverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_max_url_len(mut self, max_url_len: usize) -> Self {
        self.max_url_len = max_url_len;
        self
    }

    /// Budget in milliseconds, as reported by timeout errors.
    pub fn query_timeout_ms(&self) -> u128 {
        self.query_timeout.as_millis()
    }
}
