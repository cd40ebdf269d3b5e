use std::time::Duration;

use clap::Parser;
use mailauth_lib::dns::DEFAULT_DOH_ENDPOINT;
use mailauth_lib::{AuthLookupOptions, ResolverOptions};

/// Selectors probed when none are given on the command line.
pub const DEFAULT_SELECTORS: &[&str] = &[
    "default",
    "google",
    "selector1",
    "selector2",
    "k1",
    "s1",
    "s2",
    "dkim",
    "mail",
];

#[derive(Parser)]
#[command(name = "mailauth-cli", version, about = "Audit SPF, DKIM and DMARC records")]
pub struct Cli {
    /// domains to check
    pub domains: Vec<String>,

    /// read domains from stdin (one per line, '#' starts a comment)
    #[arg(long)]
    pub stdin: bool,

    /// write report to file (JSON/NDJSON/CSV depending on --format)
    #[arg(long)]
    pub out: Option<String>,

    /// format: human|json|ndjson|csv
    #[arg(long, default_value = "human")]
    pub format: String,

    /// DKIM selector to check (repeatable, replaces the built-in list)
    #[arg(long = "dkim-selector")]
    pub dkim_selectors: Vec<String>,

    /// DNS-over-HTTPS JSON endpoint
    #[arg(long = "doh-endpoint", default_value = DEFAULT_DOH_ENDPOINT)]
    pub doh_endpoint: String,

    /// per-query timeout (ms)
    #[arg(long = "timeout-ms", default_value_t = 5_000)]
    pub timeout_ms: u64,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn clap_command() -> clap::Command {
        <Self as clap::CommandFactory>::command()
    }

    pub fn lookup_options(&self) -> AuthLookupOptions {
        let resolver = ResolverOptions::new()
            .with_endpoint(self.doh_endpoint.clone())
            .with_query_timeout(Duration::from_millis(self.timeout_ms));
        let options = AuthLookupOptions::new().with_resolver_options(resolver);
        if self.dkim_selectors.is_empty() {
            options.with_dkim_selectors(DEFAULT_SELECTORS.iter().copied())
        } else {
            options.with_dkim_selectors(self.dkim_selectors.iter().cloned())
        }
    }
}
