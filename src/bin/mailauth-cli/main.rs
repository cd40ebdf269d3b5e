mod args;
mod output;

use std::io::{self, BufRead};

use anyhow::{Context, Result};
use mailauth_lib::{DohResolver, check_with_resolver};
use tracing_subscriber::EnvFilter;

use crate::args::Cli;
use crate::output::{OutputRow, any_invalid, write_reports};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let domains = collect_domains(&cli)?;
    if domains.is_empty() {
        Cli::clap_command().print_help()?;
        println!();
        return Ok(());
    }

    let options = cli.lookup_options();
    let resolver = DohResolver::new(options.resolver_options().clone())
        .context("build DoH HTTP client")?;

    let mut rows = Vec::with_capacity(domains.len());
    for domain in domains {
        let row = match check_with_resolver(&resolver, &domain, &options).await {
            Ok(report) => OutputRow::from_report(domain, report),
            Err(err) => OutputRow::from_error(domain, &err),
        };
        rows.push(row);
    }

    write_reports(&rows, &cli)?;

    // exit codes: 0 OK, 2 invalid, 1 fatal
    if any_invalid(&rows) {
        std::process::exit(2);
    }
    Ok(())
}

fn collect_domains(cli: &Cli) -> Result<Vec<String>> {
    let mut domains = cli.domains.clone();
    if cli.stdin {
        for line in io::stdin().lock().lines() {
            let line = line.context("read stdin")?;
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                domains.push(trimmed.to_string());
            }
        }
    }
    Ok(domains)
}
