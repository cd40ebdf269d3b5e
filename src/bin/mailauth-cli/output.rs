use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::args::Cli;
use mailauth_lib::{AuthError, Category, DomainReport};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRow {
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<DomainReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutputRow {
    pub fn from_report(input: String, report: DomainReport) -> Self {
        Self {
            input,
            report: Some(report),
            error: None,
        }
    }

    pub fn from_error(input: String, error: &AuthError) -> Self {
        Self {
            input,
            report: None,
            error: Some(error.to_string()),
        }
    }

    fn is_valid(&self) -> bool {
        self.report.as_ref().is_some_and(DomainReport::is_fully_valid)
    }
}

pub fn write_reports(rows: &[OutputRow], cli: &Cli) -> Result<()> {
    match cli.format.as_str() {
        "human" => write_human(rows),
        "json" => write_json(rows, cli),
        "ndjson" => write_ndjson(rows, cli),
        "csv" => write_csv(rows, cli),
        other => bail!("unknown --format '{other}', use: human|json|ndjson|csv"),
    }
}

pub fn any_invalid(rows: &[OutputRow]) -> bool {
    rows.iter().any(|row| !row.is_valid())
}

fn write_human(rows: &[OutputRow]) -> Result<()> {
    for row in rows {
        let Some(report) = &row.report else {
            println!(
                "[ERROR]   {} :: {}",
                row.input,
                row.error.as_deref().unwrap_or("unknown")
            );
            continue;
        };

        let tag = if row.is_valid() { "[OK]     " } else { "[INVALID]" };
        let score = &report.score;
        println!(
            "{tag} {} score={} (spf {}, dkim {}, dmarc {})",
            report.domain, score.total, score.spf, score.dkim, score.dmarc
        );
        for line in human_lines(report) {
            println!("        {line}");
        }
    }
    Ok(())
}

fn human_lines(report: &DomainReport) -> Vec<String> {
    let mut lines = Vec::new();

    let spf = &report.spf;
    if spf.valid {
        lines.push(format!(
            "spf: valid {} ({} lookups)",
            spf.all_mechanisms.first().map_or("no all", String::as_str),
            spf.dns_lookup_count
        ));
    } else {
        lines.push(format!("spf: invalid: {}", spf.errors.join("; ")));
    }
    for warning in &spf.warnings {
        lines.push(format!("  warning: {warning}"));
    }

    match report.dkim_match() {
        Some(dkim) => lines.push(format!(
            "dkim: {} ({} {} bits{})",
            dkim.selector,
            dkim.key_type.as_deref().unwrap_or("?"),
            dkim.key_bits
                .map_or_else(|| "?".to_string(), |bits| bits.to_string()),
            if dkim.testing { ", testing" } else { "" }
        )),
        None => lines.push(format!(
            "dkim: none of {}",
            report
                .dkim
                .iter()
                .map(|result| result.selector.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }

    let dmarc = &report.dmarc;
    match (&dmarc.policy, &dmarc.error) {
        (Some(policy), _) if dmarc.valid => lines.push(format!(
            "dmarc: p={policy} rua={} ruf={}",
            dmarc.rua.len(),
            dmarc.ruf.len()
        )),
        (_, error) => lines.push(format!(
            "dmarc: invalid: {}",
            error.as_deref().unwrap_or("unknown")
        )),
    }
    for warning in &dmarc.warnings {
        lines.push(format!("  warning: {warning}"));
    }

    for category in Category::ALL {
        if let (Some(reason), Some(recommendation)) = (
            report.score.reasons.get(&category),
            report.score.recommendations.get(&category),
        ) {
            lines.push(format!("{category}: {reason} -> {recommendation}"));
        }
    }

    lines
}

fn write_json(rows: &[OutputRow], cli: &Cli) -> Result<()> {
    let s = serde_json::to_string_pretty(rows)?;
    if let Some(path) = &cli.out {
        write_all_atomically(path, s.as_bytes())?;
    } else {
        println!("{s}");
    }
    Ok(())
}

fn write_ndjson(rows: &[OutputRow], cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.out {
        let mut buf = Vec::new();
        for row in rows {
            let line = serde_json::to_string(row)?;
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
        }
        write_all_atomically(path, &buf)?;
    } else {
        for row in rows {
            println!("{}", serde_json::to_string(row)?);
        }
    }
    Ok(())
}

#[cfg(feature = "with-csv")]
const CSV_HEADER: [&str; 10] = [
    "input",
    "valid",
    "total",
    "spf",
    "dkim",
    "dmarc",
    "spf_all",
    "dkim_selectors",
    "dmarc_policy",
    "error",
];

#[cfg(feature = "with-csv")]
fn write_csv(rows: &[OutputRow], cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.out {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(CSV_HEADER)?;
        for row in rows {
            wtr.write_record(csv_record(row))?;
        }
        let data = wtr.into_inner()?;
        write_all_atomically(path, &data)?;
    } else {
        let mut wtr = csv::Writer::from_writer(std::io::stdout());
        wtr.write_record(CSV_HEADER)?;
        for row in rows {
            wtr.write_record(csv_record(row))?;
        }
        wtr.flush()?;
    }
    Ok(())
}

#[cfg(not(feature = "with-csv"))]
fn write_csv(_: &[OutputRow], _: &Cli) -> Result<()> {
    bail!("format=csv requires the 'with-csv' feature")
}

#[cfg(feature = "with-csv")]
fn csv_record(row: &OutputRow) -> Vec<String> {
    let valid = row.is_valid().to_string();
    let Some(report) = &row.report else {
        let mut record = vec![row.input.clone(), valid];
        record.resize(CSV_HEADER.len() - 1, String::new());
        record.push(row.error.clone().unwrap_or_default());
        return record;
    };

    let selectors = report
        .dkim
        .iter()
        .filter(|result| result.valid)
        .map(|result| result.selector.as_str())
        .collect::<Vec<_>>()
        .join("|");
    let errors = report
        .spf
        .errors
        .iter()
        .chain(report.dkim.iter().filter_map(|result| result.error.as_ref()))
        .chain(report.dmarc.error.as_ref())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("|");

    vec![
        row.input.clone(),
        valid,
        report.score.total.to_string(),
        report.score.spf.to_string(),
        report.score.dkim.to_string(),
        report.score.dmarc.to_string(),
        report.spf.all_mechanisms.first().cloned().unwrap_or_default(),
        selectors,
        report.dmarc.policy.clone().unwrap_or_default(),
        errors,
    ]
}

fn write_all_atomically(path: &str, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let tmp = format!("{path}.tmp");
    {
        let mut f = std::fs::File::create(&tmp).with_context(|| format!("create {tmp}"))?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path).with_context(|| format!("rename {tmp} -> {path}"))?;
    Ok(())
}
