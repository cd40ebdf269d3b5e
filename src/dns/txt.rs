use tracing::warn;

use super::MxRecord;

/// Longest character-string a single TXT segment can carry.
pub const MAX_SEGMENT_LEN: usize = 255;

/// Rebuild the text of one TXT answer from its presentation form.
///
/// `"v=spf1 ip4:192.0.2.1" "-all"` yields `v=spf1 ip4:192.0.2.1 -all`: quoted
/// segments are unescaped, capped at [`MAX_SEGMENT_LEN`] characters, empty
/// ones dropped and the rest joined with a single space. Data without quotes
/// is returned trimmed and otherwise untouched.
pub fn reconstruct_txt(data: &str) -> String {
    let trimmed = data.trim();
    if !trimmed.contains('"') {
        return trimmed.to_string();
    }

    quoted_segments(trimmed)
        .into_iter()
        .map(|segment| segment.chars().take(MAX_SEGMENT_LEN).collect::<String>())
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quoted segments, collected as bytes (`\DDD` yields one byte) and decoded
/// as UTF-8 when the segment closes.
fn quoted_segments(data: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    let mut inside = false;
    let mut chars = data.chars().peekable();
    let mut utf8 = [0u8; 4];

    while let Some(c) = chars.next() {
        if !inside {
            if c == '"' {
                inside = true;
                current.clear();
            }
            continue;
        }
        match c {
            '"' => {
                inside = false;
                segments.push(String::from_utf8_lossy(&current).into_owned());
                current.clear();
            }
            '\\' => {
                let mut digits = String::new();
                while digits.len() < 3 && chars.peek().is_some_and(char::is_ascii_digit) {
                    digits.extend(chars.next());
                }
                if digits.len() == 3 {
                    match digits.parse::<u8>() {
                        Ok(byte) => current.push(byte),
                        Err(_) => current.extend_from_slice(digits.as_bytes()),
                    }
                } else {
                    current.extend_from_slice(digits.as_bytes());
                    if digits.is_empty() {
                        if let Some(escaped) = chars.next() {
                            current.extend_from_slice(escaped.encode_utf8(&mut utf8).as_bytes());
                        }
                    }
                }
            }
            other => current.extend_from_slice(other.encode_utf8(&mut utf8).as_bytes()),
        }
    }

    // unterminated trailing segment
    if inside && !current.is_empty() {
        segments.push(String::from_utf8_lossy(&current).into_owned());
    }
    segments
}

/// Parse one `"<priority> <exchange>"` MX answer. Malformed input yields `None`.
pub fn parse_mx(data: &str) -> Option<MxRecord> {
    let mut parts = data.split_whitespace();
    let preference = parts.next()?.parse::<u16>().ok()?;
    let exchange = normalize_exchange(parts.next()?);
    if exchange.is_empty() || parts.next().is_some() {
        return None;
    }
    Some(MxRecord::new(preference, exchange))
}

pub(crate) fn normalize_exchange(exchange: &str) -> String {
    exchange.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Parse, sort (ascending preference) and de-duplicate MX answers, dropping
/// malformed entries with a warning.
pub(crate) fn collect_mx<'a>(name: &str, answers: impl IntoIterator<Item = &'a str>) -> Vec<MxRecord> {
    let mut records: Vec<MxRecord> = answers
        .into_iter()
        .filter_map(|data| {
            let parsed = parse_mx(data);
            if parsed.is_none() {
                warn!(query = name, data, "dropping malformed MX answer");
            }
            parsed
        })
        .collect();
    records.sort();
    records.dedup();
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_quoted_segments_with_single_space() {
        let out = reconstruct_txt(r#""v=spf1 ip4:192.0.2.1" "-all""#);
        assert_eq!(out, "v=spf1 ip4:192.0.2.1 -all");
    }

    #[test]
    fn drops_empty_segments() {
        let out = reconstruct_txt(r#""v=DMARC1;" "" "p=reject""#);
        assert_eq!(out, "v=DMARC1; p=reject");
    }

    #[test]
    fn caps_each_segment() {
        let long = "a".repeat(300);
        let out = reconstruct_txt(&format!("\"{long}\" \"b\""));
        assert_eq!(out.len(), MAX_SEGMENT_LEN + 2);
        assert!(out.ends_with(" b"));
    }

    #[test]
    fn unescapes_quotes_and_decimal_escapes() {
        let out = reconstruct_txt(r#""say \"hi\"\059 done""#);
        assert_eq!(out, "say \"hi\"; done");
    }

    #[test]
    fn decimal_escapes_decoded_as_utf8() {
        assert_eq!(reconstruct_txt(r#""caf\195\169""#), "café");
        assert_eq!(reconstruct_txt(r#""x\255y""#), "x\u{FFFD}y");
    }

    #[test]
    fn unquoted_data_taken_verbatim() {
        assert_eq!(reconstruct_txt("  v=spf1 -all "), "v=spf1 -all");
    }

    #[test]
    fn mx_answers_sorted_and_malformed_dropped() {
        let records = collect_mx(
            "example.com",
            [
                "20 mx2.example.com.",
                "ten mx.example.com.",
                "10 MX1.example.com.",
                "5",
                "10 mx1.example.com",
            ],
        );
        assert_eq!(
            records,
            vec![
                MxRecord::new(10, "mx1.example.com"),
                MxRecord::new(20, "mx2.example.com"),
            ]
        );
    }
}
