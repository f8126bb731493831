//! Value normalization: timestamps, integers, duration units, protocol,
//! service labels and synthesized subscriber ids.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Explicit durations below this are taken to be seconds.
pub const SECONDS_CUTOFF: i64 = 1_000_000;

/// Numeric timestamps below this are epoch seconds, above it epoch millis.
const EPOCH_MILLIS_CUTOFF: i64 = 100_000_000_000;

/// Protocol used when the column is unmapped or empty.
pub const DEFAULT_PROTOCOL: &str = "TCP";

pub const SERVICE_OTHER: &str = "OTHER";
pub const SERVICE_UNKNOWN: &str = "UNKNOWN";

/// Well-known destination ports.
static PORT_SERVICES: &[(i64, &str)] = &[
    (80, "HTTP/WEB"),
    (443, "HTTPS/WEB"),
    (53, "DNS"),
    (22, "SSH"),
    (21, "FTP"),
    (25, "SMTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (3306, "MySQL"),
    (5432, "PostgreSQL"),
    (6379, "Redis"),
    (27017, "MongoDB"),
    (8080, "HTTP-ALT"),
    (8443, "HTTPS-ALT"),
    (1194, "OpenVPN"),
    (1723, "PPTP"),
    (5060, "SIP"),
];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];

/// Parse a date/time into UTC.
///
/// Naive values are taken as UTC. Bare integers are epoch seconds, or epoch
/// milliseconds from 10^11 upwards.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(v, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(v, fmt) {
            return Some(dt.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(v, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }

    let epoch: i64 = v.parse().ok()?;
    if epoch.abs() < EPOCH_MILLIS_CUTOFF {
        DateTime::from_timestamp(epoch, 0)
    } else {
        DateTime::from_timestamp_millis(epoch)
    }
}

/// Parse an integer, truncating a decimal part.
pub fn parse_integer(value: &str) -> Option<i64> {
    let v = value.trim();
    if let Ok(n) = v.parse::<i64>() {
        return Some(n);
    }
    v.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| f.trunc() as i64)
}

/// Parse a strictly positive port number.
pub fn parse_port(value: &str) -> Option<u32> {
    parse_integer(value)
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
}

/// Parse a byte counter; absent or unparsable counters are 0.
pub fn parse_bytes(value: Option<&str>) -> u64 {
    value
        .and_then(parse_integer)
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0)
}

/// Unit inference for an explicit duration value.
///
/// Values under [`SECONDS_CUTOFF`] are seconds and get scaled to
/// milliseconds; larger values are already milliseconds.
pub fn infer_duration_ms(raw: i64) -> i64 {
    if raw < SECONDS_CUTOFF {
        raw.saturating_mul(1000)
    } else {
        raw
    }
}

/// Session duration in milliseconds.
///
/// An explicit value wins (and yields nothing if unparsable); otherwise the
/// span between start and end.
pub fn duration_ms(
    explicit: Option<&str>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Option<i64> {
    if let Some(raw) = explicit {
        return parse_integer(raw).map(infer_duration_ms);
    }
    match (start, end) {
        (Some(s), Some(e)) => Some((e - s).num_milliseconds()),
        _ => None,
    }
}

/// Upper-cased protocol, [`DEFAULT_PROTOCOL`] when absent.
pub fn normalize_protocol(value: Option<&str>) -> String {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v.to_uppercase(),
        None => DEFAULT_PROTOCOL.to_string(),
    }
}

/// Service label for a numeric port.
pub fn service_for_port(port: i64) -> &'static str {
    PORT_SERVICES
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, label)| *label)
        .unwrap_or(SERVICE_OTHER)
}

/// Service label for a raw destination port value.
pub fn service_label(port: Option<&str>) -> &'static str {
    match port.and_then(parse_integer) {
        Some(p) => service_for_port(p),
        None => SERVICE_UNKNOWN,
    }
}

/// Best-effort grouping key for rows without a subscriber id.
///
/// Neither unique nor reproducible unless the suffix source is.
pub fn synthesize_party_id(src_ip: Option<&str>, start: DateTime<Utc>, suffix: &str) -> String {
    format!(
        "{}_{}_{}",
        src_ip.unwrap_or("unknown"),
        start.timestamp_millis(),
        suffix
    )
}
