//! Canonical record → delimited text line.
//!
//! The column order is part of the bulk-load contract:
//!
//! ```text
//! a_party_id,start_time,end_time,duration_ms,nat_ip,nat_port,src_ip,src_port,
//! dst_ip,dst_port,protocol,service_label,bytes_up,bytes_down
//! ```
//!
//! Absent values become empty fields. A field is quoted only when it
//! contains a comma, a double quote or a newline; inner quotes are doubled.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::CanonicalRecord;

/// Output columns, in load order.
pub const COLUMNS: [&str; 14] = [
    "a_party_id",
    "start_time",
    "end_time",
    "duration_ms",
    "nat_ip",
    "nat_port",
    "src_ip",
    "src_port",
    "dst_ip",
    "dst_port",
    "protocol",
    "service_label",
    "bytes_up",
    "bytes_down",
];

const DELIMITER: char = ',';

/// Quote a field if it needs it.
pub fn escape_field(value: &str) -> String {
    if value.contains([DELIMITER, '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

/// Encode one record as a newline-terminated line.
pub fn encode(record: &CanonicalRecord) -> String {
    let fields: [String; 14] = [
        record.a_party_id.clone(),
        timestamp(&record.start_time),
        record.end_time.as_ref().map(timestamp).unwrap_or_default(),
        opt(&record.duration_ms),
        opt(&record.nat_ip),
        opt(&record.nat_port),
        opt(&record.src_ip),
        opt(&record.src_port),
        opt(&record.dst_ip),
        opt(&record.dst_port),
        record.protocol.clone(),
        record.service_label.clone(),
        record.bytes_up.to_string(),
        record.bytes_down.to_string(),
    ];

    let mut line = fields
        .iter()
        .map(String::as_str)
        .map(escape_field)
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Header line matching [`encode`] output.
pub fn header_line() -> String {
    let mut line = COLUMNS.join(",");
    line.push('\n');
    line
}

/// Split an encoded line back into its fields.
pub fn decode_line(line: &str) -> Result<Vec<String>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(DELIMITER as u8)
        .from_reader(line.as_bytes());

    match reader.records().next() {
        Some(record) => Ok(record?.iter().map(str::to_string).collect()),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> CanonicalRecord {
        CanonicalRecord {
            a_party_id: "33612345678".into(),
            start_time: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            end_time: None,
            duration_ms: Some(500_000),
            src_ip: Some("10.0.0.1".into()),
            src_port: Some(50000),
            nat_ip: None,
            nat_port: None,
            dst_ip: Some("2001:db8::1".into()),
            dst_port: Some(443),
            protocol: "TCP".into(),
            service_label: "HTTPS/WEB".into(),
            bytes_up: 10,
            bytes_down: 0,
        }
    }

    #[test]
    fn test_escape_rules() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,\"b\""), "\"a,\"\"b\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field(""), "");
    }

    #[test]
    fn test_escaped_value_decodes_back() {
        let encoded = escape_field("a,\"b\"");
        let decoded = decode_line(&format!("{}\n", encoded)).unwrap();
        assert_eq!(decoded, vec!["a,\"b\"".to_string()]);
    }

    #[test]
    fn test_encode_field_order() {
        let line = encode(&record());
        assert_eq!(
            line,
            "33612345678,2024-03-01T10:00:00.000Z,,500000,,,10.0.0.1,50000,2001:db8::1,443,TCP,HTTPS/WEB,10,0\n"
        );
        assert_eq!(decode_line(&line).unwrap().len(), COLUMNS.len());
    }

    #[test]
    fn test_encode_quotes_party_id() {
        let mut r = record();
        r.a_party_id = "acme, inc".into();
        let line = encode(&r);
        assert!(line.starts_with("\"acme, inc\","));
        assert!(line.ends_with('\n') && !line.ends_with("\n\n"));
        assert_eq!(decode_line(&line).unwrap()[0], "acme, inc");
    }

    #[test]
    fn test_header_line() {
        assert!(header_line().starts_with("a_party_id,start_time,end_time,duration_ms,nat_ip"));
    }
}
