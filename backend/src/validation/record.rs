//! Data-level validation of one extracted row.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::schema::{self, DST_IP, DST_PORT, SRC_IP, START_TIME};
use crate::transform::normalize::{parse_port, parse_timestamp};
use crate::transform::record::ExtractedFields;

static IPV4: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").expect("valid IPv4 pattern"));

static IPV6_FULL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4}$").expect("valid IPv6 pattern")
});

/// Placeholder values some exporters write for "no value".
const NULL_LITERALS: &[&str] = &["", "null", "NULL"];

/// True if a raw cell carries no value.
pub fn is_absent(value: Option<&str>) -> bool {
    value.map_or(true, |v| NULL_LITERALS.contains(&v))
}

/// IPv4 dotted shape, full IPv6 shape, or anything containing a colon
/// (compressed IPv6 forms).
pub fn is_valid_ip(value: &str) -> bool {
    IPV4.is_match(value) || IPV6_FULL.is_match(value) || value.contains(':')
}

/// Check one extracted row.
///
/// Returns every reason the row is unusable; an empty list means valid.
pub fn validate_record(fields: &ExtractedFields<'_>) -> Vec<String> {
    let mut reasons = Vec::new();

    for field in schema::required_fields() {
        if fields.get(field.name).is_none() {
            reasons.push(format!("Missing required field: {}", field.name));
        }
    }

    if let Some(start) = fields.get(START_TIME) {
        if parse_timestamp(start).is_none() {
            reasons.push(format!("Invalid start_time: '{}'", start));
        }
    }

    if let Some(port) = fields.get(DST_PORT) {
        if parse_port(port).is_none() {
            reasons.push(format!("Invalid dst_port: '{}'", port));
        }
    }

    for name in [SRC_IP, DST_IP] {
        if let Some(ip) = fields.get(name) {
            if !is_valid_ip(ip) {
                reasons.push(format!("Invalid {}: '{}'", name, ip));
            }
        }
    }

    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnMapping, RawRecord};
    use std::sync::Arc;

    fn row(pairs: &[(&str, &str)]) -> (ColumnMapping, RawRecord) {
        let headers: Arc<[String]> = pairs.iter().map(|(h, _)| h.to_string()).collect();
        let values = pairs.iter().map(|(_, v)| v.to_string()).collect();
        let mapping = pairs
            .iter()
            .fold(ColumnMapping::new(), |m, (h, _)| m.with(*h, *h));
        (mapping, RawRecord::new(headers, values))
    }

    fn valid_pairs() -> Vec<(&'static str, &'static str)> {
        vec![
            ("a_party_id", "33612345678"),
            ("start_time", "2024-03-01 10:00:00"),
            ("src_ip", "10.0.0.1"),
            ("dst_ip", "93.184.216.34"),
            ("dst_port", "443"),
        ]
    }

    #[test]
    fn test_absent_values() {
        assert!(is_absent(None));
        assert!(is_absent(Some("")));
        assert!(is_absent(Some("null")));
        assert!(is_absent(Some("NULL")));
        assert!(!is_absent(Some("Null ")));
        assert!(!is_absent(Some("0")));
    }

    #[test]
    fn test_ip_shapes() {
        assert!(is_valid_ip("192.168.1.1"));
        assert!(is_valid_ip("2001:0db8:85a3:0000:0000:8a2e:0370:7334"));
        assert!(is_valid_ip("2001:db8::1"));
        assert!(!is_valid_ip("not-an-ip"));
        assert!(!is_valid_ip("192.168.1"));
    }

    #[test]
    fn test_valid_record() {
        let (mapping, raw) = row(&valid_pairs());
        let fields = ExtractedFields::extract(&mapping, &raw);
        assert!(validate_record(&fields).is_empty());
    }

    #[test]
    fn test_missing_required() {
        let mut pairs = valid_pairs();
        pairs[3] = ("dst_ip", "NULL");
        let (mapping, raw) = row(&pairs);
        let reasons = validate_record(&ExtractedFields::extract(&mapping, &raw));
        assert_eq!(reasons, vec!["Missing required field: dst_ip".to_string()]);
    }

    #[test]
    fn test_collects_all_reasons() {
        let pairs = vec![
            ("a_party_id", "33612345678"),
            ("start_time", "not a date"),
            ("src_ip", "bogus"),
            ("dst_ip", "93.184.216.34"),
            ("dst_port", "-80"),
        ];
        let (mapping, raw) = row(&pairs);
        let reasons = validate_record(&ExtractedFields::extract(&mapping, &raw));
        assert_eq!(reasons.len(), 3);
        assert!(reasons[0].contains("start_time"));
        assert!(reasons[1].contains("dst_port"));
        assert!(reasons[2].contains("src_ip"));
    }
}
