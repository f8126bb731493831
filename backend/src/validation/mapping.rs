//! Schema-level validation of a candidate column mapping.

use crate::models::{ColumnMapping, ValidationReport};
use crate::schema::{self, A_PARTY_ID};

/// Header fragments that identify a real subscriber column.
const SUBSCRIBER_MARKERS: &[&str] = &["subscriber", "msisdn", "imsi"];

/// Check a mapping for required-field coverage and plausibility.
///
/// * one error per unmapped required field
/// * one warning per unmapped important optional field
/// * a warning when the subscriber id looks like a session id
/// * with `headers`, a warning per mapped header missing from the file
///
/// `is_valid` is true iff there are no errors.
pub fn validate_mapping(mapping: &ColumnMapping, headers: Option<&[String]>) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let mut required_fields_count = 0;
    let mut mapped_required_count = 0;
    for field in schema::required_fields() {
        required_fields_count += 1;
        if mapping.is_mapped(field.name) {
            mapped_required_count += 1;
        } else {
            errors.push(format!(
                "Required field '{}' ({}) is not mapped",
                field.name, field.label
            ));
        }
    }

    for field in schema::important_optional_fields() {
        if !mapping.is_mapped(field.name) {
            warnings.push(format!(
                "Optional field '{}' ({}) is not mapped",
                field.name, field.label
            ));
        }
    }

    if let Some(header) = mapping.get(A_PARTY_ID) {
        let lower = header.to_lowercase();
        if lower.contains("session") && !SUBSCRIBER_MARKERS.iter().any(|m| lower.contains(m)) {
            warnings.push(format!(
                "Column '{}' mapped to subscriber id looks like a session identifier, not a subscriber identifier",
                header
            ));
        }
    }

    if let Some(headers) = headers {
        for (field, header) in mapping.iter() {
            if !headers.iter().any(|h| h == header) {
                warnings.push(format!(
                    "Column '{}' mapped to '{}' is not present in the file",
                    header, field
                ));
            }
        }
    }

    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        required_fields_count,
        mapped_required_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> ColumnMapping {
        ColumnMapping::new()
            .with("a_party_id", "MSISDN")
            .with("start_time", "Start")
            .with("src_ip", "Src")
            .with("dst_ip", "Dst")
            .with("dst_port", "DPort")
    }

    #[test]
    fn test_complete_mapping_is_valid() {
        let report = validate_mapping(&complete(), None);
        assert!(report.is_valid);
        assert_eq!(report.required_fields_count, 5);
        assert_eq!(report.mapped_required_count, 5);
        // bytes_up, bytes_down, protocol unmapped
        assert_eq!(report.warnings.len(), 3);
    }

    #[test]
    fn test_invalid_iff_required_unmapped() {
        for required in schema::required_fields() {
            let mapping: ColumnMapping = complete()
                .iter()
                .filter(|(f, _)| *f != required.name)
                .fold(ColumnMapping::new(), |m, (f, h)| m.with(f, h));
            let report = validate_mapping(&mapping, None);
            assert!(!report.is_valid);
            assert_eq!(report.errors.len(), 1);
            assert!(report.errors[0].contains(required.name));
            assert_eq!(report.mapped_required_count, 4);
        }
    }

    #[test]
    fn test_empty_mapping() {
        let report = validate_mapping(&ColumnMapping::new(), None);
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 5);
        assert_eq!(report.mapped_required_count, 0);
    }

    #[test]
    fn test_session_id_heuristic() {
        let mapping = complete().with("a_party_id", "Session_ID");
        let report = validate_mapping(&mapping, None);
        assert!(report.is_valid);
        assert!(report.warnings.iter().any(|w| w.contains("session identifier")));

        let mapping = complete().with("a_party_id", "session_subscriber");
        let report = validate_mapping(&mapping, None);
        assert!(!report.warnings.iter().any(|w| w.contains("session identifier")));
    }

    #[test]
    fn test_missing_header_warning() {
        let headers = vec!["MSISDN".to_string(), "Start".to_string()];
        let report = validate_mapping(&complete(), Some(&headers));
        assert!(report.is_valid);
        assert!(report.warnings.iter().any(|w| w.contains("'Dst'")));
    }
}
