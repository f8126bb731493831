//! Validation at the two levels the pipeline cares about.
//!
//! - [`mapping`] - schema level: does a candidate [`ColumnMapping`] cover the
//!   required fields? Runs on headers only, before any data is read.
//! - [`record`] - data level: does one extracted row carry usable values?
//!
//! The JSON Schema helpers below check the shape of collaborator output
//! against the schemas embedded from the `schemas/` directory.
//!
//! [`ColumnMapping`]: crate::models::ColumnMapping

pub mod mapping;
pub mod record;

use serde_json::Value;

pub use mapping::validate_mapping;
pub use record::{is_absent, is_valid_ip, validate_record};

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with every violation otherwise
///
/// # Example
/// ```ignore
/// use serde_json::json;
/// use ipdrload::validation::validate;
///
/// let schema = json!({ "type": "object", "required": ["name"] });
/// assert!(validate(&schema, &json!({ "name": "x" })).is_ok());
/// assert!(validate(&schema, &json!({})).is_err());
/// ```
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a parsed suggestion response: an object of `string | null`.
pub fn validate_suggestion_response(data: &Value) -> Result<(), Vec<String>> {
    let schema: Value = serde_json::from_str(include_str!("../../schemas/suggestion-response.json"))
        .map_err(|e| vec![format!("Invalid embedded schema: {}", e)])?;
    validate(&schema, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generic_validate() {
        let schema = json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } }
        });
        assert!(validate(&schema, &json!({ "name": "test" })).is_ok());
        assert!(validate(&schema, &json!({ "age": 42 })).is_err());
    }

    #[test]
    fn test_suggestion_response_shape() {
        assert!(validate_suggestion_response(&json!({
            "a_party_id": "MSISDN",
            "dst_ip": null
        }))
        .is_ok());
    }

    #[test]
    fn test_suggestion_response_rejects_non_strings() {
        let errors = validate_suggestion_response(&json!({ "dst_port": 443 })).unwrap_err();
        assert!(!errors.is_empty());
        assert!(validate_suggestion_response(&json!(["a_party_id"])).is_err());
        assert!(validate_suggestion_response(&json!({})).is_err());
    }
}
