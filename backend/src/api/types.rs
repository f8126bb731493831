//! REST API types.
//!
//! All payloads use camelCase keys. Mappings serialize as a full object of
//! canonical field → header name or `"unmapped"`.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cache::MappingRegistry;
use crate::error::PreflightError;
use crate::mapping::{MappingSource, MappingSuggester};
use crate::models::{ColumnMapping, ValidationReport};
use crate::parser::CsvInfo;
use crate::schema::{self, SchemaDefinition};
use crate::validation::validate_mapping;

/// Response to a file analysis: everything needed to confirm a mapping.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    /// Upload handle to pass back to `/api/process`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub file_headers: Vec<String>,
    pub suggested_mapping: ColumnMapping,
    pub mapping_source: MappingSource,
    pub schema_definition: SchemaDefinition,
    pub validation: ValidationReport,
    pub csv_info: CsvInfo,
    /// Best compatible saved template, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_template: Option<TemplateMatch>,
}

/// A saved mapping template matching the analyzed headers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMatch {
    pub id: String,
    pub name: String,
    /// Share of the template's columns found in the file
    pub score: f64,
    pub success_rate: f64,
    pub mapping: ColumnMapping,
}

impl TemplateMatch {
    /// Best compatible template in `registry` for `headers`.
    pub fn best(registry: &MappingRegistry, headers: &[String]) -> Option<Self> {
        registry
            .find_compatible(headers)
            .first()
            .map(|(stored, score)| Self {
                id: stored.id.clone(),
                name: stored.name.clone(),
                score: *score,
                success_rate: stored.success_rate,
                mapping: stored.mapping.clone(),
            })
    }
}

/// Suggest and validate a mapping for a file's header row.
pub async fn analyze(
    file_id: Option<String>,
    info: CsvInfo,
    suggester: &MappingSuggester,
    stored_template: Option<TemplateMatch>,
) -> AnalyzeResponse {
    let suggestion = suggester.suggest(&info.headers).await;
    let validation = validate_mapping(&suggestion.mapping, Some(&info.headers));

    AnalyzeResponse {
        file_id,
        file_headers: info.headers.clone(),
        suggested_mapping: suggestion.mapping,
        mapping_source: suggestion.source,
        schema_definition: schema::definition(),
        validation,
        csv_info: info,
        stored_template,
    }
}

/// Request body for `/api/process`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub file_id: String,
    pub mapping: ColumnMapping,
    /// Template to credit with the run's outcome
    #[serde(default)]
    pub template_id: Option<String>,
}

/// Response to an accepted process request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub job_id: String,
    /// Always "accepted"; progress and results arrive on the log stream
    pub status: String,
    /// Non-blocking mapping warnings
    pub warnings: Vec<String>,
}

impl ProcessResponse {
    pub fn accepted(job_id: impl Into<String>, warnings: Vec<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: "accepted".to_string(),
            warnings,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
        "details": []
    })
}

/// Map a preflight rejection to a status code and itemized body
pub fn preflight_rejection(err: &PreflightError) -> (StatusCode, Value) {
    let status = match err {
        PreflightError::FileNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };

    let mut body = json!({
        "status": "error",
        "error": err.to_string(),
        "details": err.details(),
    });
    if let PreflightError::UnknownHeaders { available, .. } = err {
        body["availableHeaders"] = json!(available);
    }

    (status, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(headers: &[&str]) -> CsvInfo {
        CsvInfo {
            encoding: "utf-8".into(),
            delimiter: ',',
            headers: headers.iter().map(|h| h.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_analyze_response_shape() {
        let response = analyze(
            Some("abc".into()),
            info(&["MSISDN", "Start", "Src IP", "Dst IP", "Dst Port"]),
            &MappingSuggester::fuzzy_only(),
            None,
        )
        .await;

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["fileId"], "abc");
        assert_eq!(value["mappingSource"], "fuzzy");
        assert_eq!(value["suggestedMapping"]["a_party_id"], "MSISDN");
        assert_eq!(value["suggestedMapping"]["nat_ip"], "unmapped");
        assert_eq!(value["csvInfo"]["delimiter"], ",");
        assert_eq!(value["schemaDefinition"]["requiredFields"][0], "a_party_id");
        assert!(value["validation"]["isValid"].is_boolean());
        assert!(value.get("storedTemplate").is_none());
    }

    #[tokio::test]
    async fn test_analyze_offers_template() {
        let dir = tempfile::tempdir().unwrap();
        let headers = ["MSISDN", "Start", "Src IP", "Dst IP", "Dst Port"];
        let mut registry = MappingRegistry::with_dir(dir.path());
        let mapping = ColumnMapping::new().with("a_party_id", "MSISDN");
        let id = registry
            .save(mapping, "op", headers.iter().map(|h| h.to_string()).collect())
            .unwrap();

        let best = TemplateMatch::best(&registry, &info(&headers).headers);
        let response = analyze(None, info(&headers), &MappingSuggester::fuzzy_only(), best).await;
        let template = response.stored_template.unwrap();
        assert_eq!(template.id, id);
        assert_eq!(template.score, 1.0);
    }

    #[test]
    fn test_process_request_accepts_unmapped_markers() {
        let request: ProcessRequest = serde_json::from_str(
            r#"{"fileId": "f1", "mapping": {"a_party_id": "MSISDN", "nat_ip": "unmapped", "nat_port": null}}"#,
        )
        .unwrap();
        assert_eq!(request.mapping.mapped_count(), 1);
        assert!(request.template_id.is_none());
    }

    #[test]
    fn test_preflight_rejection() {
        let (status, body) = preflight_rejection(&PreflightError::UnknownHeaders {
            missing: vec!["Dest".into()],
            available: vec!["Dst IP".into()],
        });
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"][0], "Column 'Dest' not found in file");
        assert_eq!(body["availableHeaders"][0], "Dst IP");

        let (status, _) = preflight_rejection(&PreflightError::FileNotFound("x".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
