//! Prompt generation for column mapping suggestions
//!
//! The collaborator only sees the header row and the schema description,
//! never row data.

use crate::mapping::SuggestionRequest;
use crate::schema;

/// Generate the system prompt for mapping suggestion
pub fn system_prompt() -> String {
    let fields = schema::fields()
        .iter()
        .map(|f| format!("\"{}\"", f.name))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are a telecom data integration expert. Your task is to map the columns of an IP Detail Record (IPDR) session log onto a fixed canonical schema.

## Output Format

Return ONLY a JSON object whose keys are canonical field names and whose values are either the EXACT column name from the file (case-sensitive) or null when no column fits:

```json
{{"a_party_id": "MSISDN", "start_time": "Session Start", "end_time": null}}
```

Valid keys: {fields}

## Rules

1. Use only column names that appear in the header list.
2. Never invent columns and never combine several columns.
3. A session id is NOT a subscriber identifier: map `a_party_id` to MSISDN, IMSI or a subscriber/account column.
4. Prefer the post-NAT (public) address for `nat_ip`/`nat_port` and the private address for `src_ip`/`src_port`.
5. Return ONLY the JSON object, no explanations or markdown"#
    )
}

/// Generate the user prompt for one header row
pub fn user_prompt(request: &SuggestionRequest) -> String {
    let headers = request
        .headers
        .iter()
        .map(|h| format!("- \"{}\"", h))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "## Canonical schema\n\n{}\n\n## File columns ({} total)\n\n{}\n\nMap the file columns onto the canonical schema.",
        request.schema_description,
        request.headers.len(),
        headers
    )
}
