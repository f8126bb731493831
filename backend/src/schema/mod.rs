//! Canonical IPDR schema catalog.
//!
//! The catalog is a static, ordered table of the fields a source file can be
//! mapped onto. `service_label` is derived from `dst_port` and therefore not
//! part of the mappable schema.

use serde::Serialize;

/// A canonical schema field.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub name: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub description: &'static str,
    /// Header spellings seen in the wild, used for fuzzy matching.
    #[serde(skip)]
    pub aliases: &'static [&'static str],
}

pub const A_PARTY_ID: &str = "a_party_id";
pub const START_TIME: &str = "start_time";
pub const END_TIME: &str = "end_time";
pub const DURATION: &str = "duration";
pub const SRC_IP: &str = "src_ip";
pub const SRC_PORT: &str = "src_port";
pub const NAT_IP: &str = "nat_ip";
pub const NAT_PORT: &str = "nat_port";
pub const DST_IP: &str = "dst_ip";
pub const DST_PORT: &str = "dst_port";
pub const PROTOCOL: &str = "protocol";
pub const BYTES_UP: &str = "bytes_up";
pub const BYTES_DOWN: &str = "bytes_down";

static FIELDS: &[SchemaField] = &[
    SchemaField {
        name: A_PARTY_ID,
        label: "Subscriber ID (A-Party)",
        required: true,
        description: "Subscriber identifier such as MSISDN, IMSI or account id",
        aliases: &[
            "a_party_id", "a_party", "a_number", "msisdn", "imsi", "subscriber_id",
            "subscriber", "calling_number", "user_id", "phone_number",
        ],
    },
    SchemaField {
        name: START_TIME,
        label: "Session Start Time",
        required: true,
        description: "Timestamp at which the session started",
        aliases: &[
            "start_time", "session_start", "start", "begin_time", "start_date",
            "event_time", "timestamp",
        ],
    },
    SchemaField {
        name: END_TIME,
        label: "Session End Time",
        required: false,
        description: "Timestamp at which the session ended",
        aliases: &["end_time", "session_end", "end", "stop_time", "finish_time", "end_date"],
    },
    SchemaField {
        name: DURATION,
        label: "Session Duration",
        required: false,
        description: "Session length in seconds or milliseconds",
        aliases: &["duration", "session_duration", "duration_ms", "duration_sec", "elapsed"],
    },
    SchemaField {
        name: SRC_IP,
        label: "Source IP",
        required: true,
        description: "Private (pre-NAT) IP address of the subscriber",
        aliases: &[
            "src_ip", "source_ip", "private_ip", "client_ip", "user_ip", "ip_src",
            "framed_ip", "internal_ip",
        ],
    },
    SchemaField {
        name: SRC_PORT,
        label: "Source Port",
        required: false,
        description: "Source port before NAT",
        aliases: &["src_port", "source_port", "client_port", "private_port", "sport"],
    },
    SchemaField {
        name: NAT_IP,
        label: "NAT IP",
        required: false,
        description: "Public IP address after NAT translation",
        aliases: &["nat_ip", "public_ip", "translated_ip", "post_nat_ip", "xlate_ip"],
    },
    SchemaField {
        name: NAT_PORT,
        label: "NAT Port",
        required: false,
        description: "Public port after NAT translation",
        aliases: &["nat_port", "public_port", "translated_port", "post_nat_port", "xlate_port"],
    },
    SchemaField {
        name: DST_IP,
        label: "Destination IP",
        required: true,
        description: "IP address of the remote server",
        aliases: &[
            "dst_ip", "destination_ip", "dest_ip", "server_ip", "remote_ip", "ip_dst",
            "target_ip",
        ],
    },
    SchemaField {
        name: DST_PORT,
        label: "Destination Port",
        required: true,
        description: "Port of the remote server",
        aliases: &[
            "dst_port", "destination_port", "dest_port", "server_port", "remote_port",
            "dport", "target_port",
        ],
    },
    SchemaField {
        name: PROTOCOL,
        label: "Protocol",
        required: false,
        description: "Transport protocol (TCP, UDP, ...)",
        aliases: &["protocol", "proto", "ip_protocol", "transport", "l4_protocol"],
    },
    SchemaField {
        name: BYTES_UP,
        label: "Data Volume Up",
        required: false,
        description: "Bytes sent by the subscriber (uplink)",
        aliases: &[
            "bytes_up", "uplink_bytes", "upload_bytes", "bytes_sent", "tx_bytes",
            "data_volume_up", "volume_up", "bytes_out",
        ],
    },
    SchemaField {
        name: BYTES_DOWN,
        label: "Data Volume Down",
        required: false,
        description: "Bytes received by the subscriber (downlink)",
        aliases: &[
            "bytes_down", "downlink_bytes", "download_bytes", "bytes_received", "rx_bytes",
            "data_volume_down", "volume_down", "bytes_in",
        ],
    },
];

/// Optional fields whose absence is worth a warning.
const IMPORTANT_OPTIONAL: &[&str] = &[BYTES_UP, BYTES_DOWN, PROTOCOL];

/// All canonical fields, in schema order.
pub fn fields() -> &'static [SchemaField] {
    FIELDS
}

/// Fields that must be mapped before transformation.
pub fn required_fields() -> impl Iterator<Item = &'static SchemaField> {
    FIELDS.iter().filter(|f| f.required)
}

/// Optional fields that still deserve a warning when unmapped.
pub fn important_optional_fields() -> impl Iterator<Item = &'static SchemaField> {
    FIELDS.iter().filter(|f| IMPORTANT_OPTIONAL.contains(&f.name))
}

/// Look up a field by canonical name.
pub fn field(name: &str) -> Option<&'static SchemaField> {
    FIELDS.iter().find(|f| f.name == name)
}

/// True if `name` is a canonical field.
pub fn is_field(name: &str) -> bool {
    field(name).is_some()
}

/// Natural-language description of the schema for the suggestion prompt.
pub fn describe() -> String {
    FIELDS
        .iter()
        .map(|f| {
            let examples: Vec<&str> = f.aliases.iter().take(4).copied().collect();
            format!(
                "- `{}` ({}){}: {}. Example column names: {}",
                f.name,
                f.label,
                if f.required { " [REQUIRED]" } else { "" },
                f.description,
                examples.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serializable schema definition returned by the analyze boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    pub fields: Vec<SchemaField>,
    pub required_fields: Vec<&'static str>,
}

pub fn definition() -> SchemaDefinition {
    SchemaDefinition {
        fields: FIELDS.to_vec(),
        required_fields: required_fields().map(|f| f.name).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_fields() {
        let required: Vec<&str> = required_fields().map(|f| f.name).collect();
        assert_eq!(required, vec![A_PARTY_ID, START_TIME, SRC_IP, DST_IP, DST_PORT]);
    }

    #[test]
    fn test_field_names_unique() {
        let mut names: Vec<&str> = fields().iter().map(|f| f.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), fields().len());
    }

    #[test]
    fn test_every_field_has_its_own_name_as_alias() {
        for f in fields() {
            assert!(f.aliases.contains(&f.name), "{} missing self alias", f.name);
        }
    }

    #[test]
    fn test_describe_flags_required() {
        let text = describe();
        assert!(text.contains("`dst_port` (Destination Port) [REQUIRED]"));
        assert!(text.contains("`protocol` (Protocol):"));
    }

    #[test]
    fn test_lookup() {
        assert_eq!(field(NAT_IP).map(|f| f.label), Some("NAT IP"));
        assert!(!is_field("service_label"));
        assert_eq!(important_optional_fields().count(), 3);
    }
}
