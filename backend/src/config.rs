//! Runtime configuration from the environment.
//!
//! `.env` is loaded by the binary before [`Config::from_env`] runs. CLI flags
//! override individual values afterwards.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::ai::{AiClient, DEFAULT_MAX_RETRIES, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
use crate::cache::DEFAULT_REGISTRY_DIR;
use crate::error::ConfigError;
use crate::mapping::MappingSuggester;
use crate::transform::stats::DEFAULT_MAX_DIAGNOSTICS;
use crate::transform::{PipelineOptions, DEFAULT_CHANNEL_CAPACITY};

pub const DEFAULT_OUTPUT: &str = "ipdr_records.csv";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_UPLOAD_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Anthropic key; without it suggestions are fuzzy-only
    pub api_key: Option<String>,
    pub ai_model: String,
    /// Alternative Messages endpoint, e.g. a gateway
    pub ai_api_url: Option<String>,
    /// Per-request timeout; a hung collaborator falls back to fuzzy matching
    pub ai_timeout_secs: u64,
    pub ai_max_retries: u32,
    pub upload_dir: PathBuf,
    /// Analyzed uploads older than this are swept at startup
    pub upload_ttl_secs: u64,
    /// Append target for the file sink
    pub output: PathBuf,
    /// Shell command for the command sink; wins over `output` when set
    pub load_command: Option<String>,
    pub channel_capacity: usize,
    pub max_diagnostics: usize,
    pub template_dir: PathBuf,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            ai_model: DEFAULT_MODEL.to_string(),
            ai_api_url: None,
            ai_timeout_secs: DEFAULT_TIMEOUT_SECS,
            ai_max_retries: DEFAULT_MAX_RETRIES,
            upload_dir: env::temp_dir().join("ipdrload-uploads"),
            upload_ttl_secs: DEFAULT_UPLOAD_TTL_SECS,
            output: PathBuf::from(DEFAULT_OUTPUT),
            load_command: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_diagnostics: DEFAULT_MAX_DIAGNOSTICS,
            template_dir: PathBuf::from(DEFAULT_REGISTRY_DIR),
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Ok(Self {
            api_key: get("ANTHROPIC_API_KEY"),
            ai_model: get("IPDR_AI_MODEL").unwrap_or(defaults.ai_model),
            ai_api_url: get("IPDR_AI_API_URL"),
            ai_timeout_secs: parse(&get, "IPDR_AI_TIMEOUT_SECS", defaults.ai_timeout_secs)?,
            ai_max_retries: parse(&get, "IPDR_AI_RETRIES", defaults.ai_max_retries)?,
            upload_dir: get("IPDR_UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            upload_ttl_secs: parse(&get, "IPDR_UPLOAD_TTL_SECS", defaults.upload_ttl_secs)?,
            output: get("IPDR_OUTPUT").map(PathBuf::from).unwrap_or(defaults.output),
            load_command: get("IPDR_LOAD_COMMAND"),
            channel_capacity: parse(&get, "IPDR_CHANNEL_CAPACITY", defaults.channel_capacity)?,
            max_diagnostics: parse(&get, "IPDR_MAX_DIAGNOSTICS", defaults.max_diagnostics)?,
            template_dir: get("IPDR_TEMPLATE_DIR").map(PathBuf::from).unwrap_or(defaults.template_dir),
            port: parse(&get, "PORT", defaults.port)?,
        })
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            channel_capacity: self.channel_capacity,
            max_diagnostics: self.max_diagnostics,
        }
    }

    /// Suggester backed by the Anthropic client when a key is configured.
    pub fn suggester(&self) -> MappingSuggester {
        let Some(key) = &self.api_key else {
            return MappingSuggester::fuzzy_only();
        };

        match AiClient::new(key.clone(), Duration::from_secs(self.ai_timeout_secs)) {
            Ok(client) => {
                let mut client = client
                    .with_model(&self.ai_model)
                    .with_max_retries(self.ai_max_retries);
                if let Some(url) = &self.ai_api_url {
                    client = client.with_api_url(url);
                }
                MappingSuggester::new(Arc::new(client))
            }
            Err(e) => {
                warn!(error = %e, "suggestion client unavailable, using fuzzy matching");
                MappingSuggester::fuzzy_only()
            }
        }
    }
}

fn parse<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.channel_capacity, 1024);
        assert_eq!(config.max_diagnostics, 100);
        assert_eq!(config.port, 3000);
        assert_eq!(config.ai_timeout_secs, 30);
        assert_eq!(config.ai_max_retries, 3);
        assert!(!config.suggester().has_collaborator());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("IPDR_CHANNEL_CAPACITY", "16"),
            ("IPDR_AI_TIMEOUT_SECS", "5"),
            ("IPDR_UPLOAD_TTL_SECS", "60"),
            ("IPDR_LOAD_COMMAND", "psql -c '\\copy sessions FROM STDIN WITH (FORMAT csv)'"),
            ("IPDR_OUTPUT", "  "),
            ("PORT", "8080"),
        ]))
        .unwrap();

        assert_eq!(config.channel_capacity, 16);
        assert_eq!(config.port, 8080);
        assert_eq!(config.ai_timeout_secs, 5);
        assert_eq!(config.upload_ttl_secs, 60);
        assert_eq!(config.output, PathBuf::from(DEFAULT_OUTPUT));
        assert!(config.load_command.is_some());
        assert!(config.suggester().has_collaborator());
        assert_eq!(config.pipeline_options().channel_capacity, 16);
    }

    #[test]
    fn test_invalid_number() {
        let err = Config::from_lookup(lookup(&[("IPDR_MAX_DIAGNOSTICS", "lots")])).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for IPDR_MAX_DIAGNOSTICS: 'lots'");
    }
}
