use dispatch_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::util::{non_blank_var, parse_bool_var};

/// Raw configuration as defined in a TOML or JSON file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub api: FileApiConfig,
    #[serde(default)]
    pub push: FilePushConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileApiConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FilePushConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub config_json: Option<String>,
    pub api_url: Option<String>,
    pub push_url: Option<String>,
    pub api_token: Option<String>,
    pub prune_missing: Option<bool>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: non_blank_var("DISPATCH_CONFIG_PATH").map(PathBuf::from),
            config_json: non_blank_var("DISPATCH_CONFIG_JSON"),
            api_url: non_blank_var("DISPATCH_API_URL"),
            push_url: non_blank_var("DISPATCH_PUSH_URL"),
            api_token: non_blank_var("DISPATCH_API_TOKEN"),
            prune_missing: parse_bool_var("DISPATCH_PRUNE_MISSING"),
        }
    }
}
