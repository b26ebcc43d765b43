pub mod sources;

use dispatch_core::EngineConfig;
use std::{fmt, path::PathBuf};
use url::Url;

/// Where the file-level settings came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Default => f.write_str("defaults"),
            ConfigSource::EnvPath(path) => {
                write!(f, "DISPATCH_CONFIG_PATH ({})", path.display())
            }
            ConfigSource::EnvInline => f.write_str("DISPATCH_CONFIG_JSON"),
            ConfigSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// REST endpoints the poller and asset fetcher talk to.
#[derive(Clone)]
pub struct ApiConfig {
    /// Always ends with `/` so relative endpoint paths join beneath it.
    pub base_url: Url,
    pub token: Option<String>,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub url: Url,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub source: ConfigSource,
    pub env_file: Option<PathBuf>,
}

/// Fully resolved console configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub push: PushConfig,
    pub engine: EngineConfig,
    pub metadata: ConfigMetadata,
}
