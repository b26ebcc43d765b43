pub mod error;

use anyhow::anyhow;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};
use url::Url;

use crate::{
    models::{
        ApiConfig, Config, ConfigMetadata, ConfigSource, PushConfig,
        sources::{EnvConfig, FileConfig},
    },
    util::non_blank,
    validation::{self, ConfigWarnings},
};
use error::ConfigLoadError;

const DEFAULT_CANDIDATES: &[&str] = &[
    "dispatch.toml",
    "dispatch.json",
    "config/dispatch.toml",
    "config/dispatch.json",
];

/// Validated configuration plus the non-fatal findings.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

/// Resolves [`Config`] from files and the environment.
///
/// File evaluation order:
/// 1) `$DISPATCH_CONFIG_PATH` (TOML or JSON file),
/// 2) `$DISPATCH_CONFIG_JSON` (inline JSON),
/// 3) `dispatch.toml` / `config/dispatch.toml` under the search directory,
/// 4) defaults.
///
/// `DISPATCH_API_URL`, `DISPATCH_PUSH_URL`, `DISPATCH_API_TOKEN` and
/// `DISPATCH_PRUNE_MISSING` override whatever the file says.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    env_file: Option<PathBuf>,
    search_dir: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load this `.env` file instead of looking for one in the working
    /// directory. A missing explicit file is an error.
    pub fn with_env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    /// Directory the default file candidates are resolved against.
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = Some(dir.into());
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        self.load_with_overrides(|_| {})
    }

    /// Like [`ConfigLoader::load`], letting the caller adjust the gathered
    /// environment (command-line flags, for instance) before resolution.
    pub fn load_with_overrides(
        &self,
        apply: impl FnOnce(&mut EnvConfig),
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file = self.load_env_file()?;
        let mut env = EnvConfig::gather();
        apply(&mut env);
        let mut load = self.load_with_env(env)?;
        load.config.metadata.env_file = env_file;
        Ok(load)
    }

    /// Resolve against an already gathered environment.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file, source) = self.read_file_config(&env)?;
        let config = resolve(file, env, source)?;
        let warnings = validation::check(&config)?;
        debug!(
            source = %config.metadata.source,
            api = %config.api.base_url,
            push = %config.push.url,
            "configuration loaded"
        );
        Ok(ConfigLoad { config, warnings })
    }

    fn load_env_file(&self) -> Result<Option<PathBuf>, ConfigLoadError> {
        if let Some(path) = &self.env_file {
            dotenvy::from_path(path).map_err(|source| {
                ConfigLoadError::EnvFile {
                    path: path.clone(),
                    source,
                }
            })?;
            return Ok(Some(path.clone()));
        }
        match dotenvy::dotenv() {
            Ok(path) => {
                debug!(path = %path.display(), "loaded .env");
                Ok(Some(path))
            }
            Err(err) if err.not_found() => Ok(None),
            Err(err) => {
                warn!(error = %err, "ignoring unreadable .env");
                Ok(None)
            }
        }
    }

    fn read_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(FileConfig, ConfigSource), ConfigLoadError> {
        if let Some(path) = &env.config_path {
            let config = load_from_file(path)?;
            return Ok((config, ConfigSource::EnvPath(path.clone())));
        }

        if let Some(raw) = &env.config_json {
            let config = parse_json(raw).map_err(|source| {
                ConfigLoadError::Parse {
                    origin: "DISPATCH_CONFIG_JSON".to_string(),
                    source,
                }
            })?;
            return Ok((config, ConfigSource::EnvInline));
        }

        if let Some(path) = self.find_default_file() {
            let config = load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((FileConfig::default(), ConfigSource::Default))
    }

    fn find_default_file(&self) -> Option<PathBuf> {
        let base = self.search_dir.as_deref().unwrap_or(Path::new("."));
        DEFAULT_CANDIDATES
            .iter()
            .map(|candidate| base.join(candidate))
            .find(|path| path.exists())
    }
}

pub fn load_from_file(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let origin = path.display().to_string();

    let parsed = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_json(&contents),
        Some("toml") | Some("tml") => toml::from_str(&contents)
            .map_err(|err| anyhow!("invalid toml: {err}")),
        _ => parse_from_str(&contents),
    };
    parsed.map_err(|source| ConfigLoadError::Parse { origin, source })
}

/// Try TOML first, then JSON.
pub fn parse_from_str(contents: &str) -> anyhow::Result<FileConfig> {
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| {
            anyhow!("toml error: {toml_err}; json error: {json_err}")
        })
    })
}

pub fn parse_json(raw: &str) -> anyhow::Result<FileConfig> {
    serde_json::from_str(raw).map_err(|err| anyhow!("invalid json: {err}"))
}

fn resolve(
    file: FileConfig,
    env: EnvConfig,
    source: ConfigSource,
) -> Result<Config, ConfigLoadError> {
    let FileConfig {
        api,
        push,
        mut engine,
    } = file;

    let raw_api = env
        .api_url
        .or_else(|| api.url.and_then(non_blank))
        .ok_or(ConfigLoadError::Missing("api.url / DISPATCH_API_URL"))?;
    let base_url = api_base_url(&raw_api)?;

    let push_url = match env.push_url.or_else(|| push.url.and_then(non_blank)) {
        Some(raw) => push_url(&raw)?,
        None => derive_push_url(&base_url)?,
    };

    if let Some(prune) = env.prune_missing {
        engine.poll.prune_missing = prune;
    }

    Ok(Config {
        api: ApiConfig {
            base_url,
            token: env.api_token.or_else(|| api.token.and_then(non_blank)),
        },
        push: PushConfig { url: push_url },
        engine,
        metadata: ConfigMetadata {
            source,
            env_file: None,
        },
    })
}

fn api_base_url(raw: &str) -> Result<Url, ConfigLoadError> {
    let mut url = Url::parse(raw.trim()).map_err(|source| {
        ConfigLoadError::InvalidUrl {
            field: "api.url",
            source,
        }
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigLoadError::UnsupportedScheme {
            field: "api.url",
            scheme: url.scheme().to_string(),
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn push_url(raw: &str) -> Result<Url, ConfigLoadError> {
    let url = Url::parse(raw.trim()).map_err(|source| {
        ConfigLoadError::InvalidUrl {
            field: "push.url",
            source,
        }
    })?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ConfigLoadError::UnsupportedScheme {
            field: "push.url",
            scheme: url.scheme().to_string(),
        });
    }
    Ok(url)
}

/// `https://host/api/` becomes `wss://host/api/ws`.
fn derive_push_url(base: &Url) -> Result<Url, ConfigLoadError> {
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    let mut url = base.join("ws").map_err(|source| {
        ConfigLoadError::InvalidUrl {
            field: "push.url",
            source,
        }
    })?;
    url.set_scheme(scheme).map_err(|()| {
        ConfigLoadError::UnsupportedScheme {
            field: "push.url",
            scheme: base.scheme().to_string(),
        }
    })?;
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_gains_trailing_slash() {
        let url = api_base_url("https://dispatch.example.org/api").unwrap();
        assert_eq!(url.as_str(), "https://dispatch.example.org/api/");
        assert_eq!(url.join("incidents").unwrap().path(), "/api/incidents");
    }

    #[test]
    fn push_url_is_derived_from_api_scheme() {
        let secure = api_base_url("https://dispatch.example.org/").unwrap();
        assert_eq!(
            derive_push_url(&secure).unwrap().as_str(),
            "wss://dispatch.example.org/ws"
        );
        let plain = api_base_url("http://localhost:8080").unwrap();
        assert_eq!(
            derive_push_url(&plain).unwrap().as_str(),
            "ws://localhost:8080/ws"
        );
    }

    #[test]
    fn non_websocket_push_url_is_rejected() {
        let err = push_url("https://dispatch.example.org/ws").unwrap_err();
        assert!(matches!(
            err,
            ConfigLoadError::UnsupportedScheme { field: "push.url", .. }
        ));
    }

    #[test]
    fn unparseable_text_reports_both_formats() {
        let err = parse_from_str("not = [valid").unwrap_err().to_string();
        assert!(err.contains("toml error"));
        assert!(err.contains("json error"));
    }
}
