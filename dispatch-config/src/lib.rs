//! Configuration loading for the dispatch console.
//!
//! Settings come from a TOML or JSON file, an optional `.env` file and
//! `DISPATCH_*` environment variables, in that order of increasing
//! precedence. The result is validated before the engine sees it: hard
//! problems fail with [`ConfigLoadError`], questionable but workable values
//! are reported as [`ConfigWarnings`].
#![allow(missing_docs)]

pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoader, error::ConfigLoadError};
pub use models::sources::{EnvConfig, FileConfig};
pub use models::{ApiConfig, Config, ConfigMetadata, ConfigSource, PushConfig};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
