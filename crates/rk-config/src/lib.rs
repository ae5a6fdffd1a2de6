//! # rk-config
//!
//! Layered settings: built-in defaults, then an optional `rankit.toml`, then
//! `RANKIT__SECTION__KEY` environment variables (a `.env` file is read first).

use std::path::PathBuf;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {0}: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub media: MediaSettings,
    #[serde(default)]
    pub cors: CorsSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Defaults to the number of physical cores when unset
    pub workers: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    pub url: SecretString,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize)]
pub struct MediaSettings {
    /// Directory uploads are written to
    pub root: PathBuf,
    /// Public path the directory is served under
    pub url_prefix: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct CorsSettings {
    /// `None` allows any origin
    pub allowed_origin: Option<String>,
}

impl Settings {
    /// Defaults only. Callers add sources or overrides before building.
    pub fn builder() -> Result<ConfigBuilder<DefaultState>, SettingsError> {
        Ok(Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "sqlite://rankit.db")?
            .set_default("database.max_connections", 5)?
            .set_default("media.root", "./data/uploads")?
            .set_default("media.url_prefix", "/static/uploads")?
            .set_default("media.max_upload_bytes", 5 * 1024 * 1024)?)
    }

    /// Loads `.env`, `rankit.toml` (if present) and the environment.
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("loaded environment from {}", path.display());
        }

        let builder = Self::builder()?
            .add_source(File::with_name("rankit").required(false))
            .add_source(
                Environment::with_prefix("RANKIT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_builder(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, SettingsError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.server.port == 0 {
            return Err(SettingsError::Invalid("server.port", "must be non-zero".into()));
        }
        if self.database.max_connections == 0 {
            return Err(SettingsError::Invalid("database.max_connections", "must be at least 1".into()));
        }
        if self.media.max_upload_bytes == 0 {
            return Err(SettingsError::Invalid("media.max_upload_bytes", "must be non-zero".into()));
        }
        if !self.media.url_prefix.starts_with('/') {
            return Err(SettingsError::Invalid(
                "media.url_prefix",
                format!("must start with '/', got {:?}", self.media.url_prefix),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}
