//! Application settings.
//!
//! Loaded from TOML, every field optional, then overridden by the
//! environment:
//!
//! | Variable | Field |
//! |---|---|
//! | `MESH_ADDR` | `server.addr` |
//! | `MESH_LOG_LEVEL` | `logger.level` |
//! | `MESH_LOG_FORMAT` | `logger.format` |
//!
//! ```toml
//! [server]
//! addr = "0.0.0.0:8080"
//! name = "users-api"
//!
//! [logger]
//! level = "debug"
//! format = "json"
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub logger: LogSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub addr: String,
    /// Reported by the `logger` service on every event.
    pub name: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { addr: "0.0.0.0:3000".to_owned(), name: "mesh".to_owned() }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, Error> {
        self.addr
            .parse()
            .map_err(|source| Error::InvalidAddr { addr: self.addr.clone(), source })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// An `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { level: "info".to_owned(), format: LogFormat::Pretty }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty"  => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json"    => Ok(Self::Json),
            other     => Err(Error::Config(format!("unknown log format `{other}`"))),
        }
    }
}

impl Settings {
    pub fn from_toml_str(source: &str) -> Result<Self, Error> {
        toml::from_str(source).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `MESH_*` overrides read through `lookup`.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, Error> {
        if let Some(addr) = lookup("MESH_ADDR") {
            self.server.addr = addr;
        }
        if let Some(level) = lookup("MESH_LOG_LEVEL") {
            self.logger.level = level;
        }
        if let Some(format) = lookup("MESH_LOG_FORMAT") {
            self.logger.format = format.parse()?;
        }
        Ok(self)
    }
}
