// Application options: defaults, config files and KEYSTONE_* environment variables

use crate::logging::{debug, LogConfig, LogFormat, LogLevel};
use crate::{body_parser::DEFAULT_BODY_LIMIT, Error};
use serde::Deserialize;
use std::path::Path;

/// Prefix of the environment variables read by [`ApplicationOptions::from_env`]
pub const ENV_PREFIX: &str = "KEYSTONE_";

/// Options applied when an application is built
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApplicationOptions {
    pub host: String,
    pub port: u16,
    pub global_prefix: String,
    /// Maximum request body size accepted by the body parsers, in bytes
    pub body_limit: usize,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
}

impl Default for ApplicationOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            global_prefix: String::new(),
            body_limit: DEFAULT_BODY_LIMIT,
            log_level: LogLevel::Info,
            log_format: LogFormat::Json,
        }
    }
}

impl ApplicationOptions {
    /// Parse options from TOML
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        toml::from_str(content).map_err(|e| Error::Config(format!("TOML parse error: {}", e)))
    }

    /// Parse options from JSON
    pub fn from_json_str(content: &str) -> Result<Self, Error> {
        serde_json::from_str(content).map_err(|e| Error::Config(format!("JSON parse error: {}", e)))
    }

    /// Load a `.toml` or `.json` file, chosen by extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            Some(other) => Err(Error::Config(format!("Unsupported config format: {}", other))),
            None => Err(Error::Config(format!(
                "No file extension found: {}",
                path.display()
            ))),
        }
    }

    /// Defaults overridden by `.env` and the process environment
    pub fn from_env() -> Result<Self, Error> {
        Self::default().with_env()
    }

    /// Load `path` (when given), then apply the environment on top
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let options = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        options.with_env()
    }

    /// Apply `KEYSTONE_*` variables, after loading a `.env` file if present
    pub fn with_env(mut self) -> Result<Self, Error> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }
        self.merge_env_vars(std::env::vars())?;
        Ok(self)
    }

    /// Apply `KEYSTONE_*` pairs; unrelated keys are ignored
    pub fn merge_env_vars<I>(&mut self, vars: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "HOST" => self.host = value,
                "PORT" => self.port = parse_number(&key, &value)?,
                "GLOBAL_PREFIX" => self.global_prefix = value,
                "BODY_LIMIT" => self.body_limit = parse_number(&key, &value)?,
                "LOG_LEVEL" => {
                    self.log_level = LogLevel::parse(&value).ok_or_else(|| invalid(&key, &value))?
                }
                "LOG_FORMAT" => {
                    self.log_format =
                        LogFormat::parse(&value).ok_or_else(|| invalid(&key, &value))?
                }
                _ => continue,
            }
        }
        Ok(())
    }

    /// Logging configuration matching these options
    pub fn log_config(&self) -> LogConfig {
        LogConfig::new()
            .level(self.log_level)
            .format(self.log_format)
            .with_colors(self.log_format != LogFormat::Json)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, Error> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> Error {
    Error::Config(format!("Invalid value for {}: {:?}", key, value))
}
