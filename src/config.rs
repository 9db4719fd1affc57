//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or an explicit `-f` path), then applies the `OPENAI_RESPONSE_LOG_LEVEL`
//! env override. The schema is validated at load: a missing `session_cookie`
//! or a wrong-typed field aborts startup before any entity is constructed.

use std::{env, fs, path::Path};

use serde::Deserialize;

use crate::error::AppError;

/// Platform (sensor) configuration — `[platform]` in the TOML.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Opaque session credential sent as the `session` cookie on every
    /// predict request. Required; never defaulted.
    pub session_cookie: String,
    /// Display name of the sensor entity.
    pub name: String,
    /// Default model identifier, used when a service call carries none.
    pub model: String,
}

/// Remote endpoint configuration — `[remote]` in the TOML.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the prediction host.
    pub base_url: String,
    /// Per-request HTTP timeout. `None` leaves the call unbounded.
    pub timeout_seconds: Option<u64>,
}

/// Console channel configuration — `[console]` in the TOML.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Whether the interactive stdin channel is enabled.
    pub enabled: bool,
}

/// Fully-resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub platform: PlatformConfig,
    pub remote: RemoteConfig,
    pub console: ConsoleConfig,
    pub log_level: String,
}

/// Raw TOML shape — `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    platform: RawPlatform,
    #[serde(default)]
    remote: RawRemote,
    #[serde(default)]
    console: RawConsole,
    #[serde(default)]
    daemon: RawDaemon,
}

#[derive(Deserialize)]
struct RawPlatform {
    session_cookie: String,
    #[serde(default = "default_name")]
    name: String,
    #[serde(default = "default_model")]
    model: String,
}

#[derive(Deserialize)]
struct RawRemote {
    #[serde(default = "default_base_url")]
    base_url: String,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

impl Default for RawRemote {
    fn default() -> Self {
        Self { base_url: default_base_url(), timeout_seconds: None }
    }
}

#[derive(Deserialize)]
struct RawConsole {
    /// Defaults to `true`: the console is the only built-in input channel.
    #[serde(default = "default_true")]
    enabled: bool,
}

impl Default for RawConsole {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Deserialize, Default)]
struct RawDaemon {
    #[serde(default)]
    log_level: Option<String>,
}

pub fn default_name() -> String { "hassio_openai_response".to_string() }
pub fn default_model() -> String { "gpt4hassio".to_string() }
pub fn default_base_url() -> String { "https://cloud.mindsdb.com".to_string() }

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load config from `path` (or `config/default.toml`), then apply env-var
/// overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let log_level_override = env::var("OPENAI_RESPONSE_LOG_LEVEL").ok();
    load_from(
        Path::new(path.unwrap_or("config/default.toml")),
        log_level_override.as_deref(),
    )
}

/// Internal loader — accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(path: &Path, log_level_override: Option<&str>) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let log_level = log_level_override
        .map(str::to_string)
        .or(parsed.daemon.log_level)
        .unwrap_or_else(default_log_level);

    Ok(Config {
        platform: PlatformConfig {
            session_cookie: parsed.platform.session_cookie,
            name: parsed.platform.name,
            model: parsed.platform.model,
        },
        remote: RemoteConfig {
            base_url: parsed.remote.base_url,
            timeout_seconds: parsed.remote.timeout_seconds,
        },
        console: ConsoleConfig {
            enabled: parsed.console.enabled,
        },
        log_level,
    })
}
