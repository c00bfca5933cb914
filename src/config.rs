use std::{
  fs,
  net::SocketAddr,
  path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{CyberpilotError, Result};

const CONFIG_DIR: &str = "cyberpilot";
const CONFIG_FILE: &str = "settings.json";
const CONFIG_DIR_ENV: &str = "CYBERPILOT_CONFIG_DIR";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MODEL: &str = "gemini-2.5-computer-use-preview-10-2025";
/// The computer-use tool only accepts the browser environment today; desktop
/// tasks still run under it with the desktop screenshot.
pub const DEFAULT_ORACLE_ENVIRONMENT: &str = "ENVIRONMENT_BROWSER";
pub const DEFAULT_ORACLE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_SEARCH_URL: &str = "https://www.google.com/search";
/// Full-resolution PNG screenshots travel base64-encoded in request bodies.
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub relay: RelaySettings,
  pub executor: ExecutorSettings,
  pub debug: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
  pub host: String,
  pub port: u16,
  pub model: String,
  pub oracle_url: String,
  pub oracle_environment: String,
  pub api_key: Option<String>,
  pub api_key_file: Option<PathBuf>,
  pub temperature: f32,
  pub max_round_trips: u32,
  pub max_oracle_failures: u32,
  pub oracle_timeout_secs: u64,
  pub max_body_bytes: usize,
}

impl Default for RelaySettings {
  fn default() -> Self {
    Self {
      host: DEFAULT_HOST.to_string(),
      port: DEFAULT_PORT,
      model: DEFAULT_MODEL.to_string(),
      oracle_url: DEFAULT_ORACLE_URL.to_string(),
      oracle_environment: DEFAULT_ORACLE_ENVIRONMENT.to_string(),
      api_key: None,
      api_key_file: None,
      temperature: 1.0,
      max_round_trips: 30,
      max_oracle_failures: 3,
      oracle_timeout_secs: 120,
      max_body_bytes: DEFAULT_MAX_BODY_BYTES,
    }
  }
}

impl RelaySettings {
  pub fn socket_addr(&self) -> Result<SocketAddr> {
    format!("{}:{}", self.host, self.port)
      .parse()
      .map_err(|_| CyberpilotError::invalid_settings("relay.host", "an IP address", &self.host))
  }

  /// The inline key wins over `api_key_file`.
  pub fn resolve_api_key(&self) -> Result<String> {
    if let Some(key) = self.api_key.as_deref().map(str::trim).filter(|key| !key.is_empty()) {
      return Ok(key.to_string());
    }
    let path = self
      .api_key_file
      .as_ref()
      .ok_or_else(|| CyberpilotError::missing_settings("relay.api_key"))?;
    let content = fs::read_to_string(path)?;
    parse_key_file(&content).ok_or_else(|| CyberpilotError::missing_settings("relay.api_key"))
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
  pub relay_url: String,
  /// Multiplies every input delay; 0 disables sleeping.
  pub delay_scale: f64,
  /// Wheel units per scroll step.
  pub scroll_multiplier: i32,
  pub search_url: String,
  pub request_timeout_secs: u64,
  /// Pause before each follow-up screenshot.
  pub turn_pause_ms: u64,
}

impl Default for ExecutorSettings {
  fn default() -> Self {
    Self {
      relay_url: DEFAULT_RELAY_URL.to_string(),
      delay_scale: 1.0,
      scroll_multiplier: 100,
      search_url: DEFAULT_SEARCH_URL.to_string(),
      request_timeout_secs: 60,
      turn_pause_ms: 1000,
    }
  }
}

/// Accepts either a bare key or a `NAME="value"` line, ignoring comments.
fn parse_key_file(content: &str) -> Option<String> {
  content
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty() && !line.starts_with('#'))
    .map(|line| match line.split_once('=') {
      Some((_, value)) => value.trim().trim_matches('"').trim_matches('\'').to_string(),
      None => line.to_string(),
    })
    .find(|key| !key.is_empty())
}

fn parse_flag(value: &str) -> Option<bool> {
  match value.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Some(true),
    "0" | "false" | "no" | "off" => Some(false),
    _ => None,
  }
}

pub fn get_config_dir() -> PathBuf {
  if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
    if !dir.trim().is_empty() {
      return PathBuf::from(dir);
    }
  }
  dirs::config_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join(CONFIG_DIR)
}

pub fn log_dir_path() -> PathBuf {
  get_config_dir().join("logs")
}

impl Settings {
  /// Loads `settings.json` from the config directory and applies env overrides.
  pub fn load() -> Result<Self> {
    let mut settings = Self::load_from(&get_config_dir())?;
    settings.apply_overrides(|name| std::env::var(name).ok());
    Ok(settings)
  }

  /// A missing file yields defaults; a malformed one is an error.
  pub fn load_from(dir: &Path) -> Result<Self> {
    let path = dir.join(CONFIG_FILE);
    if !path.exists() {
      tracing::debug!(target: "config", path = %path.display(), "no settings file, using defaults");
      return Ok(Self::default());
    }
    let content = fs::read_to_string(&path)?;
    let settings = serde_json::from_str(&content)?;
    tracing::debug!(target: "config", path = %path.display(), "settings loaded");
    Ok(settings)
  }

  pub fn apply_overrides<F>(&mut self, lookup: F)
  where
    F: Fn(&str) -> Option<String>,
  {
    if let Some(key) = lookup("CYBERPILOT_API_KEY").or_else(|| lookup("GEMINI_API_KEY")) {
      self.relay.api_key = Some(key);
    }
    if let Some(url) = lookup("CYBERPILOT_RELAY_URL") {
      self.executor.relay_url = url;
    }
    if let Some(host) = lookup("CYBERPILOT_HOST") {
      self.relay.host = host;
    }
    if let Some(port) = lookup("CYBERPILOT_PORT") {
      match port.trim().parse() {
        Ok(port) => self.relay.port = port,
        Err(_) => tracing::warn!(target: "config", value = %port, "ignoring invalid CYBERPILOT_PORT"),
      }
    }
    if let Some(raw) = lookup("CYBERPILOT_DEBUG") {
      match parse_flag(&raw) {
        Some(debug) => self.debug = debug,
        None => tracing::warn!(target: "config", value = %raw, "ignoring invalid CYBERPILOT_DEBUG"),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;

  #[test]
  fn missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::load_from(dir.path()).unwrap();
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.relay.max_round_trips, 30);
    assert_eq!(settings.relay.max_body_bytes, 32 * 1024 * 1024);
    assert_eq!(settings.relay.oracle_environment, "ENVIRONMENT_BROWSER");
    assert_eq!(settings.executor.scroll_multiplier, 100);
    assert!(!settings.debug);
  }

  #[test]
  fn partial_file_keeps_other_defaults() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
      dir.path().join(CONFIG_FILE),
      r#"{ "relay": { "port": 9000 }, "executor": { "delay_scale": 0.0 } }"#,
    )
    .unwrap();
    let settings = Settings::load_from(dir.path()).unwrap();
    assert_eq!(settings.relay.port, 9000);
    assert_eq!(settings.relay.host, DEFAULT_HOST);
    assert_eq!(settings.executor.delay_scale, 0.0);
    assert_eq!(settings.executor.search_url, DEFAULT_SEARCH_URL);
  }

  #[test]
  fn full_settings_file_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.relay.model = "custom-model".into();
    fs::write(
      dir.path().join(CONFIG_FILE),
      serde_json::to_vec_pretty(&settings).unwrap(),
    )
    .unwrap();
    assert_eq!(Settings::load_from(dir.path()).unwrap(), settings);
  }

  #[test]
  fn malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();
    assert!(Settings::load_from(dir.path()).is_err());
  }

  #[test]
  fn env_overrides_apply() {
    let env = HashMap::from([
      ("GEMINI_API_KEY", "from-gemini"),
      ("CYBERPILOT_PORT", "9100"),
      ("CYBERPILOT_DEBUG", "true"),
      ("CYBERPILOT_RELAY_URL", "http://relay:9100"),
    ]);
    let mut settings = Settings::default();
    settings.apply_overrides(|name| env.get(name).map(|value| value.to_string()));
    assert_eq!(settings.relay.api_key.as_deref(), Some("from-gemini"));
    assert_eq!(settings.relay.port, 9100);
    assert!(settings.debug);
    assert_eq!(settings.executor.relay_url, "http://relay:9100");
  }

  #[test]
  fn invalid_port_override_is_ignored() {
    let mut settings = Settings::default();
    settings.apply_overrides(|name| (name == "CYBERPILOT_PORT").then(|| "lots".to_string()));
    assert_eq!(settings.relay.port, DEFAULT_PORT);
  }

  #[test]
  fn api_key_file_accepts_env_style_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("key.env");
    fs::write(&path, "# gemini\nGOOGLE_API_KEY=\"abc123\"\n").unwrap();
    let settings = RelaySettings {
      api_key_file: Some(path),
      ..Default::default()
    };
    assert_eq!(settings.resolve_api_key().unwrap(), "abc123");

    let bare = dir.path().join("key.txt");
    fs::write(&bare, "  xyz789 \n").unwrap();
    let settings = RelaySettings {
      api_key: Some("  ".into()),
      api_key_file: Some(bare),
      ..Default::default()
    };
    assert_eq!(settings.resolve_api_key().unwrap(), "xyz789");
  }

  #[test]
  fn missing_api_key_is_reported() {
    let err = RelaySettings::default().resolve_api_key().unwrap_err();
    assert!(err.to_string().contains("relay.api_key"));
  }
}
