//! Configuration management for keepsake.
//!
//! Configuration is read from `~/.config/keepsake/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.
//! A few `KEEPSAKE_*` environment variables override the file.

use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

pub const ENV_SUPABASE_URL: &str = "KEEPSAKE_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "KEEPSAKE_SUPABASE_ANON_KEY";
pub const ENV_ACCESS_TOKEN: &str = "KEEPSAKE_ACCESS_TOKEN";
pub const ENV_USER: &str = "KEEPSAKE_USER";

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub sqlite: SqliteConfig,
    pub rest: RestConfig,
    pub requests: RequestConfig,
    pub retry: RetryPolicy,
    pub realtime: RealtimeConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Rest,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file; defaults to `<data_dir>/keepsake/keepsake.db`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub timeout_secs: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub poll_interval_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub user_id: Option<String>,
}

impl Config {
    /// Load configuration from `path`, or the default path when `None`.
    ///
    /// If the default config file doesn't exist, creates one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path()?,
        };

        let mut config = if !config_path.exists() {
            if path.is_none() {
                Self::create_default_config(&config_path)?;
                Self::default()
            } else {
                return Err(ConfigError::Missing(config_path));
            }
        } else {
            Self::from_file(&config_path)?
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Overlay environment values on top of the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_SUPABASE_URL) {
            self.rest.url = Some(url);
        }
        if let Some(key) = non_empty(ENV_SUPABASE_ANON_KEY) {
            self.rest.anon_key = Some(key);
        }
        if let Some(token) = non_empty(ENV_ACCESS_TOKEN) {
            self.rest.access_token = Some(token);
        }
        if let Some(user) = non_empty(ENV_USER) {
            self.session.user_id = Some(user);
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.requests.timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.realtime.poll_interval_secs.max(1))
    }

    /// Get the default config file path: `~/.config/keepsake/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("keepsake").join("config.toml"))
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# keepsake configuration

[backend]
# "sqlite" keeps favorites in a local database with in-process change events.
# "rest" talks to a Supabase project over PostgREST and polls for changes.
kind = "sqlite"

[sqlite]
# Defaults to <data dir>/keepsake/keepsake.db
# path = "/path/to/keepsake.db"

[rest]
# Overridden by KEEPSAKE_SUPABASE_URL / KEEPSAKE_SUPABASE_ANON_KEY /
# KEEPSAKE_ACCESS_TOKEN.
# url = "https://your-project.supabase.co"
# anon_key = ""
# access_token = ""

[requests]
# Per-request timeout in seconds
timeout_secs = 10

[retry]
# Exponential backoff for transient failures on reads
max_retries = 3
initial_delay_ms = 1000
max_delay_ms = 10000
backoff_multiplier = 2.0

[realtime]
# How often the rest backend checks for changes
poll_interval_secs = 5

[session]
# Signed-in user; overridden by --user or KEEPSAKE_USER
# user_id = ""
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Config file not found: {0}")]
    Missing(PathBuf),

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_deserializes() {
        let content = Config::default_config_content();
        let config: Config = toml::from_str(&content).expect("Default config should be valid TOML");

        assert_eq!(config.backend.kind, BackendKind::Sqlite);
        assert_eq!(config.requests.timeout_secs, 10);
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.rest.url.is_none());
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
[backend]
kind = "rest"

[rest]
url = "https://demo.supabase.co"

[retry]
max_retries = 5
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        assert_eq!(config.backend.kind, BackendKind::Rest);
        assert_eq!(config.rest.url.as_deref(), Some("https://demo.supabase.co"));
        assert_eq!(config.retry.max_retries, 5);
        // Default value
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").expect("Empty config should work");
        assert_eq!(config.backend.kind, BackendKind::Sqlite);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::default();
        config.rest.url = Some("https://file.supabase.co".into());

        config.apply_env(|key| match key {
            ENV_SUPABASE_URL => Some("https://env.supabase.co".into()),
            ENV_USER => Some("alice".into()),
            ENV_ACCESS_TOKEN => Some("  ".into()),
            _ => None,
        });

        assert_eq!(config.rest.url.as_deref(), Some("https://env.supabase.co"));
        assert_eq!(config.session.user_id.as_deref(), Some("alice"));
        assert!(config.rest.access_token.is_none());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[requests]\ntimeout_secs = 3\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(3));

        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[backend]\nkind = \"carrier-pigeon\"\n").unwrap();

        match Config::from_file(&path) {
            Err(ConfigError::Parse { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected {:?}", other),
        }
    }
}
