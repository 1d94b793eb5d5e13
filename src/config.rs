//! Server configuration
//!
//! Layered with the `config` crate; later sources override earlier ones:
//! 1. Defaults in the structs
//! 2. `config/default.*` (optional)
//! 3. `config/local.*` (optional, development overrides)
//! 4. Environment variables prefixed with `PAIRCHAT__`,
//!    e.g. `PAIRCHAT__SERVER__ADDR` -> `server.addr`

use std::path::Path;
use std::time::Duration;

use ::config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub profiles: ProfileSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Bind address
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Command channel capacity of the MatchServer actor
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
    /// Outbound queue capacity per connection
    #[serde(default = "default_client_buffer")]
    pub client_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            channel_buffer: default_channel_buffer(),
            client_buffer: default_client_buffer(),
        }
    }
}

fn default_addr() -> String { "127.0.0.1:8080".to_string() }
fn default_channel_buffer() -> usize { 256 }
fn default_client_buffer() -> usize { 32 }

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    /// Seconds between match retries for a waiting user
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            retry_interval_secs: default_retry_interval_secs(),
        }
    }
}

impl MatchingSettings {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs.max(1))
    }
}

fn default_retry_interval_secs() -> u64 { 5 }

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileSettings {
    /// JSON-lines profile file
    #[serde(default = "default_profiles_path")]
    pub path: String,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            path: default_profiles_path(),
        }
    }
}

fn default_profiles_path() -> String { "users.jsonl".to_string() }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Filter used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String { "pairchat=info".to_string() }

impl Settings {
    /// Load configuration from the optional config files and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(env_source())
            .build()?
            .try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(env_source())
            .build()?
            .try_deserialize()
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("PAIRCHAT")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.addr, "127.0.0.1:8080");
        assert_eq!(settings.server.channel_buffer, 256);
        assert_eq!(settings.matching.retry_interval(), Duration::from_secs(5));
        assert_eq!(settings.profiles.path, "users.jsonl");
        assert_eq!(settings.logging.level, "pairchat=info");
    }

    #[test]
    fn test_load_from_file_keeps_missing_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\naddr = \"0.0.0.0:9000\"\n\n[matching]\nretry_interval_secs = 2").unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.server.addr, "0.0.0.0:9000");
        assert_eq!(settings.server.client_buffer, 32);
        assert_eq!(settings.matching.retry_interval(), Duration::from_secs(2));
        assert_eq!(settings.profiles.path, "users.jsonl");
    }

    #[test]
    fn test_zero_retry_interval_is_clamped() {
        let matching = MatchingSettings {
            retry_interval_secs: 0,
        };
        assert_eq!(matching.retry_interval(), Duration::from_secs(1));
    }
}
