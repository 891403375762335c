//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for arplexity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the chat server
    pub server_url: Option<String>,
    /// Connect timeout in seconds
    pub connect_timeout_secs: Option<u64>,
    /// Assistant message shown before the first turn
    pub greeting: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("arplexity")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("ARPLEXITY_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Self::default()
            }),
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Parse config from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            server_url: Some(arplexity_wire::client::DEFAULT_SERVER_URL.to_string()),
            connect_timeout_secs: Some(10),
            greeting: Some("Hi there, how can I help you?".to_string()),
        };

        default_config.save()?;
        Ok(path)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# arplexity configuration file
# Place at ~/.config/arplexity/config.toml (Linux/Mac) or %APPDATA%\arplexity\config.toml (Windows)

# Chat server base URL
server_url = "http://127.0.0.1:8000"

# Seconds to wait for the connection to open
connect_timeout_secs = 10

# Assistant message shown before the first turn (optional)
greeting = "Hi there, how can I help you?"
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses() {
        let cfg = Config::parse(example_config()).unwrap();
        assert_eq!(cfg.server_url.as_deref(), Some("http://127.0.0.1:8000"));
        assert_eq!(cfg.connect_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(
            cfg.greeting.as_deref(),
            Some("Hi there, how can I help you?")
        );
    }

    #[test]
    fn test_missing_fields_default() {
        let cfg = Config::parse("").unwrap();
        assert!(cfg.server_url.is_none());
        assert!(cfg.connect_timeout().is_none());
        assert!(cfg.greeting.is_none());
    }

    #[test]
    fn test_bad_type_is_an_error() {
        assert!(Config::parse("connect_timeout_secs = \"soon\"").is_err());
    }
}
