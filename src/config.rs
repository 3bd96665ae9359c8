//! Configuration management for http2socks.
//!
//! Handles loading configuration from `<config dir>/http2socks/config.toml`
//! or an explicit path. Every field has a default, so a partial file (or
//! none at all) is valid.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::ClientOptions;
use crate::mux::MuxConfig;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub mux: MuxSection,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Local address accepting SOCKS5 clients
    pub listen: String,
    /// Tunnel server URL
    pub server: String,
    pub token: String,
    pub accept_retry_secs: u64,
    pub inspect: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:1080".to_string(),
            server: "http://localhost:8888".to_string(),
            token: String::new(),
            accept_retry_secs: 5,
            inspect: false,
        }
    }
}

impl ClientConfig {
    pub fn options(&self) -> ClientOptions {
        ClientOptions {
            accept_retry_delay: Duration::from_secs(self.accept_retry_secs),
            inspect: self.inspect,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address accepting tunnel connections
    pub listen: String,
    pub token: String,
    /// HTTP path of the tunnel endpoint
    pub path: String,
    pub connect_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8888".to_string(),
            token: String::new(),
            path: "/".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxSection {
    pub max_streams: usize,
}

impl Default for MuxSection {
    fn default() -> Self {
        Self {
            max_streams: MuxConfig::default().max_streams,
        }
    }
}

impl MuxSection {
    pub fn to_mux_config(&self) -> MuxConfig {
        MuxConfig {
            max_streams: self.max_streams,
        }
    }
}

impl Config {
    /// Loads the config from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Loads the config from `path`, falling back to defaults if it does
    /// not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs =
            ProjectDirs::from("", "", "http2socks").context("Could not determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();

        assert_eq!(config.client.listen, "127.0.0.1:1080");
        assert_eq!(config.client.server, "http://localhost:8888");
        assert_eq!(config.client.accept_retry_secs, 5);
        assert!(!config.client.inspect);
        assert_eq!(config.server.listen, "127.0.0.1:8888");
        assert_eq!(config.server.path, "/");
        assert_eq!(config.server.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.mux.max_streams, 65536);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[client]
server = "https://tunnel.example.com"
token = "abc"
inspect = true

[mux]
max_streams = 32
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();

        assert_eq!(config.client.server, "https://tunnel.example.com");
        assert_eq!(config.client.token, "abc");
        assert_eq!(config.client.listen, "127.0.0.1:1080");
        assert!(config.client.options().inspect);
        assert_eq!(config.client.options().accept_retry_delay, Duration::from_secs(5));
        assert_eq!(config.server.token, "");
        assert_eq!(config.mux.to_mux_config().max_streams, 32);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[client\nlisten = ").unwrap();

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_config_path_file_name() {
        if let Ok(path) = Config::config_path() {
            assert!(path.ends_with("config.toml"));
        }
    }
}
