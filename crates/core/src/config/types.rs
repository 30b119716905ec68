use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("atlas.db")
}

/// Reader behaviour configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReaderConfig {
    /// Quiet period before a reading position is written to the database.
    #[serde(default = "default_progress_debounce")]
    pub progress_debounce_ms: u64,
    /// Fetch the neighbouring chapter in the background after each load.
    #[serde(default = "default_true")]
    pub prefetch: bool,
    /// Reader sessions unused for this long are closed (default: 30 minutes).
    #[serde(default = "default_session_idle")]
    pub session_idle_secs: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            progress_debounce_ms: default_progress_debounce(),
            prefetch: true,
            session_idle_secs: default_session_idle(),
        }
    }
}

fn default_progress_debounce() -> u64 {
    500
}

fn default_session_idle() -> u64 {
    1800
}

fn default_true() -> bool {
    true
}

/// Novel source configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcesConfig {
    /// User agent sent with every scraping request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Request timeout in seconds (default: 10)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    #[serde(default)]
    pub novelfire: SiteConfig,
    #[serde(default)]
    pub royalroad: SiteConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout(),
            novelfire: SiteConfig::default(),
            royalroad: SiteConfig::default(),
        }
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_timeout() -> u32 {
    10
}

/// Per-site source settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Override the site root (mirrors, local test servers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "atlas.db");
        assert_eq!(config.reader.progress_debounce_ms, 500);
        assert!(config.reader.prefetch);
        assert_eq!(config.reader.session_idle_secs, 1800);
        assert_eq!(config.sources.timeout_secs, 10);
        assert!(config.sources.novelfire.enabled);
        assert!(config.sources.royalroad.enabled);
    }

    #[test]
    fn test_deserialize_server_section() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
    }

    #[test]
    fn test_deserialize_with_custom_database_path() {
        let toml = r#"
[database]
path = "/data/library.sqlite"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.database.path.to_str().unwrap(),
            "/data/library.sqlite"
        );
    }

    #[test]
    fn test_deserialize_reader_section() {
        let toml = r#"
[reader]
progress_debounce_ms = 250
prefetch = false
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.reader.progress_debounce_ms, 250);
        assert!(!config.reader.prefetch);
    }

    #[test]
    fn test_deserialize_sources_section() {
        let toml = r#"
[sources]
timeout_secs = 30

[sources.novelfire]
enabled = false

[sources.royalroad]
base_url = "http://localhost:9999"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.sources.timeout_secs, 30);
        assert!(!config.sources.novelfire.enabled);
        assert!(config.sources.royalroad.enabled);
        assert_eq!(
            config.sources.royalroad.base_url.as_deref(),
            Some("http://localhost:9999")
        );
        assert!(config.sources.user_agent.starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_serialize_skips_missing_base_url() {
        let json = serde_json::to_string(&SiteConfig::default()).unwrap();
        assert!(!json.contains("base_url"));
    }
}
