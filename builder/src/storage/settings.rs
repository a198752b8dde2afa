//! Settings file management

use serde::{Deserialize, Serialize};

use crate::github::push::TriggerPolicy;
use crate::logs::LogLevel;
use crate::publish::publisher::PublishStrategy;

/// Builder settings, read from `settings.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,

    /// Overrides the default data directory
    #[serde(default)]
    pub data_dir: Option<String>,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Sandbox and queue configuration
    #[serde(default)]
    pub builder: BuilderSettings,

    /// Content-addressed storage configuration
    #[serde(default)]
    pub storage: StorageSettings,

    /// Push-event handling
    #[serde(default)]
    pub github: GithubSettings,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            data_dir: None,
            server: ServerSettings::default(),
            builder: BuilderSettings::default(),
            storage: StorageSettings::default(),
            github: GithubSettings::default(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Build sandbox settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderSettings {
    /// Maximum number of concurrent builds
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Base runtime image every sandbox starts from
    #[serde(default = "default_base_image")]
    pub base_image: String,

    /// Mirror build output to this process's stdout
    #[serde(default = "default_true")]
    pub mirror_stdout: bool,
}

fn default_capacity() -> usize {
    3
}

fn default_base_image() -> String {
    "node".to_string()
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            base_image: default_base_image(),
            mirror_stdout: true,
        }
    }
}

/// Which storage client publishes artifacts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Upload node reached over HTTP
    #[default]
    Http,

    /// Content-addressed directory under the data dir
    Local,
}

/// Storage network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Upload node base URL
    #[serde(default = "default_node_url")]
    pub node_url: String,

    /// Gateway resolving published ids, used for links in logs and responses
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    #[serde(default)]
    pub strategy: PublishStrategy,
}

fn default_node_url() -> String {
    "https://turbo.ardrive.io".to_string()
}

fn default_gateway_url() -> String {
    "https://arweave.net".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            node_url: default_node_url(),
            gateway_url: default_gateway_url(),
            strategy: PublishStrategy::default(),
        }
    }
}

/// Push-event settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GithubSettings {
    #[serde(default)]
    pub trigger: TriggerPolicy,
}
