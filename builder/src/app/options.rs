//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;

use crate::deploy::executor::ExecutorOptions;
use crate::github::push::TriggerPolicy;
use crate::publish::publisher::PublishStrategy;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{Settings, StorageBackend};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Data directory layout
    pub layout: StorageLayout,

    /// Server configuration
    pub server: ServerOptions,

    /// Maximum number of concurrent builds
    pub capacity: usize,

    /// Sandbox configuration
    pub executor: ExecutorOptions,

    /// Publishing configuration
    pub storage: StorageOptions,

    /// Which pushes trigger deployments
    pub trigger: TriggerPolicy,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), None)
    }
}

impl AppOptions {
    /// Options from a settings file plus the storage token
    pub fn from_settings(settings: &Settings, token: Option<SecretString>) -> Self {
        let layout = match &settings.data_dir {
            Some(dir) => StorageLayout::new(dir),
            None => StorageLayout::default(),
        };

        Self {
            lifecycle: LifecycleOptions::default(),
            layout,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            capacity: settings.builder.capacity,
            executor: ExecutorOptions {
                base_image: settings.builder.base_image.clone(),
                mirror_stdout: settings.builder.mirror_stdout,
            },
            storage: StorageOptions {
                backend: settings.storage.backend,
                node_url: settings.storage.node_url.clone(),
                gateway_url: settings.storage.gateway_url.clone(),
                strategy: settings.storage.strategy,
                token,
            },
            trigger: settings.github.trigger,
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Hard limit for graceful shutdown; the process exits with 1 past it
    pub max_shutdown_delay: Duration,

    /// How long shutdown waits for running builds to finish
    pub build_grace: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
            build_grace: Duration::from_secs(20),
        }
    }
}

/// Publishing options
#[derive(Debug, Clone)]
pub struct StorageOptions {
    pub backend: StorageBackend,

    /// Upload node base URL (http backend)
    pub node_url: String,

    /// Gateway base URL for links to published sites
    pub gateway_url: String,

    pub strategy: PublishStrategy,

    /// Bearer token for the upload node
    pub token: Option<SecretString>,
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
        }
    }
}
