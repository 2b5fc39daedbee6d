use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::FilterRule;
use crate::model::rule::default_rules;

pub const CONFIG_FILE: &str = "logsync.toml";
pub const ENV_PREFIX: &str = "LOGSYNC__";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerBackend {
    Memory,
    Nats,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub backend: BrokerBackend,
    /// Server URL, ignored by the in-memory backend
    pub url: String,
    pub topic: String,
    /// Per-topic buffer of the in-memory backend
    pub capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            backend: BrokerBackend::Nats,
            url: "nats://localhost:4222".to_string(),
            topic: "logs".to_string(),
            capacity: 1024,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Elasticsearch,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub index: String,
    /// Document field holding the service name, used by retention queries
    pub service_field: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Elasticsearch,
            url: "http://localhost:9200".to_string(),
            index: "logs".to_string(),
            service_field: "service".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// memory://, file:///path or s3://host[:port]
    pub url: String,
    pub region: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            url: "memory://".to_string(),
            region: "us-west-2".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 9092)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub rules: Vec<FilterRule>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetentionSettings {
    /// Per-service retention policy file (JSON or TOML)
    pub config_path: PathBuf,
    pub page_size: usize,
    /// Upper bound on store queries per service and run
    pub max_pages: usize,
    /// Select and log expired records without archiving or deleting them
    pub dry_run: bool,
    /// Repeat the pass on this interval instead of running once
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub interval: Option<Duration>,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("retention.json"),
            page_size: 1000,
            max_pages: 1000,
            dry_run: false,
            interval: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    pub broker: BrokerConfig,
    pub store: StoreConfig,
    pub archive: ArchiveConfig,
    pub metrics: MetricsConfig,
    pub policy: PolicyConfig,
    pub retention: RetentionSettings,
}

impl Configuration {
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from_path(CONFIG_FILE)
    }

    /// Load defaults, then the given TOML file (if present), then
    /// `LOGSYNC__`-prefixed environment variables.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path).extract().map_err(Box::new)
    }

    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}
