/// Configuration management for triplegate
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::core::{Endpoint, NodeRole};

/// Main triplegate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Where cluster membership comes from
    pub discovery: DiscoveryConfig,
    /// Topology cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// How unreachable members get recreated
    pub recovery: RecoveryConfig,
    /// Member forwarding configuration
    #[serde(default)]
    pub backend: BackendConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on
    pub listen_addr: String,
    /// Path answered locally with the master's health
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Largest inbound body accepted; bigger requests get 413
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Cluster membership source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum DiscoveryConfig {
    #[serde(rename = "cloudmap")]
    CloudMap {
        /// Registry namespace name
        namespace: String,
        /// Name of the service holding the master instance
        master_service: String,
        /// Application port every member listens on
        app_port: u16,
        /// Scheme used to build member endpoints
        #[serde(default = "default_scheme")]
        scheme: String,
        /// AWS region, defaults to the environment's
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
    },
    #[serde(rename = "static")]
    Static {
        /// Master endpoint URL
        master: String,
        /// Replica endpoint URLs
        #[serde(default)]
        replicas: Vec<String>,
    },
}

/// Topology cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds a discovered topology stays fresh
    pub ttl_sec: u64,
}

/// Recovery control-plane configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum RecoveryConfig {
    #[serde(rename = "ecs")]
    Ecs {
        /// Control-plane cluster name
        cluster: String,
        /// Prefix of the redeploy group names
        service_name_prefix: String,
        #[serde(default = "default_master_suffix")]
        master_group_suffix: String,
        #[serde(default = "default_replica_suffix")]
        replica_group_suffix: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
    },
    #[serde(rename = "disabled")]
    Disabled,
}

/// Member forwarding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Per-call timeout; unset means transport defaults only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    /// Basic auth user sent to every member
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Member path probed by the health endpoint
    #[serde(default = "default_probe_path")]
    pub health_probe_path: String,
    /// Budget for one master health check
    #[serde(default = "default_health_check_timeout_ms")]
    pub health_check_timeout_ms: u64,
    /// Content types that make a mutating method a read
    #[serde(default = "default_read_content_types")]
    pub read_content_types: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, text)
    pub format: String,
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_master_suffix() -> String {
    "MasterService".to_string()
}

fn default_replica_suffix() -> String {
    "SlaveService".to_string()
}

fn default_probe_path() -> String {
    "/rdf4j-server/protocol".to_string()
}

fn default_health_check_timeout_ms() -> u64 {
    5000
}

fn default_read_content_types() -> Vec<String> {
    vec!["application/sparql-query".to_string()]
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_sec: 60 }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: None,
            connect_timeout_ms: None,
            username: None,
            password: None,
            health_probe_path: default_probe_path(),
            health_check_timeout_ms: default_health_check_timeout_ms(),
            read_content_types: default_read_content_types(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                listen_addr: "0.0.0.0:8080".to_string(),
                health_path: default_health_path(),
                max_body_bytes: default_max_body_bytes(),
            },
            discovery: DiscoveryConfig::Static {
                master: "http://127.0.0.1:8081".to_string(),
                replicas: vec!["http://127.0.0.1:8082".to_string()],
            },
            cache: CacheConfig::default(),
            recovery: RecoveryConfig::Disabled,
            backend: BackendConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file, then apply environment overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Apply the deployment's environment variables on top of the file values
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let DiscoveryConfig::CloudMap {
            namespace,
            master_service,
            ..
        } = &mut self.discovery
        {
            if let Some(value) = lookup("SERVICE_DISCOVERY_NAMESPACE") {
                *namespace = value;
            }
            if let Some(value) = lookup("MASTER_SERVICE_NAME") {
                *master_service = value;
            }
        }

        if let RecoveryConfig::Ecs {
            cluster,
            service_name_prefix,
            ..
        } = &mut self.recovery
        {
            if let Some(value) = lookup("ECS_CLUSTER_NAME") {
                *cluster = value;
            }
            if let Some(value) = lookup("ECS_SERVICE_NAME_PREFIX") {
                *service_name_prefix = value;
            }
        }

        if let Some(value) = lookup("RDF4J_USER_NAME") {
            self.backend.username = Some(value);
        }
        if let Some(value) = lookup("RDF4J_PASSWORD") {
            self.backend.password = Some(value);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen_addr.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "listen_addr cannot be empty".to_string(),
            ));
        }

        if !self.server.health_path.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "health_path must start with '/': {}",
                self.server.health_path
            )));
        }

        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "max_body_bytes must be greater than 0".to_string(),
            ));
        }

        match &self.discovery {
            DiscoveryConfig::CloudMap {
                namespace,
                master_service,
                app_port,
                scheme,
                ..
            } => {
                require_non_empty("namespace", namespace)?;
                require_non_empty("master_service", master_service)?;
                if *app_port == 0 {
                    return Err(ConfigError::ValidationError(
                        "app_port must be greater than 0".to_string(),
                    ));
                }
                if scheme != "http" && scheme != "https" {
                    return Err(ConfigError::ValidationError(format!(
                        "scheme must be 'http' or 'https', got '{}'",
                        scheme
                    )));
                }
            }
            DiscoveryConfig::Static { master, replicas } => {
                Endpoint::parse(master, NodeRole::Master).map_err(|e| {
                    ConfigError::ValidationError(format!("Invalid master endpoint: {}", e))
                })?;
                for replica in replicas {
                    Endpoint::parse(replica, NodeRole::Replica).map_err(|e| {
                        ConfigError::ValidationError(format!("Invalid replica endpoint: {}", e))
                    })?;
                }
            }
        }

        if self.cache.ttl_sec == 0 {
            return Err(ConfigError::ValidationError(
                "cache ttl_sec must be greater than 0".to_string(),
            ));
        }

        if let RecoveryConfig::Ecs {
            cluster,
            service_name_prefix,
            master_group_suffix,
            replica_group_suffix,
            ..
        } = &self.recovery
        {
            require_non_empty("cluster", cluster)?;
            require_non_empty("service_name_prefix", service_name_prefix)?;
            require_non_empty("master_group_suffix", master_group_suffix)?;
            require_non_empty("replica_group_suffix", replica_group_suffix)?;
        }

        if self.backend.username.is_some() != self.backend.password.is_some() {
            return Err(ConfigError::ValidationError(
                "username and password must be set together".to_string(),
            ));
        }

        if self.backend.request_timeout_ms == Some(0)
            || self.backend.connect_timeout_ms == Some(0)
            || self.backend.health_check_timeout_ms == 0
        {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than 0 when set".to_string(),
            ));
        }

        if !self.backend.health_probe_path.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "health_probe_path must start with '/': {}",
                self.backend.health_probe_path
            )));
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.as_str() {
            "json" | "text" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}",
                    self.logging.format
                )))
            }
        }

        Ok(())
    }

    /// Topology cache time-to-live
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_sec)
    }

    /// Master health check budget
    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.health_check_timeout_ms)
    }

    /// Create example configuration file
    pub fn create_example_config<P: AsRef<Path>>(path: P, mode: &str) -> Result<(), ConfigError> {
        let config = match mode {
            "cloudmap" => Config {
                discovery: DiscoveryConfig::CloudMap {
                    namespace: "rdf4j.local".to_string(),
                    master_service: "rdf4j-master".to_string(),
                    app_port: 8080,
                    scheme: default_scheme(),
                    region: None,
                },
                recovery: RecoveryConfig::Ecs {
                    cluster: "rdf4j-cluster".to_string(),
                    service_name_prefix: "Rdf4j".to_string(),
                    master_group_suffix: default_master_suffix(),
                    replica_group_suffix: default_replica_suffix(),
                    region: None,
                },
                ..Default::default()
            },
            "static" => Config {
                discovery: DiscoveryConfig::Static {
                    master: "http://10.0.1.10:8080".to_string(),
                    replicas: vec![
                        "http://10.0.1.11:8080".to_string(),
                        "http://10.0.1.12:8080".to_string(),
                    ],
                },
                ..Default::default()
            },
            _ => {
                return Err(ConfigError::ValidationError(
                    "Mode must be 'cloudmap' or 'static'".to_string(),
                ))
            }
        };

        config.save_to_file(path)
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "{} cannot be empty",
            field
        )));
    }
    Ok(())
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
