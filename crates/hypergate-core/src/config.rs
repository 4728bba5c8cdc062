//! Layered configuration: a typed `serde`/`schemars` struct loaded through
//! the `config` crate with environment overrides and sane defaults.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub stdio: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8765,
            stdio: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PiiProtectionConfig {
    pub enabled: bool,
    pub types: Vec<String>,
    pub detokenize_output: bool,
}

impl Default for PiiProtectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            types: Vec::new(),
            detokenize_output: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub ttl_seconds: u64,
    pub persistence: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl_seconds: 1800,
            persistence: false,
        }
    }
}

/// The subset of configuration the core recognises.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub enable_speculative: bool,
    pub default_tool_limit: usize,
    pub pii_protection: PiiProtectionConfig,
    pub cache_config: CacheConfig,
    pub per_layer_validation: bool,
    pub task_timeout_ms: u64,
    pub workflow_ttl_ms: u64,
    /// Default HIL approval deadline; `None` means infinite.
    pub approval_timeout_ms: Option<u64>,
    /// Relative edge-count delta that invalidates the PageRank/Louvain cache.
    pub graph_cache_invalidation_delta: f64,
    /// Observation count at which an `inferred` edge promotes to `observed`.
    pub edge_promotion_threshold: u32,
    pub data_dir: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            enable_speculative: false,
            default_tool_limit: 5,
            pii_protection: PiiProtectionConfig::default(),
            cache_config: CacheConfig::default(),
            per_layer_validation: false,
            task_timeout_ms: 30_000,
            workflow_ttl_ms: 3_600_000,
            approval_timeout_ms: None,
            graph_cache_invalidation_delta: 0.05,
            edge_promotion_threshold: 3,
            data_dir: "./data/hypergate".into(),
        }
    }
}

impl GatewayConfig {
    /// Loads defaults, then an optional TOML file, then `HYPERGATE_*`
    /// environment overrides, in that precedence order.
    pub fn load(path: Option<&str>) -> crate::error::Result<Self> {
        let defaults = Self::default();
        let defaults_source = config::Config::try_from(&defaults)
            .map_err(|e| crate::error::GatewayError::Configuration(e.to_string()))?;

        let mut builder = config::Config::builder().add_source(defaults_source);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("HYPERGATE")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder
            .build()
            .map_err(|e| crate::error::GatewayError::Configuration(e.to_string()))?;

        cfg.try_deserialize()
            .map_err(|e| crate::error::GatewayError::Configuration(e.to_string()))
    }
}
