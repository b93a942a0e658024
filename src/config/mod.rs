//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, path from GATEWAY_CONFIG)
//!     → loader.rs (parse & deserialize)
//!     → env.rs (environment overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BackendConfig, BreakerConfig, DiscoveryConfig, GatewayConfig, ListenerConfig,
    LoadMonitorConfig, RateLimitConfig, RegistryBackend, RegistryConfig, RetryConfig,
    RouteConfig, SagaConfig, TimeoutConfig, MAX_COOLDOWN,
};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG";

/// Load using the path in [`CONFIG_PATH_ENV`], or defaults when unset.
pub fn load_from_env() -> Result<GatewayConfig, ConfigError> {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.is_empty() => load_config(Some(std::path::Path::new(&path))),
        _ => load_config(None),
    }
}
