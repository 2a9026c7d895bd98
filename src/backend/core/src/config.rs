//! Configuration management.
//!
//! Sources, lowest precedence first: built-in defaults, a file when one is
//! given, then environment variables (prefix `SAAS`, nesting `__`):
//!
//! ```text
//! SAAS_ENVIRONMENT=production
//! SAAS_LOGGING__LEVEL=debug
//! SAAS_POLICY__ENABLED_ROLES=OWNER,ADMIN,MEMBER
//! ```

use serde::Deserialize;

use crate::error::{Result, SaasError};
use crate::rbac::Role;
use crate::telemetry::LoggingConfig;

const ENV_PREFIX: &str = "SAAS";

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SaasConfig {
    /// Deployment environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Authorization policy configuration
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl Default for SaasConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            logging: LoggingConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Roles that have a permission builder. A principal holding any other
    /// role is rejected with `RoleNotConfigured`.
    #[serde(default = "default_enabled_roles")]
    pub enabled_roles: Vec<Role>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled_roles: default_enabled_roles(),
        }
    }
}

// Default value functions
fn default_environment() -> String { "development".to_string() }
fn default_enabled_roles() -> Vec<Role> { Role::all().to_vec() }

fn environment_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("policy.enabled_roles")
        .try_parsing(true)
}

impl SaasConfig {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        Self::from_sources(None, environment_source())
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        Self::from_sources(Some(path), environment_source())
    }

    /// Load from an explicit set of `SAAS_*` variables instead of the process
    /// environment.
    pub fn from_env_map(vars: config::Map<String, String>) -> Result<Self> {
        Self::from_sources(None, environment_source().source(Some(vars)))
    }

    fn from_sources(file: Option<&str>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path));
        }
        let config = builder.add_source(env).build()?;

        let cfg: SaasConfig = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations that cannot authorize anyone.
    pub fn validate(&self) -> Result<()> {
        if self.policy.enabled_roles.is_empty() {
            return Err(SaasError::configuration(
                "policy.enabled_roles must name at least one role",
            ));
        }
        Ok(())
    }
}
