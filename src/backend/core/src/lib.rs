#![allow(clippy::result_large_err)]
//! # SaaS Core
//!
//! Authorization engine of a multi-tenant SaaS backend.
//!
//! ## Architecture
//!
//! - **RBAC**: subject registry, role permission table, ability builder and
//!   the deny-overrides evaluator behind `define_ability_for`
//! - **Error**: stable error codes with HTTP mapping for request handlers
//! - **Config**: layered configuration (file + `SAAS_*` environment)
//! - **Telemetry**: structured logging and authorization metrics

pub mod config;
pub mod error;
pub mod rbac;
pub mod telemetry;

pub use error::{ErrorCode, ErrorDetails, ErrorSeverity, Result, SaasError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{PolicyConfig, SaasConfig};
    pub use crate::error::{ErrorCode, ErrorDetails, ErrorSeverity, Result, SaasError};
    pub use crate::rbac::{
        define_ability_for, Ability, AbilityBuilder, Action, AuthzError, Condition, DenyReason,
        Effect, PolicyDecision, Role, RolePermissionTable, Rule, Subject, SubjectField,
        SubjectRef, SubjectType, User, UserId,
    };
}
