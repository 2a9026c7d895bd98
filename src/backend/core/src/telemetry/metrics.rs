//! Authorization metrics.
//!
//! Counters are emitted through the `metrics` facade. The library installs
//! no recorder; without one every call is a no-op, so embedding services pick
//! their own exporter.
//!
//! # Example
//!
//! ```rust
//! use saas_core::telemetry::metrics::AuthzMetrics;
//!
//! AuthzMetrics::describe();
//! ```

use metrics::{counter, describe_counter};

use crate::rbac::{Action, AuthzError, PolicyDecision, Role};

pub const DECISIONS_TOTAL: &str = "saas_authz_decisions_total";
pub const AUTHZ_ERRORS_TOTAL: &str = "saas_authz_errors_total";
pub const ABILITIES_BUILT_TOTAL: &str = "saas_abilities_built_total";
pub const ERRORS_TOTAL: &str = "saas_errors_total";

/// Counters for the authorization engine.
pub struct AuthzMetrics;

impl AuthzMetrics {
    /// Register metric descriptions with the installed recorder.
    pub fn describe() {
        describe_counter!(
            DECISIONS_TOTAL,
            "Authorization decisions by role, action, subject type and outcome"
        );
        describe_counter!(
            AUTHZ_ERRORS_TOTAL,
            "Authorization engine errors by kind"
        );
        describe_counter!(ABILITIES_BUILT_TOTAL, "Abilities built per role");
        describe_counter!(ERRORS_TOTAL, "Errors by code, category and severity");
    }

    pub fn record_decision(role: Role, action: Action, subject: &'static str, decision: &PolicyDecision) {
        counter!(
            DECISIONS_TOTAL,
            "role" => role.as_str(),
            "action" => action.as_str(),
            "subject" => subject,
            "decision" => decision.label(),
        )
        .increment(1);
    }

    pub fn record_error(error: &AuthzError) {
        counter!(AUTHZ_ERRORS_TOTAL, "kind" => error.kind()).increment(1);
    }

    pub fn record_ability_built(role: Role) {
        counter!(ABILITIES_BUILT_TOTAL, "role" => role.as_str()).increment(1);
    }
}
