//! Ability evaluator.
//!
//! Answers "may this principal perform this action on this subject?" from the
//! principal's [`Ability`]. The model is closed-world with deny overrides:
//!
//! 1. The subject is discriminated. A raw subject that cannot be is an error.
//! 2. Rules are scanned in declaration order. A rule is relevant if its action
//!    is the requested one or `manage`, and its subject is the subject's type
//!    or `all`.
//! 3. If any relevant deny holds, the decision is deny and the first such
//!    rule is reported. Otherwise the first holding grant allows. Otherwise
//!    nothing speaks for the request and it is denied.

use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use super::ability::Ability;
use super::models::{Action, User};
use super::rules::{Effect, Rule};
use super::subjects::{is_valid_pair, Subject, SubjectField, SubjectType};
use crate::error::SaasError;
use crate::telemetry::metrics::AuthzMetrics;

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors from the authorization engine. A denial is never one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthzError {
    #[error("Role not configured: {0}")]
    RoleNotConfigured(String),

    #[error("Action `{action}` is not valid on subject `{subject}`")]
    InvalidActionSubjectPair {
        action: Action,
        subject: SubjectType,
    },

    #[error("Condition references field `{field}` which `{subject}` does not expose")]
    InvalidCondition {
        subject: SubjectType,
        field: SubjectField,
    },

    #[error("Subject discrimination failed: {0}")]
    SubjectDiscriminationFailure(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Unknown subject type: {0}")]
    UnknownSubjectType(String),
}

impl AuthzError {
    /// Stable snake_case name, used as a metric label.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RoleNotConfigured(_) => "role_not_configured",
            Self::InvalidActionSubjectPair { .. } => "invalid_action_subject_pair",
            Self::InvalidCondition { .. } => "invalid_condition",
            Self::SubjectDiscriminationFailure(_) => "subject_discrimination_failure",
            Self::UnknownAction(_) => "unknown_action",
            Self::UnknownSubjectType(_) => "unknown_subject_type",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No grant holds for the request.
    NoMatchingRule,
    /// The deny rule at this index holds.
    DeniedByRule { rule: usize },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatchingRule => f.write_str("no matching rule"),
            Self::DeniedByRule { rule } => write!(f, "denied by rule #{}", rule),
        }
    }
}

/// Result of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The grant rule at this index allows the request.
    Allow { rule: usize },
    Deny(DenyReason),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }

    /// Index of the rule that decided, if any did.
    pub fn rule_index(&self) -> Option<usize> {
        match self {
            Self::Allow { rule } | Self::Deny(DenyReason::DeniedByRule { rule }) => Some(*rule),
            Self::Deny(DenyReason::NoMatchingRule) => None,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Allow { .. } => "allow",
            Self::Deny(_) => "deny",
        }
    }
}

impl fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow { rule } => write!(f, "allowed by rule #{}", rule),
            Self::Deny(reason) => reason.fmt(f),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Query subjects
// ═══════════════════════════════════════════════════════════════════════════════

/// What a query is about: a whole type, a typed instance, or a raw instance
/// still to be discriminated.
#[derive(Debug, Clone, Copy)]
pub enum SubjectRef<'a> {
    Type(SubjectType),
    Instance(&'a Subject),
    Raw(&'a Value),
}

impl<'a> From<SubjectType> for SubjectRef<'a> {
    fn from(value: SubjectType) -> Self {
        Self::Type(value)
    }
}

impl<'a> From<&'a Subject> for SubjectRef<'a> {
    fn from(value: &'a Subject) -> Self {
        Self::Instance(value)
    }
}

impl<'a> From<&'a Value> for SubjectRef<'a> {
    fn from(value: &'a Value) -> Self {
        Self::Raw(value)
    }
}

/// A query subject after discrimination.
struct Resolved<'a> {
    tag: SubjectType,
    instance: Option<Cow<'a, Subject>>,
}

impl<'a> SubjectRef<'a> {
    fn resolve(self, ability: &Ability) -> Result<Resolved<'a>, AuthzError> {
        Ok(match self {
            Self::Type(tag) => Resolved { tag, instance: None },
            Self::Instance(subject) => Resolved {
                tag: subject.subject_type(),
                instance: Some(Cow::Borrowed(subject)),
            },
            Self::Raw(value) => {
                let subject = Subject::from_json_with(value, ability.detector())?;
                Resolved {
                    tag: subject.subject_type(),
                    instance: Some(Cow::Owned(subject)),
                }
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Evaluation
// ═══════════════════════════════════════════════════════════════════════════════

/// Whether a relevant rule holds for the query.
///
/// Type-level queries have no instance: conditional grants count (some
/// instance may qualify), conditional denies do not (some instance may not).
fn rule_holds(rule: &Rule, user: &User, instance: Option<&Subject>) -> bool {
    match (&rule.condition, instance) {
        (None, _) => true,
        (Some(condition), Some(subject)) => condition.evaluate(user, subject),
        (Some(_), None) => rule.effect == Effect::Grant,
    }
}

fn decide(ability: &Ability, action: Action, subject: &Resolved<'_>) -> Result<PolicyDecision, AuthzError> {
    let tag = subject.tag;
    if !is_valid_pair(action, tag) {
        return Err(AuthzError::InvalidActionSubjectPair {
            action,
            subject: tag,
        });
    }

    let principal = ability.principal();
    let mut first_grant = None;

    for (index, rule) in ability.rules().iter().enumerate() {
        if !rule.matches(action, tag) || !rule_holds(rule, principal, subject.instance.as_deref()) {
            continue;
        }
        match rule.effect {
            Effect::Deny => return Ok(PolicyDecision::Deny(DenyReason::DeniedByRule { rule: index })),
            Effect::Grant => {
                first_grant.get_or_insert(index);
            }
        }
    }

    Ok(match first_grant {
        Some(rule) => PolicyDecision::Allow { rule },
        None => PolicyDecision::Deny(DenyReason::NoMatchingRule),
    })
}

/// Decide `action` on `subject` for the ability's principal.
///
/// # Errors
///
/// - [`AuthzError::SubjectDiscriminationFailure`] for raw subjects the
///   ability's detector cannot classify or decode.
/// - [`AuthzError::InvalidActionSubjectPair`] if the action is not valid on
///   the subject's type.
pub fn evaluate<'a>(
    ability: &Ability,
    action: Action,
    subject: impl Into<SubjectRef<'a>>,
) -> Result<PolicyDecision, AuthzError> {
    let resolved = subject.into().resolve(ability)?;
    decide(ability, action, &resolved)
}

impl Ability {
    /// Full decision for one query. See [`evaluate`].
    pub fn evaluate<'a>(
        &self,
        action: Action,
        subject: impl Into<SubjectRef<'a>>,
    ) -> Result<PolicyDecision, AuthzError> {
        evaluate(self, action, subject)
    }

    /// Whether the principal may perform `action` on `subject`.
    ///
    /// Fails closed: discrimination failures and invalid queries answer
    /// `false` and are logged and counted.
    pub fn can<'a>(&self, action: Action, subject: impl Into<SubjectRef<'a>>) -> bool {
        let (tag, result) = self.observed(action, subject.into());
        match result {
            Ok(decision) => decision.is_allowed(),
            Err(e) => {
                warn!(
                    user_id = %self.principal().id,
                    role = %self.principal().role,
                    action = %action,
                    subject = tag_label(tag),
                    error = %e,
                    "Authorization query failed; denying"
                );
                false
            }
        }
    }

    pub fn cannot<'a>(&self, action: Action, subject: impl Into<SubjectRef<'a>>) -> bool {
        !self.can(action, subject)
    }

    /// Guard for request handlers: `Ok(())` when allowed, otherwise a
    /// forbidden error carrying `message`.
    ///
    /// Engine errors surface as their own [`SaasError`] codes rather than
    /// as a plain denial. Every returned error is logged at its severity.
    pub fn enforce<'a>(
        &self,
        action: Action,
        subject: impl Into<SubjectRef<'a>>,
        message: impl Into<Cow<'static, str>>,
    ) -> crate::Result<()> {
        let (tag, result) = self.observed(action, subject.into());
        let error = match result {
            Ok(decision) if decision.is_allowed() => return Ok(()),
            Ok(decision) => SaasError::forbidden(message)
                .with_context("action", action.as_str())
                .with_context("subject", tag_label(tag))
                .with_context("reason", decision.to_string()),
            Err(e) => SaasError::from(e).with_context("subject", tag_label(tag)),
        };
        error.log();
        Err(error)
    }

    /// Resolve, decide, and record the outcome. The subject tag is `None`
    /// only when discrimination failed.
    fn observed(
        &self,
        action: Action,
        subject: SubjectRef<'_>,
    ) -> (Option<SubjectType>, Result<PolicyDecision, AuthzError>) {
        let (tag, result) = match subject.resolve(self) {
            Ok(resolved) => (Some(resolved.tag), decide(self, action, &resolved)),
            Err(e) => (None, Err(e)),
        };

        let role = self.principal().role;
        match &result {
            Ok(decision) => {
                debug!(
                    user_id = %self.principal().id,
                    role = %role,
                    action = %action,
                    subject = tag_label(tag),
                    allowed = decision.is_allowed(),
                    reason = %decision,
                    "Authorization decision"
                );
                AuthzMetrics::record_decision(role, action, tag_label(tag), decision);
            }
            Err(e) => AuthzMetrics::record_error(e),
        }
        (tag, result)
    }
}

/// Type name for logs and metric labels.
fn tag_label(tag: Option<SubjectType>) -> &'static str {
    tag.map_or("unknown", |tag| tag.as_str())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::rbac::ability::AbilityBuilder;
    use crate::rbac::models::Role;
    use crate::rbac::rules::Condition;
    use crate::rbac::subjects::detect_subject_type;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ability(configure: impl FnOnce(&mut AbilityBuilder)) -> Ability {
        let mut builder = AbilityBuilder::new(User::new("u1", Role::Member));
        configure(&mut builder);
        builder.build().unwrap()
    }

    #[test]
    fn test_empty_ability_denies_everything() {
        let ability = ability(|_| {});
        assert_eq!(
            ability.evaluate(Action::Get, SubjectType::Project).unwrap(),
            PolicyDecision::Deny(DenyReason::NoMatchingRule)
        );
        assert!(ability.cannot(Action::Manage, SubjectType::All));
    }

    #[test]
    fn test_deny_overrides_earlier_grant() {
        let ability = ability(|b| {
            b.grant(Action::Manage, SubjectType::All)
                .deny(Action::Delete, SubjectType::Organization);
        });
        let org = Subject::organization("o1", "u1");
        assert_eq!(
            ability.evaluate(Action::Delete, &org).unwrap(),
            PolicyDecision::Deny(DenyReason::DeniedByRule { rule: 1 })
        );
        assert_eq!(
            ability.evaluate(Action::Update, &org).unwrap(),
            PolicyDecision::Allow { rule: 0 }
        );
    }

    #[test]
    fn test_deny_overrides_later_grant() {
        let ability = ability(|b| {
            b.deny(Action::Get, SubjectType::Billing)
                .grant(Action::Manage, SubjectType::Billing);
        });
        assert!(ability.cannot(Action::Get, &Subject::billing("o1")));
        assert!(ability.can(Action::Export, &Subject::billing("o1")));
    }

    #[test]
    fn test_first_matching_deny_is_reported() {
        let ability = ability(|b| {
            b.grant(Action::Manage, SubjectType::All)
                .deny(Action::Manage, SubjectType::All)
                .deny(Action::Delete, SubjectType::Project);
        });
        assert_eq!(
            ability.evaluate(Action::Delete, SubjectType::Project).unwrap(),
            PolicyDecision::Deny(DenyReason::DeniedByRule { rule: 1 })
        );
    }

    #[test]
    fn test_manage_query_needs_manage_rule() {
        let ability = ability(|b| {
            b.grant_many(
                &[Action::Get, Action::Create, Action::Delete],
                SubjectType::Invite,
            );
        });
        for action in [Action::Get, Action::Create, Action::Delete] {
            assert!(ability.can(action, SubjectType::Invite), "{}", action);
        }
        assert!(ability.cannot(Action::Manage, SubjectType::Invite));
    }

    #[test]
    fn test_update_invite_is_not_a_valid_rule() {
        let mut builder = AbilityBuilder::new(User::new("u1", Role::Member));
        builder.grant(Action::Update, SubjectType::Invite);
        assert_eq!(
            builder.build().unwrap_err(),
            AuthzError::InvalidActionSubjectPair {
                action: Action::Update,
                subject: SubjectType::Invite,
            }
        );
    }

    #[test]
    fn test_type_level_conditional_rules() {
        let ability = ability(|b| {
            b.grant_if(Action::Update, SubjectType::Project, Condition::owner())
                .deny_if(Action::Delete, SubjectType::Project, Condition::not_owner())
                .grant(Action::Delete, SubjectType::Project);
        });
        assert!(ability.can(Action::Update, SubjectType::Project));
        assert!(ability.can(Action::Delete, SubjectType::Project));
        assert!(ability.cannot(Action::Delete, &Subject::project("p1", "other", "o1")));
        assert!(ability.can(Action::Delete, &Subject::project("p1", "u1", "o1")));
    }

    #[test]
    fn test_unconditional_deny_applies_to_type_queries() {
        let ability = ability(|b| {
            b.grant(Action::Manage, SubjectType::All)
                .deny(Action::Export, SubjectType::Billing);
        });
        assert!(ability.cannot(Action::Export, SubjectType::Billing));
    }

    #[test]
    fn test_raw_subjects() {
        let ability = ability(|b| {
            b.grant_if(Action::Update, SubjectType::Project, Condition::owner());
        });
        let mine = json!({
            "__typename": "Project", "id": "p1", "ownerId": "u1", "organizationId": "o1"
        });
        let untyped = json!({ "id": "p1", "ownerId": "u1", "organizationId": "o1" });

        assert!(ability.can(Action::Update, &mine));
        assert!(ability.cannot(Action::Update, &untyped));
        assert!(matches!(
            ability.evaluate(Action::Update, &untyped),
            Err(AuthzError::SubjectDiscriminationFailure(_))
        ));
    }

    #[test]
    fn test_invalid_query_pair_is_error_and_denied() {
        let ability = ability(|b| {
            b.grant(Action::Manage, SubjectType::All);
        });
        assert_eq!(
            ability.evaluate(Action::TransferOwnership, SubjectType::Project),
            Err(AuthzError::InvalidActionSubjectPair {
                action: Action::TransferOwnership,
                subject: SubjectType::Project,
            })
        );
        assert!(ability.cannot(Action::TransferOwnership, SubjectType::Project));
    }

    #[test]
    fn test_enforce() {
        let ability = ability(|b| {
            b.grant(Action::Get, SubjectType::User);
        });
        assert!(ability.enforce(Action::Get, &Subject::user("u2"), "nope").is_ok());

        let err = ability
            .enforce(Action::Delete, &Subject::user("u2"), "You're not allowed to delete this user")
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
        assert_eq!(err.user_message(), "You're not allowed to delete this user");
        assert_eq!(err.details().context.get("reason"), Some(&json!("no matching rule")));

        let err = ability
            .enforce(Action::Get, &json!({ "id": "u2" }), "nope")
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SubjectDiscriminationFailed);
    }

    static DETECTOR_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting_detector(value: &Value) -> Option<SubjectType> {
        DETECTOR_CALLS.fetch_add(1, Ordering::SeqCst);
        detect_subject_type(value)
    }

    #[test]
    fn test_raw_subject_is_discriminated_once_per_query() {
        let mut builder = AbilityBuilder::new(User::new("u1", Role::Member));
        builder.grant(Action::Get, SubjectType::Project);
        let ability = builder.build_with_detector(counting_detector).unwrap();
        let project = json!({
            "__typename": "Project", "id": "p1", "ownerId": "u2", "organizationId": "o1"
        });

        assert!(ability.can(Action::Get, &project));
        assert_eq!(DETECTOR_CALLS.load(Ordering::SeqCst), 1);

        let err = ability.enforce(Action::Delete, &project, "nope").unwrap_err();
        assert_eq!(DETECTOR_CALLS.load(Ordering::SeqCst), 2);
        assert_eq!(err.details().context.get("subject"), Some(&json!("Project")));
    }

    #[test]
    fn test_discriminator_is_case_sensitive() {
        let ability = ability(|b| {
            b.grant(Action::Manage, SubjectType::All);
        });
        let org = json!({ "__typename": "organization", "id": "o1", "ownerId": "u1" });

        assert!(ability.cannot(Action::Delete, &org));
        let err = ability.enforce(Action::Delete, &org, "nope").unwrap_err();
        assert_eq!(err.code(), ErrorCode::SubjectDiscriminationFailed);
        assert_eq!(err.details().context.get("subject"), Some(&json!("unknown")));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            AuthzError::RoleNotConfigured("X".into()).kind(),
            "role_not_configured"
        );
        assert_eq!(
            AuthzError::SubjectDiscriminationFailure(String::new()).kind(),
            "subject_discrimination_failure"
        );
    }

    #[test]
    fn test_decision_accessors() {
        let allow = PolicyDecision::Allow { rule: 2 };
        assert!(allow.is_allowed());
        assert_eq!(allow.rule_index(), Some(2));
        assert_eq!(allow.to_string(), "allowed by rule #2");

        let deny = PolicyDecision::Deny(DenyReason::NoMatchingRule);
        assert!(deny.is_denied());
        assert_eq!(deny.rule_index(), None);
        assert_eq!(deny.label(), "deny");
    }
}
