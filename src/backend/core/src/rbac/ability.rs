//! Ability construction.
//!
//! An [`AbilityBuilder`] is owned by the code assembling one principal's
//! rules. [`AbilityBuilder::build`] validates every rule against the subject
//! registry and consumes the builder into an immutable [`Ability`]; nothing
//! can be added afterwards.
//!
//! ```rust
//! use saas_core::rbac::{Action, AbilityBuilder, Condition, Role, SubjectType, User};
//!
//! let mut builder = AbilityBuilder::new(User::new("u-1", Role::Member));
//! builder
//!     .grant(Action::Get, SubjectType::Project)
//!     .deny_if(Action::Delete, SubjectType::Project, Condition::not_owner());
//! let ability = builder.build().unwrap();
//! assert_eq!(ability.rules().len(), 2);
//! ```

use tracing::debug;

use super::models::{Action, User};
use super::policy::AuthzError;
use super::rules::{Condition, Effect, Rule};
use super::subjects::{detect_subject_type, is_valid_pair, SubjectDetector, SubjectType};

// ═══════════════════════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════════════════════

/// Accumulates grant and deny rules, in declaration order, for one principal.
#[derive(Debug, Clone)]
pub struct AbilityBuilder {
    principal: User,
    rules: Vec<Rule>,
}

impl AbilityBuilder {
    pub fn new(principal: User) -> Self {
        Self {
            principal,
            rules: Vec::new(),
        }
    }

    pub fn principal(&self) -> &User {
        &self.principal
    }

    /// Rules declared so far.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn push(&mut self, rule: Rule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    pub fn grant(&mut self, action: Action, subject: SubjectType) -> &mut Self {
        self.push(Rule::new(Effect::Grant, action, subject))
    }

    pub fn grant_if(
        &mut self,
        action: Action,
        subject: SubjectType,
        condition: Condition,
    ) -> &mut Self {
        self.push(Rule::new(Effect::Grant, action, subject).with_condition(condition))
    }

    /// One unconditional grant per action.
    pub fn grant_many(&mut self, actions: &[Action], subject: SubjectType) -> &mut Self {
        for action in actions {
            self.grant(*action, subject);
        }
        self
    }

    pub fn grant_many_if(
        &mut self,
        actions: &[Action],
        subject: SubjectType,
        condition: Condition,
    ) -> &mut Self {
        for action in actions {
            self.grant_if(*action, subject, condition.clone());
        }
        self
    }

    pub fn deny(&mut self, action: Action, subject: SubjectType) -> &mut Self {
        self.push(Rule::new(Effect::Deny, action, subject))
    }

    pub fn deny_if(
        &mut self,
        action: Action,
        subject: SubjectType,
        condition: Condition,
    ) -> &mut Self {
        self.push(Rule::new(Effect::Deny, action, subject).with_condition(condition))
    }

    pub fn deny_many(&mut self, actions: &[Action], subject: SubjectType) -> &mut Self {
        for action in actions {
            self.deny(*action, subject);
        }
        self
    }

    pub fn deny_many_if(
        &mut self,
        actions: &[Action],
        subject: SubjectType,
        condition: Condition,
    ) -> &mut Self {
        for action in actions {
            self.deny_if(*action, subject, condition.clone());
        }
        self
    }

    /// Validate and freeze the rules, discriminating raw subjects by `__typename`.
    pub fn build(self) -> Result<Ability, AuthzError> {
        self.build_with_detector(detect_subject_type)
    }

    /// Validate and freeze the rules with a custom discriminator for raw subjects.
    ///
    /// # Errors
    ///
    /// - [`AuthzError::InvalidActionSubjectPair`] if a rule's action is not
    ///   meaningful on its subject type.
    /// - [`AuthzError::InvalidCondition`] if a condition reads a field the
    ///   subject type does not expose.
    pub fn build_with_detector(self, detector: SubjectDetector) -> Result<Ability, AuthzError> {
        for rule in &self.rules {
            validate_rule(rule)?;
        }

        debug!(
            user_id = %self.principal.id,
            role = %self.principal.role,
            rules = self.rules.len(),
            "Built ability"
        );

        Ok(Ability {
            principal: self.principal,
            rules: self.rules,
            detector,
        })
    }
}

fn validate_rule(rule: &Rule) -> Result<(), AuthzError> {
    if !is_valid_pair(rule.action, rule.subject) {
        return Err(AuthzError::InvalidActionSubjectPair {
            action: rule.action,
            subject: rule.subject,
        });
    }

    if let Some(condition) = &rule.condition {
        if let Some(field) = condition
            .fields()
            .into_iter()
            .find(|field| !rule.subject.has_field(*field))
        {
            return Err(AuthzError::InvalidCondition {
                subject: rule.subject,
                field,
            });
        }
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Ability
// ═══════════════════════════════════════════════════════════════════════════════

/// The immutable, validated rule set of one principal.
///
/// Built per check and dropped afterwards; decisions are made through
/// [`Ability::can`], [`Ability::cannot`], [`Ability::evaluate`] and
/// [`Ability::enforce`].
#[derive(Clone)]
pub struct Ability {
    principal: User,
    rules: Vec<Rule>,
    detector: SubjectDetector,
}

impl std::fmt::Debug for Ability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ability")
            .field("principal", &self.principal)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl Ability {
    pub fn principal(&self) -> &User {
        &self.principal
    }

    /// Rules in declaration order. Decisions report indexes into this slice.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, index: usize) -> Option<&Rule> {
        self.rules.get(index)
    }

    pub fn detector(&self) -> SubjectDetector {
        self.detector
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::Role;
    use crate::rbac::subjects::SubjectField;

    fn builder() -> AbilityBuilder {
        AbilityBuilder::new(User::new("u1", Role::Member))
    }

    #[test]
    fn test_rules_keep_declaration_order() {
        let mut b = builder();
        b.grant(Action::Get, SubjectType::User)
            .grant_many(&[Action::Create, Action::Get], SubjectType::Project)
            .deny_many_if(
                &[Action::Update, Action::Delete],
                SubjectType::Project,
                Condition::not_owner(),
            );
        let ability = b.build().unwrap();

        let summary: Vec<_> = ability
            .rules()
            .iter()
            .map(|r| (r.effect, r.action, r.subject))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Effect::Grant, Action::Get, SubjectType::User),
                (Effect::Grant, Action::Create, SubjectType::Project),
                (Effect::Grant, Action::Get, SubjectType::Project),
                (Effect::Deny, Action::Update, SubjectType::Project),
                (Effect::Deny, Action::Delete, SubjectType::Project),
            ]
        );
        assert!(ability.rule(3).unwrap().is_conditional());
        assert!(ability.rule(5).is_none());
    }

    #[test]
    fn test_invalid_pair_fails_build() {
        let mut b = builder();
        b.grant(Action::TransferOwnership, SubjectType::Project);
        let err = b.build().unwrap_err();
        assert_eq!(
            err,
            AuthzError::InvalidActionSubjectPair {
                action: Action::TransferOwnership,
                subject: SubjectType::Project,
            }
        );
    }

    #[test]
    fn test_all_accepts_only_manage() {
        let mut b = builder();
        b.deny(Action::Delete, SubjectType::All);
        assert!(matches!(
            b.build(),
            Err(AuthzError::InvalidActionSubjectPair { .. })
        ));
    }

    #[test]
    fn test_condition_on_unknown_field_fails_build() {
        let mut b = builder();
        b.grant_if(Action::Get, SubjectType::Billing, Condition::owner());
        assert_eq!(
            b.build().unwrap_err(),
            AuthzError::InvalidCondition {
                subject: SubjectType::Billing,
                field: SubjectField::OwnerId,
            }
        );
    }

    #[test]
    fn test_negated_condition_fields_are_validated() {
        let mut b = builder();
        b.deny_if(
            Action::Manage,
            SubjectType::All,
            Condition::field_equals(SubjectField::Role, "OWNER").negate(),
        );
        assert!(matches!(
            b.build(),
            Err(AuthzError::InvalidCondition { subject: SubjectType::All, .. })
        ));
    }

    #[test]
    fn test_custom_detector_is_kept() {
        fn never(_: &serde_json::Value) -> Option<SubjectType> {
            None
        }
        let ability = builder().build_with_detector(never).unwrap();
        assert_eq!(ability.detector()(&serde_json::json!({ "__typename": "User" })), None);
        assert_eq!(ability.principal().id.as_str(), "u1");
    }
}
