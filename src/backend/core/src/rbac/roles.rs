//! Role permission table and the authorization facade.
//!
//! Every role maps to a pure rule-building function. The shipped policy:
//!
//! | Role    | Rules                                                                     |
//! |---------|---------------------------------------------------------------------------|
//! | OWNER   | manage all                                                                |
//! | ADMIN   | manage all; not update/transfer_ownership Organization unless owner;      |
//! |         | not update Project unless owner; not create Invite for role OWNER         |
//! | MEMBER  | get User; update own User; create/get Project; update/delete own Project  |
//! | BILLING | manage Billing                                                            |
//!
//! Restrictions are expressed as broad grants followed by conditional
//! denies. Denies win regardless of position.

use std::collections::BTreeSet;
use tracing::{error, instrument};

use super::ability::{Ability, AbilityBuilder};
use super::models::{Action, Role, User, UserId};
use super::policy::AuthzError;
use super::rules::Condition;
use super::subjects::{SubjectField, SubjectType};
use crate::config::PolicyConfig;
use crate::telemetry::metrics::AuthzMetrics;

/// Adds one role's rules for a principal to a builder.
pub type RuleBuilderFn = fn(&User, &mut AbilityBuilder);

// ═══════════════════════════════════════════════════════════════════════════════
// Rule builders
// ═══════════════════════════════════════════════════════════════════════════════

fn owner_permissions(_user: &User, builder: &mut AbilityBuilder) {
    builder.grant(Action::Manage, SubjectType::All);
}

fn admin_permissions(_user: &User, builder: &mut AbilityBuilder) {
    builder
        .grant(Action::Manage, SubjectType::All)
        .deny_many_if(
            &[Action::Update, Action::TransferOwnership],
            SubjectType::Organization,
            Condition::not_owner(),
        )
        .deny_if(Action::Update, SubjectType::Project, Condition::not_owner())
        // Only an owner may mint another owner.
        .deny_if(
            Action::Create,
            SubjectType::Invite,
            Condition::field_equals(SubjectField::Role, Role::Owner.as_str()),
        );
}

fn member_permissions(_user: &User, builder: &mut AbilityBuilder) {
    builder
        .grant(Action::Get, SubjectType::User)
        .grant_if(Action::Update, SubjectType::User, Condition::is_self())
        .grant_many(&[Action::Create, Action::Get], SubjectType::Project)
        .grant_many(&[Action::Update, Action::Delete], SubjectType::Project)
        .deny_many_if(
            &[Action::Update, Action::Delete],
            SubjectType::Project,
            Condition::not_owner(),
        );
}

fn billing_permissions(_user: &User, builder: &mut AbilityBuilder) {
    builder.grant(Action::Manage, SubjectType::Billing);
}

fn builder_for(role: Role) -> RuleBuilderFn {
    match role {
        Role::Owner => owner_permissions,
        Role::Admin => admin_permissions,
        Role::Member => member_permissions,
        Role::Billing => billing_permissions,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Table
// ═══════════════════════════════════════════════════════════════════════════════

/// The roles a deployment authorizes, each with its rule builder.
///
/// The default table enables every role. A deployment may enable a subset;
/// principals holding a disabled role get [`AuthzError::RoleNotConfigured`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePermissionTable {
    enabled: BTreeSet<Role>,
}

impl Default for RolePermissionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RolePermissionTable {
    /// Table with every role enabled.
    pub fn new() -> Self {
        Self::with_roles(Role::all())
    }

    pub fn with_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            enabled: roles.into_iter().collect(),
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self::with_roles(config.enabled_roles.iter().copied())
    }

    /// The same table with `role` disabled.
    pub fn without(mut self, role: Role) -> Self {
        self.enabled.remove(&role);
        self
    }

    pub fn is_configured(&self, role: Role) -> bool {
        self.enabled.contains(&role)
    }

    /// Enabled roles, in declaration order.
    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.enabled.iter().copied()
    }

    /// The rule builder registered for `role`.
    ///
    /// # Errors
    ///
    /// [`AuthzError::RoleNotConfigured`] if the role is not enabled.
    pub fn permissions_for(&self, role: Role) -> Result<RuleBuilderFn, AuthzError> {
        if self.is_configured(role) {
            Ok(builder_for(role))
        } else {
            Err(AuthzError::RoleNotConfigured(role.as_str().to_string()))
        }
    }

    /// Build the ability of `user` from its role's rules.
    ///
    /// Stateless: every call builds a fresh ability, nothing is cached.
    #[instrument(skip(self, user), fields(user_id = %user.id, role = %user.role))]
    pub fn define_ability_for(&self, user: &User) -> Result<Ability, AuthzError> {
        let result = self.permissions_for(user.role).and_then(|build_rules| {
            let mut builder = AbilityBuilder::new(user.clone());
            build_rules(user, &mut builder);
            builder.build()
        });

        match &result {
            Ok(_) => AuthzMetrics::record_ability_built(user.role),
            Err(e) => {
                error!(error = %e, "Failed to define ability");
                AuthzMetrics::record_error(e);
            }
        }
        result
    }

    /// Build an ability from raw claims: a user id and a role name as found
    /// in the session. Unknown role names are [`AuthzError::RoleNotConfigured`].
    pub fn define_ability_for_claims(
        &self,
        user_id: impl Into<UserId>,
        role: &str,
    ) -> Result<Ability, AuthzError> {
        let user = User::from_claims(user_id, role).map_err(|e| {
            error!(role, error = %e, "Rejected principal with unknown role");
            AuthzMetrics::record_error(&e);
            e
        })?;
        self.define_ability_for(&user)
    }
}

/// Build the ability of `user` with the default table.
///
/// ```rust
/// use saas_core::rbac::{define_ability_for, Action, Role, Subject, User};
///
/// let user = User::new("u-1", Role::Member);
/// let ability = define_ability_for(&user).unwrap();
///
/// assert!(ability.can(Action::Update, &Subject::project("p-1", "u-1", "o-1")));
/// assert!(ability.cannot(Action::Update, &Subject::project("p-2", "u-9", "o-1")));
/// ```
pub fn define_ability_for(user: &User) -> Result<Ability, AuthzError> {
    RolePermissionTable::default().define_ability_for(user)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::subjects::{valid_pairs, Subject};

    fn ability_for(role: Role) -> Ability {
        define_ability_for(&User::new("me", role)).unwrap()
    }

    #[test]
    fn test_every_role_builds() {
        let table = RolePermissionTable::new();
        for role in Role::all() {
            assert!(table.permissions_for(role).is_ok());
            assert!(table.define_ability_for(&User::new("me", role)).is_ok(), "{}", role);
        }
    }

    #[test]
    fn test_disabled_role_is_not_configured() {
        let table = RolePermissionTable::new().without(Role::Billing);
        assert!(!table.is_configured(Role::Billing));
        assert_eq!(
            table.define_ability_for(&User::new("me", Role::Billing)).unwrap_err(),
            AuthzError::RoleNotConfigured("BILLING".to_string())
        );
        assert_eq!(table.roles().count(), 3);
    }

    #[test]
    fn test_from_config() {
        let config = PolicyConfig {
            enabled_roles: vec![Role::Member, Role::Owner],
        };
        let table = RolePermissionTable::from_config(&config);
        assert_eq!(table.roles().collect::<Vec<_>>(), vec![Role::Owner, Role::Member]);
    }

    #[test]
    fn test_claims_with_unknown_role() {
        let err = RolePermissionTable::new()
            .define_ability_for_claims("me", "GUEST_X")
            .unwrap_err();
        assert_eq!(err, AuthzError::RoleNotConfigured("GUEST_X".to_string()));
    }

    #[test]
    fn test_owner_manages_everything() {
        let owner = ability_for(Role::Owner);
        for (action, subject) in valid_pairs() {
            assert!(owner.can(action, subject), "{} {}", action, subject);
        }
    }

    #[test]
    fn test_admin_ownership_restrictions() {
        let admin = ability_for(Role::Admin);
        let own_org = Subject::organization("o1", "me");
        let other_org = Subject::organization("o2", "someone");

        assert!(admin.can(Action::Update, &own_org));
        assert!(admin.can(Action::TransferOwnership, &own_org));
        assert!(admin.cannot(Action::Update, &other_org));
        assert!(admin.cannot(Action::TransferOwnership, &other_org));
        assert!(admin.can(Action::Delete, &other_org));

        assert!(admin.can(Action::Update, &Subject::project("p1", "me", "o1")));
        assert!(admin.cannot(Action::Update, &Subject::project("p2", "someone", "o1")));
        assert!(admin.can(Action::Delete, &Subject::project("p2", "someone", "o1")));
    }

    #[test]
    fn test_admin_cannot_invite_owners() {
        let admin = ability_for(Role::Admin);
        assert!(admin.can(Action::Create, &Subject::invite("i1", "o1", Role::Member)));
        assert!(admin.cannot(Action::Create, &Subject::invite("i2", "o1", Role::Owner)));
        assert!(admin.can(Action::Delete, &Subject::invite("i2", "o1", Role::Owner)));
    }

    #[test]
    fn test_member_rules() {
        let member = ability_for(Role::Member);

        assert!(member.can(Action::Get, &Subject::user("someone")));
        assert!(member.can(Action::Update, &Subject::user("me")));
        assert!(member.cannot(Action::Update, &Subject::user("someone")));
        assert!(member.cannot(Action::Delete, &Subject::user("me")));

        let mine = Subject::project("p1", "me", "o1");
        let theirs = Subject::project("p2", "someone", "o1");
        assert!(member.can(Action::Create, SubjectType::Project));
        assert!(member.can(Action::Get, &theirs));
        assert!(member.can(Action::Update, &mine));
        assert!(member.can(Action::Delete, &mine));
        assert!(member.cannot(Action::Update, &theirs));
        assert!(member.cannot(Action::Delete, &theirs));

        assert!(member.cannot(Action::Delete, &Subject::organization("o1", "someone")));
        assert!(member.cannot(Action::Get, &Subject::billing("o1")));
        assert!(member.cannot(Action::Manage, SubjectType::All));
    }

    #[test]
    fn test_billing_rules() {
        let billing = ability_for(Role::Billing);
        assert!(billing.can(Action::Export, &Subject::billing("o1")));
        assert!(billing.can(Action::Manage, SubjectType::Billing));
        assert!(billing.cannot(Action::Get, SubjectType::Project));
        assert!(billing.cannot(Action::Get, &Subject::user("me")));
    }
}
