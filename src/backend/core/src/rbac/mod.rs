//! Role-based, attribute-aware authorization for a multi-tenant SaaS.
//!
//! This module provides:
//! - **Models**: principals, roles, actions and typed identifiers
//! - **Subjects**: the closed set of resource kinds and their discriminator
//! - **Rules**: grant/deny statements with ownership and field conditions
//! - **Abilities**: per-principal rule sets, validated when built
//! - **Policy**: the deny-overrides, closed-world evaluator
//! - **Roles**: the role permission table and `define_ability_for`
//!
//! # Usage
//!
//! ```rust
//! use saas_core::rbac::{define_ability_for, Action, Role, Subject, User};
//!
//! let user = User::new("user-1", Role::Admin);
//! let ability = define_ability_for(&user).unwrap();
//!
//! let org = Subject::organization("org-1", "user-2");
//! assert!(ability.can(Action::Delete, &org));
//! assert!(ability.cannot(Action::TransferOwnership, &org));
//! ```

pub mod ability;
pub mod models;
pub mod policy;
pub mod roles;
pub mod rules;
pub mod subjects;

pub use ability::{Ability, AbilityBuilder};
pub use models::{Action, InviteId, OrganizationId, ProjectId, Role, User, UserId};
pub use policy::{evaluate, AuthzError, DenyReason, PolicyDecision, SubjectRef};
pub use roles::{define_ability_for, RolePermissionTable, RuleBuilderFn};
pub use rules::{Condition, Effect, Rule};
pub use subjects::{
    detect_subject_type, is_valid_pair, valid_pairs, Billing, Invite, Organization, Project,
    Subject, SubjectDetector, SubjectField, SubjectType, UserAccount, TYPENAME_FIELD,
};
