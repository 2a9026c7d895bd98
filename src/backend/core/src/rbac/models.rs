//! RBAC data models: identifiers, the authenticated principal, roles, and actions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::policy::AuthzError;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Declares a strongly-typed string identifier.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Strongly-typed user identifier.
    UserId
);

string_id!(
    /// Strongly-typed organization identifier.
    OrganizationId
);

string_id!(
    /// Strongly-typed project identifier.
    ProjectId
);

string_id!(
    /// Strongly-typed invite identifier.
    InviteId
);

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// Membership role of a principal within the organization being accessed.
///
/// The set is closed: a role name outside it is a configuration defect and
/// parses to [`AuthzError::RoleNotConfigured`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Owner,
    Admin,
    Member,
    Billing,
}

impl Role {
    /// Wire name of the role.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "OWNER",
            Self::Admin => "ADMIN",
            Self::Member => "MEMBER",
            Self::Billing => "BILLING",
        }
    }

    pub const fn description(&self) -> &'static str {
        match self {
            Self::Owner => "Full control over the organization and everything in it",
            Self::Admin => "Manages the organization; ownership-sensitive changes need ownership",
            Self::Member => "Works on projects; edits only the projects they own",
            Self::Billing => "Manages billing for the organization",
        }
    }

    /// Every role, in declaration order.
    pub const fn all() -> [Role; 4] {
        [Self::Owner, Self::Admin, Self::Member, Self::Billing]
    }

    /// The role whose wire name is exactly `name`.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::all().into_iter().find(|role| role.as_str() == name)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lenient parse for operator input: trims and ignores ASCII case. Claims go
/// through [`User::from_claims`], which is exact.
impl FromStr for Role {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::all()
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| AuthzError::RoleNotConfigured(name.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Action
// ═══════════════════════════════════════════════════════════════════════════════

/// An operation requested on a subject.
///
/// `Manage` is the wildcard action: a rule on `manage` matches every action
/// for its subject type. As a query it only matches `manage` rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Manage,
    Get,
    Create,
    Update,
    Delete,
    TransferOwnership,
    Export,
}

impl Action {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Manage => "manage",
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::TransferOwnership => "transfer_ownership",
            Self::Export => "export",
        }
    }

    pub const fn all() -> [Action; 7] {
        [
            Self::Manage,
            Self::Get,
            Self::Create,
            Self::Update,
            Self::Delete,
            Self::TransferOwnership,
            Self::Export,
        ]
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = AuthzError;

    /// Parses the wire name. `read` is accepted as an alias for `get`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if name == "read" {
            return Ok(Self::Get);
        }
        Self::all()
            .into_iter()
            .find(|action| action.as_str() == name)
            .ok_or(AuthzError::UnknownAction(name))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Principal
// ═══════════════════════════════════════════════════════════════════════════════

/// The authenticated principal a decision is made for.
///
/// Built by callers from already-authenticated data: the user id from the
/// session and the role from the user's membership in the target organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub role: Role,
}

impl User {
    pub fn new(id: impl Into<UserId>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    /// Build a principal from raw claims. The role name must be an exact
    /// wire name; anything else is [`AuthzError::RoleNotConfigured`].
    pub fn from_claims(id: impl Into<UserId>, role: &str) -> Result<Self, AuthzError> {
        let role = Role::from_wire(role)
            .ok_or_else(|| AuthzError::RoleNotConfigured(role.to_string()))?;
        Ok(Self::new(id, role))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_round_trips_wire_names() {
        for role in Role::all() {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
    }

    #[test]
    fn test_unknown_role_is_not_configured() {
        let err = "GUEST_X".parse::<Role>().unwrap_err();
        assert_eq!(err, AuthzError::RoleNotConfigured("GUEST_X".to_string()));
    }

    #[test]
    fn test_role_serde_uses_screaming_case() {
        let json = serde_json::to_string(&Role::Billing).unwrap();
        assert_eq!(json, "\"BILLING\"");
        let role: Role = serde_json::from_str("\"OWNER\"").unwrap();
        assert_eq!(role, Role::Owner);
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("transfer_ownership".parse::<Action>().unwrap(), Action::TransferOwnership);
        assert_eq!("read".parse::<Action>().unwrap(), Action::Get);
        assert_eq!("Delete".parse::<Action>().unwrap(), Action::Delete);
        assert!(matches!(
            "shutdown".parse::<Action>(),
            Err(AuthzError::UnknownAction(name)) if name == "shutdown"
        ));
    }

    #[test]
    fn test_user_from_claims() {
        let user = User::from_claims("user-1", "MEMBER").unwrap();
        assert_eq!(user.id.as_str(), "user-1");
        assert_eq!(user.role, Role::Member);

        assert!(matches!(
            User::from_claims("user-1", "GUEST_X"),
            Err(AuthzError::RoleNotConfigured(_))
        ));
    }

    #[test]
    fn test_claims_role_must_match_wire_name_exactly() {
        for name in ["owner", "Owner", " OWNER", "OWNER "] {
            assert_eq!(
                User::from_claims("user-1", name).unwrap_err(),
                AuthzError::RoleNotConfigured(name.to_string())
            );
        }
        assert_eq!(Role::from_wire("OWNER"), Some(Role::Owner));
        assert_eq!(Role::from_wire("owner"), None);
    }

    #[test]
    fn test_ids_are_transparent_strings() {
        assert_eq!(OrganizationId::from("org-1").to_string(), "org-1");
        assert_eq!(UserId::new("u-1").as_str(), "u-1");
    }
}
