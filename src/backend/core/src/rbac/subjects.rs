//! Subject registry: the closed set of resource kinds the engine authorizes.
//!
//! For every kind this module declares the discriminator value, the fields
//! visible to rule conditions, and which actions are meaningful on it. The
//! valid action/subject table is the single place a new kind or action is
//! registered; rules and queries outside it are rejected.
//!
//! On the wire a subject instance carries its kind in a `__typename` field,
//! next to (never inside) its data:
//!
//! ```json
//! { "__typename": "Project", "id": "p-1", "ownerId": "u-1", "organizationId": "o-1" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::models::{Action, InviteId, OrganizationId, ProjectId, Role, UserId};
use super::policy::AuthzError;

/// Name of the discriminator field on raw subject instances.
pub const TYPENAME_FIELD: &str = "__typename";

/// Resolves the kind of a raw subject instance.
pub type SubjectDetector = fn(&Value) -> Option<SubjectType>;

// ═══════════════════════════════════════════════════════════════════════════════
// Subject types
// ═══════════════════════════════════════════════════════════════════════════════

/// Discriminator of a subject. `All` is the wildcard used by rules and
/// type-level queries; no instance is ever of type `All`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubjectType {
    Organization,
    Project,
    Billing,
    Invite,
    User,
    #[serde(rename = "all")]
    All,
}

impl SubjectType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "Organization",
            Self::Project => "Project",
            Self::Billing => "Billing",
            Self::Invite => "Invite",
            Self::User => "User",
            Self::All => "all",
        }
    }

    /// Every discriminator, wildcard last.
    pub const fn all() -> [SubjectType; 6] {
        [
            Self::Organization,
            Self::Project,
            Self::Billing,
            Self::Invite,
            Self::User,
            Self::All,
        ]
    }

    /// Fields of this kind that conditions may inspect.
    pub const fn fields(&self) -> &'static [SubjectField] {
        match self {
            Self::Organization => &[SubjectField::Id, SubjectField::OwnerId],
            Self::Project => &[
                SubjectField::Id,
                SubjectField::OwnerId,
                SubjectField::OrganizationId,
            ],
            Self::Billing => &[SubjectField::OrganizationId],
            Self::Invite => &[
                SubjectField::Id,
                SubjectField::OrganizationId,
                SubjectField::Role,
            ],
            Self::User => &[SubjectField::Id],
            Self::All => &[],
        }
    }

    /// Actions that may be granted, denied, or queried on this kind.
    pub const fn valid_actions(&self) -> &'static [Action] {
        use Action::*;
        match self {
            Self::Project => &[Manage, Get, Create, Update, Delete],
            Self::User => &[Manage, Get, Update, Delete],
            Self::Organization => &[Manage, Create, Update, Delete, TransferOwnership],
            Self::Billing => &[Manage, Get, Export],
            Self::Invite => &[Manage, Get, Create, Delete],
            Self::All => &[Manage],
        }
    }

    pub fn has_field(&self, field: SubjectField) -> bool {
        self.fields().contains(&field)
    }

    pub fn allows(&self, action: Action) -> bool {
        self.valid_actions().contains(&action)
    }

    /// The concrete kind whose discriminator is exactly `name`.
    ///
    /// Unlike `FromStr` this is case-sensitive and never yields the wildcard.
    pub fn from_typename(name: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|kind| *kind != Self::All && kind.as_str() == name)
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lenient parse for operator input: trims and ignores ASCII case.
impl FromStr for SubjectType {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::all()
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| AuthzError::UnknownSubjectType(name.to_string()))
    }
}

/// Returns true if `(action, subject)` is in the valid action/subject table.
pub fn is_valid_pair(action: Action, subject: SubjectType) -> bool {
    subject.allows(action)
}

/// Every valid `(action, subject)` combination, grouped by subject.
pub fn valid_pairs() -> impl Iterator<Item = (Action, SubjectType)> {
    SubjectType::all().into_iter().flat_map(|subject| {
        subject
            .valid_actions()
            .iter()
            .map(move |action| (*action, subject))
    })
}

/// Default discriminator: reads `__typename` from a raw instance.
///
/// Returns `None` when the field is missing, not a string, names an unknown
/// kind, or names the wildcard.
pub fn detect_subject_type(value: &Value) -> Option<SubjectType> {
    SubjectType::from_typename(value.get(TYPENAME_FIELD)?.as_str()?)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Fields
// ═══════════════════════════════════════════════════════════════════════════════

/// A subject attribute that conditions can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubjectField {
    Id,
    OwnerId,
    OrganizationId,
    Role,
}

impl SubjectField {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::OwnerId => "ownerId",
            Self::OrganizationId => "organizationId",
            Self::Role => "role",
        }
    }
}

impl fmt::Display for SubjectField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Subject instances
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: OrganizationId,
    pub owner_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub owner_id: UserId,
    pub organization_id: OrganizationId,
}

/// The billing account of an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Billing {
    pub organization_id: OrganizationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    pub id: InviteId,
    pub organization_id: OrganizationId,
    /// Role the invitee will receive.
    pub role: Role,
}

/// A user account as the target of self-management actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: UserId,
}

/// A concrete resource instance, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum Subject {
    Organization(Organization),
    Project(Project),
    Billing(Billing),
    Invite(Invite),
    User(UserAccount),
}

impl Subject {
    pub fn organization(id: impl Into<OrganizationId>, owner_id: impl Into<UserId>) -> Self {
        Self::Organization(Organization {
            id: id.into(),
            owner_id: owner_id.into(),
        })
    }

    pub fn project(
        id: impl Into<ProjectId>,
        owner_id: impl Into<UserId>,
        organization_id: impl Into<OrganizationId>,
    ) -> Self {
        Self::Project(Project {
            id: id.into(),
            owner_id: owner_id.into(),
            organization_id: organization_id.into(),
        })
    }

    pub fn billing(organization_id: impl Into<OrganizationId>) -> Self {
        Self::Billing(Billing {
            organization_id: organization_id.into(),
        })
    }

    pub fn invite(
        id: impl Into<InviteId>,
        organization_id: impl Into<OrganizationId>,
        role: Role,
    ) -> Self {
        Self::Invite(Invite {
            id: id.into(),
            organization_id: organization_id.into(),
            role,
        })
    }

    pub fn user(id: impl Into<UserId>) -> Self {
        Self::User(UserAccount { id: id.into() })
    }

    /// The discriminator of this instance. Never `All`.
    pub fn subject_type(&self) -> SubjectType {
        match self {
            Self::Organization(_) => SubjectType::Organization,
            Self::Project(_) => SubjectType::Project,
            Self::Billing(_) => SubjectType::Billing,
            Self::Invite(_) => SubjectType::Invite,
            Self::User(_) => SubjectType::User,
        }
    }

    /// Value of a condition-visible field, or `None` if this kind lacks it.
    pub fn field(&self, field: SubjectField) -> Option<&str> {
        match (self, field) {
            (Self::Organization(org), SubjectField::Id) => Some(org.id.as_str()),
            (Self::Organization(org), SubjectField::OwnerId) => Some(org.owner_id.as_str()),
            (Self::Project(project), SubjectField::Id) => Some(project.id.as_str()),
            (Self::Project(project), SubjectField::OwnerId) => Some(project.owner_id.as_str()),
            (Self::Project(project), SubjectField::OrganizationId) => {
                Some(project.organization_id.as_str())
            }
            (Self::Billing(billing), SubjectField::OrganizationId) => {
                Some(billing.organization_id.as_str())
            }
            (Self::Invite(invite), SubjectField::Id) => Some(invite.id.as_str()),
            (Self::Invite(invite), SubjectField::OrganizationId) => {
                Some(invite.organization_id.as_str())
            }
            (Self::Invite(invite), SubjectField::Role) => Some(invite.role.as_str()),
            (Self::User(account), SubjectField::Id) => Some(account.id.as_str()),
            _ => None,
        }
    }

    /// Owner of the instance, for kinds that have one.
    pub fn owner_id(&self) -> Option<&UserId> {
        match self {
            Self::Organization(org) => Some(&org.owner_id),
            Self::Project(project) => Some(&project.owner_id),
            Self::Billing(_) | Self::Invite(_) | Self::User(_) => None,
        }
    }

    /// Discriminate and decode a raw instance with the given detector.
    ///
    /// The detector decides the kind; the payload is then decoded as that
    /// kind. Both an undetectable kind and a payload that does not fit the
    /// detected kind are discrimination failures.
    pub fn from_json_with(value: &Value, detector: SubjectDetector) -> Result<Self, AuthzError> {
        let kind = detector(value).ok_or_else(|| {
            AuthzError::SubjectDiscriminationFailure(match value.get(TYPENAME_FIELD) {
                Some(tag) => format!("unrecognized {} {}", TYPENAME_FIELD, tag),
                None => format!("missing {}", TYPENAME_FIELD),
            })
        })?;

        let decoded = match kind {
            SubjectType::Organization => serde_json::from_value(value.clone()).map(Self::Organization),
            SubjectType::Project => serde_json::from_value(value.clone()).map(Self::Project),
            SubjectType::Billing => serde_json::from_value(value.clone()).map(Self::Billing),
            SubjectType::Invite => serde_json::from_value(value.clone()).map(Self::Invite),
            SubjectType::User => serde_json::from_value(value.clone()).map(Self::User),
            SubjectType::All => {
                return Err(AuthzError::SubjectDiscriminationFailure(
                    "the wildcard `all` has no instances".to_string(),
                ))
            }
        };

        decoded.map_err(|e| {
            AuthzError::SubjectDiscriminationFailure(format!("payload is not a valid {}: {}", kind, e))
        })
    }

    /// Discriminate and decode a raw instance by its `__typename`.
    pub fn from_json(value: &Value) -> Result<Self, AuthzError> {
        Self::from_json_with(value, detect_subject_type)
    }
}

impl From<Organization> for Subject {
    fn from(value: Organization) -> Self {
        Self::Organization(value)
    }
}

impl From<Project> for Subject {
    fn from(value: Project) -> Self {
        Self::Project(value)
    }
}

impl From<Billing> for Subject {
    fn from(value: Billing) -> Self {
        Self::Billing(value)
    }
}

impl From<Invite> for Subject {
    fn from(value: Invite) -> Self {
        Self::Invite(value)
    }
}

impl From<UserAccount> for Subject {
    fn from(value: UserAccount) -> Self {
        Self::User(value)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_instance_resolves_to_one_concrete_type() {
        let subjects = [
            Subject::organization("o1", "u1"),
            Subject::project("p1", "u1", "o1"),
            Subject::billing("o1"),
            Subject::invite("i1", "o1", Role::Member),
            Subject::user("u1"),
        ];
        for subject in &subjects {
            assert_ne!(subject.subject_type(), SubjectType::All);
        }
    }

    #[test]
    fn test_field_visibility_matches_registry() {
        let subjects = [
            Subject::organization("o1", "u1"),
            Subject::project("p1", "u1", "o1"),
            Subject::billing("o1"),
            Subject::invite("i1", "o1", Role::Admin),
            Subject::user("u1"),
        ];
        let every_field = [
            SubjectField::Id,
            SubjectField::OwnerId,
            SubjectField::OrganizationId,
            SubjectField::Role,
        ];
        for subject in &subjects {
            let kind = subject.subject_type();
            for field in every_field {
                assert_eq!(
                    subject.field(field).is_some(),
                    kind.has_field(field),
                    "{}.{}",
                    kind,
                    field
                );
            }
        }
    }

    #[test]
    fn test_valid_pairs() {
        assert!(is_valid_pair(Action::TransferOwnership, SubjectType::Organization));
        assert!(is_valid_pair(Action::Export, SubjectType::Billing));
        assert!(is_valid_pair(Action::Manage, SubjectType::All));
        assert!(!is_valid_pair(Action::TransferOwnership, SubjectType::Project));
        assert!(!is_valid_pair(Action::Get, SubjectType::All));
        assert!(!is_valid_pair(Action::Create, SubjectType::User));

        let pairs: Vec<_> = valid_pairs().collect();
        assert_eq!(pairs.len(), 5 + 4 + 5 + 3 + 4 + 1);
        assert!(pairs.iter().all(|(action, subject)| subject.allows(*action)));
    }

    #[test]
    fn test_manage_is_valid_everywhere() {
        for kind in SubjectType::all() {
            assert!(kind.allows(Action::Manage), "{}", kind);
        }
    }

    #[test]
    fn test_detect_subject_type() {
        assert_eq!(
            detect_subject_type(&json!({ "__typename": "Project", "id": "p1" })),
            Some(SubjectType::Project)
        );
        assert_eq!(detect_subject_type(&json!({ "id": "p1" })), None);
        assert_eq!(detect_subject_type(&json!({ "__typename": "Folder" })), None);
        assert_eq!(detect_subject_type(&json!({ "__typename": "all" })), None);
        assert_eq!(detect_subject_type(&json!({ "__typename": 7 })), None);
        assert_eq!(detect_subject_type(&json!({ "__typename": "organization" })), None);
        assert_eq!(detect_subject_type(&json!({ "__typename": " Project" })), None);
    }

    #[test]
    fn test_subject_json_round_trip_keeps_discriminator_out_of_data() {
        let subject = Subject::project("p1", "u1", "o1");
        let value = serde_json::to_value(&subject).unwrap();
        assert_eq!(
            value,
            json!({
                "__typename": "Project",
                "id": "p1",
                "ownerId": "u1",
                "organizationId": "o1",
            })
        );
        assert_eq!(Subject::from_json(&value).unwrap(), subject);
    }

    #[test]
    fn test_from_json_failures() {
        let missing = Subject::from_json(&json!({ "id": "o1", "ownerId": "u1" }));
        assert!(matches!(missing, Err(AuthzError::SubjectDiscriminationFailure(_))));

        let malformed = Subject::from_json(&json!({ "__typename": "Organization", "id": "o1" }));
        assert!(matches!(malformed, Err(AuthzError::SubjectDiscriminationFailure(_))));
    }

    #[test]
    fn test_from_json_with_custom_detector() {
        fn always_billing(_: &Value) -> Option<SubjectType> {
            Some(SubjectType::Billing)
        }
        let subject =
            Subject::from_json_with(&json!({ "organizationId": "o1" }), always_billing).unwrap();
        assert_eq!(subject, Subject::billing("o1"));
    }

    #[test]
    fn test_owner_id() {
        assert_eq!(
            Subject::organization("o1", "u1").owner_id(),
            Some(&UserId::new("u1"))
        );
        assert_eq!(Subject::billing("o1").owner_id(), None);
    }
}
