//! Rules and the attribute conditions attached to them.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::models::{Action, User};
use super::subjects::{Subject, SubjectField, SubjectType};

// ═══════════════════════════════════════════════════════════════════════════════
// Effect
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effect {
    Grant,
    Deny,
}

impl Effect {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Grant => "GRANT",
            Self::Deny => "DENY",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Condition
// ═══════════════════════════════════════════════════════════════════════════════

/// A pure predicate over the principal and a subject instance.
///
/// Field conditions are checked against the subject type's visible fields
/// when the ability is built. A field the instance does not carry evaluates
/// as not matching.
#[derive(Clone)]
pub enum Condition {
    /// The field holds the principal's user id.
    FieldIsPrincipal(SubjectField),
    /// The field holds exactly this value.
    FieldEquals(SubjectField, String),
    Not(Box<Condition>),
    /// Escape hatch for checks the field forms cannot express.
    Predicate {
        name: &'static str,
        check: fn(&User, &Subject) -> bool,
    },
}

impl Condition {
    /// `ownerId == principal.id`
    pub fn owner() -> Self {
        Self::FieldIsPrincipal(SubjectField::OwnerId)
    }

    /// `ownerId != principal.id`
    pub fn not_owner() -> Self {
        Self::owner().negate()
    }

    /// `id == principal.id`
    pub fn is_self() -> Self {
        Self::FieldIsPrincipal(SubjectField::Id)
    }

    pub fn field_equals(field: SubjectField, value: impl Into<String>) -> Self {
        Self::FieldEquals(field, value.into())
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    pub fn evaluate(&self, user: &User, subject: &Subject) -> bool {
        match self {
            Self::FieldIsPrincipal(field) => subject.field(*field) == Some(user.id.as_str()),
            Self::FieldEquals(field, value) => subject.field(*field) == Some(value.as_str()),
            Self::Not(inner) => !inner.evaluate(user, subject),
            Self::Predicate { check, .. } => check(user, subject),
        }
    }

    /// Subject fields this condition reads.
    pub fn fields(&self) -> Vec<SubjectField> {
        match self {
            Self::FieldIsPrincipal(field) | Self::FieldEquals(field, _) => vec![*field],
            Self::Not(inner) => inner.fields(),
            Self::Predicate { .. } => Vec::new(),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldIsPrincipal(field) => f.debug_tuple("FieldIsPrincipal").field(field).finish(),
            Self::FieldEquals(field, value) => {
                f.debug_tuple("FieldEquals").field(field).field(value).finish()
            }
            Self::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
            Self::Predicate { name, .. } => {
                f.debug_struct("Predicate").field("name", name).finish_non_exhaustive()
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldIsPrincipal(field) => write!(f, "{} == principal.id", field),
            Self::FieldEquals(field, value) => write!(f, "{} == {:?}", field, value),
            Self::Not(inner) => match inner.as_ref() {
                Self::FieldIsPrincipal(field) => write!(f, "{} != principal.id", field),
                Self::FieldEquals(field, value) => write!(f, "{} != {:?}", field, value),
                other => write!(f, "not ({})", other),
            },
            Self::Predicate { name, .. } => write!(f, "{}(principal, subject)", name),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rule
// ═══════════════════════════════════════════════════════════════════════════════

/// One grant or deny statement. Its position in the ability is its identity.
#[derive(Debug, Clone)]
pub struct Rule {
    pub effect: Effect,
    pub action: Action,
    /// Subject type, or `SubjectType::All` for every type.
    pub subject: SubjectType,
    pub condition: Option<Condition>,
}

impl Rule {
    pub fn new(effect: Effect, action: Action, subject: SubjectType) -> Self {
        Self {
            effect,
            action,
            subject,
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Whether this rule speaks about `action` on subjects of type `tag`,
    /// ignoring its condition. `manage` and `all` act as wildcards.
    pub fn matches(&self, action: Action, tag: SubjectType) -> bool {
        (self.action == action || self.action == Action::Manage)
            && (self.subject == tag || self.subject == SubjectType::All)
    }

    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.effect, self.action, self.subject)?;
        if let Some(condition) = &self.condition {
            write!(f, " if {}", condition)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
