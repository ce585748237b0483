//! Contact domain model.
//!
//! # Responsibility
//! - Define the stored identity fragment (email and/or phone) with its
//!   precedence and optional link to a primary.
//! - Provide row-level validation for precedence/link consistency.
//!
//! # Invariants
//! - A `Primary` contact has no `linked_id`.
//! - A `Secondary` contact has a `linked_id` and never links to itself.
//! - At least one of `email` / `phone_number` is present.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned contact identifier.
pub type ContactId = i64;

/// Role of a contact inside its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPrecedence {
    /// Anchors a cluster.
    Primary,
    /// Alias attached to a primary.
    Secondary,
}

impl LinkPrecedence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "primary" => Some(Self::Primary),
            "secondary" => Some(Self::Secondary),
            _ => None,
        }
    }
}

/// Row-level validation errors for contacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactValidationError {
    /// Neither email nor phone number is set.
    MissingContactInfo,
    /// Primary row carries a link.
    PrimaryWithLink { linked_id: ContactId },
    /// Secondary row has no link.
    SecondaryWithoutLink,
    /// Secondary row links to itself.
    SelfLink(ContactId),
}

impl Display for ContactValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingContactInfo => {
                write!(f, "contact requires at least one of email or phone number")
            }
            Self::PrimaryWithLink { linked_id } => {
                write!(f, "primary contact must not link to another contact ({linked_id})")
            }
            Self::SecondaryWithoutLink => write!(f, "secondary contact requires linked_id"),
            Self::SelfLink(id) => write!(f, "contact {id} must not link to itself"),
        }
    }
}

impl Error for ContactValidationError {}

/// Stored identity fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: ContactId,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// Set only on secondaries; always points at a primary.
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
    /// Soft delete tombstone (epoch milliseconds).
    pub deleted_at: Option<i64>,
}

impl Contact {
    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Returns the id of the primary this contact currently resolves to.
    ///
    /// For a valid row this is `id` on primaries and `linked_id` on
    /// secondaries. Returns `None` only for an invalid secondary.
    pub fn governing_primary_id(&self) -> Option<ContactId> {
        match self.link_precedence {
            LinkPrecedence::Primary => Some(self.id),
            LinkPrecedence::Secondary => self.linked_id,
        }
    }

    pub fn validate(&self) -> Result<(), ContactValidationError> {
        validate_fields(
            self.email.as_deref(),
            self.phone_number.as_deref(),
            self.link_precedence,
            self.linked_id,
        )?;
        if self.linked_id == Some(self.id) {
            return Err(ContactValidationError::SelfLink(self.id));
        }
        Ok(())
    }
}

/// Insert model for a contact that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
}

impl NewContact {
    /// New cluster anchor.
    pub fn primary(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email,
            phone_number,
            linked_id: None,
            link_precedence: LinkPrecedence::Primary,
        }
    }

    /// New alias attached to `primary_id`.
    pub fn secondary(
        primary_id: ContactId,
        email: Option<String>,
        phone_number: Option<String>,
    ) -> Self {
        Self {
            email,
            phone_number,
            linked_id: Some(primary_id),
            link_precedence: LinkPrecedence::Secondary,
        }
    }

    pub fn validate(&self) -> Result<(), ContactValidationError> {
        validate_fields(
            self.email.as_deref(),
            self.phone_number.as_deref(),
            self.link_precedence,
            self.linked_id,
        )
    }
}

fn validate_fields(
    email: Option<&str>,
    phone_number: Option<&str>,
    precedence: LinkPrecedence,
    linked_id: Option<ContactId>,
) -> Result<(), ContactValidationError> {
    if email.is_none() && phone_number.is_none() {
        return Err(ContactValidationError::MissingContactInfo);
    }
    match (precedence, linked_id) {
        (LinkPrecedence::Primary, Some(linked_id)) => {
            Err(ContactValidationError::PrimaryWithLink { linked_id })
        }
        (LinkPrecedence::Secondary, None) => Err(ContactValidationError::SecondaryWithoutLink),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{Contact, ContactValidationError, LinkPrecedence, NewContact};

    fn contact(id: i64, precedence: LinkPrecedence, linked_id: Option<i64>) -> Contact {
        Contact {
            id,
            email: Some("a@example.com".to_string()),
            phone_number: None,
            linked_id,
            link_precedence: precedence,
            created_at: 0,
            updated_at: 0,
            deleted_at: None,
        }
    }

    #[test]
    fn governing_primary_follows_link_for_secondaries() {
        assert_eq!(
            contact(3, LinkPrecedence::Primary, None).governing_primary_id(),
            Some(3)
        );
        assert_eq!(
            contact(4, LinkPrecedence::Secondary, Some(3)).governing_primary_id(),
            Some(3)
        );
    }

    #[test]
    fn validate_rejects_inconsistent_links() {
        assert_eq!(
            contact(1, LinkPrecedence::Primary, Some(2)).validate(),
            Err(ContactValidationError::PrimaryWithLink { linked_id: 2 })
        );
        assert_eq!(
            contact(1, LinkPrecedence::Secondary, None).validate(),
            Err(ContactValidationError::SecondaryWithoutLink)
        );
        assert_eq!(
            contact(1, LinkPrecedence::Secondary, Some(1)).validate(),
            Err(ContactValidationError::SelfLink(1))
        );
    }

    #[test]
    fn new_contact_requires_email_or_phone() {
        let empty = NewContact::secondary(1, None, None);
        assert_eq!(
            empty.validate(),
            Err(ContactValidationError::MissingContactInfo)
        );
        assert!(NewContact::primary(None, Some("123".to_string()))
            .validate()
            .is_ok());
    }

    #[test]
    fn precedence_text_form_is_stable() {
        for precedence in [LinkPrecedence::Primary, LinkPrecedence::Secondary] {
            assert_eq!(LinkPrecedence::parse(precedence.as_str()), Some(precedence));
        }
        assert_eq!(LinkPrecedence::parse("tertiary"), None);
    }
}
