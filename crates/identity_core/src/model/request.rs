//! Identify request contract and input validation.
//!
//! # Responsibility
//! - Define the wire shape of an identify request.
//! - Reject caller-correctable input before any store interaction.
//!
//! # Invariants
//! - A validated `Observation` always carries at least one of email/phone.
//! - Empty strings are treated as absent fields.

use crate::model::contact::ContactId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const EMAIL_MAX_LEN: usize = 255;
pub const PHONE_MAX_LEN: usize = 20;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid phone regex"));

/// Input-invalid failures. Never reach the reconciliation core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestValidationError {
    /// Both email and phone number are absent.
    MissingContactInfo,
    InvalidEmail,
    NonNumericPhone,
    EmailTooLong { len: usize },
    PhoneTooLong { len: usize },
}

impl Display for RequestValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingContactInfo => {
                write!(f, "at least one of email or phoneNumber is required")
            }
            Self::InvalidEmail => write!(f, "invalid email format"),
            Self::NonNumericPhone => write!(f, "phone number must be numeric"),
            Self::EmailTooLong { len } => {
                write!(f, "email must be at most {EMAIL_MAX_LEN} characters, got {len}")
            }
            Self::PhoneTooLong { len } => write!(
                f,
                "phone number must be at most {PHONE_MAX_LEN} characters, got {len}"
            ),
        }
    }
}

impl Error for RequestValidationError {}

/// Raw identify request as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    #[serde(default)]
    pub email: Option<String>,
    /// Accepts a JSON string or a JSON integer.
    #[serde(default, deserialize_with = "deserialize_phone")]
    pub phone_number: Option<String>,
}

impl IdentifyRequest {
    pub fn new(email: Option<&str>, phone_number: Option<&str>) -> Self {
        Self {
            email: email.map(str::to_string),
            phone_number: phone_number.map(str::to_string),
        }
    }

    /// Validates the request and returns the observation the core works on.
    ///
    /// # Errors
    /// - `MissingContactInfo` when both fields are absent or empty.
    /// - `EmailTooLong` / `InvalidEmail` for a bad email.
    /// - `PhoneTooLong` / `NonNumericPhone` for a bad phone number.
    pub fn validate(&self) -> Result<Observation, RequestValidationError> {
        let email = non_empty(self.email.as_deref());
        let phone_number = non_empty(self.phone_number.as_deref());

        if email.is_none() && phone_number.is_none() {
            return Err(RequestValidationError::MissingContactInfo);
        }

        if let Some(value) = email {
            let len = value.chars().count();
            if len > EMAIL_MAX_LEN {
                return Err(RequestValidationError::EmailTooLong { len });
            }
            if !EMAIL_RE.is_match(value) {
                return Err(RequestValidationError::InvalidEmail);
            }
        }

        if let Some(value) = phone_number {
            let len = value.chars().count();
            if len > PHONE_MAX_LEN {
                return Err(RequestValidationError::PhoneTooLong { len });
            }
            if !PHONE_RE.is_match(value) {
                return Err(RequestValidationError::NonNumericPhone);
            }
        }

        Ok(Observation {
            email: email.map(str::to_string),
            phone_number: phone_number.map(str::to_string),
        })
    }
}

/// Validated (email, phone) pair handed to the reconciliation core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    email: Option<String>,
    phone_number: Option<String>,
}

impl Observation {
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }
}

/// Unified identity view returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedContact {
    pub primary_contact_id: ContactId,
    /// Primary's own email first, when it has one.
    pub emails: Vec<String>,
    /// Primary's own phone number first, when it has one.
    pub phone_numbers: Vec<String>,
    pub secondary_contact_ids: Vec<ContactId>,
}

/// Response envelope for a successful identify call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyResponse {
    pub contact: ConsolidatedContact,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PhoneInput {
    Text(String),
    Number(u64),
}

fn deserialize_phone<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<PhoneInput>::deserialize(deserializer)?;
    Ok(value.map(|input| match input {
        PhoneInput::Text(text) => text,
        PhoneInput::Number(number) => number.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::{IdentifyRequest, RequestValidationError, EMAIL_MAX_LEN, PHONE_MAX_LEN};

    #[test]
    fn validate_requires_email_or_phone() {
        let err = IdentifyRequest::default().validate().unwrap_err();
        assert_eq!(err, RequestValidationError::MissingContactInfo);

        let err = IdentifyRequest::new(Some(""), Some(""))
            .validate()
            .unwrap_err();
        assert_eq!(err, RequestValidationError::MissingContactInfo);
    }

    #[test]
    fn validate_rejects_malformed_email_and_phone() {
        let err = IdentifyRequest::new(Some("not-an-email"), None)
            .validate()
            .unwrap_err();
        assert_eq!(err, RequestValidationError::InvalidEmail);

        let err = IdentifyRequest::new(None, Some("12-34"))
            .validate()
            .unwrap_err();
        assert_eq!(err, RequestValidationError::NonNumericPhone);
    }

    #[test]
    fn validate_enforces_length_ceilings() {
        let long_email = format!("{}@example.com", "a".repeat(EMAIL_MAX_LEN));
        assert!(matches!(
            IdentifyRequest::new(Some(&long_email), None).validate(),
            Err(RequestValidationError::EmailTooLong { .. })
        ));

        let long_phone = "1".repeat(PHONE_MAX_LEN + 1);
        assert_eq!(
            IdentifyRequest::new(None, Some(&long_phone)).validate(),
            Err(RequestValidationError::PhoneTooLong {
                len: PHONE_MAX_LEN + 1
            })
        );
    }

    #[test]
    fn validate_drops_empty_fields() {
        let observation = IdentifyRequest::new(Some(""), Some("123456"))
            .validate()
            .unwrap();
        assert_eq!(observation.email(), None);
        assert_eq!(observation.phone_number(), Some("123456"));
    }

    #[test]
    fn phone_number_deserializes_from_string_or_integer() {
        let from_text: IdentifyRequest =
            serde_json::from_str(r#"{"email":"a@b.io","phoneNumber":"123"}"#).unwrap();
        assert_eq!(from_text.phone_number.as_deref(), Some("123"));

        let from_number: IdentifyRequest =
            serde_json::from_str(r#"{"phoneNumber":123456}"#).unwrap();
        assert_eq!(from_number.phone_number.as_deref(), Some("123456"));
        assert_eq!(from_number.email, None);

        let explicit_null: IdentifyRequest =
            serde_json::from_str(r#"{"email":"a@b.io","phoneNumber":null}"#).unwrap();
        assert_eq!(explicit_null.phone_number, None);
    }
}
