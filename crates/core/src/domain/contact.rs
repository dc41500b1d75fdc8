use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

const MAX_NAME_CHARS: usize = 100;
const MAX_EMAIL_CHARS: usize = 254;
const MAX_SUBJECT_CHARS: usize = 150;
const MAX_MESSAGE_CHARS: usize = 5_000;

/// Contact fields in the order the workflow requests them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactField {
    FullName,
    EmailAddress,
    Subject,
    Message,
}

impl ContactField {
    pub const ORDER: [ContactField; 4] =
        [Self::FullName, Self::EmailAddress, Self::Subject, Self::Message];

    pub fn index(self) -> usize {
        match self {
            Self::FullName => 0,
            Self::EmailAddress => 1,
            Self::Subject => 2,
            Self::Message => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ORDER.get(index).copied()
    }

    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::FullName => "full name",
            Self::EmailAddress => "email address",
            Self::Subject => "subject",
            Self::Message => "message",
        }
    }

    /// Argument name of this field in the `send_email` tool schema.
    pub fn tool_argument(self) -> &'static str {
        match self {
            Self::FullName => "senderName",
            Self::EmailAddress => "senderEmail",
            Self::Subject => "subject",
            Self::Message => "content",
        }
    }

    pub fn from_tool_argument(argument: &str) -> Option<Self> {
        Self::ORDER.into_iter().find(|field| field.tool_argument() == argument)
    }

    pub fn validate(self, raw: &str) -> Result<String, ValidationError> {
        match self {
            Self::FullName => validate_full_name(raw),
            Self::EmailAddress => validate_email(raw),
            Self::Subject => validate_subject(raw),
            Self::Message => validate_message(raw),
        }
    }
}

impl fmt::Display for ContactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    pub field: ContactField,
    pub value: String,
}

impl FieldValue {
    pub fn new(field: ContactField, value: impl Into<String>) -> Self {
        Self { field, value: value.into() }
    }
}

/// Committed values plus values that were offered but still await their own confirmation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactForm {
    committed: BTreeMap<ContactField, String>,
    pending: BTreeMap<ContactField, String>,
}

impl ContactForm {
    pub fn committed(&self, field: ContactField) -> Option<&str> {
        self.committed.get(&field).map(String::as_str)
    }

    pub fn pending(&self, field: ContactField) -> Option<&str> {
        self.pending.get(&field).map(String::as_str)
    }

    pub fn is_committed(&self, field: ContactField) -> bool {
        self.committed.contains_key(&field)
    }

    pub fn committed_fields(&self) -> Vec<ContactField> {
        self.committed.keys().copied().collect()
    }

    pub fn pending_fields(&self) -> Vec<ContactField> {
        self.pending.keys().copied().collect()
    }

    /// Caches offered values; values for fields that are already committed are ignored.
    pub fn cache(&mut self, values: &[FieldValue]) {
        for value in values {
            if !self.is_committed(value.field) {
                self.pending.insert(value.field, value.value.clone());
            }
        }
    }

    pub fn take_pending(&mut self, field: ContactField) -> Option<String> {
        self.pending.remove(&field)
    }

    pub fn discard_pending(&mut self, field: ContactField) {
        self.pending.remove(&field);
    }

    pub fn commit(&mut self, field: ContactField, value: String) {
        self.pending.remove(&field);
        self.committed.insert(field, value);
    }

    pub fn first_missing(&self) -> Option<ContactField> {
        ContactField::ORDER.into_iter().find(|field| !self.is_committed(*field))
    }

    pub fn clear(&mut self) {
        self.committed.clear();
        self.pending.clear();
    }
}

/// Arguments of the `send_email` tool. Only constructible from a fully committed form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactEmail {
    pub subject: String,
    pub content: String,
    pub sender_name: String,
    pub sender_email: String,
}

impl ContactEmail {
    pub fn from_form(form: &ContactForm) -> Result<Self, ValidationError> {
        let take = |field: ContactField| {
            form.committed(field)
                .map(str::to_string)
                .ok_or(ValidationError::MissingField { field })
        };

        Ok(Self {
            subject: take(ContactField::Subject)?,
            content: take(ContactField::Message)?,
            sender_name: take(ContactField::FullName)?,
            sender_email: take(ContactField::EmailAddress)?,
        })
    }
}

pub fn is_valid_email(candidate: &str) -> bool {
    if candidate.len() > MAX_EMAIL_CHARS || candidate.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || local.starts_with('.') || local.ends_with('.')
    {
        return false;
    }

    let labels = domain.split('.').collect::<Vec<_>>();
    if labels.len() < 2 {
        return false;
    }
    let labels_valid = labels.iter().all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
    });
    let tld_valid = labels
        .last()
        .map(|tld| tld.len() >= 2 && tld.chars().all(|ch| ch.is_ascii_alphabetic()))
        .unwrap_or(false);

    labels_valid && tld_valid
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn validate_full_name(raw: &str) -> Result<String, ValidationError> {
    let field = ContactField::FullName;
    let value = collapse_whitespace(raw);
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if value.chars().count() > MAX_NAME_CHARS {
        return Err(ValidationError::TooLong { field, max_chars: MAX_NAME_CHARS });
    }
    if value.contains('@') || !value.chars().any(char::is_alphabetic) {
        return Err(ValidationError::NotAName { value });
    }
    Ok(value)
}

fn validate_email(raw: &str) -> Result<String, ValidationError> {
    let value = raw.trim().trim_start_matches('<').trim_end_matches('>').to_ascii_lowercase();
    if value.is_empty() {
        return Err(ValidationError::Empty { field: ContactField::EmailAddress });
    }
    if !is_valid_email(&value) {
        return Err(ValidationError::InvalidEmail { value: raw.trim().to_string() });
    }
    Ok(value)
}

fn validate_subject(raw: &str) -> Result<String, ValidationError> {
    let field = ContactField::Subject;
    if raw.trim().lines().count() > 1 {
        return Err(ValidationError::MultiLine { field });
    }
    let value = collapse_whitespace(raw);
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if value.chars().count() > MAX_SUBJECT_CHARS {
        return Err(ValidationError::TooLong { field, max_chars: MAX_SUBJECT_CHARS });
    }
    Ok(value)
}

fn validate_message(raw: &str) -> Result<String, ValidationError> {
    let field = ContactField::Message;
    let value = raw.trim().to_string();
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if value.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ValidationError::TooLong { field, max_chars: MAX_MESSAGE_CHARS });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::{is_valid_email, ContactEmail, ContactField, ContactForm, FieldValue};
    use crate::errors::ValidationError;

    #[test]
    fn fields_advance_in_request_order() {
        assert_eq!(ContactField::FullName.next(), Some(ContactField::EmailAddress));
        assert_eq!(ContactField::EmailAddress.next(), Some(ContactField::Subject));
        assert_eq!(ContactField::Subject.next(), Some(ContactField::Message));
        assert_eq!(ContactField::Message.next(), None);
        assert_eq!(ContactField::from_tool_argument("senderEmail"), Some(ContactField::EmailAddress));
        assert_eq!(ContactField::from_tool_argument("cc"), None);
    }

    #[test]
    fn email_syntax_check() {
        assert!(is_valid_email("jane@x.com"));
        assert!(is_valid_email("first.last+tag@mail.example.org"));
        assert!(!is_valid_email("jane@x"));
        assert!(!is_valid_email("jane.x.com"));
        assert!(!is_valid_email("@x.com"));
        assert!(!is_valid_email("jane@@x.com"));
        assert!(!is_valid_email("jane doe@x.com"));
        assert!(!is_valid_email("jane@x.c"));
        assert!(!is_valid_email("jane@-x.com"));
    }

    #[test]
    fn field_validation_normalizes_and_rejects() {
        assert_eq!(ContactField::FullName.validate("  Jane   Doe "), Ok("Jane Doe".to_string()));
        assert_eq!(
            ContactField::EmailAddress.validate("<Jane@X.com>"),
            Ok("jane@x.com".to_string())
        );
        assert!(matches!(
            ContactField::EmailAddress.validate("jane@"),
            Err(ValidationError::InvalidEmail { .. })
        ));
        assert!(matches!(
            ContactField::FullName.validate("12345"),
            Err(ValidationError::NotAName { .. })
        ));
        assert!(matches!(
            ContactField::Subject.validate("line one\nline two"),
            Err(ValidationError::MultiLine { field: ContactField::Subject })
        ));
        assert!(matches!(
            ContactField::Message.validate("   "),
            Err(ValidationError::Empty { field: ContactField::Message })
        ));
    }

    #[test]
    fn cache_never_overwrites_committed_values() {
        let mut form = ContactForm::default();
        form.commit(ContactField::FullName, "Jane Doe".to_string());
        form.cache(&[
            FieldValue::new(ContactField::FullName, "Bob"),
            FieldValue::new(ContactField::EmailAddress, "jane@x.com"),
        ]);

        assert_eq!(form.committed(ContactField::FullName), Some("Jane Doe"));
        assert_eq!(form.pending(ContactField::FullName), None);
        assert_eq!(form.pending(ContactField::EmailAddress), Some("jane@x.com"));
        assert_eq!(form.first_missing(), Some(ContactField::EmailAddress));
    }

    #[test]
    fn email_requires_every_committed_field() {
        let mut form = ContactForm::default();
        form.commit(ContactField::FullName, "Jane Doe".to_string());
        form.commit(ContactField::EmailAddress, "jane@x.com".to_string());
        form.commit(ContactField::Subject, "Hello".to_string());
        form.cache(&[FieldValue::new(ContactField::Message, "Hi!")]);

        assert_eq!(
            ContactEmail::from_form(&form),
            Err(ValidationError::MissingField { field: ContactField::Message })
        );

        form.commit(ContactField::Message, "Hi!".to_string());
        let email = ContactEmail::from_form(&form).expect("complete form");
        assert_eq!(email.sender_name, "Jane Doe");
        assert_eq!(email.sender_email, "jane@x.com");
        assert_eq!(email.subject, "Hello");
        assert_eq!(email.content, "Hi!");

        let json = serde_json::to_value(&email).expect("serialize");
        assert_eq!(json["senderEmail"], "jane@x.com");
        assert_eq!(json["content"], "Hi!");
    }
}
