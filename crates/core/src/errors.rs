use std::path::PathBuf;

use thiserror::Error;

use crate::domain::contact::ContactField;
use crate::flows::FlowTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IngestionError {
    #[error("could not read document source `{path}`: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },
    #[error("memory service rejected `{document}` (status {status}): {message}")]
    Rejected { document: String, status: u16, message: String },
    #[error("memory service unreachable while uploading `{document}`: {message}")]
    Transport { document: String, message: String },
    #[error("invalid document manifest: {0}")]
    Manifest(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("tool name must not be empty")]
    EmptyToolName,
    #[error("tool name `{0}` must start with a letter and contain only [A-Za-z0-9_]")]
    InvalidToolName(String),
    #[error("tool `{tool}` is missing a description")]
    MissingDescription { tool: String },
    #[error("tool `{tool}` declares no parameters")]
    NoParameters { tool: String },
    #[error("tool `{tool}` requires `{field}` which is not declared in its parameters")]
    RequiredFieldNotDeclared { tool: String, field: String },
    #[error("tool `{tool}` lists `{field}` as required more than once")]
    DuplicateRequiredField { tool: String, field: String },
    #[error("tool `{0}` is declared more than once")]
    DuplicateTool(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("memory retrieval timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("memory service unavailable: {0}")]
    Unavailable(String),
    #[error("memory service rejected the query (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("memory service returned a malformed response: {0}")]
    MalformedResponse(String),
    #[error("memory `{0}` does not exist")]
    UnknownMemory(String),
}

impl RetrievalError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Unavailable(_) => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::MalformedResponse(_) | Self::UnknownMemory(_) => false,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LanguageCapabilityError {
    #[error("language model timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("language model unavailable: {0}")]
    Unavailable(String),
    #[error("language model rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("language model returned a malformed response: {0}")]
    MalformedResponse(String),
}

impl LanguageCapabilityError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Unavailable(_) => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::MalformedResponse(_) => false,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolInvocationError {
    #[error("tool `{0}` is not registered")]
    UnknownTool(String),
    #[error("invalid arguments for tool `{tool}`: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("tool invocation timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("email delivery failed: {0}")]
    Delivery(String),
    #[error("email service rejected the message (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("email delivery is not configured")]
    NotConfigured,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("the {field} must not be empty")]
    Empty { field: ContactField },
    #[error("the {field} must be at most {max_chars} characters")]
    TooLong { field: ContactField, max_chars: usize },
    #[error("the {field} must fit on a single line")]
    MultiLine { field: ContactField },
    #[error("`{value}` is not a valid email address")]
    InvalidEmail { value: String },
    #[error("`{value}` does not look like a name")]
    NotAName { value: String },
    #[error("the {field} has not been confirmed yet")]
    MissingField { field: ContactField },
}

impl ValidationError {
    pub fn field(&self) -> ContactField {
        match self {
            Self::Empty { field }
            | Self::TooLong { field, .. }
            | Self::MultiLine { field }
            | Self::MissingField { field } => *field,
            Self::InvalidEmail { .. } => ContactField::EmailAddress,
            Self::NotAName { .. } => ContactField::FullName,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("pipe host rejected `{pipe}` (status {status}): {message}")]
    Rejected { pipe: String, status: u16, message: String },
    #[error("pipe host unreachable: {0}")]
    Transport(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Ingestion(#[from] IngestionError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    LanguageCapability(#[from] LanguageCapabilityError),
    #[error(transparent)]
    ToolInvocation(#[from] ToolInvocationError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested conversation does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(_) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id: unassigned(),
            },
            ApplicationError::Ingestion(IngestionError::SourceUnreadable { .. })
            | ApplicationError::Ingestion(IngestionError::Manifest(_)) => {
                Self::BadRequest { message: value.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Ingestion(_)
            | ApplicationError::Retrieval(_)
            | ApplicationError::LanguageCapability(_)
            | ApplicationError::ToolInvocation(_)
            | ApplicationError::Publish(PublishError::Rejected { .. })
            | ApplicationError::Publish(PublishError::Transport(_)) => {
                Self::ServiceUnavailable { message: value.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Schema(_)
            | ApplicationError::Publish(PublishError::Schema(_))
            | ApplicationError::Configuration(_) => {
                Self::Internal { message: value.to_string(), correlation_id: unassigned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::contact::ContactField;
    use crate::errors::{
        ApplicationError, DomainError, InterfaceError, LanguageCapabilityError, RetrievalError,
        SchemaError, ValidationError,
    };

    #[test]
    fn validation_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::from(ValidationError::Empty {
            field: ContactField::Subject,
        }))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn capability_errors_map_to_service_unavailable() {
        let interface = ApplicationError::from(LanguageCapabilityError::Timeout { after_ms: 30_000 })
            .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn schema_error_maps_to_internal() {
        let interface =
            ApplicationError::from(SchemaError::EmptyToolName).into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn retryability_follows_status_class() {
        assert!(RetrievalError::Timeout { after_ms: 10 }.is_retryable());
        assert!(RetrievalError::Rejected { status: 503, message: String::new() }.is_retryable());
        assert!(!RetrievalError::Rejected { status: 401, message: String::new() }.is_retryable());
        assert!(LanguageCapabilityError::Rejected { status: 429, message: String::new() }
            .is_retryable());
        assert!(!LanguageCapabilityError::MalformedResponse("eof".to_string()).is_retryable());
    }

    #[test]
    fn validation_errors_report_their_field() {
        assert_eq!(
            ValidationError::InvalidEmail { value: "nope".to_string() }.field(),
            ContactField::EmailAddress
        );
        assert_eq!(
            ValidationError::TooLong { field: ContactField::Message, max_chars: 10 }.field(),
            ContactField::Message
        );
    }
}
