use serde::{Deserialize, Serialize};

use crate::domain::contact::{ContactEmail, ContactField, ContactForm, FieldValue};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FlowState {
    #[default]
    Answering,
    CollectingField { field: ContactField },
    ConfirmingField { field: ContactField, proposed: String },
    ReadyToSend,
    Sent,
    Declined,
    FailedToSend,
}

impl FlowState {
    pub fn is_collecting(&self) -> bool {
        matches!(
            self,
            Self::CollectingField { .. } | Self::ConfirmingField { .. } | Self::ReadyToSend
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Answering => "answering",
            Self::CollectingField { .. } => "collecting_field",
            Self::ConfirmingField { .. } => "confirming_field",
            Self::ReadyToSend => "ready_to_send",
            Self::Sent => "sent",
            Self::Declined => "declined",
            Self::FailedToSend => "failed_to_send",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    InformationRequested,
    ContactRequested { candidates: Vec<FieldValue> },
    FieldsSupplied(Vec<FieldValue>),
    FieldInvalid { field: ContactField, reason: String },
    Confirmed,
    Rejected { corrections: Vec<FieldValue> },
    Cancelled,
    SendSucceeded,
    SendFailed { reason: String },
}

/// Per-session data the transition function reads and rewrites.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowContext {
    pub form: ContactForm,
    pub email_sent: bool,
    pub send_attempts: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    AnswerFromContext,
    AnnounceContactWorkflow,
    PromptForField { field: ContactField, cached: Option<String> },
    RequestConfirmation { field: ContactField, value: String },
    ReportInvalidField { field: ContactField, reason: String },
    DispatchEmail(ContactEmail),
    ConfirmDelivery,
    ReportSendFailure { retry_available: bool },
    AskToRetry,
    AbandonSend,
    DeclineRepeatContact,
    AcknowledgeCancellation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: FlowState,
    pub to: FlowState,
    pub event: FlowEvent,
    pub context: FlowContext,
    pub actions: Vec<FlowAction>,
}

impl TransitionOutcome {
    pub fn dispatched_email(&self) -> Option<&ContactEmail> {
        self.actions.iter().find_map(|action| match action {
            FlowAction::DispatchEmail(email) => Some(email),
            _ => None,
        })
    }
}
