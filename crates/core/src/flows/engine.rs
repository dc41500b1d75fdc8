use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::contact::{ContactEmail, ContactField, ContactForm};
use crate::errors::ValidationError;
use crate::flows::states::{FlowAction, FlowContext, FlowEvent, FlowState, TransitionOutcome};

/// First attempt plus one retry.
pub const MAX_SEND_ATTEMPTS: u8 = 2;

pub trait FlowDefinition {
    fn initial_state(&self) -> FlowState;
    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Slot-filling workflow that ends in a single contact email.
#[derive(Clone, Debug, Default)]
pub struct ContactFlow;

impl FlowDefinition for ContactFlow {
    fn initial_state(&self) -> FlowState {
        FlowState::Answering
    }

    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_contact(current, event, context)
    }
}

#[derive(Clone, Debug)]
pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> FlowState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(audit, "contact_flow.transition_applied")
                        .with_category(AuditCategory::ContactFlow)
                        .with_metadata("from", outcome.from.name())
                        .with_metadata("to", outcome.to.name())
                        .with_metadata("event", event_name(&outcome.event))
                        .with_metadata("email_sent", outcome.context.email_sent.to_string()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(audit, "contact_flow.transition_rejected")
                        .with_category(AuditCategory::ContactFlow)
                        .with_outcome(AuditOutcome::Rejected)
                        .with_metadata("from", current.name())
                        .with_metadata("event", event_name(event))
                        .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<ContactFlow> {
    fn default() -> Self {
        Self::new(ContactFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: FlowState, event: FlowEvent },
    #[error("email dispatch blocked: {reason}")]
    DispatchBlocked { reason: &'static str },
    #[error("contact form incomplete: {0}")]
    IncompleteForm(ValidationError),
}

pub fn event_name(event: &FlowEvent) -> &'static str {
    match event {
        FlowEvent::InformationRequested => "information_requested",
        FlowEvent::ContactRequested { .. } => "contact_requested",
        FlowEvent::FieldsSupplied(_) => "fields_supplied",
        FlowEvent::FieldInvalid { .. } => "field_invalid",
        FlowEvent::Confirmed => "confirmed",
        FlowEvent::Rejected { .. } => "rejected",
        FlowEvent::Cancelled => "cancelled",
        FlowEvent::SendSucceeded => "send_succeeded",
        FlowEvent::SendFailed { .. } => "send_failed",
    }
}

/// A contact intent gets one run. Any dispatch attempt, failed or not, uses it up.
fn contact_available(context: &FlowContext) -> bool {
    !context.email_sent && context.send_attempts == 0
}

fn transition_contact(
    current: &FlowState,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        AbandonSend, AcknowledgeCancellation, AnnounceContactWorkflow, AnswerFromContext,
        AskToRetry, ConfirmDelivery, DeclineRepeatContact, PromptForField, ReportInvalidField,
        ReportSendFailure, RequestConfirmation,
    };
    use FlowEvent::{
        Cancelled, Confirmed, ContactRequested, FieldInvalid, FieldsSupplied,
        InformationRequested, Rejected, SendFailed, SendSucceeded,
    };
    use FlowState::{
        Answering, CollectingField, ConfirmingField, Declined, FailedToSend, ReadyToSend, Sent,
    };

    let invalid =
        || FlowTransitionError::InvalidTransition { state: current.clone(), event: event.clone() };
    let mut next = context.clone();

    let (to, actions) = match (current, event) {
        (Answering | Sent | Declined | FailedToSend, InformationRequested) => {
            (Answering, vec![AnswerFromContext])
        }
        (Answering | Sent | Declined | FailedToSend, ContactRequested { candidates }) => {
            if contact_available(&next) {
                next.form.clear();
                next.form.cache(candidates);
                let (to, mut actions) = collect(ContactField::FullName, &mut next.form);
                actions.insert(0, AnnounceContactWorkflow);
                (to, actions)
            } else {
                (Declined, vec![DeclineRepeatContact])
            }
        }
        (CollectingField { field }, InformationRequested) => (
            current.clone(),
            vec![
                AnswerFromContext,
                PromptForField { field: *field, cached: next.form.pending(*field).map(str::to_string) },
            ],
        ),
        (ConfirmingField { field, proposed }, InformationRequested) => (
            current.clone(),
            vec![AnswerFromContext, RequestConfirmation { field: *field, value: proposed.clone() }],
        ),
        (CollectingField { .. } | ConfirmingField { .. }, Cancelled) => {
            next.form.clear();
            (Answering, vec![AcknowledgeCancellation])
        }
        (CollectingField { field }, FieldsSupplied(values))
        | (CollectingField { field }, ContactRequested { candidates: values }) => {
            next.form.cache(values);
            collect(*field, &mut next.form)
        }
        (CollectingField { field }, FieldInvalid { field: invalid_field, reason }) => (
            current.clone(),
            vec![
                ReportInvalidField { field: *invalid_field, reason: reason.clone() },
                PromptForField { field: *field, cached: next.form.pending(*field).map(str::to_string) },
            ],
        ),
        (CollectingField { field }, Confirmed) => match next.form.take_pending(*field) {
            Some(value) => commit(*field, value, &mut next)?,
            None => (current.clone(), vec![PromptForField { field: *field, cached: None }]),
        },
        (CollectingField { field }, Rejected { corrections }) => {
            next.form.discard_pending(*field);
            next.form.cache(corrections);
            collect(*field, &mut next.form)
        }
        (ConfirmingField { field, proposed }, Confirmed) => {
            commit(*field, proposed.clone(), &mut next)?
        }
        // Values for other fields are cached; the proposed value still awaits an answer.
        (ConfirmingField { field, proposed }, FieldsSupplied(values))
            if !values.iter().any(|value| value.field == *field) =>
        {
            next.form.cache(values);
            (current.clone(), vec![RequestConfirmation { field: *field, value: proposed.clone() }])
        }
        (ConfirmingField { field, .. }, Rejected { corrections })
        | (ConfirmingField { field, .. }, FieldsSupplied(corrections)) => {
            next.form.cache(corrections);
            collect(*field, &mut next.form)
        }
        (ConfirmingField { field, .. }, FieldInvalid { field: invalid_field, reason }) => (
            CollectingField { field: *field },
            vec![
                ReportInvalidField { field: *invalid_field, reason: reason.clone() },
                PromptForField { field: *field, cached: None },
            ],
        ),
        (ConfirmingField { field, proposed }, ContactRequested { .. }) => {
            (current.clone(), vec![RequestConfirmation { field: *field, value: proposed.clone() }])
        }
        (ReadyToSend, Confirmed) => dispatch(&mut next)?,
        (ReadyToSend, Rejected { .. } | Cancelled) => {
            next.form.clear();
            (FailedToSend, vec![AbandonSend])
        }
        (ReadyToSend, FieldsSupplied(_) | ContactRequested { .. }) => (ReadyToSend, vec![AskToRetry]),
        (ReadyToSend, SendSucceeded) => {
            if next.email_sent || next.send_attempts == 0 {
                return Err(invalid());
            }
            next.email_sent = true;
            (Sent, vec![ConfirmDelivery])
        }
        (ReadyToSend, SendFailed { .. }) => {
            if next.send_attempts == 0 {
                return Err(invalid());
            }
            if next.send_attempts >= MAX_SEND_ATTEMPTS {
                next.form.clear();
                (FailedToSend, vec![ReportSendFailure { retry_available: false }])
            } else {
                (ReadyToSend, vec![ReportSendFailure { retry_available: true }])
            }
        }
        _ => return Err(invalid()),
    };

    Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), context: next, actions })
}

fn collect(field: ContactField, form: &mut ContactForm) -> (FlowState, Vec<FlowAction>) {
    match form.take_pending(field) {
        Some(value) => (
            FlowState::ConfirmingField { field, proposed: value.clone() },
            vec![FlowAction::RequestConfirmation { field, value }],
        ),
        None => (
            FlowState::CollectingField { field },
            vec![FlowAction::PromptForField { field, cached: None }],
        ),
    }
}

fn commit(
    field: ContactField,
    value: String,
    context: &mut FlowContext,
) -> Result<(FlowState, Vec<FlowAction>), FlowTransitionError> {
    context.form.commit(field, value);
    match field.next() {
        Some(next_field) => Ok((
            FlowState::CollectingField { field: next_field },
            vec![FlowAction::PromptForField {
                field: next_field,
                cached: context.form.pending(next_field).map(str::to_string),
            }],
        )),
        None => dispatch(context),
    }
}

fn dispatch(
    context: &mut FlowContext,
) -> Result<(FlowState, Vec<FlowAction>), FlowTransitionError> {
    if context.email_sent {
        return Err(FlowTransitionError::DispatchBlocked {
            reason: "an email was already sent in this conversation",
        });
    }
    if context.send_attempts >= MAX_SEND_ATTEMPTS {
        return Err(FlowTransitionError::DispatchBlocked { reason: "send attempts exhausted" });
    }
    let email = ContactEmail::from_form(&context.form).map_err(FlowTransitionError::IncompleteForm)?;
    context.send_attempts += 1;
    Ok((FlowState::ReadyToSend, vec![FlowAction::DispatchEmail(email)]))
}
