use serde::{Deserialize, Serialize};

use advocado_core::domain::contact::ContactField;
use advocado_core::flows::{FlowAction, FlowContext};
use advocado_core::policy::Persona;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Answered,
    Unavailable,
    Collecting,
    Sent,
    SendFailed,
    Declined,
    Cancelled,
    /// Transient failure; the session did not move and the visitor may ask again.
    Retryable,
}

/// Fixed wording for every contact-flow action.
#[derive(Clone, Debug)]
pub struct ReplyRenderer {
    recipient: String,
    site_url: String,
}

impl ReplyRenderer {
    pub fn new(persona: &Persona) -> Self {
        Self { recipient: persona.short_name.clone(), site_url: persona.site_url.clone() }
    }

    pub fn render(&self, action: &FlowAction, context: &FlowContext) -> Option<String> {
        let recipient = &self.recipient;
        let message = match action {
            FlowAction::AnswerFromContext | FlowAction::DispatchEmail(_) => return None,
            FlowAction::AnnounceContactWorkflow => format!(
                "I can help you get in touch with {recipient}. I'll ask for your name, email address, \
                 a subject and your message, one at a time, and check each with you before sending."
            ),
            FlowAction::PromptForField { field, cached: Some(value) } => {
                format!("I have your {} as \"{value}\". Is that correct?", field.label())
            }
            FlowAction::PromptForField { field, cached: None } => self.prompt(*field),
            FlowAction::RequestConfirmation { field, value } => {
                format!("Just to confirm, your {} is \"{value}\"?", field.label())
            }
            FlowAction::ReportInvalidField { reason, .. } => {
                format!("{}.", capitalize(reason.trim_end_matches('.')))
            }
            FlowAction::ConfirmDelivery => format!(
                "Your message has been sent to {recipient}. Thank you for reaching out!"
            ),
            FlowAction::ReportSendFailure { retry_available: true } => {
                "Sorry, the email could not be sent. Would you like me to try once more?".to_string()
            }
            FlowAction::ReportSendFailure { retry_available: false } => format!(
                "Sorry, the email still could not be sent. Please try again later or reach {recipient} \
                 through {}.",
                self.site_url
            ),
            FlowAction::AskToRetry => {
                "Should I try sending your email once more? Reply yes to retry or no to stop.".to_string()
            }
            FlowAction::AbandonSend => format!(
                "Okay, I won't try again and I've discarded your contact details. You can reach \
                 {recipient} through {}.",
                self.site_url
            ),
            FlowAction::DeclineRepeatContact if context.email_sent => format!(
                "A message has already been sent to {recipient} in this conversation, and only one \
                 email can be sent per conversation. I'm happy to keep answering questions about {recipient}."
            ),
            FlowAction::DeclineRepeatContact => format!(
                "I can't send another email in this conversation. Please reach {recipient} through {}.",
                self.site_url
            ),
            FlowAction::AcknowledgeCancellation => format!(
                "No problem, I've discarded those contact details. What else would you like to know \
                 about {recipient}?"
            ),
        };
        Some(message)
    }

    fn prompt(&self, field: ContactField) -> String {
        match field {
            ContactField::FullName => "What is your full name?".to_string(),
            ContactField::EmailAddress => "What email address should the reply go to?".to_string(),
            ContactField::Subject => "What should the subject of the email be?".to_string(),
            ContactField::Message => {
                format!("What message would you like to send to {}?", self.recipient)
            }
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
