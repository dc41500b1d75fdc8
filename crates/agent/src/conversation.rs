use advocado_core::domain::contact::{ContactField, FieldValue};
use advocado_core::errors::ValidationError;
use advocado_core::flows::{FlowEvent, FlowState};
use advocado_core::policy::Persona;

const CANCEL_PHRASES: [&str; 10] = [
    "cancel",
    "cancel that",
    "cancel it",
    "never mind",
    "nevermind",
    "forget it",
    "forget about it",
    "stop",
    "abort",
    "quit",
];

const AFFIRMATIVE_PHRASES: [&str; 22] = [
    "y",
    "yes",
    "yeah",
    "yep",
    "yup",
    "sure",
    "ok",
    "okay",
    "correct",
    "confirm",
    "confirmed",
    "right",
    "that is right",
    "that s right",
    "thats right",
    "looks good",
    "yes please",
    "send it",
    "go ahead",
    "please do",
    "retry",
    "try again",
];

const NEGATIVE_WORDS: [&str; 6] = ["no", "n", "nope", "wrong", "incorrect", "nah"];

const STRONG_CONTACT_PHRASES: [&str; 9] = [
    "contact",
    "get in touch",
    "reach out",
    "send a message",
    "send an email",
    "leave a message",
    "drop a line",
    "drop a message",
    "pass a message",
];

const TARGETED_CONTACT_VERBS: [&str; 10] = [
    "email",
    "message",
    "reach",
    "write to",
    "talk to",
    "speak to",
    "speak with",
    "connect with",
    "send",
    "ping",
];

const PRONOUNS: [&str; 3] = ["him", "her", "them"];

const QUESTION_OPENERS: [&str; 18] = [
    "what", "who", "whom", "whose", "where", "when", "why", "how", "which", "does", "do", "did",
    "is", "are", "was", "can", "could", "has",
];

const THIRD_PERSON: [&str; 5] = ["he", "he's", "his", "him", "himself"];

const NAME_INTRODUCTIONS: [&str; 4] = ["my name is ", "this is ", "i'm ", "i am "];

/// Values found in one user message, split into valid and rejected candidates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldExtraction {
    pub values: Vec<FieldValue>,
    pub invalid: Vec<ValidationError>,
}

impl FieldExtraction {
    fn push(&mut self, field: ContactField, raw: &str) {
        if self.values.iter().any(|value| value.field == field) {
            return;
        }
        match field.validate(raw) {
            Ok(value) => {
                self.invalid.retain(|error| error.field() != field);
                self.values.push(FieldValue::new(field, value));
            }
            Err(error) => {
                if !self.invalid.iter().any(|existing| existing.field() == field) {
                    self.invalid.push(error);
                }
            }
        }
    }

    pub fn value(&self, field: ContactField) -> Option<&str> {
        self.values.iter().find(|value| value.field == field).map(|value| value.value.as_str())
    }

    pub fn invalid_for(&self, field: ContactField) -> Option<&ValidationError> {
        self.invalid.iter().find(|error| error.field() == field)
    }
}

/// Turns raw user text into a contact-flow event for the current state.
#[derive(Clone, Debug)]
pub struct TurnParser {
    aliases: Vec<String>,
}

impl TurnParser {
    pub fn new(persona: &Persona) -> Self {
        Self { aliases: persona.aliases() }
    }

    pub fn parse(&self, state: &FlowState, text: &str) -> FlowEvent {
        let normalized = normalize_text(text);

        match state {
            FlowState::Answering | FlowState::Sent | FlowState::Declined | FlowState::FailedToSend => {
                if self.is_contact_intent(&normalized) {
                    FlowEvent::ContactRequested { candidates: self.extract(text, None).values }
                } else {
                    FlowEvent::InformationRequested
                }
            }
            FlowState::CollectingField { field } => {
                if let Some(event) = self.parse_control(&normalized, text, *field) {
                    return event;
                }
                if self.is_contact_intent(&normalized) {
                    return FlowEvent::ContactRequested { candidates: self.extract(text, None).values };
                }
                if self.is_side_question(&normalized, text, *field) {
                    return FlowEvent::InformationRequested;
                }
                self.parse_field_input(text, *field)
            }
            FlowState::ConfirmingField { field, .. } => {
                if let Some(event) = self.parse_control(&normalized, text, *field) {
                    return event;
                }
                if self.is_side_question(&normalized, text, *field) {
                    return FlowEvent::InformationRequested;
                }
                match self.parse_field_input(text, *field) {
                    FlowEvent::FieldsSupplied(values) if values.is_empty() => {
                        FlowEvent::Rejected { corrections: Vec::new() }
                    }
                    event => event,
                }
            }
            FlowState::ReadyToSend => {
                if CANCEL_PHRASES.contains(&normalized.as_str()) {
                    FlowEvent::Cancelled
                } else if is_affirmative(&normalized) {
                    FlowEvent::Confirmed
                } else if negative_remainder(&normalized).is_some() {
                    FlowEvent::Rejected { corrections: Vec::new() }
                } else {
                    FlowEvent::FieldsSupplied(Vec::new())
                }
            }
        }
    }

    pub fn is_contact_intent(&self, normalized: &str) -> bool {
        let padded = format!(" {normalized} ");
        if STRONG_CONTACT_PHRASES.iter().any(|phrase| padded.contains(&format!(" {phrase} "))) {
            return true;
        }

        TARGETED_CONTACT_VERBS.iter().any(|verb| {
            self.aliases
                .iter()
                .map(String::as_str)
                .chain(PRONOUNS)
                .any(|target| padded.contains(&format!(" {verb} {target} ")))
        })
    }

    /// A question asked while a contact field is expected. Subject and message are free
    /// text, so there a question only counts when it is about the persona in the third person.
    pub fn is_side_question(&self, normalized: &str, text: &str, field: ContactField) -> bool {
        if text.contains('@') || !labeled_segments(text).is_empty() {
            return false;
        }
        let opener = normalized.split(' ').next().unwrap_or_default();
        let asks = text.trim_end().ends_with('?') || QUESTION_OPENERS.contains(&opener);
        match field {
            ContactField::FullName | ContactField::EmailAddress => asks,
            ContactField::Subject | ContactField::Message => asks && self.mentions_persona(normalized),
        }
    }

    fn mentions_persona(&self, normalized: &str) -> bool {
        let padded = format!(" {normalized} ");
        THIRD_PERSON.iter().any(|pronoun| padded.contains(&format!(" {pronoun} ")))
            || self.aliases.iter().any(|alias| {
                padded.contains(&format!(" {alias} ")) || padded.contains(&format!(" {alias}'s "))
            })
    }

    /// Labeled segments (`name:`, `email:`, `subject:`, `message:`) win; otherwise email
    /// tokens are picked out and the remaining text is read as the `expected` field.
    pub fn extract(&self, text: &str, expected: Option<ContactField>) -> FieldExtraction {
        let mut extraction = FieldExtraction::default();
        let labeled = labeled_segments(text);
        for (field, raw) in &labeled {
            extraction.push(*field, raw);
        }

        let unlabeled = if labeled.is_empty() { text } else { "" };
        let (emails, broken_emails, remainder) = split_email_tokens(unlabeled);
        for email in &emails {
            extraction.push(ContactField::EmailAddress, email);
        }

        match expected {
            Some(ContactField::FullName) if !labeled.is_empty() => {}
            Some(ContactField::FullName) => {
                let name = strip_name_introduction(&remainder);
                if !name.is_empty() {
                    extraction.push(ContactField::FullName, &name);
                }
            }
            Some(ContactField::EmailAddress) if extraction.value(ContactField::EmailAddress).is_none() => {
                let candidate = broken_emails.first().cloned().unwrap_or_else(|| unlabeled.trim().to_string());
                if !candidate.is_empty() {
                    extraction.push(ContactField::EmailAddress, &candidate);
                }
            }
            Some(field @ (ContactField::Subject | ContactField::Message)) if labeled.is_empty() => {
                extraction.push(field, text);
            }
            Some(_) => {}
            None => {
                if let Some(name) = introduced_name(&remainder) {
                    extraction.push(ContactField::FullName, &name);
                }
                for broken in &broken_emails {
                    extraction.push(ContactField::EmailAddress, broken);
                }
            }
        }

        extraction
    }

    fn parse_control(&self, normalized: &str, text: &str, field: ContactField) -> Option<FlowEvent> {
        if CANCEL_PHRASES.contains(&normalized) {
            return Some(FlowEvent::Cancelled);
        }
        if is_affirmative(normalized) {
            return Some(FlowEvent::Confirmed);
        }
        let remainder = negative_remainder(normalized)?;
        let corrections = if remainder.is_empty() {
            Vec::new()
        } else {
            self.extract(strip_negative_prefix(text), Some(field)).values
        };
        Some(FlowEvent::Rejected { corrections })
    }

    fn parse_field_input(&self, text: &str, field: ContactField) -> FlowEvent {
        let extraction = self.extract(text, Some(field));
        if extraction.value(field).is_some() {
            return FlowEvent::FieldsSupplied(extraction.values);
        }
        if let Some(error) = extraction.invalid_for(field) {
            return FlowEvent::FieldInvalid { field, reason: error.to_string() };
        }
        if !extraction.values.is_empty() {
            return FlowEvent::FieldsSupplied(extraction.values);
        }
        match extraction.invalid.first() {
            Some(error) => FlowEvent::FieldInvalid { field: error.field(), reason: error.to_string() },
            None => FlowEvent::FieldsSupplied(Vec::new()),
        }
    }
}

/// Lowercases, maps punctuation to spaces and collapses whitespace. Apostrophes are kept.
pub fn normalize_text(text: &str) -> String {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_alphanumeric() || matches!(character, '\'' | '@' | '.' | '-' | '_' | '+') {
            sanitized.extend(character.to_lowercase());
        } else {
            sanitized.push(' ');
        }
    }
    sanitized
        .split_whitespace()
        .map(|token| token.trim_matches('.'))
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_affirmative(normalized: &str) -> bool {
    let without_apostrophes = normalized.replace('\'', " ");
    let collapsed = without_apostrophes.split_whitespace().collect::<Vec<_>>().join(" ");
    AFFIRMATIVE_PHRASES.contains(&collapsed.as_str())
        || AFFIRMATIVE_PHRASES.contains(&normalized)
}

/// `Some(rest)` when the message opens with a negative word.
fn negative_remainder(normalized: &str) -> Option<&str> {
    let (first, rest) = normalized.split_once(' ').unwrap_or((normalized, ""));
    NEGATIVE_WORDS.contains(&first).then_some(rest.trim())
}

fn strip_negative_prefix(text: &str) -> &str {
    let trimmed = text.trim_start();
    let word_end = trimmed
        .find(|ch: char| !ch.is_alphabetic())
        .unwrap_or(trimmed.len());
    trimmed[word_end..].trim_start_matches(|ch: char| ch.is_whitespace() || matches!(ch, ',' | '.' | '!' | '-' | ':'))
}

fn label_field(label: &str) -> Option<ContactField> {
    match label {
        "name" | "full name" | "my name" => Some(ContactField::FullName),
        "email" | "e-mail" | "email address" | "my email" => Some(ContactField::EmailAddress),
        "subject" | "title" => Some(ContactField::Subject),
        "message" | "content" | "body" => Some(ContactField::Message),
        _ => None,
    }
}

/// Finds `label: value` segments; a value runs until the next recognised label.
fn labeled_segments(text: &str) -> Vec<(ContactField, String)> {
    let lowered = text.to_lowercase();
    if lowered.len() != text.len() {
        return Vec::new();
    }

    let mut markers = Vec::new();
    for (colon, _) in lowered.match_indices(':') {
        let head = &lowered[..colon];
        let segment_start = head
            .rfind(|ch: char| matches!(ch, '\n' | ',' | ';'))
            .map_or(0, |index| index + 1);
        let label = head[segment_start..].trim();
        if let Some(field) = label_field(label) {
            markers.push((segment_start, colon + 1, field));
        }
    }

    let mut segments = Vec::new();
    for (index, (_, value_start, field)) in markers.iter().enumerate() {
        let value_end = markers.get(index + 1).map_or(text.len(), |(next_start, _, _)| *next_start);
        let value = text[*value_start..value_end]
            .trim()
            .trim_end_matches(|ch: char| matches!(ch, ',' | ';'))
            .trim();
        if !value.is_empty() {
            segments.push((*field, value.to_string()));
        }
    }
    segments
}

/// Returns (valid emails, `@` tokens that failed validation, text with both removed).
fn split_email_tokens(text: &str) -> (Vec<String>, Vec<String>, String) {
    let mut emails = Vec::new();
    let mut broken = Vec::new();
    let mut remainder = Vec::new();

    for token in text.split_whitespace() {
        let cleaned = token.trim_matches(|ch: char| matches!(ch, '<' | '>' | ',' | ';' | '(' | ')' | '"' | '\'' | '!' | '?'));
        let cleaned = cleaned.trim_end_matches('.');
        if cleaned.contains('@') {
            match ContactField::EmailAddress.validate(cleaned) {
                Ok(email) => emails.push(email),
                Err(_) => broken.push(cleaned.to_string()),
            }
        } else {
            remainder.push(token);
        }
    }

    (emails, broken, remainder.join(" "))
}

fn strip_name_introduction(text: &str) -> String {
    let candidate = introduced_name(text).unwrap_or_else(|| text.to_string());
    trim_connectors(&candidate)
}

fn introduced_name(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    if lowered.len() != text.len() {
        return None;
    }
    NAME_INTRODUCTIONS.iter().find_map(|intro| {
        let start = lowered.find(intro)? + intro.len();
        let rest = &text[start..];
        let end = rest.find([',', '.', ';', '\n', '!', '?']).unwrap_or(rest.len());
        let name = trim_connectors(&rest[..end]);
        (!name.is_empty()).then_some(name)
    })
}

fn trim_connectors(text: &str) -> String {
    let mut value = text.trim().trim_matches(|ch: char| matches!(ch, ',' | ';' | '.' | '!' | '-')).trim();
    for suffix in [" and", " &", " at", " email"] {
        if let Some(stripped) = value.strip_suffix(suffix) {
            value = stripped.trim_end();
        }
    }
    value.trim_matches(|ch: char| matches!(ch, ',' | ';')).trim().to_string()
}
