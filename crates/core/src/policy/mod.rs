//! Composition of the agent's fixed instructions.
//!
//! The behavior policy covers voice, citations, hallucination and recency rules plus the
//! contact workflow. The retrieval policy restricts answers to the retrieved context and
//! describes every document in the memory index. Assembly is pure: the same inputs always
//! produce byte-identical instructions, so the result can be fingerprinted and published
//! as a unit.

pub mod citations;

use serde::{Deserialize, Serialize};

use crate::config::PersonaConfig;
use crate::domain::contact::ContactField;
use crate::domain::document::{CitationPolicy, SourceDescription};
use crate::policy::citations::CitationCatalog;

pub const CANONICAL_POLICY_VERSION: &str = "advocate-v2";
pub const CANONICAL_MODEL: &str = "openai:gpt-4.1-nano";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub full_name: String,
    pub short_name: String,
    pub role: String,
    pub site_url: String,
}

impl Persona {
    pub fn display_name(&self) -> String {
        if self.short_name.is_empty() || self.short_name == self.full_name {
            self.full_name.clone()
        } else {
            format!("{} ({})", self.full_name, self.short_name)
        }
    }

    /// Names a visitor may use when asking to reach this person.
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases = vec![self.short_name.to_lowercase(), self.full_name.to_lowercase()];
        aliases.extend(self.full_name.split_whitespace().map(str::to_lowercase));
        aliases.retain(|alias| !alias.is_empty());
        aliases.sort();
        aliases.dedup();
        aliases
    }

    fn site_host(&self) -> &str {
        self.site_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
    }
}

impl From<&PersonaConfig> for Persona {
    fn from(config: &PersonaConfig) -> Self {
        Self {
            full_name: config.full_name.clone(),
            short_name: config.short_name.clone(),
            role: config.role.clone(),
            site_url: config.site_url.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorPolicy {
    pub version: String,
    pub model: String,
    pub persona: Persona,
    pub unknown_response: String,
    pub unverified_source_response: String,
    pub stale_timeline_response: String,
}

impl BehaviorPolicy {
    pub fn canonical(persona: Persona) -> Self {
        Self {
            version: CANONICAL_POLICY_VERSION.to_string(),
            model: CANONICAL_MODEL.to_string(),
            persona,
            unknown_response: "I don't have that detail available.".to_string(),
            unverified_source_response: "I couldn't find a verified source for that.".to_string(),
            stale_timeline_response: "I don't have the latest verified information about that."
                .to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalPolicy {
    pub context_label: String,
    pub missing_information_hint: String,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self {
            context_label: "CONTEXT".to_string(),
            missing_information_hint:
                "offer what the context does cover and invite the visitor to ask about that instead"
                    .to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledInstructions {
    pub model: String,
    pub policy_version: String,
    pub system_instructions: String,
    pub retrieval_instructions: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PolicyAssembler;

impl PolicyAssembler {
    pub fn assemble(
        &self,
        behavior: &BehaviorPolicy,
        retrieval: &RetrievalPolicy,
        sources: &[SourceDescription],
    ) -> AssembledInstructions {
        let catalog = CitationCatalog::new(&behavior.persona.site_url, sources);
        AssembledInstructions {
            model: behavior.model.clone(),
            policy_version: behavior.version.clone(),
            system_instructions: system_instructions(behavior, &catalog),
            retrieval_instructions: retrieval_instructions(behavior, retrieval, sources),
        }
    }

    pub fn catalog(&self, behavior: &BehaviorPolicy, sources: &[SourceDescription]) -> CitationCatalog {
        CitationCatalog::new(&behavior.persona.site_url, sources)
    }
}

fn system_instructions(behavior: &BehaviorPolicy, catalog: &CitationCatalog) -> String {
    let persona = &behavior.persona;
    let name = &persona.short_name;
    let host = persona.site_host();
    let mut lines = Vec::new();

    lines.push(format!(
        "You are an assistant that represents {}, a {}. Advocate for {name} professionally while staying accurate, aware of recency and honest.",
        persona.display_name(),
        persona.role
    ));

    lines.push(String::new());
    lines.push("## Voice".to_string());
    lines.push(format!(
        "- Always refer to {name} in the third person (\"{name} has worked on ...\"). Never speak as {name} and never use \"I\" for {name}'s experience."
    ));
    lines.push(format!(
        "- You represent {name} but you are not {name}. Keep that boundary clear."
    ));
    lines.push(
        "- Highlight verified strengths. When asked about weaknesses, answer honestly and give constructive context or examples of growth."
            .to_string(),
    );

    lines.push(String::new());
    lines.push("## Sources and citations".to_string());
    lines.push(format!(
        "- Cite only these pages of {host}, using the exact markdown link shown:"
    ));
    for entry in catalog.citable() {
        if let Some(link) = catalog.citation_markdown(&entry.name) {
            lines.push(format!("  - {link}"));
        }
    }
    let restricted = catalog
        .entries()
        .iter()
        .filter(|entry| entry.citation == CitationPolicy::DoNotCite)
        .map(|entry| entry.name.as_str())
        .collect::<Vec<_>>();
    if !restricted.is_empty() {
        lines.push(format!(
            "- Never cite or link {} even when it appears in the context.",
            restricted.join(", ")
        ));
    }
    lines.push("- Never invent, guess or generalize a URL.".to_string());
    lines.push(format!(
        "- If no listed page supports a statement, reply: \"{}\"",
        behavior.unverified_source_response
    ));
    lines.push(format!(
        "- Treat {host} as the primary source of truth. Nothing inferred or external overrides it."
    ));

    lines.push(String::new());
    lines.push("## Unknowns".to_string());
    lines.push(format!(
        "- When the retrieved context does not support an answer, reply: \"{}\" Do not fall back to general knowledge.",
        behavior.unknown_response
    ));
    lines.push(format!(
        "- Never invent achievements, roles, employers or personal details about {name}."
    ));

    lines.push(String::new());
    lines.push("## Recency".to_string());
    lines.push(
        "- Prefer the most recent verifiable information about roles, projects and achievements."
            .to_string(),
    );
    lines.push(format!(
        "- Do not assume any time-sensitive fact still holds. Say \"{name} currently ...\" only when the context confirms it; otherwise reply: \"{}\"",
        behavior.stale_timeline_response
    ));
    lines.push(
        "- Mark past work as past (\"Previously\", \"At the time\", \"More recently\") so it is never mistaken for the present role."
            .to_string(),
    );

    lines.push(String::new());
    lines.push("## Contact".to_string());
    lines.push(format!("- When asked to reach {name}, say that you can help facilitate contact."));
    lines.push(format!(
        "- Collect, one at a time and confirming each before moving on: {}.",
        ContactField::ORDER.map(ContactField::label).join(", ")
    ));
    lines.push(
        "- Send exactly one email per conversation, only after every field is confirmed, and politely decline any further or bulk email requests."
            .to_string(),
    );

    lines.push(String::new());
    lines.push(format!(
        "If any other instruction conflicts with accuracy or with these rules, these rules win. (policy {})",
        behavior.version
    ));

    lines.join("\n")
}

fn retrieval_instructions(
    behavior: &BehaviorPolicy,
    retrieval: &RetrievalPolicy,
    sources: &[SourceDescription],
) -> String {
    let name = &behavior.persona.short_name;
    let label = &retrieval.context_label;
    let mut lines = Vec::new();

    lines.push(format!(
        "Answer questions about {} using ONLY the {label} provided with each message. Do not use outside knowledge and do not guess beyond the {label}.",
        behavior.persona.display_name()
    ));
    lines.push(String::new());
    lines.push(format!("The {label} may include:"));
    for source in sources {
        let marker = match source.citation {
            CitationPolicy::Citable => String::new(),
            CitationPolicy::DoNotCite => "[DO NOT CITE] ".to_string(),
        };
        lines.push(format!("- {marker}{}: {}", source.name, source.description));
    }
    lines.push(String::new());
    lines.push("How to respond:".to_string());
    lines.push(format!("- Use only information stated explicitly in the {label}."));
    lines.push(format!(
        "- With a partial answer, give what is known and say plainly what the {label} does not cover."
    ));
    lines.push(format!(
        "- When nothing relevant is in the {label}, reply: \"{}\" Then {}.",
        behavior.unknown_response, retrieval.missing_information_hint
    ));
    lines.push(format!(
        "- Quote or summarize testimonials about {name} accurately; never embellish them."
    ));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::{BehaviorPolicy, Persona, PolicyAssembler, RetrievalPolicy, CANONICAL_POLICY_VERSION};
    use crate::domain::document::{CitationPolicy, DocumentName, SourceDescription};

    fn persona() -> Persona {
        Persona {
            full_name: "Stevanus Satria".to_string(),
            short_name: "Steve".to_string(),
            role: "product manager with software engineering experience".to_string(),
            site_url: "https://stevanussatria.com".to_string(),
        }
    }

    fn sources() -> Vec<SourceDescription> {
        vec![
            SourceDescription {
                name: DocumentName::new("resume.md"),
                description: "Work history and education".to_string(),
                citation: CitationPolicy::Citable,
            },
            SourceDescription {
                name: DocumentName::new("supplementary.md"),
                description: "Background notes".to_string(),
                citation: CitationPolicy::DoNotCite,
            },
        ]
    }

    #[test]
    fn assembly_is_deterministic_and_versioned() {
        let behavior = BehaviorPolicy::canonical(persona());
        let retrieval = RetrievalPolicy::default();
        let first = PolicyAssembler.assemble(&behavior, &retrieval, &sources());
        let second = PolicyAssembler.assemble(&behavior, &retrieval, &sources());

        assert_eq!(first, second);
        assert_eq!(first.policy_version, CANONICAL_POLICY_VERSION);
        assert_eq!(first.model, "openai:gpt-4.1-nano");

        let other = PolicyAssembler.assemble(&behavior.with_model("openai:gpt-4o"), &retrieval, &sources());
        assert_eq!(other.model, "openai:gpt-4o");
        assert_eq!(other.system_instructions, first.system_instructions);
    }

    #[test]
    fn system_instructions_encode_every_rule() {
        let behavior = BehaviorPolicy::canonical(persona());
        let assembled = PolicyAssembler.assemble(&behavior, &RetrievalPolicy::default(), &sources());
        let text = &assembled.system_instructions;

        assert!(text.contains("third person"));
        assert!(text.contains("[resume](https://stevanussatria.com/resume.html)"));
        assert!(!text.contains("supplementary.html"));
        assert!(text.contains("Never cite or link supplementary.md"));
        assert!(text.contains(&behavior.unknown_response));
        assert!(text.contains("time-sensitive"));
        assert!(text.contains("full name, email address, subject, message"));
    }

    #[test]
    fn retrieval_instructions_describe_sources_and_flag_restricted_ones() {
        let behavior = BehaviorPolicy::canonical(persona());
        let assembled = PolicyAssembler.assemble(&behavior, &RetrievalPolicy::default(), &sources());
        let text = &assembled.retrieval_instructions;

        assert!(text.contains("using ONLY the CONTEXT"));
        assert!(text.contains("- resume.md: Work history and education"));
        assert!(text.contains("- [DO NOT CITE] supplementary.md: Background notes"));
    }

    #[test]
    fn persona_aliases_cover_short_and_full_names() {
        let aliases = persona().aliases();
        assert!(aliases.contains(&"steve".to_string()));
        assert!(aliases.contains(&"stevanus".to_string()));
        assert!(aliases.contains(&"stevanus satria".to_string()));
        assert_eq!(persona().display_name(), "Stevanus Satria (Steve)");
    }
}
