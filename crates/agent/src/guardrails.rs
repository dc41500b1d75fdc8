use advocado_core::domain::retrieval::RetrievedContext;
use advocado_core::policy::citations::CitationCatalog;

/// Whether retrieved context may back an answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroundingDecision {
    Allow { citable_excerpts: usize },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

impl GroundingDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SanitizedAnswer {
    pub text: String,
    pub removed_links: Vec<String>,
}

/// Answers only from citable context and strips links outside the citation allow-list.
#[derive(Clone, Debug)]
pub struct GroundingGuard {
    catalog: CitationCatalog,
    unavailable_message: String,
}

impl GroundingGuard {
    pub fn new(catalog: CitationCatalog, unavailable_message: impl Into<String>) -> Self {
        Self { catalog, unavailable_message: unavailable_message.into() }
    }

    pub fn catalog(&self) -> &CitationCatalog {
        &self.catalog
    }

    pub fn unavailable_message(&self) -> &str {
        &self.unavailable_message
    }

    /// Context drawn only from do-not-cite documents cannot support a citable answer.
    pub fn evaluate(&self, context: &RetrievedContext) -> GroundingDecision {
        if context.is_empty() {
            return GroundingDecision::Degrade {
                reason_code: "empty_context",
                user_message: self.unavailable_message.clone(),
                fallback_path: "answer_unavailable",
            };
        }

        let citable_excerpts =
            context.iter().filter(|excerpt| self.catalog.is_citable(&excerpt.document_name)).count();
        if citable_excerpts == 0 {
            return GroundingDecision::Degrade {
                reason_code: "restricted_sources_only",
                user_message: self.unavailable_message.clone(),
                fallback_path: "answer_unavailable",
            };
        }

        GroundingDecision::Allow { citable_excerpts }
    }

    /// Rewrites `[label](url)` to `label` whenever `url` is not an allow-listed page.
    pub fn sanitize(&self, answer: &str) -> SanitizedAnswer {
        let mut text = String::with_capacity(answer.len());
        let mut removed_links = Vec::new();
        let mut rest = answer;

        while let Some(open) = rest.find('[') {
            let Some((label, url, consumed)) = markdown_link(&rest[open..]) else {
                text.push_str(&rest[..=open]);
                rest = &rest[open + 1..];
                continue;
            };

            text.push_str(&rest[..open]);
            if self.catalog.is_allowed_link(url) {
                text.push_str(&rest[open..open + consumed]);
            } else {
                text.push_str(label);
                removed_links.push(url.to_string());
            }
            rest = &rest[open + consumed..];
        }
        text.push_str(rest);

        SanitizedAnswer { text: text.trim().to_string(), removed_links }
    }
}

/// Parses `[label](url)` at the start of `input`; returns label, url and bytes consumed.
fn markdown_link(input: &str) -> Option<(&str, &str, usize)> {
    let close_label = input.find(']')?;
    let label = &input[1..close_label];
    if label.contains('[') || label.contains('\n') {
        return None;
    }
    let after = &input[close_label + 1..];
    if !after.starts_with('(') {
        return None;
    }
    let close_url = after.find(')')?;
    let url = after[1..close_url].trim();
    if url.is_empty() || url.contains(char::is_whitespace) {
        return None;
    }
    Some((label, url, close_label + 1 + close_url + 1))
}
