use std::collections::BTreeSet;

use crate::domain::document::{CitationPolicy, DocumentName, SourceDescription};

/// Pages the agent may link to, derived from the source manifest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CitationCatalog {
    site_url: String,
    entries: Vec<SourceDescription>,
}

impl CitationCatalog {
    pub fn new(site_url: &str, sources: &[SourceDescription]) -> Self {
        Self { site_url: site_url.trim().trim_end_matches('/').to_string(), entries: sources.to_vec() }
    }

    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    pub fn entries(&self) -> &[SourceDescription] {
        &self.entries
    }

    pub fn is_citable(&self, name: &DocumentName) -> bool {
        self.entries
            .iter()
            .any(|entry| &entry.name == name && entry.citation == CitationPolicy::Citable)
    }

    pub fn citable(&self) -> impl Iterator<Item = &SourceDescription> {
        self.entries.iter().filter(|entry| entry.citation == CitationPolicy::Citable)
    }

    /// `None` for unknown or do-not-cite documents.
    pub fn page_url(&self, name: &DocumentName) -> Option<String> {
        self.is_citable(name).then(|| format!("{}/{}.html", self.site_url, name.stem()))
    }

    pub fn citation_markdown(&self, name: &DocumentName) -> Option<String> {
        self.page_url(name).map(|url| format!("[{}]({url})", name.stem()))
    }

    pub fn allowed_urls(&self) -> BTreeSet<String> {
        self.citable().filter_map(|entry| self.page_url(&entry.name)).collect()
    }

    pub fn is_allowed_link(&self, url: &str) -> bool {
        let normalized = strip_suffixes(url.trim());
        self.allowed_urls().iter().any(|allowed| allowed == normalized)
    }
}

fn strip_suffixes(url: &str) -> &str {
    let url = url.split_once('#').map_or(url, |(head, _)| head);
    let url = url.split_once('?').map_or(url, |(head, _)| head);
    url.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::CitationCatalog;
    use crate::domain::document::{CitationPolicy, DocumentName, SourceDescription};

    fn catalog() -> CitationCatalog {
        let source = |name: &str, citation| SourceDescription {
            name: DocumentName::new(name),
            description: format!("about {name}"),
            citation,
        };
        CitationCatalog::new(
            "https://example.dev/",
            &[
                source("resume.md", CitationPolicy::Citable),
                source("projects.md", CitationPolicy::Citable),
                source("supplementary.md", CitationPolicy::DoNotCite),
            ],
        )
    }

    #[test]
    fn citable_pages_map_to_site_urls() {
        let catalog = catalog();
        assert_eq!(
            catalog.page_url(&DocumentName::new("resume.md")).as_deref(),
            Some("https://example.dev/resume.html")
        );
        assert_eq!(
            catalog.citation_markdown(&DocumentName::new("projects.md")).as_deref(),
            Some("[projects](https://example.dev/projects.html)")
        );
        assert_eq!(catalog.page_url(&DocumentName::new("supplementary.md")), None);
        assert_eq!(catalog.page_url(&DocumentName::new("blog.md")), None);
        assert_eq!(catalog.allowed_urls().len(), 2);
    }

    #[test]
    fn link_allow_list_ignores_fragments_and_rejects_everything_else() {
        let catalog = catalog();
        assert!(catalog.is_allowed_link("https://example.dev/resume.html"));
        assert!(catalog.is_allowed_link("https://example.dev/resume.html#experience"));
        assert!(!catalog.is_allowed_link("https://example.dev/supplementary.html"));
        assert!(!catalog.is_allowed_link("https://example.dev/about.html"));
        assert!(!catalog.is_allowed_link("https://evil.example/resume.html"));
    }
}
