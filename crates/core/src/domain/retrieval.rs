use serde::{Deserialize, Serialize};

use crate::domain::document::DocumentName;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedExcerpt {
    pub document_name: DocumentName,
    pub excerpt: String,
    pub relevance: f32,
}

/// Relevance-ordered excerpts returned for a single query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RetrievedContext {
    excerpts: Vec<RetrievedExcerpt>,
}

impl RetrievedContext {
    pub fn new(mut excerpts: Vec<RetrievedExcerpt>) -> Self {
        excerpts.retain(|excerpt| !excerpt.excerpt.trim().is_empty());
        excerpts.sort_by(|left, right| right.relevance.total_cmp(&left.relevance));
        Self { excerpts }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.excerpts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.excerpts.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RetrievedExcerpt> {
        self.excerpts.iter()
    }
}

impl IntoIterator for RetrievedContext {
    type Item = RetrievedExcerpt;
    type IntoIter = std::vec::IntoIter<RetrievedExcerpt>;

    fn into_iter(self) -> Self::IntoIter {
        self.excerpts.into_iter()
    }
}
