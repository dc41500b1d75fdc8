use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use advocado_core::domain::document::{DocumentName, KnowledgeDocument};
use advocado_core::domain::retrieval::{RetrievedContext, RetrievedExcerpt};
use advocado_core::errors::{IngestionError, RetrievalError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAck {
    pub memory_name: String,
    pub document_name: DocumentName,
    pub acknowledged_at: DateTime<Utc>,
}

/// Remote memory index: replace-by-name upload and relevance-ordered retrieval.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn upload(
        &self,
        memory_name: &str,
        document: &KnowledgeDocument,
    ) -> Result<UploadAck, IngestionError>;

    async fn retrieve(
        &self,
        query: &str,
        memory_name: &str,
        top_k: usize,
    ) -> Result<RetrievedContext, RetrievalError>;
}

#[derive(Clone, Debug)]
struct StoredDocument {
    text: String,
    digest: String,
}

/// Process-local store used for development and tests. Ranking is plain term overlap
/// over blank-line separated paragraphs.
#[derive(Default)]
pub struct InMemoryMemoryStore {
    memories: RwLock<HashMap<String, BTreeMap<DocumentName, StoredDocument>>>,
}

impl InMemoryMemoryStore {
    pub async fn document_count(&self, memory_name: &str) -> usize {
        let memories = self.memories.read().await;
        memories.get(memory_name).map_or(0, BTreeMap::len)
    }

    pub async fn digest_of(&self, memory_name: &str, document: &DocumentName) -> Option<String> {
        let memories = self.memories.read().await;
        memories.get(memory_name)?.get(document).map(|stored| stored.digest.clone())
    }

    pub async fn text_of(&self, memory_name: &str, document: &DocumentName) -> Option<String> {
        let memories = self.memories.read().await;
        memories.get(memory_name)?.get(document).map(|stored| stored.text.clone())
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn upload(
        &self,
        memory_name: &str,
        document: &KnowledgeDocument,
    ) -> Result<UploadAck, IngestionError> {
        let stored = StoredDocument { text: document.text().into_owned(), digest: document.digest() };
        let mut memories = self.memories.write().await;
        memories.entry(memory_name.to_string()).or_default().insert(document.name.clone(), stored);

        Ok(UploadAck {
            memory_name: memory_name.to_string(),
            document_name: document.name.clone(),
            acknowledged_at: Utc::now(),
        })
    }

    async fn retrieve(
        &self,
        query: &str,
        memory_name: &str,
        top_k: usize,
    ) -> Result<RetrievedContext, RetrievalError> {
        let memories = self.memories.read().await;
        let documents = memories
            .get(memory_name)
            .ok_or_else(|| RetrievalError::UnknownMemory(memory_name.to_string()))?;

        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(RetrievedContext::empty());
        }

        let mut excerpts = Vec::new();
        for (name, stored) in documents {
            for paragraph in stored.text.split("\n\n") {
                let paragraph = paragraph.trim();
                let words = query_terms(paragraph);
                let matched = terms.iter().filter(|term| words.contains(*term)).count();
                if matched > 0 {
                    excerpts.push(RetrievedExcerpt {
                        document_name: name.clone(),
                        excerpt: paragraph.to_string(),
                        relevance: matched as f32 / terms.len() as f32,
                    });
                }
            }
        }

        let mut context = RetrievedContext::new(excerpts).into_iter().collect::<Vec<_>>();
        context.truncate(top_k);
        Ok(RetrievedContext::new(context))
    }
}

const STOPWORDS: [&str; 24] = [
    "about", "and", "are", "can", "did", "does", "for", "from", "has", "have", "his", "her", "how",
    "the", "their", "them", "this", "what", "when", "where", "which", "who", "with", "you",
];

fn query_terms(text: &str) -> BTreeSet<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| token.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|token| !STOPWORDS.contains(&token.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use advocado_core::domain::document::{DocumentName, KnowledgeDocument, TEXT_PLAIN};
    use advocado_core::errors::RetrievalError;

    use super::{InMemoryMemoryStore, MemoryStore};

    fn document(name: &str, text: &str) -> KnowledgeDocument {
        KnowledgeDocument {
            name: DocumentName::new(name),
            source_path: PathBuf::from(name),
            raw_bytes: text.as_bytes().to_vec(),
            content_type: TEXT_PLAIN.to_string(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn upload_replaces_by_name() {
        let store = InMemoryMemoryStore::default();
        store.upload("mem", &document("resume.md", "old")).await.expect("first upload");
        store.upload("mem", &document("resume.md", "new")).await.expect("second upload");

        assert_eq!(store.document_count("mem").await, 1);
        assert_eq!(
            store.text_of("mem", &DocumentName::new("resume.md")).await.as_deref(),
            Some("new")
        );
    }

    #[tokio::test]
    async fn retrieval_ranks_paragraphs_by_term_overlap() {
        let store = InMemoryMemoryStore::default();
        store
            .upload(
                "mem",
                &document(
                    "projects.md",
                    "Built a portfolio site with VitePress.\n\nMaintains a Rust CLI for quoting.",
                ),
            )
            .await
            .expect("upload");
        store
            .upload("mem", &document("gear.md", "Rides a gravel bike on weekends."))
            .await
            .expect("upload");

        let context = store.retrieve("Which portfolio site tools?", "mem", 5).await.expect("retrieve");
        assert_eq!(context.len(), 1);
        let first = context.iter().next().expect("one excerpt");
        assert_eq!(first.document_name.as_str(), "projects.md");
        assert!(first.excerpt.contains("VitePress"));

        let nothing = store.retrieve("favourite food", "mem", 5).await.expect("retrieve");
        assert!(nothing.is_empty());
    }

    #[tokio::test]
    async fn unknown_memory_is_an_error() {
        let store = InMemoryMemoryStore::default();
        let error = store.retrieve("anything", "missing", 3).await.expect_err("no such memory");
        assert_eq!(error, RetrievalError::UnknownMemory("missing".to_string()));
    }
}
