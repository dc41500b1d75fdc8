use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use advocado_core::domain::document::KnowledgeDocument;
use advocado_core::domain::retrieval::RetrievedContext;
use advocado_core::errors::{IngestionError, RetrievalError};
use advocado_memory::{InMemoryMemoryStore, Ingestor, Manifest, MemoryStore, UploadAck};

/// Rejects one document by name and delegates everything else.
struct RejectingStore {
    inner: InMemoryMemoryStore,
    reject: &'static str,
    attempts: AtomicUsize,
}

#[async_trait]
impl MemoryStore for RejectingStore {
    async fn upload(
        &self,
        memory_name: &str,
        document: &KnowledgeDocument,
    ) -> Result<UploadAck, IngestionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if document.name.as_str() == self.reject {
            return Err(IngestionError::Rejected {
                document: document.name.to_string(),
                status: 413,
                message: "payload too large".to_string(),
            });
        }
        self.inner.upload(memory_name, document).await
    }

    async fn retrieve(
        &self,
        query: &str,
        memory_name: &str,
        top_k: usize,
    ) -> Result<RetrievedContext, RetrievalError> {
        self.inner.retrieve(query, memory_name, top_k).await
    }
}

fn write_portfolio(dir: &TempDir, skip: &[&str]) {
    let docs = dir.path().join("docs");
    let private = dir.path().join("private");
    std::fs::create_dir_all(&docs).expect("docs dir");
    std::fs::create_dir_all(&private).expect("private dir");

    for entry in Manifest::portfolio(&docs, &private).documents {
        if skip.contains(&entry.file_name.as_str()) {
            continue;
        }
        std::fs::write(entry.path(), format!("# {}\n\n{}", entry.file_name, entry.description))
            .expect("write fixture");
    }
}

#[tokio::test]
async fn one_failure_does_not_abort_the_rest() {
    let dir = TempDir::new().expect("tempdir");
    write_portfolio(&dir, &["gear.md"]);
    let manifest = Manifest::portfolio(dir.path().join("docs"), dir.path().join("private"));

    let store = Arc::new(RejectingStore {
        inner: InMemoryMemoryStore::default(),
        reject: "stack.md",
        attempts: AtomicUsize::new(0),
    });
    let ingestor = Ingestor::new(store.clone(), "advocado-memory");

    let report = ingestor.sync_manifest(&manifest).await;

    assert_eq!(report.results.len(), 8);
    assert_eq!(report.succeeded(), 6);
    assert_eq!(report.failed(), 2);
    assert!(!report.all_succeeded());

    let order = report.results.iter().map(|result| result.document.as_str()).collect::<Vec<_>>();
    assert_eq!(order[0], "index.md");
    assert_eq!(order[7], "supplementary.md");

    let gear = report.results.iter().find(|result| result.document.as_str() == "gear.md");
    assert!(matches!(
        gear.map(|result| &result.outcome),
        Some(Err(IngestionError::SourceUnreadable { .. }))
    ));
    let stack = report.results.iter().find(|result| result.document.as_str() == "stack.md");
    assert!(matches!(
        stack.map(|result| &result.outcome),
        Some(Err(IngestionError::Rejected { status: 413, .. }))
    ));

    // gear.md never reaches the store.
    assert_eq!(store.attempts.load(Ordering::SeqCst), 7);
    assert_eq!(store.inner.document_count("advocado-memory").await, 6);
    assert_eq!(ingestor.ledger().await.len(), 6);

    let json = report.to_json();
    assert_eq!(json["uploaded"], 6);
    assert_eq!(json["failed"], 2);
    assert_eq!(json["documents"][5]["status"], "failed");
}

#[tokio::test]
async fn resync_of_unchanged_manifest_keeps_one_document_per_name() {
    let dir = TempDir::new().expect("tempdir");
    write_portfolio(&dir, &[]);
    let manifest = Manifest::portfolio(dir.path().join("docs"), dir.path().join("private"));

    let store = Arc::new(InMemoryMemoryStore::default());
    let ingestor = Ingestor::new(store.clone(), "advocado-memory");

    assert!(ingestor.sync_manifest(&manifest).await.all_succeeded());
    assert!(ingestor.sync_manifest(&manifest).await.all_succeeded());

    assert_eq!(store.document_count("advocado-memory").await, 8);
    let ledger = ingestor.ledger().await;
    assert_eq!(ledger.len(), 8);
    assert!(manifest
        .documents
        .iter()
        .all(|entry| ledger.get(&entry.document_name()).map(|e| e.upload_count) == Some(2)));
}
