use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};

use advocado_core::domain::document::{DocumentName, KnowledgeDocument};
use advocado_core::errors::IngestionError;

use crate::manifest::{load_document, Manifest, ManifestEntry};
use crate::store::{MemoryStore, UploadAck};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub digest: String,
    pub acknowledged_at: DateTime<Utc>,
    pub upload_count: u32,
}

/// Last acknowledged upload per document name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UploadLedger {
    entries: BTreeMap<DocumentName, LedgerEntry>,
}

impl UploadLedger {
    pub fn record(&mut self, ack: &UploadAck, digest: String) {
        let upload_count = self.entries.get(&ack.document_name).map_or(0, |entry| entry.upload_count);
        self.entries.insert(
            ack.document_name.clone(),
            LedgerEntry { digest, acknowledged_at: ack.acknowledged_at, upload_count: upload_count + 1 },
        );
    }

    pub fn get(&self, name: &DocumentName) -> Option<&LedgerEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentUploadResult {
    pub document: DocumentName,
    pub outcome: Result<UploadAck, IngestionError>,
}

impl DocumentUploadResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Per-document results in manifest order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManifestReport {
    pub results: Vec<DocumentUploadResult>,
}

impl ManifestReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|result| result.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    pub fn to_json(&self) -> Value {
        let documents = self
            .results
            .iter()
            .map(|result| match &result.outcome {
                Ok(ack) => json!({
                    "document": result.document.as_str(),
                    "status": "uploaded",
                    "acknowledged_at": ack.acknowledged_at.to_rfc3339(),
                }),
                Err(error) => json!({
                    "document": result.document.as_str(),
                    "status": "failed",
                    "error": error.to_string(),
                }),
            })
            .collect::<Vec<_>>();

        json!({
            "uploaded": self.succeeded(),
            "failed": self.failed(),
            "documents": documents,
        })
    }
}

/// Uploads documents into one named memory and keeps the upload ledger.
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn MemoryStore>,
    memory_name: String,
    ledger: Arc<RwLock<UploadLedger>>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn MemoryStore>, memory_name: impl Into<String>) -> Self {
        Self { store, memory_name: memory_name.into(), ledger: Arc::new(RwLock::new(UploadLedger::default())) }
    }

    pub fn memory_name(&self) -> &str {
        &self.memory_name
    }

    pub async fn ledger(&self) -> UploadLedger {
        self.ledger.read().await.clone()
    }

    pub async fn upload(&self, document: &KnowledgeDocument) -> Result<UploadAck, IngestionError> {
        match self.store.upload(&self.memory_name, document).await {
            Ok(ack) => {
                let digest = document.digest();
                info!(
                    event_name = "memory.upload.completed",
                    memory = %self.memory_name,
                    document = %document.name,
                    size_bytes = document.size_bytes(),
                    digest = %digest,
                    "document uploaded"
                );
                self.ledger.write().await.record(&ack, digest);
                Ok(ack)
            }
            Err(error) => {
                warn!(
                    event_name = "memory.upload.failed",
                    memory = %self.memory_name,
                    document = %document.name,
                    error = %error,
                    "document upload failed"
                );
                Err(error)
            }
        }
    }

    pub async fn upload_entry(&self, entry: &ManifestEntry) -> DocumentUploadResult {
        let outcome = match load_document(entry).await {
            Ok(document) => self.upload(&document).await,
            Err(error) => {
                warn!(
                    event_name = "memory.upload.failed",
                    memory = %self.memory_name,
                    document = %entry.file_name,
                    error = %error,
                    "document source unreadable"
                );
                Err(error)
            }
        };
        DocumentUploadResult { document: entry.document_name(), outcome }
    }

    /// Uploads every entry concurrently. A failing entry never stops the others.
    pub async fn sync_manifest(&self, manifest: &Manifest) -> ManifestReport {
        let handles = manifest
            .documents
            .iter()
            .cloned()
            .map(|entry| {
                let ingestor = self.clone();
                let document = entry.document_name();
                (document, tokio::spawn(async move { ingestor.upload_entry(&entry).await }))
            })
            .collect::<Vec<_>>();

        let mut results = Vec::with_capacity(handles.len());
        for (document, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_error) => DocumentUploadResult {
                    outcome: Err(IngestionError::Transport {
                        document: document.to_string(),
                        message: format!("upload task aborted: {join_error}"),
                    }),
                    document,
                },
            };
            results.push(result);
        }

        let report = ManifestReport { results };
        info!(
            event_name = "memory.sync.completed",
            memory = %self.memory_name,
            uploaded = report.succeeded(),
            failed = report.failed(),
            "manifest sync finished"
        );
        report
    }
}
