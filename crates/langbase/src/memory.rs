use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use advocado_core::domain::document::{DocumentName, KnowledgeDocument};
use advocado_core::domain::retrieval::{RetrievedContext, RetrievedExcerpt};
use advocado_core::errors::{IngestionError, RetrievalError};
use advocado_memory::store::{MemoryStore, UploadAck};

use crate::client::{ensure_success, send_error, HttpFailure, LangbaseClient};

const UNKNOWN_DOCUMENT: &str = "unknown";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedUpload {
    signed_url: String,
}

/// Langbase memory: two-step signed-URL upload and top-k retrieval.
#[derive(Clone)]
pub struct LangbaseMemoryStore {
    client: LangbaseClient,
}

impl LangbaseMemoryStore {
    pub fn new(client: LangbaseClient) -> Self {
        Self { client }
    }
}

pub(crate) fn upload_request(memory_name: &str, document: &KnowledgeDocument) -> Value {
    let mut meta = document
        .metadata
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect::<Map<String, Value>>();
    meta.insert("documentName".to_string(), Value::String(document.name.to_string()));

    json!({
        "memoryName": memory_name,
        "documentName": document.name.as_str(),
        "contentType": document.content_type,
        "meta": meta,
    })
}

pub(crate) fn retrieve_request(query: &str, memory_name: &str, top_k: usize) -> Value {
    json!({
        "query": query,
        "memory": [{ "name": memory_name }],
        "topK": top_k,
    })
}

/// Accepts a bare array of chunks or `{"data": [...]}`.
pub fn parse_retrieve_response(value: &Value) -> Result<RetrievedContext, RetrievalError> {
    let chunks = value
        .as_array()
        .or_else(|| value.get("data").and_then(Value::as_array))
        .ok_or_else(|| RetrievalError::MalformedResponse("expected an array of chunks".to_string()))?;

    let excerpts = chunks
        .iter()
        .map(|chunk| {
            let text = chunk
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| RetrievalError::MalformedResponse("chunk without text".to_string()))?;
            let document = chunk
                .pointer("/meta/documentName")
                .or_else(|| chunk.get("documentName"))
                .and_then(Value::as_str)
                .unwrap_or(UNKNOWN_DOCUMENT);
            let relevance = chunk.get("similarity").and_then(Value::as_f64).unwrap_or(0.0) as f32;
            Ok(RetrievedExcerpt {
                document_name: DocumentName::new(document),
                excerpt: text.to_string(),
                relevance,
            })
        })
        .collect::<Result<Vec<_>, RetrievalError>>()?;

    Ok(RetrievedContext::new(excerpts))
}

fn ingestion_error(document: &DocumentName, failure: HttpFailure) -> IngestionError {
    match failure {
        HttpFailure::Status { status, message } => {
            IngestionError::Rejected { document: document.to_string(), status, message }
        }
        HttpFailure::Timeout => IngestionError::Transport {
            document: document.to_string(),
            message: "request timed out".to_string(),
        },
        HttpFailure::Transport(message) | HttpFailure::Decode(message) => {
            IngestionError::Transport { document: document.to_string(), message }
        }
    }
}

fn retrieval_error(failure: HttpFailure, after_ms: u64) -> RetrievalError {
    match failure {
        HttpFailure::Timeout => RetrievalError::Timeout { after_ms },
        HttpFailure::Transport(message) => RetrievalError::Unavailable(message),
        HttpFailure::Status { status: 404, message } => RetrievalError::UnknownMemory(message),
        HttpFailure::Status { status, message } => RetrievalError::Rejected { status, message },
        HttpFailure::Decode(message) => RetrievalError::MalformedResponse(message),
    }
}

#[async_trait]
impl MemoryStore for LangbaseMemoryStore {
    async fn upload(
        &self,
        memory_name: &str,
        document: &KnowledgeDocument,
    ) -> Result<UploadAck, IngestionError> {
        let signed: SignedUpload = self
            .client
            .post_json("/v1/memory/documents", &upload_request(memory_name, document))
            .await
            .map_err(|failure| ingestion_error(&document.name, failure))?;
        debug!(
            event_name = "memory.upload.signed",
            memory = %memory_name,
            document = %document.name,
            "received signed upload url"
        );

        let response = self
            .client
            .http()
            .put(&signed.signed_url)
            .header(reqwest::header::CONTENT_TYPE, document.content_type.as_str())
            .body(document.raw_bytes.clone())
            .send()
            .await
            .map_err(|error| ingestion_error(&document.name, send_error(error)))?;
        ensure_success(response)
            .await
            .map_err(|failure| ingestion_error(&document.name, failure))?;

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
        let after_ms = u64::try_from(self.client.timeout().as_millis()).unwrap_or(u64::MAX);
        let value: Value = self
            .client
            .post_json("/v1/memory/retrieve", &retrieve_request(query, memory_name, top_k))
            .await
            .map_err(|failure| retrieval_error(failure, after_ms))?;
        let mut excerpts = parse_retrieve_response(&value)?.into_iter().collect::<Vec<_>>();
        excerpts.truncate(top_k);
        Ok(RetrievedContext::new(excerpts))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use serde_json::json;

    use advocado_core::domain::document::{DocumentName, KnowledgeDocument, TEXT_PLAIN};
    use advocado_core::errors::RetrievalError;

    use super::{parse_retrieve_response, retrieve_request, upload_request};

    #[test]
    fn upload_request_carries_metadata_and_document_name() {
        let mut metadata = BTreeMap::new();
        metadata.insert("extension".to_string(), "md".to_string());
        metadata.insert("description".to_string(), "Resume".to_string());
        let document = KnowledgeDocument {
            name: DocumentName::new("resume.md"),
            source_path: PathBuf::from("docs/resume.md"),
            raw_bytes: Vec::new(),
            content_type: TEXT_PLAIN.to_string(),
            metadata,
        };

        let request = upload_request("advocado-memory", &document);
        assert_eq!(request["memoryName"], "advocado-memory");
        assert_eq!(request["documentName"], "resume.md");
        assert_eq!(request["contentType"], "text/plain");
        assert_eq!(request["meta"]["extension"], "md");
        assert_eq!(request["meta"]["documentName"], "resume.md");
    }

    #[test]
    fn retrieve_response_is_ordered_by_similarity() {
        let context = parse_retrieve_response(&json!([
            {"text": "Rides a gravel bike", "similarity": 0.41, "meta": {"documentName": "gear.md"}},
            {"text": "Product manager", "similarity": 0.87, "meta": {"documentName": "resume.md"}},
            {"text": "Loose chunk", "similarity": 0.2}
        ]))
        .expect("parsed");

        let names = context.iter().map(|excerpt| excerpt.document_name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["resume.md", "gear.md", "unknown"]);
        assert_eq!(retrieve_request("q", "mem", 4)["topK"], 4);
    }

    #[test]
    fn malformed_retrieve_response_is_reported() {
        assert!(matches!(
            parse_retrieve_response(&json!({"chunks": 3})),
            Err(RetrievalError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_retrieve_response(&json!([{"similarity": 0.3}])),
            Err(RetrievalError::MalformedResponse(_))
        ));
    }
}
