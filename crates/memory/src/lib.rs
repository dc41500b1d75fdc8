pub mod ingest;
pub mod manifest;
pub mod store;

pub use ingest::{DocumentUploadResult, Ingestor, LedgerEntry, ManifestReport, UploadLedger};
pub use manifest::{load_document, Manifest, ManifestEntry};
pub use store::{InMemoryMemoryStore, MemoryStore, UploadAck};
