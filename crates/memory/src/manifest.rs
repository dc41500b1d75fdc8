use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use advocado_core::config::MemoryConfig;
use advocado_core::domain::document::{
    CitationPolicy, DocumentName, KnowledgeDocument, SourceDescription, TEXT_PLAIN,
};
use advocado_core::errors::IngestionError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub source_dir: PathBuf,
    pub file_name: String,
    pub description: String,
    #[serde(default)]
    pub citation: CitationPolicy,
}

impl ManifestEntry {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        file_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            file_name: file_name.into(),
            description: description.into(),
            citation: CitationPolicy::Citable,
        }
    }

    pub fn do_not_cite(mut self) -> Self {
        self.citation = CitationPolicy::DoNotCite;
        self
    }

    pub fn path(&self) -> PathBuf {
        self.source_dir.join(&self.file_name)
    }

    pub fn document_name(&self) -> DocumentName {
        DocumentName::new(self.file_name.clone())
    }

    pub fn source_description(&self) -> SourceDescription {
        SourceDescription {
            name: self.document_name(),
            description: self.description.clone(),
            citation: self.citation,
        }
    }
}

/// Ordered list of documents that make up the memory index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub documents: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(documents: Vec<ManifestEntry>) -> Result<Self, IngestionError> {
        let manifest = Self { documents };
        manifest.validate()?;
        Ok(manifest)
    }

    /// The portfolio pages plus the private background notes.
    pub fn portfolio(docs_root: impl AsRef<Path>, private_root: impl AsRef<Path>) -> Self {
        let docs = docs_root.as_ref();
        let private = private_root.as_ref();
        Self {
            documents: vec![
                ManifestEntry::new(
                    docs,
                    "index.md",
                    "Personal profile: background, current and past roles, interests and achievements, with a narrative of career and hobbies.",
                ),
                ManifestEntry::new(
                    docs,
                    "resume.md",
                    "Resume: contact details, profile summary, core competencies, work experience, education, awards and certifications.",
                ),
                ManifestEntry::new(
                    docs,
                    "projects.md",
                    "Projects with descriptions, the technologies used and links to their source repositories.",
                ),
                ManifestEntry::new(
                    docs,
                    "milestones.md",
                    "Timeline of major career and personal milestones such as promotions, awards, certifications and life events.",
                ),
                ManifestEntry::new(
                    docs,
                    "recommendations.md",
                    "Testimonials and recommendations from colleagues, clients and friends about skills, work ethic and impact.",
                ),
                ManifestEntry::new(
                    docs,
                    "stack.md",
                    "Technical stack: programming languages, frameworks, platforms and productivity tools, each with a short description.",
                ),
                ManifestEntry::new(
                    docs,
                    "gear.md",
                    "Inventory of favourite personal gear and gadgets, from watches to bikes and tech devices.",
                ),
                ManifestEntry::new(
                    private,
                    "supplementary.md",
                    "Additional notes on the professional journey, the approach to product management and software engineering, and personal interests.",
                )
                .do_not_cite(),
            ],
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, IngestionError> {
        let manifest = toml::from_str::<Self>(raw)
            .map_err(|error| IngestionError::Manifest(error.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub async fn load(path: &Path) -> Result<Self, IngestionError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|error| {
            IngestionError::Manifest(format!("could not read `{}`: {error}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Manifest file from config when set (sources relative to its directory), else the portfolio set.
    pub async fn from_config(config: &MemoryConfig) -> Result<Self, IngestionError> {
        match &config.manifest_path {
            Some(path) => {
                let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
                Ok(Self::load(path).await?.rooted_at(&root))
            }
            None => Ok(Self::portfolio(&config.docs_root, &config.private_root)),
        }
    }

    /// Prefixes relative source directories with `root`.
    pub fn rooted_at(mut self, root: &Path) -> Self {
        for entry in &mut self.documents {
            if entry.source_dir.is_relative() {
                entry.source_dir = root.join(&entry.source_dir);
            }
        }
        self
    }

    pub fn sources(&self) -> Vec<SourceDescription> {
        self.documents.iter().map(ManifestEntry::source_description).collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn validate(&self) -> Result<(), IngestionError> {
        if self.documents.is_empty() {
            return Err(IngestionError::Manifest("manifest lists no documents".to_string()));
        }

        let mut names = BTreeSet::new();
        for entry in &self.documents {
            let file_name = entry.file_name.trim();
            if file_name.is_empty() {
                return Err(IngestionError::Manifest("document file_name must not be empty".to_string()));
            }
            if file_name.contains('/') || file_name.contains('\\') {
                return Err(IngestionError::Manifest(format!(
                    "document file_name `{file_name}` must not contain a path separator; use source_dir"
                )));
            }
            if !names.insert(file_name) {
                return Err(IngestionError::Manifest(format!(
                    "document `{file_name}` is listed more than once"
                )));
            }
        }

        Ok(())
    }
}

/// Reads one manifest entry from disk and attaches content type and metadata.
pub async fn load_document(entry: &ManifestEntry) -> Result<KnowledgeDocument, IngestionError> {
    let path = entry.path();
    let raw_bytes = tokio::fs::read(&path)
        .await
        .map_err(|error| IngestionError::SourceUnreadable { path: path.clone(), reason: error.to_string() })?;

    let name = entry.document_name();
    let mut metadata = BTreeMap::new();
    metadata.insert("extension".to_string(), name.extension().unwrap_or("txt").to_string());
    metadata.insert("description".to_string(), entry.description.clone());

    Ok(KnowledgeDocument {
        name,
        source_path: path,
        raw_bytes,
        content_type: TEXT_PLAIN.to_string(),
        metadata,
    })
}
