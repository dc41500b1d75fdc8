use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const TEXT_PLAIN: &str = "text/plain";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentName(pub String);

impl DocumentName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name without its extension, used as the page slug on the public site.
    pub fn stem(&self) -> &str {
        match self.0.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.0,
        }
    }

    pub fn extension(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(_, extension)| extension).filter(|ext| !ext.is_empty())
    }
}

impl fmt::Display for DocumentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationPolicy {
    #[default]
    Citable,
    DoNotCite,
}

/// What the agent is told about one document in the memory index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescription {
    pub name: DocumentName,
    pub description: String,
    pub citation: CitationPolicy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KnowledgeDocument {
    pub name: DocumentName,
    pub source_path: PathBuf,
    pub raw_bytes: Vec<u8>,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
}

impl KnowledgeDocument {
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw_bytes)
    }

    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.raw_bytes);
        format!("{:x}", hasher.finalize())
    }

    pub fn size_bytes(&self) -> usize {
        self.raw_bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::{DocumentName, KnowledgeDocument, TEXT_PLAIN};

    #[test]
    fn stem_strips_the_extension_only() {
        assert_eq!(DocumentName::new("resume.md").stem(), "resume");
        assert_eq!(DocumentName::new("notes.v2.md").stem(), "notes.v2");
        assert_eq!(DocumentName::new("README").stem(), "README");
        assert_eq!(DocumentName::new(".env").stem(), ".env");
        assert_eq!(DocumentName::new("resume.md").extension(), Some("md"));
        assert_eq!(DocumentName::new("README").extension(), None);
    }

    #[test]
    fn digest_depends_on_bytes_not_name() {
        let first = document("index.md", b"# Hello");
        let renamed = document("other.md", b"# Hello");
        let changed = document("index.md", b"# Hello!");

        assert_eq!(first.digest(), renamed.digest());
        assert_ne!(first.digest(), changed.digest());
        assert_eq!(first.digest().len(), 64);
    }

    fn document(name: &str, bytes: &[u8]) -> KnowledgeDocument {
        KnowledgeDocument {
            name: DocumentName::new(name),
            source_path: PathBuf::from(name),
            raw_bytes: bytes.to_vec(),
            content_type: TEXT_PLAIN.to_string(),
            metadata: BTreeMap::new(),
        }
    }
}
