//! Retrieval and identity collaborators.
//!
//! Where a description comes from (disk, an unpacked archive, a download
//! cache) and who the caller is are decided outside the engine. The engine
//! only asks through these two traits.

use std::path::Path;

use crate::document::SceneDocument;
use crate::error::Result;

/// Produces the full serialized description for a handle
pub trait DocumentSource: Send {
    fn load(&self, handle: &Path) -> Result<SceneDocument>;
}

/// Reads descriptions from JSON files
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFileSource;

impl DocumentSource for JsonFileSource {
    fn load(&self, handle: &Path) -> Result<SceneDocument> {
        tracing::debug!("Loading scene description from {}", handle.display());
        SceneDocument::from_file(handle)
    }
}

/// Supplies the opaque caller identity used for identity-token substitution
pub trait IdentityProvider: Send {
    fn identity(&self) -> String;
}

/// A fixed identity string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedIdentity(pub String);

impl FixedIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }
}

impl IdentityProvider for FixedIdentity {
    fn identity(&self) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_json_file_source_reads_document() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"sources": [{{"id": "leaf", "name": "Cam"}}]}}"#).unwrap();

        let doc = JsonFileSource.load(file.path()).unwrap();
        assert_eq!(doc.sources.len(), 1);
    }

    #[test]
    fn test_json_file_source_missing_file() {
        let result = JsonFileSource.load(Path::new("/nonexistent/scene.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_fixed_identity() {
        assert_eq!(FixedIdentity::new("abc123").identity(), "abc123");
    }
}
