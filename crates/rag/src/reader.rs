//! Directory Reader
//!
//! Loads every text file of a directory as a [`Document`].
//!
//! Only UTF-8 text is read (`.txt`, `.md`, `.csv` and the like). PDF, DOCX
//! and other binary formats are not extracted: such files are skipped with a
//! warning, and a directory holding nothing else fails to load. Convert them
//! to text before provisioning.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::RagError;

/// A source document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: String,
    /// Full UTF-8 text
    pub text: String,
    /// `file_path`, `file_name`, `extension`
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    fn from_file(path: &Path, text: String) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("file_path".to_string(), path.display().to_string());
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            metadata.insert("file_name".to_string(), name.to_string());
        }
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            metadata.insert("extension".to_string(), ext.to_string());
        }

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text,
            metadata,
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.metadata.get("file_name").map(String::as_str)
    }
}

/// Reads documents from a directory
///
/// Hidden entries (dot-prefixed) are skipped. Files that are not valid UTF-8
/// are skipped with a warning. Output is ordered by path.
#[derive(Debug, Clone)]
pub struct DirectoryReader {
    input_dir: PathBuf,
    recursive: bool,
    required_exts: Option<Vec<String>>,
}

impl DirectoryReader {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            recursive: false,
            required_exts: None,
        }
    }

    /// Descend into subdirectories
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Only read files with one of these extensions (without the dot)
    pub fn required_exts(mut self, exts: Vec<String>) -> Self {
        self.required_exts = Some(exts);
        self
    }

    /// Read all documents
    ///
    /// Fails with `FileAccess` when the directory is missing or unreadable,
    /// or when no readable file is found.
    pub fn load_data(&self) -> Result<Vec<Document>, RagError> {
        if !self.input_dir.is_dir() {
            return Err(RagError::file_access(
                &self.input_dir,
                "document directory does not exist",
            ));
        }

        let mut files = Vec::new();
        self.collect_files(&self.input_dir, &mut files)?;
        files.sort();

        let mut documents = Vec::with_capacity(files.len());
        let mut skipped = Vec::new();
        for path in files {
            match std::fs::read_to_string(&path) {
                Ok(text) => documents.push(Document::from_file(&path, text)),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Skipping file that is not UTF-8 text");
                    skipped.push(path);
                }
            }
        }

        if documents.is_empty() {
            let message = if skipped.is_empty() {
                "no readable documents found".to_string()
            } else {
                let names: Vec<_> = skipped
                    .iter()
                    .filter_map(|p| p.file_name())
                    .map(|n| n.to_string_lossy())
                    .collect();
                format!(
                    "no readable documents found; skipped files that are not UTF-8 text: {}",
                    names.join(", ")
                )
            };
            return Err(RagError::file_access(&self.input_dir, message));
        }

        tracing::info!(
            directory = %self.input_dir.display(),
            documents = documents.len(),
            "Loaded documents"
        );

        Ok(documents)
    }

    fn collect_files(&self, dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), RagError> {
        let entries = std::fs::read_dir(dir).map_err(|e| RagError::file_access(dir, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| RagError::file_access(dir, e))?;
            let path = entry.path();

            if is_hidden(&path) {
                continue;
            }

            if path.is_dir() {
                if self.recursive {
                    self.collect_files(&path, files)?;
                }
                continue;
            }

            if let Some(ref exts) = self.required_exts {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                if !exts.iter().any(|e| e.trim_start_matches('.') == ext) {
                    continue;
                }
            }

            files.push(path);
        }

        Ok(())
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &[u8]) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_reads_visible_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.txt", b"second");
        write(dir.path(), "a.md", b"first");
        write(dir.path(), ".hidden", b"secret");

        let docs = DirectoryReader::new(dir.path()).load_data().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].text, "first");
        assert_eq!(docs[0].file_name(), Some("a.md"));
        assert_eq!(docs[0].metadata.get("extension").map(String::as_str), Some("md"));
        assert_eq!(docs[1].text, "second");
    }

    #[test]
    fn test_recursion_is_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "top.txt", b"top");
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        write(&dir.path().join("nested"), "inner.txt", b"inner");

        let flat = DirectoryReader::new(dir.path()).load_data().unwrap();
        assert_eq!(flat.len(), 1);

        let deep = DirectoryReader::new(dir.path()).recursive(true).load_data().unwrap();
        assert_eq!(deep.len(), 2);
    }

    #[test]
    fn test_required_extensions() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", b"keep");
        write(dir.path(), "b.csv", b"drop");

        let docs = DirectoryReader::new(dir.path())
            .required_exts(vec![".txt".to_string()])
            .load_data()
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "keep");
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectoryReader::new(dir.path().join("absent"))
            .load_data()
            .unwrap_err();
        assert!(matches!(err, RagError::FileAccess { .. }));
    }

    #[test]
    fn test_no_readable_documents() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "binary.bin", &[0xff, 0xfe, 0xfd]);

        let err = DirectoryReader::new(dir.path()).load_data().unwrap_err();
        assert!(matches!(err, RagError::FileAccess { .. }));
    }

    #[test]
    fn test_binary_documents_are_named_in_the_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "leaflet.pdf", b"%PDF-1.7\n\xff\xfe\x00\x9c");

        match DirectoryReader::new(dir.path()).load_data() {
            Err(RagError::FileAccess { message, .. }) => {
                assert!(message.contains("leaflet.pdf"), "{}", message);
                assert!(message.contains("not UTF-8 text"), "{}", message);
            }
            other => panic!("expected FileAccess, got {:?}", other.map(|d| d.len())),
        }
    }

    #[test]
    fn test_text_survives_beside_binary_documents() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "leaflet.docx", &[0x50, 0x4b, 0x03, 0x04, 0xff, 0xfe]);
        write(dir.path(), "hours.txt", b"Open nine to five.");

        let docs = DirectoryReader::new(dir.path()).load_data().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].file_name(), Some("hours.txt"));
    }
}
