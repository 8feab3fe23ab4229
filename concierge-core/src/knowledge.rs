//! Apartment knowledge loading.
//!
//! Knowledge is rebuilt from the documents on disk for every request. There is
//! no cache, so an upload or delete is visible to the next message.

use concierge_common::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::documents::validate_apartment_id;
use crate::extract::DocumentFormat;

/// Extracted text of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnowledgeDocument {
    pub filename: String,
    pub content: String,
}

/// Everything known about one apartment.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApartmentKnowledge {
    pub apartment_id: String,
    pub documents: Vec<KnowledgeDocument>,
}

impl ApartmentKnowledge {
    pub fn new(apartment_id: impl Into<String>) -> Self {
        Self {
            apartment_id: apartment_id.into(),
            documents: Vec::new(),
        }
    }

    /// Concatenated text of all documents, each introduced by its file name.
    pub fn full_text(&self) -> String {
        self.documents
            .iter()
            .map(|doc| format!("\n\n=== {} ===\n{}", doc.filename, doc.content))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Builds [`ApartmentKnowledge`] from the apartment document directories.
///
/// Blocking: reads and parses files synchronously. Async callers should run
/// it on the blocking pool.
#[derive(Debug, Clone)]
pub struct KnowledgeLoader {
    root: PathBuf,
}

impl KnowledgeLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load an apartment's knowledge.
    ///
    /// Returns `Ok(None)` when the apartment has no directory. A directory
    /// with no readable documents yields empty knowledge instead.
    pub fn load(&self, apartment_id: &str) -> Result<Option<ApartmentKnowledge>> {
        validate_apartment_id(apartment_id)?;
        let dir = self.root.join(apartment_id);
        if !dir.is_dir() {
            return Ok(None);
        }

        let mut knowledge = ApartmentKnowledge::new(apartment_id);
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(format) = DocumentFormat::from_filename(&filename) else {
                continue;
            };
            if !entry.file_type()?.is_file() {
                continue;
            }

            let content = read_document(&entry.path(), format).unwrap_or_else(|e| {
                tracing::warn!(
                    apartment_id = %apartment_id,
                    filename = %filename,
                    error = %e,
                    "Document extraction failed, using empty content"
                );
                String::new()
            });

            knowledge.documents.push(KnowledgeDocument { filename, content });
        }

        tracing::debug!(
            apartment_id = %apartment_id,
            documents = knowledge.documents.len(),
            "Apartment knowledge loaded"
        );
        Ok(Some(knowledge))
    }
}

fn read_document(path: &Path, format: DocumentFormat) -> std::result::Result<String, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    format.extract_text(&bytes).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::docx::fixtures::docx_with_paragraphs;
    use crate::extract::pdf::fixtures::pdf_with_text;
    use tempfile::TempDir;

    fn loader_with(files: &[(&str, Vec<u8>)]) -> (TempDir, KnowledgeLoader) {
        let dir = TempDir::new().unwrap();
        let apt = dir.path().join("apt-1");
        std::fs::create_dir_all(&apt).unwrap();
        for (name, bytes) in files {
            std::fs::write(apt.join(name), bytes).unwrap();
        }
        let loader = KnowledgeLoader::new(dir.path());
        (dir, loader)
    }

    #[test]
    fn test_unknown_apartment_is_none() {
        let (_dir, loader) = loader_with(&[]);
        assert!(loader.load("apt-404").unwrap().is_none());
    }

    #[test]
    fn test_empty_directory_is_empty_knowledge() {
        let (_dir, loader) = loader_with(&[]);
        let knowledge = loader.load("apt-1").unwrap().unwrap();
        assert!(knowledge.is_empty());
        assert_eq!(knowledge.full_text(), "");
    }

    #[test]
    fn test_all_markers_present_regardless_of_order() {
        let (_dir, loader) = loader_with(&[
            ("a.docx", docx_with_paragraphs(&["MARKER-ALPHA"])),
            ("b.docx", docx_with_paragraphs(&["MARKER-BETA"])),
        ]);

        let knowledge = loader.load("apt-1").unwrap().unwrap();
        let text = knowledge.full_text();
        assert_eq!(knowledge.documents.len(), 2);
        assert!(text.contains("MARKER-ALPHA"));
        assert!(text.contains("MARKER-BETA"));
        assert!(text.contains("=== a.docx ==="));
        assert!(text.contains("=== b.docx ==="));
    }

    #[test]
    fn test_pdf_and_docx_both_contribute() {
        let (_dir, loader) = loader_with(&[
            ("guide.pdf", pdf_with_text("MARKER-PDF")),
            ("rules.docx", docx_with_paragraphs(&["MARKER-DOCX"])),
        ]);

        let text = loader.load("apt-1").unwrap().unwrap().full_text();
        assert!(text.contains("MARKER-PDF"));
        assert!(text.contains("MARKER-DOCX"));
        assert!(text.contains("=== guide.pdf ==="));
    }

    #[test]
    fn test_unsupported_files_skipped() {
        let (_dir, loader) = loader_with(&[
            ("rules.docx", docx_with_paragraphs(&["No smoking"])),
            ("photo.jpg", vec![0xFF, 0xD8]),
        ]);

        let knowledge = loader.load("apt-1").unwrap().unwrap();
        assert_eq!(knowledge.documents.len(), 1);
        assert_eq!(knowledge.documents[0].filename, "rules.docx");
    }

    #[test]
    fn test_broken_document_contributes_empty_text() {
        let (_dir, loader) = loader_with(&[
            ("broken.pdf", b"definitely not a pdf".to_vec()),
            ("ok.docx", docx_with_paragraphs(&["Checkout at 11"])),
        ]);

        let knowledge = loader.load("apt-1").unwrap().unwrap();
        assert_eq!(knowledge.documents.len(), 2);
        let broken = knowledge
            .documents
            .iter()
            .find(|d| d.filename == "broken.pdf")
            .unwrap();
        assert!(broken.content.is_empty());
        assert!(knowledge.full_text().contains("Checkout at 11"));
    }
}
