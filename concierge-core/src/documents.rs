//! Per-apartment document storage.
//!
//! Layout: `{root}/{apartment_id}/{filename}`. Apartment directories are
//! created lazily on the first successful upload.

use concierge_common::util::{is_safe_path_segment, secure_filename};
use concierge_common::{Error, Result};
use std::path::{Path, PathBuf};

use crate::extract::is_allowed_filename;

/// File-backed store for apartment reference documents.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one apartment's documents.
    pub fn apartment_dir(&self, apartment_id: &str) -> Result<PathBuf> {
        validate_apartment_id(apartment_id)?;
        Ok(self.root.join(apartment_id))
    }

    /// All apartment ids with a document directory, sorted.
    pub async fn list_apartments(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut apartments = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    apartments.push(name.to_string());
                }
            }
        }
        apartments.sort();
        Ok(apartments)
    }

    /// Document file names for an apartment, sorted. Only allowed types are listed.
    pub async fn list_documents(&self, apartment_id: &str) -> Result<Vec<String>> {
        let dir = self.apartment_dir(apartment_id)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("Apartment {apartment_id} not found")))
            }
            Err(e) => return Err(e.into()),
        };

        let mut documents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_allowed_filename(name) {
                    documents.push(name.to_string());
                }
            }
        }
        documents.sort();
        Ok(documents)
    }

    /// Store an uploaded document and return the name it was saved under.
    ///
    /// Nothing touches the disk unless the name passes validation.
    pub async fn upload_document(
        &self,
        apartment_id: &str,
        filename: &str,
        contents: &[u8],
    ) -> Result<String> {
        if filename.trim().is_empty() {
            return Err(Error::InvalidInput("Empty file name".into()));
        }
        if !is_allowed_filename(filename) {
            return Err(Error::InvalidInput("File type not allowed".into()));
        }

        let stored_name = secure_filename(filename);
        if stored_name.is_empty() || !is_allowed_filename(&stored_name) {
            return Err(Error::InvalidInput(format!("Unusable file name: {filename}")));
        }

        let dir = self.apartment_dir(apartment_id)?;
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&stored_name), contents).await?;

        tracing::info!(
            apartment_id = %apartment_id,
            filename = %stored_name,
            bytes = contents.len(),
            "Document uploaded"
        );
        Ok(stored_name)
    }

    /// Remove a document. Unknown apartments and files are both not-found.
    pub async fn delete_document(&self, apartment_id: &str, filename: &str) -> Result<String> {
        let stored_name = secure_filename(filename);
        let dir = self.apartment_dir(apartment_id)?;
        let path = dir.join(&stored_name);

        if stored_name.is_empty() || !tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
            return Err(Error::NotFound(format!("Document {filename} not found")));
        }

        tokio::fs::remove_file(&path).await?;
        tracing::info!(apartment_id = %apartment_id, filename = %stored_name, "Document deleted");
        Ok(stored_name)
    }
}

pub(crate) fn validate_apartment_id(apartment_id: &str) -> Result<()> {
    if is_safe_path_segment(apartment_id) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("Invalid apartment id: {apartment_id:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, DocumentStore) {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path().join("apartments"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_upload_list_delete() {
        let (_dir, store) = store();

        let name = store.upload_document("apt-1", "notes.pdf", b"%PDF").await.unwrap();
        assert_eq!(name, "notes.pdf");
        assert_eq!(store.list_documents("apt-1").await.unwrap(), vec!["notes.pdf"]);

        store.delete_document("apt-1", "notes.pdf").await.unwrap();
        assert!(store.list_documents("apt-1").await.unwrap().is_empty());

        let err = store.delete_document("apt-1", "notes.pdf").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_disallowed_extension_creates_nothing() {
        let (_dir, store) = store();

        let err = store.upload_document("apt-1", "setup.exe", b"MZ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!store.root().join("apt-1").exists());
        assert!(store.list_apartments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_filename_rejected() {
        let (_dir, store) = store();
        let err = store.upload_document("apt-1", "", b"x").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_upload_sanitizes_name() {
        let (_dir, store) = store();
        let name = store
            .upload_document("apt-1", "../House Rules.docx", b"PK")
            .await
            .unwrap();
        assert_eq!(name, "House_Rules.docx");
        assert!(store.root().join("apt-1").join("House_Rules.docx").exists());
    }

    #[tokio::test]
    async fn test_list_documents_unknown_apartment() {
        let (_dir, store) = store();
        let err = store.list_documents("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_documents_skips_other_files() {
        let (_dir, store) = store();
        store.upload_document("apt-1", "guide.pdf", b"%PDF").await.unwrap();
        std::fs::write(store.root().join("apt-1").join("notes.txt"), "x").unwrap();
        std::fs::create_dir(store.root().join("apt-1").join("sub.pdf")).unwrap();

        assert_eq!(store.list_documents("apt-1").await.unwrap(), vec!["guide.pdf"]);
    }

    #[tokio::test]
    async fn test_list_apartments_only_directories() {
        let (_dir, store) = store();
        store.upload_document("apt-b", "a.pdf", b"x").await.unwrap();
        store.upload_document("apt-a", "a.pdf", b"x").await.unwrap();
        std::fs::write(store.root().join("stray.json"), "{}").unwrap();

        assert_eq!(store.list_apartments().await.unwrap(), vec!["apt-a", "apt-b"]);
    }

    #[tokio::test]
    async fn test_list_apartments_missing_root() {
        let (_dir, store) = store();
        assert!(store.list_apartments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsafe_apartment_id_rejected() {
        let (_dir, store) = store();
        let err = store.upload_document("../escape", "a.pdf", b"x").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
