//! Document content extractors.
//!
//! Every supported upload format maps to one [`DocumentFormat`] variant, and
//! each variant knows how to turn the raw file bytes into plain text.
//! Callers dispatch on the file extension via [`DocumentFormat::from_filename`].

pub(crate) mod docx;
pub(crate) mod pdf;

use concierge_common::util::file_extension;

/// Extensions accepted for upload and knowledge loading.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "docx", "doc"];

/// Extraction failure for a single document.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("Invalid Word archive: {0}")]
    Archive(String),

    #[error("Word archive has no {0}")]
    MissingPart(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A supported document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    /// Legacy `.doc` uploads. Only readable when the file is really an
    /// OOXML package with the old extension.
    Doc,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "doc" => Some(Self::Doc),
            _ => None,
        }
    }

    pub fn from_filename(name: &str) -> Option<Self> {
        file_extension(name).and_then(|ext| Self::from_extension(&ext))
    }

    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Doc => "doc",
        }
    }

    /// Extract plain text from the document bytes.
    pub fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        match self {
            Self::Pdf => pdf::extract_text(bytes),
            Self::Docx | Self::Doc => docx::extract_text(bytes),
        }
    }
}

/// Whether a file name carries one of the [`ALLOWED_EXTENSIONS`].
pub fn is_allowed_filename(name: &str) -> bool {
    DocumentFormat::from_filename(name).is_some()
}
