//! PDF text extraction.

use super::ExtractError;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Extract the text layer of a PDF.
///
/// `pdf-extract` panics on some malformed inputs, so the call is isolated
/// and a panic is reported as an ordinary extraction error.
pub(super) fn extract_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let outcome = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes)));

    match outcome {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked on malformed input".into())),
    }
}
