//! Error types for the concierge services.

use thiserror::Error;

/// Result type alias using the concierge error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Message returned to callers for every server-side failure.
pub const GENERIC_ERROR_MESSAGE: &str = "Error processing the request";

/// Unified error type for concierge services.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing required field or disallowed input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Request body over the configured cap
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// New guest without an apartment id
    #[error("apartment_id is required for new guest {guest_id}")]
    MissingApartment { guest_id: String },

    /// Apartment has no knowledge directory
    #[error("No information found for apartment {0}")]
    UnknownApartment(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The language-model call failed
    #[error("Responder error: {0}")]
    Responder(String),

    /// Outbound messaging failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The responder did not answer in time
    #[error("Operation timed out")]
    Timeout,

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strip any context wrappers.
    pub fn root(&self) -> &Self {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this is a not-found error of any kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound(_) | Self::UnknownApartment(_))
    }

    /// Check if this is a caller mistake.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::MissingApartment { .. } => 400,
            Self::NotFound(_) | Self::UnknownApartment(_) => 404,
            Self::PayloadTooLarge(_) => 413,
            Self::Timeout | Self::Responder(_) => 500,
            Self::Transport(_) => 502,
            Self::WithContext { source, .. } => source.status_code(),
            _ => 500,
        }
    }

    /// Message safe to show to callers. Server-side failures never leak detail.
    pub fn public_message(&self) -> String {
        if self.is_client_error() {
            self.root().to_string()
        } else {
            GENERIC_ERROR_MESSAGE.to_string()
        }
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(Error::InvalidInput("test".into()).status_code(), 400);
        assert_eq!(
            Error::MissingApartment {
                guest_id: "g".into()
            }
            .status_code(),
            400
        );
        assert_eq!(Error::UnknownApartment("apt".into()).status_code(), 404);
        assert_eq!(Error::NotFound("test".into()).status_code(), 404);
        assert_eq!(Error::PayloadTooLarge("upload".into()).status_code(), 413);
        assert_eq!(Error::Responder("boom".into()).status_code(), 500);
        assert_eq!(Error::Timeout.status_code(), 500);
        assert_eq!(Error::Internal("test".into()).status_code(), 500);
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::NotFound("notes.pdf".into());
        let with_ctx = err.with_context("deleting document");
        assert!(matches!(with_ctx, Error::WithContext { .. }));
        assert_eq!(with_ctx.status_code(), 404);
        assert!(with_ctx.is_not_found());
    }

    #[test]
    fn test_public_message_hides_server_detail() {
        let err = Error::Responder("401 invalid x-api-key sk-secret".into());
        assert_eq!(err.public_message(), GENERIC_ERROR_MESSAGE);

        let err = Error::InvalidInput("File type not allowed".into());
        assert_eq!(err.public_message(), "Invalid input: File type not allowed");
    }
}
