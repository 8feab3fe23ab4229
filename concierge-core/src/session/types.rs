//! Session data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who wrote a history entry.
///
/// Guest turns are stored as `"user"` so records line up with the responder's
/// wire roles; `"guest"` is accepted on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    #[serde(rename = "user", alias = "guest")]
    Guest,
    Assistant,
}

impl ChatRole {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One immutable history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn guest(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Guest, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

/// Ordered message log for one guest.
pub type ChatHistory = Vec<ChatMessage>;

/// The apartment a guest is staying in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestApartmentLink {
    pub guest_id: String,
    pub apartment_id: String,
    pub created_at: DateTime<Utc>,
}

impl GuestApartmentLink {
    pub fn new(guest_id: impl Into<String>, apartment_id: impl Into<String>) -> Self {
        Self {
            guest_id: guest_id.into(),
            apartment_id: apartment_id.into(),
            created_at: Utc::now(),
        }
    }
}
