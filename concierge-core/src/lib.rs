//! Concierge Core - apartment knowledge, guest sessions, and the orchestrator.
//!
//! This crate provides:
//! - Document content extractors (PDF, Word)
//! - The apartment document store
//! - The apartment knowledge loader
//! - File-backed guest sessions with per-guest locks
//! - The responder provider abstraction (Anthropic)
//! - The conversation orchestrator

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod documents;
pub mod extract;
pub mod knowledge;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod session;

pub use documents::DocumentStore;
pub use extract::{DocumentFormat, ExtractError, ALLOWED_EXTENSIONS};
pub use knowledge::{ApartmentKnowledge, KnowledgeDocument, KnowledgeLoader};
pub use orchestrator::{ChatReply, Concierge, GuestHistory};
pub use prompt::build_system_prompt;
pub use provider::{
    AnthropicProvider, ChatRequest, ChatResponse, Message, Provider, ProviderError, TokenUsage,
};
pub use session::{ChatHistory, ChatMessage, ChatRole, GuestApartmentLink, SessionStore};
