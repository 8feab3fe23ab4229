//! Seams between the webhook processor and its collaborators.

use async_trait::async_trait;
use concierge_core::Concierge;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ChannelError> for concierge_common::Error {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::InvalidMessage(msg) => Self::InvalidInput(msg),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Outbound side of a messaging platform.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Get the channel name.
    fn name(&self) -> &'static str;

    /// Send a plain text message, returning the platform message id.
    async fn send_text(&self, to: &str, text: &str) -> ChannelResult<String>;

    /// Tell the sender their message was read.
    async fn mark_as_read(&self, message_id: &str) -> ChannelResult<()>;
}

/// Produces the reply to one inbound guest message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        guest_id: &str,
        apartment_id: &str,
        text: &str,
    ) -> concierge_common::Result<String>;
}

#[async_trait]
impl MessageHandler for Concierge {
    async fn handle(
        &self,
        guest_id: &str,
        apartment_id: &str,
        text: &str,
    ) -> concierge_common::Result<String> {
        self.handle_message(guest_id, Some(apartment_id), text)
            .await
            .map(|reply| reply.reply)
    }
}
