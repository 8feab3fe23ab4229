//! Conversation orchestrator.
//!
//! One guest message becomes one responder round trip: resolve the apartment,
//! load its knowledge, append the guest turn, ask the responder, append the
//! reply and persist. Each guest is handled under its own lock so concurrent
//! messages from the same guest never overwrite each other's turns.

use std::sync::Arc;
use std::time::Duration;

use concierge_common::{ConciergeConfig, Error, LlmConfig, Result};
use serde::Serialize;

use crate::documents::validate_apartment_id;
use crate::knowledge::{ApartmentKnowledge, KnowledgeLoader};
use crate::prompt::build_system_prompt;
use crate::provider::{ChatRequest, Message, Provider};
use crate::session::{ChatHistory, ChatMessage, ChatRole, SessionStore};

/// Result of a successful chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    #[serde(rename = "response")]
    pub reply: String,
    pub guest_id: String,
    pub apartment_id: String,
}

/// A guest's stored conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuestHistory {
    pub guest_id: String,
    pub apartment_id: Option<String>,
    pub history: ChatHistory,
}

/// Glues knowledge, sessions and the responder together.
pub struct Concierge {
    provider: Arc<dyn Provider>,
    knowledge: KnowledgeLoader,
    sessions: Arc<SessionStore>,
    persona: ConciergeConfig,
    model: String,
    max_tokens: i64,
    timeout: Duration,
}

impl Concierge {
    pub fn new(
        provider: Arc<dyn Provider>,
        knowledge: KnowledgeLoader,
        sessions: Arc<SessionStore>,
        llm: &LlmConfig,
        persona: ConciergeConfig,
    ) -> Self {
        Self {
            provider,
            knowledge,
            sessions,
            persona,
            model: llm.model.clone(),
            max_tokens: llm.max_tokens,
            timeout: Duration::from_secs(llm.timeout_secs),
        }
    }

    /// Override the responder timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Answer one guest message.
    ///
    /// A supplied `apartment_id` replaces the guest's stored link; without one
    /// the stored link is used. If the responder fails, the guest turn is
    /// still persisted and no assistant turn is recorded.
    pub async fn handle_message(
        &self,
        guest_id: &str,
        apartment_id: Option<&str>,
        message: &str,
    ) -> Result<ChatReply> {
        if guest_id.trim().is_empty() || message.trim().is_empty() {
            return Err(Error::InvalidInput(
                "guest_id and message are required".into(),
            ));
        }

        let _guard = self.sessions.lock(guest_id).await;

        let apartment_id = self.resolve_apartment(guest_id, apartment_id).await?;
        let knowledge = self.load_knowledge(&apartment_id).await?;

        let mut history = self.sessions.get_history(guest_id).await?;
        history.push(ChatMessage::guest(message));

        let request = ChatRequest {
            model: self.model.clone(),
            messages: conversation_messages(&history),
            max_tokens: Some(self.max_tokens),
            temperature: None,
            system: Some(build_system_prompt(&self.persona, &knowledge)),
        };

        let reply = match self.ask(request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(
                    guest_id = %guest_id,
                    apartment_id = %apartment_id,
                    provider = self.provider.name(),
                    error = %e,
                    "Responder failed, keeping guest turn only"
                );
                if let Err(save_err) = self.sessions.save_history(guest_id, &history).await {
                    tracing::error!(
                        guest_id = %guest_id,
                        error = %save_err,
                        "Failed to persist guest turn after responder failure"
                    );
                }
                return Err(e);
            }
        };

        history.push(ChatMessage::assistant(reply.clone()));
        self.sessions.save_history(guest_id, &history).await?;

        tracing::info!(
            guest_id = %guest_id,
            apartment_id = %apartment_id,
            turns = history.len(),
            "Chat turn completed"
        );

        Ok(ChatReply {
            reply,
            guest_id: guest_id.to_string(),
            apartment_id,
        })
    }

    /// Stored history and apartment link for `guest_id`.
    pub async fn history(&self, guest_id: &str) -> Result<GuestHistory> {
        let history = self.sessions.get_history(guest_id).await?;
        let apartment_id = self
            .sessions
            .get_link(guest_id)
            .await?
            .map(|link| link.apartment_id);

        Ok(GuestHistory {
            guest_id: guest_id.to_string(),
            apartment_id,
            history,
        })
    }

    /// Clear the history. The apartment link is kept.
    pub async fn reset(&self, guest_id: &str) -> Result<()> {
        let _guard = self.sessions.lock(guest_id).await;
        self.sessions.reset(guest_id).await?;
        tracing::info!(guest_id = %guest_id, "Chat history reset");
        Ok(())
    }

    async fn resolve_apartment(&self, guest_id: &str, supplied: Option<&str>) -> Result<String> {
        match supplied.map(str::trim).filter(|id| !id.is_empty()) {
            Some(apartment_id) => {
                validate_apartment_id(apartment_id)?;
                self.sessions.save_link(guest_id, apartment_id).await?;
                Ok(apartment_id.to_string())
            }
            None => self
                .sessions
                .get_link(guest_id)
                .await?
                .map(|link| link.apartment_id)
                .ok_or_else(|| Error::MissingApartment {
                    guest_id: guest_id.to_string(),
                }),
        }
    }

    async fn load_knowledge(&self, apartment_id: &str) -> Result<ApartmentKnowledge> {
        let loader = self.knowledge.clone();
        let id = apartment_id.to_string();
        tokio::task::spawn_blocking(move || loader.load(&id))
            .await
            .map_err(|e| Error::Internal(format!("Knowledge loader panicked: {e}")))??
            .ok_or_else(|| Error::UnknownApartment(apartment_id.to_string()))
    }

    async fn ask(&self, request: ChatRequest) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.provider.chat(request)).await {
            Ok(Ok(response)) => {
                tracing::debug!(
                    model = %response.model,
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    latency_ms = response.latency_ms,
                    "Responder replied"
                );
                Ok(response.content)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.timeout.as_secs_f32(),
                    provider = self.provider.name(),
                    "Responder did not answer in time"
                );
                Err(Error::Timeout)
            }
        }
    }
}

/// Guest and assistant turns in responder form.
///
/// Consecutive turns with the same role are merged and leading assistant
/// turns dropped, so the conversation always alternates and opens with the
/// guest.
fn conversation_messages(history: &[ChatMessage]) -> Vec<Message> {
    let mut messages: Vec<Message> = Vec::with_capacity(history.len());
    for entry in history {
        let role = entry.role.as_str();
        if let Some(last) = messages.last_mut().filter(|last| last.role == role) {
            last.content.push_str("\n\n");
            last.content.push_str(&entry.content);
            continue;
        }
        if messages.is_empty() && entry.role == ChatRole::Assistant {
            continue;
        }
        messages.push(Message::new(role, entry.content.clone()));
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatResponse, ProviderError, TokenUsage};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replies from a script and records every request.
    #[derive(Default)]
    struct ScriptedProvider {
        replies: Mutex<VecDeque<std::result::Result<String, ProviderError>>>,
        requests: Mutex<Vec<ChatRequest>>,
        delay: Option<Duration>,
    }

    impl ScriptedProvider {
        fn replying(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
                ..Self::default()
            }
        }

        fn failing() -> Self {
            let err = ProviderError::new("scripted", "test", "boom").with_status(500);
            Self {
                replies: Mutex::new(VecDeque::from([Err(err)])),
                ..Self::default()
            }
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, request: ChatRequest) -> std::result::Result<ChatResponse, ProviderError> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("ok".into()));
            next.map(|content| ChatResponse {
                provider: "scripted".into(),
                model: request.model,
                content,
                usage: TokenUsage::default(),
                finish_reason: Some("end_turn".into()),
                latency_ms: 0,
            })
        }
    }

    struct Fixture {
        _dir: TempDir,
        provider: Arc<ScriptedProvider>,
        concierge: Concierge,
    }

    fn fixture(provider: ScriptedProvider) -> Fixture {
        let dir = TempDir::new().unwrap();
        let apartments = dir.path().join("apartments");
        std::fs::create_dir_all(apartments.join("apt-1")).unwrap();
        std::fs::create_dir_all(apartments.join("apt-2")).unwrap();

        let provider = Arc::new(provider);
        let concierge = Concierge::new(
            provider.clone(),
            KnowledgeLoader::new(&apartments),
            Arc::new(SessionStore::new(dir.path().join("history"))),
            &LlmConfig::default(),
            ConciergeConfig::default(),
        );
        Fixture {
            _dir: dir,
            provider,
            concierge,
        }
    }

    #[tokio::test]
    async fn test_new_guest_without_apartment_fails() {
        let f = fixture(ScriptedProvider::replying(&["hi"]));
        let err = f
            .concierge
            .handle_message("guest-1", None, "hello")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MissingApartment { .. }));
        assert_eq!(err.status_code(), 400);
        assert!(f.provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_chat_appends_guest_then_assistant() {
        let f = fixture(ScriptedProvider::replying(&["¡Hola!"]));
        let reply = f
            .concierge
            .handle_message("guest-1", Some("apt-1"), "hello")
            .await
            .unwrap();

        assert_eq!(reply.reply, "¡Hola!");
        assert_eq!(reply.guest_id, "guest-1");
        assert_eq!(reply.apartment_id, "apt-1");

        let stored = f.concierge.history("guest-1").await.unwrap();
        assert_eq!(stored.apartment_id.as_deref(), Some("apt-1"));
        assert_eq!(stored.history.len(), 2);
        assert_eq!(stored.history[0].role, ChatRole::Guest);
        assert_eq!(stored.history[0].content, "hello");
        assert_eq!(stored.history[1].role, ChatRole::Assistant);
        assert_eq!(stored.history[1].content, "¡Hola!");
    }

    #[tokio::test]
    async fn test_follow_up_uses_stored_link_and_history() {
        let f = fixture(ScriptedProvider::replying(&["first", "second"]));
        f.concierge
            .handle_message("guest-1", Some("apt-1"), "hello")
            .await
            .unwrap();
        let reply = f
            .concierge
            .handle_message("guest-1", None, "and the wifi?")
            .await
            .unwrap();

        assert_eq!(reply.apartment_id, "apt-1");
        let requests = f.provider.requests();
        assert_eq!(requests.len(), 2);
        let roles: Vec<_> = requests[1].messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);
        assert!(requests[1]
            .system
            .as_deref()
            .unwrap()
            .contains("apartment apt-1"));
        assert_eq!(requests[1].max_tokens, Some(1000));
    }

    #[tokio::test]
    async fn test_supplied_apartment_replaces_link() {
        let f = fixture(ScriptedProvider::replying(&["a", "b"]));
        f.concierge
            .handle_message("guest-1", Some("apt-1"), "hello")
            .await
            .unwrap();
        let reply = f
            .concierge
            .handle_message("guest-1", Some("apt-2"), "moved")
            .await
            .unwrap();

        assert_eq!(reply.apartment_id, "apt-2");
        let stored = f.concierge.history("guest-1").await.unwrap();
        assert_eq!(stored.apartment_id.as_deref(), Some("apt-2"));
    }

    #[tokio::test]
    async fn test_unknown_apartment() {
        let f = fixture(ScriptedProvider::replying(&["hi"]));
        let err = f
            .concierge
            .handle_message("guest-1", Some("apt-404"), "hello")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnknownApartment(ref id) if id == "apt-404"));
        assert_eq!(err.status_code(), 404);
        assert!(f.provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let f = fixture(ScriptedProvider::replying(&["hi"]));
        let err = f
            .concierge
            .handle_message("guest-1", Some("apt-1"), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_responder_failure_keeps_guest_turn_only() {
        let f = fixture(ScriptedProvider::failing());
        let err = f
            .concierge
            .handle_message("guest-1", Some("apt-1"), "hello")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Responder(_)));
        assert_eq!(err.public_message(), "Error processing the request");

        let stored = f.concierge.history("guest-1").await.unwrap();
        assert_eq!(stored.history.len(), 1);
        assert_eq!(stored.history[0].role, ChatRole::Guest);
        assert_eq!(stored.history[0].content, "hello");
    }

    #[tokio::test]
    async fn test_retry_after_failure_merges_guest_turns() {
        let f = fixture(ScriptedProvider::failing());
        let _ = f
            .concierge
            .handle_message("guest-1", Some("apt-1"), "hello")
            .await;
        f.concierge
            .handle_message("guest-1", None, "anyone there?")
            .await
            .unwrap();

        let requests = f.provider.requests();
        let last = &requests[1].messages;
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].content, "hello\n\nanyone there?");

        let stored = f.concierge.history("guest-1").await.unwrap();
        assert_eq!(stored.history.len(), 3);
    }

    #[tokio::test]
    async fn test_responder_timeout() {
        let provider = ScriptedProvider {
            delay: Some(Duration::from_secs(2)),
            ..ScriptedProvider::default()
        };
        let f = fixture(provider);
        let concierge = f.concierge.with_timeout(Duration::from_millis(50));

        let err = concierge
            .handle_message("guest-1", Some("apt-1"), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));
        assert_eq!(err.status_code(), 500);

        let stored = concierge.history("guest-1").await.unwrap();
        assert_eq!(stored.history.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_clears_history_keeps_link() {
        let f = fixture(ScriptedProvider::replying(&["hi"]));
        f.concierge
            .handle_message("guest-1", Some("apt-1"), "hello")
            .await
            .unwrap();

        f.concierge.reset("guest-1").await.unwrap();

        let stored = f.concierge.history("guest-1").await.unwrap();
        assert!(stored.history.is_empty());
        assert_eq!(stored.apartment_id.as_deref(), Some("apt-1"));
    }

    #[tokio::test]
    async fn test_concurrent_messages_for_one_guest_are_not_lost() {
        let provider = ScriptedProvider {
            delay: Some(Duration::from_millis(30)),
            ..ScriptedProvider::default()
        };
        let f = fixture(provider);
        let concierge = Arc::new(f.concierge);

        let a = {
            let c = concierge.clone();
            tokio::spawn(async move { c.handle_message("guest-1", Some("apt-1"), "one").await })
        };
        let b = {
            let c = concierge.clone();
            tokio::spawn(async move { c.handle_message("guest-1", Some("apt-1"), "two").await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let stored = concierge.history("guest-1").await.unwrap();
        assert_eq!(stored.history.len(), 4);
        let guest_turns: Vec<_> = stored
            .history
            .iter()
            .filter(|m| m.role == ChatRole::Guest)
            .map(|m| m.content.as_str())
            .collect();
        assert!(guest_turns.contains(&"one"));
        assert!(guest_turns.contains(&"two"));
    }

    #[test]
    fn test_conversation_messages_merges_and_trims() {
        let history = vec![
            ChatMessage::assistant("stray"),
            ChatMessage::guest("a"),
            ChatMessage::guest("b"),
            ChatMessage::assistant("c"),
        ];
        let messages = conversation_messages(&history);
        assert_eq!(
            messages,
            vec![Message::new("user", "a\n\nb"), Message::new("assistant", "c")]
        );
    }
}
