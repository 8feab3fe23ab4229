//! WhatsApp webhook handling: subscription handshake and inbound messages.
//!
//! Processing is best-effort. Every delivery ends in a [`WebhookStatus`];
//! nothing here returns an error to the platform. Outbound send failures are
//! logged and do not change the reported status.

use std::sync::Arc;

use concierge_common::logging::generate_trace_id;
use concierge_common::util::truncate_with_ellipsis;
use concierge_common::WhatsAppConfig;
use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;

use crate::registry::GuestPhoneRegistry;
use crate::traits::{MessageHandler, MessageSender};
use crate::whatsapp::{parse_webhook_payload, InboundMessage};

/// Result of the subscription handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Token matched; echo this challenge back.
    Verified(String),
    /// Token matched but no challenge was supplied.
    MissingChallenge,
    Forbidden,
}

/// Outcome of one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookStatus {
    /// Nothing to answer (status updates, empty deliveries).
    NoMessage,
    UnsupportedType {
        from: String,
        message_type: String,
    },
    GuestNotRegistered {
        from: String,
    },
    Success {
        from: String,
        apartment: String,
        message: String,
        response: String,
    },
    /// The orchestrator failed; the guest got the fallback reply.
    ApiError {
        from: String,
    },
    Error {
        error: String,
    },
}

/// Fixed replies sent without consulting the orchestrator.
#[derive(Debug, Clone)]
struct CannedReplies {
    unsupported: String,
    unregistered: String,
    error: String,
}

/// Turns webhook deliveries into orchestrator calls and replies.
pub struct WebhookProcessor {
    verify_token: String,
    app_secret: Option<String>,
    replies: CannedReplies,
    registry: Arc<GuestPhoneRegistry>,
    handler: Arc<dyn MessageHandler>,
    sender: Option<Arc<dyn MessageSender>>,
}

impl WebhookProcessor {
    /// Create a processor. Without a `sender`, replies are logged and dropped.
    pub fn new(
        config: &WhatsAppConfig,
        registry: Arc<GuestPhoneRegistry>,
        handler: Arc<dyn MessageHandler>,
        sender: Option<Arc<dyn MessageSender>>,
    ) -> Self {
        if sender.is_none() {
            tracing::warn!("WhatsApp credentials not configured, webhook replies will not be sent");
        }
        Self {
            verify_token: config.verify_token.clone(),
            app_secret: config.app_secret.clone().filter(|s| !s.is_empty()),
            replies: CannedReplies {
                unsupported: config.unsupported_reply.clone(),
                unregistered: config.unregistered_reply.clone(),
                error: config.error_reply.clone(),
            },
            registry,
            handler,
            sender,
        }
    }

    pub fn registry(&self) -> &GuestPhoneRegistry {
        &self.registry
    }

    /// Meta subscription handshake.
    pub fn verify(
        &self,
        mode: Option<&str>,
        token: Option<&str>,
        challenge: Option<&str>,
    ) -> VerifyOutcome {
        let token_matches = token.is_some_and(|t| constant_time_eq(t, &self.verify_token));

        if mode != Some("subscribe") || !token_matches {
            tracing::warn!("WhatsApp webhook verification failed");
            return VerifyOutcome::Forbidden;
        }

        match challenge {
            Some(challenge) => {
                tracing::info!("WhatsApp webhook verified");
                VerifyOutcome::Verified(challenge.to_string())
            }
            None => VerifyOutcome::MissingChallenge,
        }
    }

    /// Check the `X-Hub-Signature-256` header. Always passes without an app secret.
    pub fn verify_signature(&self, body: &[u8], signature_header: Option<&str>) -> bool {
        match &self.app_secret {
            Some(secret) => verify_hub_signature(secret, body, signature_header.unwrap_or("")),
            None => true,
        }
    }

    /// Handle one delivery.
    ///
    /// Deliveries carrying several messages are handled in order; the status
    /// of the last one is returned.
    pub async fn process(&self, payload: &Value) -> WebhookStatus {
        let mut status = WebhookStatus::NoMessage;

        for parsed in parse_webhook_payload(payload) {
            let message = match parsed {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed WhatsApp message");
                    status = WebhookStatus::Error {
                        error: e.to_string(),
                    };
                    continue;
                }
            };

            let trace_id = generate_trace_id();
            let span = concierge_common::channel_span!(
                "whatsapp",
                trace_id.as_str(),
                message.from.as_str()
            );
            status = self.process_message(message).instrument(span).await;
            tracing::info!(trace_id = %trace_id, status = ?status, "WhatsApp message processed");
        }

        status
    }

    async fn process_message(&self, message: InboundMessage) -> WebhookStatus {
        let from = message.from.clone();

        let body = match message.body.as_deref() {
            Some(body) if message.is_text() => body,
            _ => {
                self.reply(&from, &self.replies.unsupported).await;
                return WebhookStatus::UnsupportedType {
                    from,
                    message_type: message.kind,
                };
            }
        };

        if let Some(sender) = &self.sender {
            if let Err(e) = sender.mark_as_read(&message.id).await {
                tracing::warn!(message_id = %message.id, error = %e, "Failed to mark message as read");
            }
        }

        let apartment_id = match self.registry.get_apartment_id(&from) {
            Ok(Some(apartment_id)) => apartment_id,
            Ok(None) => {
                tracing::info!(from = %from, "Message from unregistered number");
                self.reply(&from, &self.replies.unregistered).await;
                return WebhookStatus::GuestNotRegistered { from };
            }
            Err(e) => {
                tracing::error!(from = %from, error = %e, "Phone registry lookup failed");
                return WebhookStatus::Error {
                    error: e.to_string(),
                };
            }
        };

        tracing::debug!(
            apartment_id = %apartment_id,
            preview = %truncate_with_ellipsis(body, 80),
            "Forwarding WhatsApp message to concierge"
        );

        match self.handler.handle(&from, &apartment_id, body).await {
            Ok(response) => {
                self.reply(&from, &response).await;
                WebhookStatus::Success {
                    from,
                    apartment: apartment_id,
                    message: body.to_string(),
                    response,
                }
            }
            Err(e) => {
                tracing::error!(
                    from = %from,
                    apartment_id = %apartment_id,
                    error = %e,
                    "Concierge failed to answer WhatsApp message"
                );
                self.reply(&from, &self.replies.error).await;
                WebhookStatus::ApiError { from }
            }
        }
    }

    async fn reply(&self, to: &str, text: &str) {
        let Some(sender) = &self.sender else {
            tracing::debug!(to = %to, "No WhatsApp sender, dropping reply");
            return;
        };
        if let Err(e) = sender.send_text(to, text).await {
            tracing::error!(to = %to, channel = sender.name(), error = %e, "Failed to send reply");
        }
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .as_bytes()
            .iter()
            .zip(b.as_bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

/// Verify a Meta `X-Hub-Signature-256` header (`sha256=<hex hmac>`).
pub fn verify_hub_signature(app_secret: &str, body: &[u8], signature_header: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let Some(hex_sig) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
