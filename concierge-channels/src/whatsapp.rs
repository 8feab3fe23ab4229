//! WhatsApp Business Cloud API client and webhook payload parsing.
//!
//! Messages are received via webhook (push-based) and answered through the
//! Graph API `/{phone_number_id}/messages` endpoint.

use crate::traits::{ChannelError, ChannelResult, MessageSender};
use async_trait::async_trait;
use concierge_common::WhatsAppConfig;
use reqwest::Client;
use serde_json::{json, Value};

/// A message extracted from a webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender phone number as delivered (international format, no `+`)
    pub from: String,
    pub id: String,
    /// WhatsApp message type: `text`, `image`, `audio`, ...
    pub kind: String,
    /// Text body, present for `text` messages
    pub body: Option<String>,
}

impl InboundMessage {
    pub fn is_text(&self) -> bool {
        self.kind == "text"
    }
}

/// Extract every message from a webhook payload.
///
/// Deliveries without messages (status updates) yield an empty list. A
/// message missing its sender, id or text body yields an error entry so the
/// caller can report it without dropping its siblings.
pub fn parse_webhook_payload(payload: &Value) -> Vec<ChannelResult<InboundMessage>> {
    let mut messages = Vec::new();

    let Some(entries) = payload.get("entry").and_then(|e| e.as_array()) else {
        return messages;
    };

    for entry in entries {
        let Some(changes) = entry.get("changes").and_then(|c| c.as_array()) else {
            continue;
        };

        for change in changes {
            let Some(msgs) = change
                .get("value")
                .and_then(|v| v.get("messages"))
                .and_then(|m| m.as_array())
            else {
                continue;
            };

            messages.extend(msgs.iter().map(parse_message));
        }
    }

    messages
}

fn parse_message(msg: &Value) -> ChannelResult<InboundMessage> {
    let field = |name: &str| msg.get(name).and_then(|v| v.as_str()).map(str::to_string);

    let from = field("from")
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ChannelError::InvalidMessage("message has no sender".into()))?;
    let id = field("id")
        .ok_or_else(|| ChannelError::InvalidMessage(format!("message from {from} has no id")))?;
    let kind = field("type").unwrap_or_else(|| "unknown".into());

    let body = if kind == "text" {
        let text = msg
            .get("text")
            .and_then(|t| t.get("body"))
            .and_then(|b| b.as_str())
            .ok_or_else(|| {
                ChannelError::InvalidMessage(format!("text message {id} has no body"))
            })?;
        Some(text.to_string())
    } else {
        None
    };

    Ok(InboundMessage {
        from,
        id,
        kind,
        body,
    })
}

/// WhatsApp Business Cloud API client.
pub struct WhatsAppClient {
    access_token: String,
    phone_number_id: String,
    api_base: String,
    client: Client,
}

impl WhatsAppClient {
    pub fn new(
        access_token: impl Into<String>,
        phone_number_id: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            phone_number_id: phone_number_id.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Build a client when both the access token and phone number id are set.
    pub fn from_config(config: &WhatsAppConfig) -> Option<Self> {
        let token = config.access_token.as_deref().filter(|t| !t.is_empty())?;
        let phone_id = config.phone_number_id.as_deref().filter(|p| !p.is_empty())?;
        Some(Self::new(token, phone_id, &config.api_base))
    }

    /// Send a text message.
    pub async fn send_message(&self, to: &str, text: &str) -> ChannelResult<String> {
        let body = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": normalize_recipient(to),
            "type": "text",
            "text": {
                "preview_url": false,
                "body": text
            }
        });

        let result = self.post_messages(&body).await?;
        tracing::info!(to = %to, "WhatsApp message sent");
        Ok(first_message_id(&result))
    }

    /// Send a pre-approved template message.
    pub async fn send_template_message(
        &self,
        to: &str,
        template_name: &str,
        language_code: Option<&str>,
    ) -> ChannelResult<String> {
        let body = json!({
            "messaging_product": "whatsapp",
            "to": normalize_recipient(to),
            "type": "template",
            "template": {
                "name": template_name,
                "language": { "code": language_code.unwrap_or("es") }
            }
        });

        let result = self.post_messages(&body).await?;
        tracing::info!(to = %to, template = %template_name, "WhatsApp template sent");
        Ok(first_message_id(&result))
    }

    /// Mark an inbound message as read.
    pub async fn mark_as_read(&self, message_id: &str) -> ChannelResult<()> {
        let body = json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": message_id
        });

        self.post_messages(&body).await.map(|_| ())
    }

    async fn post_messages(&self, body: &Value) -> ChannelResult<Value> {
        let url = format!("{}/{}/messages", self.api_base, self.phone_number_id);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Connection(format!("WhatsApp request error: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ChannelError::Auth("WhatsApp access token rejected".into()));
        }
        if !status.is_success() {
            let error = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed(format!(
                "WhatsApp API error ({status}): {error}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| ChannelError::Internal(format!("Failed to parse response: {e}")))
    }
}

#[async_trait]
impl MessageSender for WhatsAppClient {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    async fn send_text(&self, to: &str, text: &str) -> ChannelResult<String> {
        self.send_message(to, text).await
    }

    async fn mark_as_read(&self, message_id: &str) -> ChannelResult<()> {
        WhatsAppClient::mark_as_read(self, message_id).await
    }
}

/// The Graph API wants recipients without the leading `+`.
fn normalize_recipient(to: &str) -> &str {
    to.strip_prefix('+').unwrap_or(to)
}

fn first_message_id(result: &Value) -> String {
    result
        .get("messages")
        .and_then(|m| m.as_array())
        .and_then(|arr| arr.first())
        .and_then(|msg| msg.get("id"))
        .and_then(|id| id.as_str())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn text_payload(from: &str, body: &str) -> Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "changes": [{
                    "value": {
                        "messages": [{
                            "from": from,
                            "id": "wamid.1",
                            "timestamp": "1699999999",
                            "type": "text",
                            "text": { "body": body }
                        }]
                    }
                }]
            }]
        })
    }

    fn sent_response() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "messaging_product": "whatsapp",
            "messages": [{ "id": "wamid.out" }]
        }))
    }

    #[test]
    fn whatsapp_parse_empty_payload() {
        assert!(parse_webhook_payload(&json!({})).is_empty());
    }

    #[test]
    fn whatsapp_parse_status_update() {
        let payload = json!({
            "entry": [{ "changes": [{ "value": { "statuses": [{ "status": "delivered" }] } }] }]
        });
        assert!(parse_webhook_payload(&payload).is_empty());
    }

    #[test]
    fn whatsapp_parse_valid_text_message() {
        let msgs = parse_webhook_payload(&text_payload("34600111222", "Hola!"));
        assert_eq!(msgs.len(), 1);
        let msg = msgs[0].as_ref().unwrap();
        assert_eq!(msg.from, "34600111222");
        assert_eq!(msg.id, "wamid.1");
        assert!(msg.is_text());
        assert_eq!(msg.body.as_deref(), Some("Hola!"));
    }

    #[test]
    fn whatsapp_parse_image_message() {
        let payload = json!({
            "entry": [{ "changes": [{ "value": { "messages": [{
                "from": "34600111222",
                "id": "wamid.2",
                "type": "image",
                "image": { "id": "media-1" }
            }] } }] }]
        });
        let msgs = parse_webhook_payload(&payload);
        let msg = msgs[0].as_ref().unwrap();
        assert_eq!(msg.kind, "image");
        assert!(!msg.is_text());
        assert!(msg.body.is_none());
    }

    #[test]
    fn whatsapp_parse_message_without_sender() {
        let payload = json!({
            "entry": [{ "changes": [{ "value": { "messages": [
                { "id": "wamid.3", "type": "text", "text": { "body": "hi" } },
                { "from": "34600111222", "id": "wamid.4", "type": "text", "text": { "body": "ok" } }
            ] } }] }]
        });
        let msgs = parse_webhook_payload(&payload);
        assert_eq!(msgs.len(), 2);
        assert!(matches!(msgs[0], Err(ChannelError::InvalidMessage(_))));
        assert!(msgs[1].is_ok());
    }

    #[test]
    fn whatsapp_from_config_requires_credentials() {
        let mut config = WhatsAppConfig::default();
        assert!(WhatsAppClient::from_config(&config).is_none());

        config.access_token = Some("token".into());
        config.phone_number_id = Some("123".into());
        assert!(WhatsAppClient::from_config(&config).is_some());
    }

    #[tokio::test]
    async fn whatsapp_send_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/123/messages"))
            .and(header("Authorization", "Bearer test-token"))
            .and(body_json(json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": "34600111222",
                "type": "text",
                "text": { "preview_url": false, "body": "Hola" }
            })))
            .respond_with(sent_response())
            .expect(1)
            .mount(&server)
            .await;

        let client = WhatsAppClient::new("test-token", "123", server.uri());
        let id = client.send_message("+34600111222", "Hola").await.unwrap();
        assert_eq!(id, "wamid.out");
    }

    #[tokio::test]
    async fn whatsapp_send_template_defaults_to_spanish() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/123/messages"))
            .and(body_json(json!({
                "messaging_product": "whatsapp",
                "to": "34600111222",
                "type": "template",
                "template": { "name": "welcome", "language": { "code": "es" } }
            })))
            .respond_with(sent_response())
            .expect(1)
            .mount(&server)
            .await;

        let client = WhatsAppClient::new("test-token", "123", server.uri());
        client
            .send_template_message("34600111222", "welcome", None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn whatsapp_mark_as_read() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/123/messages"))
            .and(body_json(json!({
                "messaging_product": "whatsapp",
                "status": "read",
                "message_id": "wamid.1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(1)
            .mount(&server)
            .await;

        let client = WhatsAppClient::new("test-token", "123", server.uri());
        client.mark_as_read("wamid.1").await.unwrap();
    }

    #[tokio::test]
    async fn whatsapp_send_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/123/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad recipient"))
            .mount(&server)
            .await;

        let client = WhatsAppClient::new("test-token", "123", server.uri());
        let err = client.send_message("1", "Hola").await.unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed(ref m) if m.contains("bad recipient")));
    }

    #[tokio::test]
    async fn whatsapp_send_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = WhatsAppClient::new("expired", "123", server.uri());
        let err = client.send_message("1", "Hola").await.unwrap_err();
        assert!(matches!(err, ChannelError::Auth(_)));
    }
}
