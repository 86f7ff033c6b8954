/// Outbound messaging transport
///
/// Seam between the messaging action handlers and the provider wire
/// format. Handlers call the trait; the HTTP implementation posts
/// provider-shaped JSON with reqwest. A send either succeeds with a
/// provider message id or fails once - retries belong to the provider
/// side, never here.

use crate::config::MessagingConfig;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The sending channel identity a run executes under
///
/// Resolved by the trigger layer and passed unchanged to every handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelProfile {
    /// Unique profile identifier
    pub id: String,
    /// Owning team identifier
    pub team_id: String,
    /// Provider phone number id this profile sends from
    pub phone_number_id: String,
}

/// An interactive reply button offered to the recipient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyButton {
    pub id: String,
    pub title: String,
}

/// Async messaging transport contract
///
/// Every method returns the provider-assigned message identifier.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Send a pre-approved template message
    async fn send_template(
        &self,
        profile: &ChannelProfile,
        to: &str,
        template_name: &str,
        body: &str,
    ) -> Result<String>;

    /// Send a free-form text message
    async fn send_text(&self, profile: &ChannelProfile, to: &str, text: &str) -> Result<String>;

    /// Send a media message (image, document, audio, video) by URL
    async fn send_media(
        &self,
        profile: &ChannelProfile,
        to: &str,
        media_type: &str,
        media_url: &str,
        caption: Option<&str>,
    ) -> Result<String>;

    /// Send an interactive message with reply buttons
    async fn send_interactive(
        &self,
        profile: &ChannelProfile,
        to: &str,
        text: &str,
        buttons: &[ReplyButton],
    ) -> Result<String>;
}

/// reqwest-based transport against a WhatsApp-Cloud-shaped JSON API
///
/// POSTs to {api_base}/{phone_number_id}/messages with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpMessageTransport {
    client: reqwest::Client,
    config: MessagingConfig,
}

impl HttpMessageTransport {
    /// Create a transport from the messaging configuration
    pub fn new(config: MessagingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// POST a provider payload and extract the assigned message id
    async fn post_message(&self, profile: &ChannelProfile, payload: Value) -> Result<String> {
        let url = format!("{}/{}/messages", self.config.api_base, profile.phone_number_id);

        tracing::debug!("📨 Sending provider message via {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Message send failed: {}", e))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read provider response: {}", e))?;

        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "Provider rejected the send (status {}): {}",
                status.as_u16(),
                body
            ));
        }

        let message_id = body
            .get("messages")
            .and_then(|m| m.get(0))
            .and_then(|m| m.get("id"))
            .and_then(|id| id.as_str())
            .ok_or_else(|| anyhow::anyhow!("Provider response carried no message id: {}", body))?;

        tracing::info!("✅ Provider accepted message: {}", message_id);

        Ok(message_id.to_string())
    }
}

#[async_trait]
impl MessageTransport for HttpMessageTransport {
    async fn send_template(
        &self,
        profile: &ChannelProfile,
        to: &str,
        template_name: &str,
        body: &str,
    ) -> Result<String> {
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "template",
            "template": {
                "name": template_name,
                "language": { "code": "en" },
                "components": [{
                    "type": "body",
                    "parameters": [{ "type": "text", "text": body }]
                }]
            }
        });

        self.post_message(profile, payload).await
    }

    async fn send_text(&self, profile: &ChannelProfile, to: &str, text: &str) -> Result<String> {
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": text }
        });

        self.post_message(profile, payload).await
    }

    async fn send_media(
        &self,
        profile: &ChannelProfile,
        to: &str,
        media_type: &str,
        media_url: &str,
        caption: Option<&str>,
    ) -> Result<String> {
        let mut media = json!({ "link": media_url });
        if let Some(caption) = caption {
            media["caption"] = json!(caption);
        }

        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": media_type,
            media_type: media
        });

        self.post_message(profile, payload).await
    }

    async fn send_interactive(
        &self,
        profile: &ChannelProfile,
        to: &str,
        text: &str,
        buttons: &[ReplyButton],
    ) -> Result<String> {
        let rendered_buttons: Vec<Value> = buttons
            .iter()
            .map(|button| {
                json!({
                    "type": "reply",
                    "reply": { "id": button.id, "title": button.title }
                })
            })
            .collect();

        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "interactive",
            "interactive": {
                "type": "button",
                "body": { "text": text },
                "action": { "buttons": rendered_buttons }
            }
        });

        self.post_message(profile, payload).await
    }
}
