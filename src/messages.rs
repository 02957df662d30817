//! Sending messages
//!
//! A message carries the user's description and references the uploaded
//! resource by id and name. The server answers with the conversation the
//! message landed in.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::client::{error_body, OpenJusticeClient};
use crate::config::ApiConfig;
use crate::uploads::UploadedResource;
use crate::{ClientConfig, Error, Result};

const SEND_MESSAGE_PATH: &str = "conversation/send-message";

/// Titles are cut to this many characters
pub const MAX_TITLE_CHARS: usize = 100;

/// Body of `POST /conversation/send-message`.
///
/// `None` fields serialize as `null`; the endpoint expects every key present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: Option<String>,
    pub title: Option<String>,
    pub prompt: Option<String>,
    pub messages: Vec<OutgoingMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub role: String,
    pub content: String,
    pub model: String,
    pub metadata: MessageMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub resources: Vec<ResourceReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceReference {
    pub id: String,
    pub name: String,
}

impl SendMessageRequest {
    pub fn new(
        description: &str,
        resource: &UploadedResource,
        model: &str,
        conversation_id: Option<&str>,
    ) -> Self {
        let title: String = description.chars().take(MAX_TITLE_CHARS).collect();
        let non_empty = |text: String| if text.is_empty() { None } else { Some(text) };

        Self {
            conversation_id: conversation_id.map(str::to_string),
            title: non_empty(title),
            prompt: non_empty(description.to_string()),
            messages: vec![OutgoingMessage {
                role: "user".to_string(),
                content: description.to_string(),
                model: model.to_string(),
                metadata: MessageMetadata {
                    resources: vec![ResourceReference {
                        id: resource.resource_id.clone(),
                        name: resource.file_name.clone(),
                    }],
                },
            }],
        }
    }
}

/// Outcome of a sent message
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub conversation_id: String,
    /// Raw response body
    pub response: Value,
}

/// Send a message with the given credentials
pub async fn send_message(
    description: &str,
    resource: &UploadedResource,
    api: &ApiConfig,
    conversation_id: Option<&str>,
) -> Result<SentMessage> {
    OpenJusticeClient::new(ClientConfig::new(api.clone()))?
        .send_message(description, resource, conversation_id)
        .await
}

impl OpenJusticeClient {
    /// Post a message referencing `resource` and return its conversation
    pub async fn send_message(
        &self,
        description: &str,
        resource: &UploadedResource,
        conversation_id: Option<&str>,
    ) -> Result<SentMessage> {
        let url = self.endpoint(SEND_MESSAGE_PATH)?;
        let payload =
            SendMessageRequest::new(description, resource, &self.config().model, conversation_id);

        info!(
            "Sending message with resource {} (conversation: {})",
            resource.resource_id,
            conversation_id.unwrap_or("<server assigned>")
        );

        let response = self
            .http()
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::send(None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = error_body(response).await;
            error!("Send message failed: {} - {}", status, error_text);
            return Err(Error::send(Some(status.as_u16()), error_text));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::send(None, format!("invalid response: {}", e)))?;
        debug!("Message sent, API response: {}", body);

        let conversation_id = body
            .get("conversationId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .or(conversation_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::send(None, "no conversation id"))?
            .to_string();

        Ok(SentMessage {
            conversation_id,
            response: body,
        })
    }
}
