//! Chat transcript
//!
//! The conversation as a front end shows it: user messages with an optional
//! image, each followed by an assistant message that starts as a loading
//! placeholder, is rewritten on every stream update and is finalized when the
//! submission ends.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stream::StreamingResponse;
use crate::uploads::FileUpload;
use crate::Error;

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// An image shown next to a user message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    /// `data:` URL with the image inlined as base64
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.bytes))
    }
}

impl From<&FileUpload> for ImageAttachment {
    fn from(file: &FileUpload) -> Self {
        Self {
            mime_type: file.mime_type.clone(),
            bytes: file.bytes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub is_loading: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: ChatRole, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            image: None,
            is_loading: false,
            created_at: Utc::now(),
        }
    }
}

/// Ordered list of chat messages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// True while some assistant message is still waiting for output
    pub fn is_loading(&self) -> bool {
        self.messages.iter().any(|message| message.is_loading)
    }

    /// Append a user message and its assistant placeholder.
    ///
    /// Returns the placeholder id, or `None` when the text is blank.
    pub fn submit_user(&mut self, content: &str, image: Option<&ImageAttachment>) -> Option<Uuid> {
        let content = content.trim();
        if content.is_empty() {
            return None;
        }

        let mut user = ChatMessage::new(ChatRole::User, content.to_string());
        user.image = image.map(ImageAttachment::data_url);
        self.messages.push(user);

        let mut placeholder = ChatMessage::new(ChatRole::Assistant, String::new());
        placeholder.is_loading = true;
        let id = placeholder.id;
        self.messages.push(placeholder);

        Some(id)
    }

    /// Show the latest stream snapshot in the assistant message
    pub fn update_assistant(&mut self, id: Uuid, snapshot: &StreamingResponse) -> bool {
        self.set_assistant(id, snapshot.to_pretty_json())
    }

    /// Stop loading the assistant message.
    ///
    /// A successful submission keeps the last streamed snapshot as the
    /// content; a failed one replaces it with the error.
    pub fn finish_assistant(&mut self, id: Uuid, outcome: Result<(), &Error>) -> bool {
        match outcome {
            Ok(()) => match self.assistant_mut(id) {
                Some(message) => {
                    message.is_loading = false;
                    true
                }
                None => false,
            },
            Err(error) => self.set_assistant(id, format!("Error: {}", error)),
        }
    }

    pub fn message(&self, id: Uuid) -> Option<&ChatMessage> {
        self.messages.iter().find(|message| message.id == id)
    }

    fn assistant_mut(&mut self, id: Uuid) -> Option<&mut ChatMessage> {
        self.messages
            .iter_mut()
            .find(|message| message.id == id && message.role == ChatRole::Assistant)
    }

    fn set_assistant(&mut self, id: Uuid, content: String) -> bool {
        match self.assistant_mut(id) {
            Some(message) => {
                message.content = content;
                message.is_loading = false;
                true
            }
            None => false,
        }
    }
}
