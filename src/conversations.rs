//! Conversation lookup
//!
//! The API key is set up to route to a known conversation, but the send call
//! still wants its id. Finding it is advisory: when the lookup fails the
//! server picks or creates the conversation itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::client::OpenJusticeClient;
use crate::config::ApiConfig;
use crate::{ClientConfig, Recoverable};

const CONVERSATIONS_PATH: &str = "conversation";

/// One entry of the conversation list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl ConversationSummary {
    fn usable_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Pick the conversation to post into.
///
/// The first entry whose title equals one of `titles` (ignoring case) wins;
/// otherwise the first entry of the list is used.
pub fn select_conversation<S: AsRef<str>>(
    conversations: &[ConversationSummary],
    titles: &[S],
) -> Option<String> {
    let by_title = conversations.iter().find(|conversation| {
        conversation.title.as_deref().map_or(false, |title| {
            let title = title.to_lowercase();
            titles
                .iter()
                .any(|wanted| wanted.as_ref().to_lowercase() == title)
        })
    });

    if let Some(conversation) = by_title {
        if let Some(id) = conversation.usable_id() {
            info!(
                "Found '{}' conversation: {}",
                conversation.title.as_deref().unwrap_or_default(),
                id
            );
            return Some(id.to_string());
        }
    }

    let first = conversations.first().and_then(ConversationSummary::usable_id)?;
    info!("Using first available conversation: {}", first);
    Some(first.to_string())
}

/// Entries of a conversation list body. Anything but an array is an empty list.
fn parse_conversation_list(body: Value) -> Vec<ConversationSummary> {
    match body {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).unwrap_or_default())
            .collect(),
        _ => Vec::new(),
    }
}

/// Resolve the target conversation with the given credentials
pub async fn resolve_conversation(api: &ApiConfig) -> Option<String> {
    match OpenJusticeClient::new(ClientConfig::new(api.clone())) {
        Ok(client) => client.resolve_conversation().await,
        Err(e) => {
            debug!("Could not build client for conversation lookup: {}", e);
            None
        }
    }
}

impl OpenJusticeClient {
    /// List the conversations visible to this API key
    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, Recoverable> {
        let lookup_failed = |message: String| Recoverable::ConversationLookup { message };

        let url = self
            .endpoint(CONVERSATIONS_PATH)
            .map_err(|e| lookup_failed(e.to_string()))?;
        let response = self
            .http()
            .get(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| lookup_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(lookup_failed(format!("HTTP {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| lookup_failed(e.to_string()))?;
        Ok(parse_conversation_list(body))
    }

    /// Find the conversation to post into, reporting why a lookup failed
    pub async fn find_conversation(&self) -> Result<Option<String>, Recoverable> {
        let conversations = self.list_conversations().await?;
        debug!("Listed {} conversations", conversations.len());
        Ok(select_conversation(
            &conversations,
            self.config().conversation_titles.as_slice(),
        ))
    }

    /// Find the conversation to post into; failures resolve to `None`
    pub async fn resolve_conversation(&self) -> Option<String> {
        match self.find_conversation().await {
            Ok(conversation_id) => conversation_id,
            Err(reason) => {
                debug!("{}", reason);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TITLES: [&str; 2] = ["test convo", "testconvo"];

    fn convo(id: &str, title: &str) -> ConversationSummary {
        ConversationSummary {
            id: Some(id.to_string()),
            title: Some(title.to_string()),
        }
    }

    #[test]
    fn test_title_match_any_position_any_case() {
        let list = vec![
            convo("a", "Intake"),
            convo("b", "Research"),
            convo("c", "Test Convo"),
        ];
        assert_eq!(select_conversation(&list, &TITLES[..]), Some("c".to_string()));

        let list = vec![convo("x", "TESTCONVO"), convo("y", "Other")];
        assert_eq!(select_conversation(&list, &TITLES[..]), Some("x".to_string()));
    }

    #[test]
    fn test_falls_back_to_first() {
        let list = vec![convo("a", "Intake"), convo("b", "Research")];
        assert_eq!(select_conversation(&list, &TITLES[..]), Some("a".to_string()));
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(select_conversation::<&str>(&[], &TITLES[..]), None);
    }

    #[test]
    fn test_title_is_not_a_substring_match() {
        let list = vec![convo("a", "Intake"), convo("b", "my test convo notes")];
        assert_eq!(select_conversation(&list, &TITLES[..]), Some("a".to_string()));
    }

    #[test]
    fn test_entries_without_ids() {
        let list = vec![ConversationSummary {
            id: None,
            title: Some("test convo".to_string()),
        }];
        assert_eq!(select_conversation(&list, &TITLES[..]), None);
    }

    #[test]
    fn test_parse_conversation_list() {
        let list = parse_conversation_list(json!([
            {"id": "a", "title": "Intake", "createdAt": "2024-01-01"},
            {"id": "b"},
            {"id": 7, "title": "numeric id"}
        ]));
        assert_eq!(list.len(), 3);
        assert_eq!(list[0], convo("a", "Intake"));
        assert_eq!(list[1].title, None);
        assert_eq!(list[2], ConversationSummary::default());

        assert!(parse_conversation_list(json!({"items": []})).is_empty());
    }

    fn client_for(server: &mockito::Server) -> OpenJusticeClient {
        OpenJusticeClient::builder()
            .api_key("test-key")
            .api_url(server.url())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_resolve_conversation_from_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/conversation")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id":"a","title":"Intake"},{"id":"c","title":"test convo"}]"#)
            .create_async()
            .await;

        let client = client_for(&server);
        assert_eq!(client.resolve_conversation().await, Some("c".to_string()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_lookup_is_recoverable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/conversation")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = client_for(&server);
        assert!(matches!(
            client.find_conversation().await,
            Err(Recoverable::ConversationLookup { .. })
        ));
        assert_eq!(client.resolve_conversation().await, None);
    }

    #[tokio::test]
    async fn test_unparseable_body_resolves_to_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/conversation")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        assert_eq!(client_for(&server).resolve_conversation().await, None);
    }
}
