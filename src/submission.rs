//! Submissions
//!
//! One submission runs upload → conversation lookup → send → stream, strictly
//! in that order. Any stage error ends the submission and is returned as is.

use tracing::info;

use crate::client::OpenJusticeClient;
use crate::stream::StreamingResponse;
use crate::uploads::{FileUpload, UploadedFileRef};
use crate::Result;

/// Run a whole submission with configuration from the environment
pub async fn process_submission<F>(
    file: FileUpload,
    description: &str,
    on_update: F,
) -> Result<StreamingResponse>
where
    F: FnMut(&StreamingResponse),
{
    OpenJusticeClient::from_env()?
        .process_submission(&file, description, on_update)
        .await
}

impl OpenJusticeClient {
    /// Upload `file`, post `description` about it and stream the flow's answer
    pub async fn process_submission<F>(
        &self,
        file: &FileUpload,
        description: &str,
        on_update: F,
    ) -> Result<StreamingResponse>
    where
        F: FnMut(&StreamingResponse),
    {
        let uploaded = self.upload_file(file).await?;
        info!("File uploaded: {}", uploaded.resource_id);

        let conversation_id = self.resolve_conversation().await;
        if conversation_id.is_none() {
            info!("No existing conversation found; the server will assign one");
        }

        let sent = self
            .send_message(description, &uploaded, conversation_id.as_deref())
            .await?;
        info!("Conversation ID: {}", sent.conversation_id);

        let mut response = self.stream_response(&sent.conversation_id, on_update).await?;
        response.uploaded_file = Some(UploadedFileRef::from(&uploaded));
        response.description = Some(description.to_string());

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use serde_json::json;
    use std::time::Duration;

    fn client_for(server: &mockito::Server) -> OpenJusticeClient {
        OpenJusticeClient::builder()
            .api_key("test-key")
            .api_url(server.url())
            .stream_grace_period(Duration::ZERO)
            .build()
            .unwrap()
    }

    fn image() -> FileUpload {
        FileUpload::new("a.png", b"image a".to_vec())
    }

    #[tokio::test]
    async fn test_end_to_end_submission() {
        let mut server = mockito::Server::new_async().await;
        let upload = server
            .mock("POST", "/conversation/resources/upload-file")
            .with_status(200)
            .with_body(r#"{"ok":true,"resourceId":"r1","fileName":"a.png"}"#)
            .create_async()
            .await;
        let list = server
            .mock("GET", "/conversation")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let send = server
            .mock("POST", "/conversation/send-message")
            .match_body(mockito::Matcher::PartialJson(json!({"conversationId": null})))
            .with_status(200)
            .with_body(r#"{"conversationId":"c1"}"#)
            .create_async()
            .await;
        let stream = server
            .mock("GET", "/nap/stream")
            .match_query(mockito::Matcher::UrlEncoded(
                "conversationId".into(),
                "c1".into(),
            ))
            .with_status(200)
            .with_body(
                "event: message\ndata: {\"text\":\"result\"}\n\n\
                 event: flow-complete\ndata: {\"status\":\"done\"}\n\n",
            )
            .create_async()
            .await;

        let mut updates = 0;
        let response = client_for(&server)
            .process_submission(&image(), "describe this", |_| updates += 1)
            .await
            .unwrap();

        assert_eq!(updates, 2);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "success": true,
                "conversationId": "c1",
                "messages": ["result"],
                "nodeResults": [],
                "complete": true,
                "finalResult": {"status": "done"},
                "uploadedFile": {"id": "r1", "fileName": "a.png"},
                "description": "describe this"
            })
        );

        upload.assert_async().await;
        list.assert_async().await;
        send.assert_async().await;
        stream.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_failure_stops_pipeline() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/conversation/resources/upload-file")
            .with_status(401)
            .with_body("unauthorized")
            .create_async()
            .await;
        let send = server
            .mock("POST", "/conversation/send-message")
            .expect(0)
            .create_async()
            .await;

        let error = client_for(&server)
            .process_submission(&image(), "describe this", |_| {})
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Upload { status: Some(401), .. }));
        send.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_failure_skips_stream() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/conversation/resources/upload-file")
            .with_status(200)
            .with_body(r#"{"ok":true,"resourceId":"r1","fileName":"a.png"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/conversation")
            .with_status(503)
            .create_async()
            .await;
        server
            .mock("POST", "/conversation/send-message")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let stream = server
            .mock("GET", "/nap/stream")
            .match_query(mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let error = client_for(&server)
            .process_submission(&image(), "describe this", |_| {})
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Send { status: None, .. }));
        stream.assert_async().await;
    }
}
