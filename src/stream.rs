//! Flow response streaming
//!
//! After a message is sent, the flow's output arrives as an SSE stream keyed
//! by conversation id. Every event is folded into a [`StreamingResponse`];
//! the caller sees an immutable snapshot after each change.
//!
//! ```text
//! bytes ──SSEParser──▶ SSEEvent ──StreamingResponse::apply──▶ on_update(&snapshot)
//! ```

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::client::{error_body, OpenJusticeClient};
use crate::config::ApiConfig;
use crate::sse::{SSEEvent, SSEParser};
use crate::uploads::UploadedFileRef;
use crate::{ClientConfig, Error, Recoverable, Result};

const STREAM_PATH: &str = "nap/stream";

/// Attached when the stream ended without a single event
pub const EMPTY_STREAM_WARNING: &str =
    "No response received from flow. The flow may still be processing.";

/// Event types with their own place in the response
pub mod event_types {
    pub const MESSAGE: &str = "message";
    pub const NODE_RESULT: &str = "node-result";
    pub const AWAITING_USER_INPUT: &str = "awaiting-user-input";
    pub const FLOW_COMPLETE: &str = "flow-complete";
}

/// An event of a type without a dedicated field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtherEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
}

/// Everything a flow has streamed so far.
///
/// Fields only grow: lists are appended to, `complete` only goes from false
/// to true, and nothing set is ever cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingResponse {
    pub success: bool,
    pub conversation_id: String,
    pub messages: Vec<String>,
    pub node_results: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awaiting_input: Option<Value>,
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_events: Option<Vec<OtherEvent>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_file: Option<UploadedFileRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl StreamingResponse {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            success: true,
            conversation_id: conversation_id.into(),
            messages: Vec::new(),
            node_results: Vec::new(),
            awaiting_input: None,
            complete: false,
            final_result: None,
            other_events: None,
            warning: None,
            uploaded_file: None,
            description: None,
        }
    }

    /// Fold one event into the response.
    ///
    /// `Ok(())` means the response changed and observers should be told.
    /// Events that change nothing come back as [`Recoverable`].
    pub fn apply(&mut self, event: &SSEEvent) -> std::result::Result<(), Recoverable> {
        let event_type = event.event_type();
        if event.data.is_empty() {
            return Err(Recoverable::EmptyData {
                event_type: event_type.to_string(),
            });
        }

        let payload: Value =
            serde_json::from_str(&event.data).map_err(|e| Recoverable::MalformedPayload {
                event_type: event_type.to_string(),
                message: e.to_string(),
            })?;

        match event_type {
            event_types::MESSAGE => {
                let text = payload
                    .get("text")
                    .and_then(Value::as_str)
                    .filter(|text| !text.is_empty())
                    .ok_or(Recoverable::MissingText)?;
                self.messages.push(text.to_string());
            }
            event_types::NODE_RESULT => self.node_results.push(payload),
            event_types::AWAITING_USER_INPUT => self.awaiting_input = Some(payload),
            event_types::FLOW_COMPLETE => {
                if self.complete {
                    return Err(Recoverable::AlreadyComplete);
                }
                self.complete = true;
                self.final_result = Some(payload);
            }
            other => self
                .other_events
                .get_or_insert_with(Vec::new)
                .push(OtherEvent {
                    event_type: other.to_string(),
                    data: payload,
                }),
        }

        Ok(())
    }

    /// All message fragments concatenated
    pub fn text(&self) -> String {
        self.messages.concat()
    }

    /// Pretty-printed JSON, as shown to users while the flow runs
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

/// Fold already parsed events into a fresh response
pub fn fold_events<'a, I>(conversation_id: &str, events: I) -> StreamingResponse
where
    I: IntoIterator<Item = &'a SSEEvent>,
{
    events
        .into_iter()
        .fold(StreamingResponse::new(conversation_id), |mut response, event| {
            let _ = response.apply(event);
            response
        })
}

/// Consume an SSE byte stream into a response.
///
/// `on_update` runs once for every event that changed the response, in
/// stream order. Events that change nothing are logged and skipped. A read
/// error ends consumption with [`Error::Stream`].
pub async fn consume_stream<S, E, F>(
    conversation_id: &str,
    body: S,
    mut on_update: F,
) -> Result<StreamingResponse>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
    F: FnMut(&StreamingResponse),
{
    futures::pin_mut!(body);

    let mut parser = SSEParser::new();
    let mut response = StreamingResponse::new(conversation_id);
    let mut events_seen = 0usize;

    let mut dispatch = |response: &mut StreamingResponse, event: SSEEvent| {
        events_seen += 1;
        match response.apply(&event) {
            Ok(()) => on_update(&*response),
            Err(reason) => debug!("Skipping {} event: {}", event.event_type(), reason),
        }
    };

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| Error::stream(None, format!("error reading stream: {}", e)))?;
        for event in parser.parse_chunk(&chunk) {
            dispatch(&mut response, event);
        }
    }

    if let Some(event) = parser.finish() {
        dispatch(&mut response, event);
    }

    info!("Stream finished after {} events", events_seen);
    if events_seen == 0 {
        warn!("No events received from stream for conversation {}", conversation_id);
        response.warning = Some(EMPTY_STREAM_WARNING.to_string());
    }

    Ok(response)
}

/// Stream a flow response with the given credentials
pub async fn stream_response<F>(
    conversation_id: &str,
    api: &ApiConfig,
    on_update: F,
) -> Result<StreamingResponse>
where
    F: FnMut(&StreamingResponse),
{
    OpenJusticeClient::new(ClientConfig::new(api.clone()))?
        .stream_response(conversation_id, on_update)
        .await
}

impl OpenJusticeClient {
    /// Follow the flow's event stream for a conversation until it ends
    pub async fn stream_response<F>(
        &self,
        conversation_id: &str,
        on_update: F,
    ) -> Result<StreamingResponse>
    where
        F: FnMut(&StreamingResponse),
    {
        let grace_period = self.config().stream_grace_period;
        if !grace_period.is_zero() {
            debug!("Waiting {:?} before opening stream", grace_period);
            tokio::time::sleep(grace_period).await;
        }

        let mut url = self.endpoint(STREAM_PATH)?;
        url.query_pairs_mut()
            .append_pair("dialogFlowId", &self.config().flow_id)
            .append_pair("conversationId", conversation_id);

        info!("Streaming flow response for conversation {}", conversation_id);
        debug!("Stream URL: {}", url);

        let response = self
            .http()
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| Error::stream(None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = error_body(response).await;
            error!("Stream error response: {} - {}", status, error_text);
            return Err(Error::stream(Some(status.as_u16()), error_text));
        }

        consume_stream(conversation_id, response.bytes_stream(), on_update).await
    }
}
