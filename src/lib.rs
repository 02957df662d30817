// OpenJustice Client - Rust Edition
// Upload a file, send a message that references it, and follow the flow's event stream

//! # OpenJustice Client Library
//!
//! This crate talks to the OpenJustice conversation API. One submission runs a
//! fixed pipeline:
//!
//! ```text
//! ApiConfig::from_env()
//!   ↓
//! upload_file            POST /conversation/resources/upload-file
//!   ↓
//! resolve_conversation   GET  /conversation            (advisory, never fails)
//!   ↓
//! send_message           POST /conversation/send-message
//!   ↓
//! stream_response        GET  /nap/stream               (Server-Sent Events)
//! ```
//!
//! The stream consumer folds every event into a [`StreamingResponse`] and hands
//! an immutable snapshot to the caller's progress callback after each change.
//!
//! ## Usage Example
//!
//! ```no_run
//! use openjustice::{process_submission, FileUpload};
//!
//! # async fn run() -> openjustice::Result<()> {
//! let image = FileUpload::from_path("receipt.png").await?;
//! let response = process_submission(image, "describe this", |snapshot| {
//!     println!("{} message(s) so far", snapshot.messages.len());
//! })
//! .await?;
//! println!("complete: {}", response.complete);
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod client;
pub mod config;
pub mod conversations;
pub mod messages;
pub mod sse;
pub mod stream;
pub mod submission;
pub mod uploads;

pub use chat::{ChatMessage, ChatRole, ImageAttachment, Transcript};
pub use client::{ClientBuilder, ClientConfig, OpenJusticeClient};
pub use config::ApiConfig;
pub use conversations::{resolve_conversation, select_conversation, ConversationSummary};
pub use messages::{send_message, SendMessageRequest, SentMessage};
pub use sse::{SSEEvent, SSEParser};
pub use stream::{consume_stream, fold_events, stream_response, OtherEvent, StreamingResponse};
pub use submission::process_submission;
pub use uploads::{upload_file, FileUpload, UploadedFileRef, UploadedResource};

use thiserror::Error;

/// Crate version, sent in the user agent
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fatal errors for one submission.
///
/// Each pipeline stage has its own variant so a caller can tell which step
/// failed. HTTP failures carry the status code when the server answered.
///
/// ## Rust Learning Notes:
///
/// `#[error(...)]` may call a helper with `.field` arguments. Here it keeps the
/// "status then body" formatting in one place for all stage variants.
#[derive(Error, Debug)]
pub enum Error {
    /// Credentials or the base URL are missing or unusable
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The file upload was rejected or the response was malformed
    #[error("Failed to upload file: {}", failure_detail(.status, .message))]
    Upload { status: Option<u16>, message: String },

    /// The message was rejected or no conversation id could be resolved
    #[error("Failed to send message: {}", failure_detail(.status, .message))]
    Send { status: Option<u16>, message: String },

    /// The event stream could not be opened or broke while reading
    #[error("Failed to stream flow response: {}", failure_detail(.status, .message))]
    Stream { status: Option<u16>, message: String },
}

fn failure_detail(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("{} {}", status, message),
        None => message.to_string(),
    }
}

impl Error {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn upload(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Upload {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn send(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Send {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn stream(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Stream {
            status,
            message: message.into(),
        }
    }

    /// HTTP status returned by the server, if the failure came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Configuration { .. } => None,
            Error::Upload { status, .. } | Error::Send { status, .. } | Error::Stream { status, .. } => {
                *status
            }
        }
    }
}

/// Non-fatal outcomes that are logged and skipped.
///
/// These never abort a submission. Keeping them apart from [`Error`] makes it
/// explicit that "no conversation hint" or "one bad event" is not a failed
/// pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Recoverable {
    /// Listing conversations failed; the server will pick or create one
    #[error("could not fetch conversations: {message}")]
    ConversationLookup { message: String },

    /// An event block had no `data:` lines
    #[error("'{event_type}' event carried no data")]
    EmptyData { event_type: String },

    /// An event's data was not valid JSON
    #[error("could not parse '{event_type}' event: {message}")]
    MalformedPayload { event_type: String, message: String },

    /// A `message` event without a text field
    #[error("message event has no text")]
    MissingText,

    /// A second `flow-complete` after the flow already finished
    #[error("flow already complete")]
    AlreadyComplete,
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
