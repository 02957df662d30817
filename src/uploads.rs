//! Resource uploads
//!
//! Files are sent as multipart form data and come back as a resource handle
//! that later messages reference by id.

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, error, info};

use crate::client::{error_body, OpenJusticeClient};
use crate::config::ApiConfig;
use crate::{ClientConfig, Error, Result};

const UPLOAD_PATH: &str = "conversation/resources/upload-file";

/// A file ready to be uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    /// Wrap in-memory bytes; the MIME type is guessed from the file name
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_for_name(&file_name).to_string();
        Self {
            file_name,
            mime_type,
            bytes,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Read a file from disk
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::upload(None, format!("failed reading {}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload.bin")
            .to_string();
        Ok(Self::new(file_name, bytes))
    }
}

/// MIME type for a file name, by extension
pub fn mime_for_name(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Server-side handle to an uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedResource {
    pub resource_id: String,
    pub file_name: String,
}

/// Upload metadata attached to a finished response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFileRef {
    pub id: String,
    pub file_name: String,
}

impl From<&UploadedResource> for UploadedFileRef {
    fn from(resource: &UploadedResource) -> Self {
        Self {
            id: resource.resource_id.clone(),
            file_name: resource.file_name.clone(),
        }
    }
}

/// Upload a file with the given credentials
pub async fn upload_file(file: &FileUpload, api: &ApiConfig) -> Result<UploadedResource> {
    OpenJusticeClient::new(ClientConfig::new(api.clone()))?
        .upload_file(file)
        .await
}

impl OpenJusticeClient {
    /// Upload a file and return its resource handle
    pub async fn upload_file(&self, file: &FileUpload) -> Result<UploadedResource> {
        let url = self.endpoint(UPLOAD_PATH)?;
        info!("Uploading {} ({} bytes)", file.file_name, file.bytes.len());

        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| Error::upload(None, format!("invalid MIME type '{}': {}", file.mime_type, e)))?;
        let form = Form::new().part("file", part);

        let response = self
            .http()
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::upload(None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = error_body(response).await;
            error!("Upload failed: {} - {}", status, error_text);
            return Err(Error::upload(Some(status.as_u16()), error_text));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::upload(None, format!("invalid response: {}", e)))?;
        let resource = parse_upload_response(&body, &file.file_name)?;

        debug!("Uploaded {} as resource {}", resource.file_name, resource.resource_id);
        Ok(resource)
    }
}

fn parse_upload_response(body: &Value, local_name: &str) -> Result<UploadedResource> {
    let ok = body.get("ok").map_or(false, is_truthy);
    let resource_id = body
        .get("resourceId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty());

    match (ok, resource_id) {
        (true, Some(resource_id)) => Ok(UploadedResource {
            resource_id: resource_id.to_string(),
            file_name: body
                .get("fileName")
                .and_then(Value::as_str)
                .unwrap_or(local_name)
                .to_string(),
        }),
        _ => Err(Error::upload(None, "invalid response")),
    }
}

/// JSON value treated as a success flag: false, null, zero, NaN and "" are falsy
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map_or(true, |n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
