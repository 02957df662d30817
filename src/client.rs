//! OpenJustice API client
//!
//! This module provides the client shared by every pipeline stage. It owns the
//! HTTP client with the bearer token installed as a default header, plus the
//! tunables of a submission (flow id, model, grace period before streaming).
//! The stage operations live next to their types in `uploads`, `conversations`,
//! `messages`, `stream` and `submission`.

use reqwest::{header, Client as HttpClient, Response};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::{ApiConfig, DEFAULT_API_URL};
use crate::{Error, Result};

/// Flow the stream endpoint is asked for
pub const DEFAULT_FLOW_ID: &str = "tester";

/// Vision-capable model named in every outgoing message
pub const DEFAULT_MODEL: &str = "gpt-4o-mini-2024-07-18";

/// Pause between sending a message and opening its stream
pub const DEFAULT_STREAM_GRACE_PERIOD: Duration = Duration::from_millis(1000);

/// Titles of the conversation the API key is set up to route to
pub const DEFAULT_CONVERSATION_TITLES: [&str; 2] = ["test convo", "testconvo"];

/// Configuration for the OpenJustice client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub flow_id: String,
    pub model: String,
    /// Sleep before opening the stream so the server can start the flow.
    /// There is no readiness signal to wait on instead.
    pub stream_grace_period: Duration,
    /// Compared case-insensitively against conversation titles
    pub conversation_titles: Vec<String>,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(api: ApiConfig) -> Self {
        Self {
            api,
            flow_id: DEFAULT_FLOW_ID.to_string(),
            model: DEFAULT_MODEL.to_string(),
            stream_grace_period: DEFAULT_STREAM_GRACE_PERIOD,
            conversation_titles: DEFAULT_CONVERSATION_TITLES
                .iter()
                .map(|title| title.to_string())
                .collect(),
            user_agent: format!("openjustice-rust/{}", crate::VERSION),
        }
    }
}

/// Client for the OpenJustice conversation API
#[derive(Debug, Clone)]
pub struct OpenJusticeClient {
    config: ClientConfig,
    http_client: Arc<HttpClient>,
}

impl OpenJusticeClient {
    /// Create a new client with the given configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();

        headers.insert(
            header::USER_AGENT,
            config
                .user_agent
                .parse()
                .map_err(|e| Error::configuration(format!("Invalid user agent: {}", e)))?,
        );

        let mut authorization: header::HeaderValue = format!("Bearer {}", config.api.api_key)
            .parse()
            .map_err(|e| Error::configuration(format!("Invalid API key: {}", e)))?;
        authorization.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, authorization);

        // No overall timeout: it would also bound reading the event stream.
        let http_client = Arc::new(
            HttpClient::builder()
                .default_headers(headers)
                .build()
                .map_err(|e| {
                    Error::configuration(format!("Failed to create HTTP client: {}", e))
                })?,
        );

        debug!("Created OpenJustice client for {}", config.api.api_url);

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Create a client from `OPENJUSTICE_API_KEY` / `OPENJUSTICE_API_URL`
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::new(ApiConfig::from_env()?))
    }

    /// Create a client builder
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn http(&self) -> &HttpClient {
        &self.http_client
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        self.config.api.endpoint(path)
    }
}

/// Read an error response body, tolerating unreadable bodies
pub(crate) async fn error_body(response: Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string())
}

/// Builder for [`OpenJusticeClient`]
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    api_key: Option<String>,
    api_url: String,
    flow_id: Option<String>,
    model: Option<String>,
    stream_grace_period: Option<Duration>,
    conversation_titles: Option<Vec<String>>,
}

impl ClientBuilder {
    /// Create a new client builder
    pub fn new() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            flow_id: None,
            model: None,
            stream_grace_period: None,
            conversation_titles: None,
        }
    }

    /// Start from an already resolved configuration
    pub fn api_config(mut self, api: &ApiConfig) -> Self {
        self.api_key = Some(api.api_key.clone());
        self.api_url = api.api_url.to_string();
        self
    }

    /// Set the API key
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the base URL
    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn flow_id(mut self, flow_id: impl Into<String>) -> Self {
        self.flow_id = Some(flow_id.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the pause before the stream is opened; zero disables it
    pub fn stream_grace_period(mut self, grace_period: Duration) -> Self {
        self.stream_grace_period = Some(grace_period);
        self
    }

    pub fn conversation_titles<I, S>(mut self, titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conversation_titles = Some(titles.into_iter().map(Into::into).collect());
        self
    }

    /// Build the client
    pub fn build(self) -> Result<OpenJusticeClient> {
        let api = ApiConfig::new(self.api_key.unwrap_or_default(), &self.api_url)?;
        let mut config = ClientConfig::new(api);
        if let Some(flow_id) = self.flow_id {
            config.flow_id = flow_id;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(grace_period) = self.stream_grace_period {
            config.stream_grace_period = grace_period;
        }
        if let Some(titles) = self.conversation_titles {
            config.conversation_titles = titles;
        }
        OpenJusticeClient::new(config)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
