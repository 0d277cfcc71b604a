use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use tracing::debug;

use crate::chat::auth::TokenProvider;
use crate::chat::error::EngineError;
use crate::chat::models::{ChatMessage, SourceConfig};
use crate::chat::services::stream_decoder::{EventDecoder, StreamEvent};
use crate::config::{api_url, ApiEndpoint};
use crate::settings::models::SettingsModel;

/// Type alias for decoded backend event streams.
pub type EventStream = BoxStream<'static, Result<StreamEvent, EngineError>>;

/// A transcript message as the backend expects it.
#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSourceBody {
    pub repositories: Vec<String>,
    pub query: String,
}

/// The JSON body of a chat turn request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequestBody {
    pub messages: Vec<WireMessage>,
    pub sources: Vec<WireSourceBody>,
}

/// The JSON body of a search request. Scope-learning searches carry only
/// the raw query text; regular searches carry the resolved source list.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SearchRequestBody {
    Sources { sources: Vec<WireSourceBody> },
    ScopeLearning { empty: String },
}

/// Query parameters attached to a turn, derived from settings.
#[derive(Debug, Clone)]
pub struct TurnParams {
    pub repositories: String,
    pub is_deep_research: bool,
    pub temperature: f32,
    pub api_provider: String,
    pub provider_params: Vec<(&'static str, String)>,
}

impl TurnParams {
    pub fn from_settings(settings: &SettingsModel, deep_research: bool) -> Self {
        Self {
            repositories: settings.selected_repositories.join(","),
            is_deep_research: deep_research,
            temperature: settings.temperature,
            api_provider: settings.api_provider.as_str().to_string(),
            provider_params: settings.provider_params(),
        }
    }

    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("repositories", self.repositories.clone()),
            ("is_deep_research", self.is_deep_research.to_string()),
            ("temperature", self.temperature.to_string()),
            ("api_provider", self.api_provider.clone()),
        ];
        pairs.extend(self.provider_params.iter().cloned());
        pairs
    }
}

/// Resolve the effective query for a source: its own query, then the
/// session-wide search query, then the user's message text.
pub fn effective_query(source: &SourceConfig, search_query: &str, user_text: &str) -> String {
    source
        .query
        .as_deref()
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| {
            if search_query.trim().is_empty() {
                user_text
            } else {
                search_query
            }
        })
        .to_string()
}

/// HTTP client for the chat backend. Owns the base URL and attaches the
/// bearer token from the provider on every request.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl BackendClient {
    pub fn new(
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| EngineError::Request(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            tokens,
        })
    }

    /// Open a streaming chat turn and return the decoded event stream.
    pub async fn chat_turn(
        &self,
        body: &ChatRequestBody,
        params: &TurnParams,
    ) -> Result<EventStream, EngineError> {
        let url = api_url(&self.base_url, ApiEndpoint::Chat);
        debug!(%url, messages = body.messages.len(), "opening chat turn");

        let mut request = self
            .http
            .post(&url)
            .query(&params.query_pairs())
            .header("Accept", "text/event-stream")
            .json(body);
        if let Some(token) = self.tokens.bearer_token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| EngineError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(EngineError::Request(format!(
                "server returned status {}",
                response.status()
            )));
        }

        Ok(event_stream(response))
    }

    /// Open a streaming search. Scope-learning searches hit the scope
    /// endpoint; regular searches hit the plain search endpoint.
    pub async fn search(
        &self,
        body: &SearchRequestBody,
        params: &TurnParams,
        scope_learning: bool,
    ) -> Result<EventStream, EngineError> {
        let endpoint = if scope_learning {
            ApiEndpoint::ScopeSearch
        } else {
            ApiEndpoint::Search
        };
        let url = api_url(&self.base_url, endpoint);
        debug!(%url, scope_learning, "opening search");

        let mut request = self
            .http
            .post(&url)
            .query(&params.query_pairs())
            .header("Accept", "text/event-stream")
            .json(body);
        if let Some(token) = self.tokens.bearer_token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| EngineError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(EngineError::Request(format!(
                "server returned status {}",
                response.status()
            )));
        }

        Ok(event_stream(response))
    }
}

/// Decode a streaming HTTP response into backend events.
fn event_stream(response: reqwest::Response) -> EventStream {
    Box::pin(async_stream::stream! {
        let mut decoder = EventDecoder::new();
        let mut bytes = response.bytes_stream();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Err(EngineError::Stream(err.to_string()));
                    return;
                }
            };
            match decoder.push_bytes(&chunk) {
                Ok(events) => {
                    for event in events {
                        yield Ok(event);
                    }
                }
                Err(err) => {
                    yield Err(EngineError::Stream(err.to_string()));
                    return;
                }
            }
        }

        match decoder.finish() {
            Ok(Some(event)) => yield Ok(event),
            Ok(None) => {}
            Err(err) => yield Err(EngineError::Stream(err.to_string())),
        }
    })
}
