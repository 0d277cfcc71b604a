use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::chat::models::ChatSession;
use crate::config::{api_url, ApiEndpoint};

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("share request failed: {0}")]
    Http(String),

    #[error("share rejected by server: status {status}")]
    Rejected { status: String },

    #[error("malformed share payload: {0}")]
    MalformedPayload(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShareRequest {
    chat_session: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShareResponse {
    status: String,
    #[serde(default)]
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveResponse {
    status: String,
    #[serde(default)]
    chat_session: Option<String>,
}

/// Exchanges local sessions for durable remote share keys and back.
///
/// The session travels as an opaque JSON string inside the envelope, so
/// the server never needs to understand the session schema. Resolution is
/// public by key; no authentication is required to hydrate a shared
/// transcript.
pub struct ShareGateway {
    http: reqwest::Client,
    base_url: String,
}

impl ShareGateway {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ShareError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| ShareError::Http(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Upload a session and return its share key.
    pub async fn share(&self, session: &ChatSession) -> Result<String, ShareError> {
        let payload = serde_json::to_string(session)
            .map_err(|err| ShareError::MalformedPayload(err.to_string()))?;
        let url = api_url(&self.base_url, ApiEndpoint::Share);
        debug!(%url, session_id = %session.id, "sharing session");

        let response = self
            .http
            .post(&url)
            .json(&ShareRequest {
                chat_session: payload,
            })
            .send()
            .await
            .map_err(|err| ShareError::Http(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ShareError::Http(format!(
                "server returned status {}",
                response.status()
            )));
        }

        let body: ShareResponse = response
            .json()
            .await
            .map_err(|err| ShareError::MalformedPayload(err.to_string()))?;
        if body.status != "success" {
            return Err(ShareError::Rejected {
                status: body.status,
            });
        }
        body.key.ok_or_else(|| {
            ShareError::MalformedPayload("success response without a key".to_string())
        })
    }

    /// Fetch and deserialize a previously shared session by key.
    pub async fn resolve(&self, key: &str) -> Result<ChatSession, ShareError> {
        let url = api_url(&self.base_url, ApiEndpoint::Share);
        debug!(%url, key, "resolving shared session");

        let response = self
            .http
            .get(&url)
            .query(&[("key", key)])
            .send()
            .await
            .map_err(|err| ShareError::Http(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ShareError::Http(format!(
                "server returned status {}",
                response.status()
            )));
        }

        let body: ResolveResponse = response
            .json()
            .await
            .map_err(|err| ShareError::MalformedPayload(err.to_string()))?;
        if body.status != "success" {
            return Err(ShareError::Rejected {
                status: body.status,
            });
        }
        let payload = body.chat_session.ok_or_else(|| {
            ShareError::MalformedPayload("success response without a session".to_string())
        })?;
        serde_json::from_str(&payload).map_err(|err| ShareError::MalformedPayload(err.to_string()))
    }

    /// The URL a recipient opens to view a shared session.
    pub fn share_link(&self, key: &str) -> String {
        format!("{}/?share={}", self.base_url, key)
    }
}
