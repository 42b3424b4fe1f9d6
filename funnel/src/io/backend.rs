//! Backend collaborator: user registry, peer lookup, message generation.
//!
//! The [`Backend`] trait decouples the session flow from the HTTP service.
//! Tests use a scripted backend that returns canned results without any
//! network traffic.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::handle::Affinity;
use crate::core::types::{DrawCount, Peer};

const API_PREFIX: &str = "/api/f4f";

/// Failure reported by a backend call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Connection, timeout or undecodable response.
    #[error("transport: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl BackendError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// 5xx responses say nothing about the request itself.
    pub fn is_server_side(&self) -> bool {
        matches!(self, Self::Rejected { status, .. } if *status >= 500)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub handle: String,
    pub affinity: Affinity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub session_id: String,
    pub handle: String,
    pub affinity: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeersRequest {
    pub affinity: Affinity,
    pub count: DrawCount,
    /// The visitor's own handle, which must not come back as a peer.
    pub exclude_handle: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRequest {
    pub peer_handles: Vec<String>,
    pub affinity: Affinity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostIntentRequest {
    pub text: String,
}

/// Request/response contract with the funnel backend.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn register(&self, request: &RegisterRequest) -> Result<Registration, BackendError>;

    /// An empty list means nobody else shares the affinity.
    async fn fetch_peers(&self, request: &PeersRequest) -> Result<Vec<Peer>, BackendError>;

    async fn generate_message(&self, request: &MessageRequest) -> Result<String, BackendError>;

    /// Returns a pre-filled external post URL.
    async fn post_intent(&self, request: &PostIntentRequest) -> Result<String, BackendError>;
}

#[derive(Serialize)]
struct EnterBody<'a> {
    username: &'a str,
    project: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnterResponse {
    user_id: Value,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    project: Option<String>,
}

#[derive(Deserialize)]
struct UsersResponse {
    #[serde(default)]
    users: Vec<UserEntry>,
}

#[derive(Deserialize)]
struct UserEntry {
    username: String,
    #[serde(default)]
    project: String,
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    usernames: &'a [String],
    project: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    message: String,
}

#[derive(Serialize)]
struct PostBody<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    twitter_url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// [`Backend`] over the funnel's JSON HTTP API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{API_PREFIX}/{path}", self.base_url)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    #[instrument(skip_all, fields(handle = %request.handle, affinity = %request.affinity))]
    async fn register(&self, request: &RegisterRequest) -> Result<Registration, BackendError> {
        let response = self
            .client
            .post(self.endpoint("enter"))
            .json(&EnterBody {
                username: &request.handle,
                project: request.affinity.as_str(),
            })
            .send()
            .await
            .map_err(transport)?;
        let body: EnterResponse = read_json(response).await?;
        let session_id = id_to_string(&body.user_id)
            .ok_or_else(|| BackendError::Transport("response missing userId".to_string()))?;
        debug!(session_id = %session_id, "registered");
        Ok(Registration {
            session_id,
            handle: body.username.unwrap_or_else(|| request.handle.clone()),
            affinity: body
                .project
                .unwrap_or_else(|| request.affinity.as_str().to_string()),
        })
    }

    #[instrument(skip_all, fields(affinity = %request.affinity, count = request.count.get()))]
    async fn fetch_peers(&self, request: &PeersRequest) -> Result<Vec<Peer>, BackendError> {
        let count = request.count.to_string();
        let response = self
            .client
            .get(self.endpoint("users"))
            .query(&[
                ("project", request.affinity.as_str()),
                ("count", count.as_str()),
                ("currentUsername", request.exclude_handle.as_str()),
            ])
            .send()
            .await
            .map_err(transport)?;
        let body: UsersResponse = read_json(response).await?;
        debug!(returned = body.users.len(), "peers fetched");
        Ok(body
            .users
            .into_iter()
            .map(|user| Peer::new(user.username, user.project))
            .collect())
    }

    #[instrument(skip_all, fields(peers = request.peer_handles.len(), affinity = %request.affinity))]
    async fn generate_message(&self, request: &MessageRequest) -> Result<String, BackendError> {
        let response = self
            .client
            .post(self.endpoint("generate-message"))
            .json(&GenerateBody {
                usernames: &request.peer_handles,
                project: request.affinity.as_str(),
            })
            .send()
            .await
            .map_err(transport)?;
        let body: GenerateResponse = read_json(response).await?;
        Ok(body.message)
    }

    #[instrument(skip_all, fields(chars = request.text.chars().count()))]
    async fn post_intent(&self, request: &PostIntentRequest) -> Result<String, BackendError> {
        let response = self
            .client
            .post(self.endpoint("post"))
            .json(&PostBody {
                message: &request.text,
            })
            .send()
            .await
            .map_err(transport)?;
        let status = response.status().as_u16();
        let body: PostResponse = read_json(response).await?;
        match body.twitter_url {
            Some(url) if body.success && !url.trim().is_empty() => Ok(url),
            _ => {
                warn!(success = body.success, "backend did not return a post url");
                Err(BackendError::rejected(
                    status,
                    "failed to generate a post URL",
                ))
            }
        }
    }
}

fn transport(err: reqwest::Error) -> BackendError {
    BackendError::Transport(err.to_string())
}

/// Decode a success body, or turn a failure status into [`BackendError::Rejected`]
/// carrying the backend's `message` when it sent one.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| BackendError::Transport(format!("read response body: {e}")))?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        debug!(status = status.as_u16(), message = %message, "backend rejected request");
        return Err(BackendError::rejected(status.as_u16(), message));
    }

    serde_json::from_str(&body)
        .map_err(|e| BackendError::Transport(format!("malformed response: {e}")))
}

/// Backends issue ids as strings or numbers; anything else is malformed.
fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
