//! Chat-platform collaborators
//!
//! The HTTP collaborator talks to the service that owns conversations and
//! renders forms. Without one configured, a logging collaborator stands in:
//! every conversation resolves and every effect succeeds.

use crate::runtime::{ActionDispatcher, ConversationHandle, ConversationTransport};
use crate::state_machine::{Event, RecruitContext, RecruitState};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("Invalid collaborator URL: {0}")]
    InvalidUrl(String),
    #[error("Request failed: {0}")]
    Request(String),
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

#[derive(Debug, Deserialize)]
struct ConversationResponse {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct StateEnteredRequest<'a> {
    state: RecruitState,
    context: &'a RecruitContext,
}

#[derive(Debug, Deserialize)]
struct StateEnteredResponse {
    #[serde(default)]
    event: Option<Event>,
}

/// Collaborator reached over HTTP
pub struct HttpCollaborator {
    client: Client,
    base_url: Url,
}

impl HttpCollaborator {
    /// # Errors
    ///
    /// Fails if `base_url` is not an absolute http(s) URL or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CollaboratorError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CollaboratorError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(CollaboratorError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// `{base}/conversations/{id}[/{tail}]`, with the id as one encoded path segment
    fn conversation_url(
        &self,
        conversation_id: &str,
        tail: Option<&str>,
    ) -> Result<Url, CollaboratorError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| CollaboratorError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("conversations")
            .push(conversation_id)
            .extend(tail);
        Ok(url)
    }

    async fn fetch_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationHandle>, CollaboratorError> {
        let response = self
            .client
            .get(self.conversation_url(conversation_id, None)?)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response
            .text()
            .await
            .map_err(|e| CollaboratorError::Request(format!("Failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(CollaboratorError::Status { status, body });
        }

        let parsed: ConversationResponse = if body.trim().is_empty() {
            ConversationResponse { name: None }
        } else {
            serde_json::from_str(&body)
                .map_err(|e| CollaboratorError::Parse(format!("{e} - body: {body}")))?
        };
        Ok(Some(ConversationHandle {
            id: conversation_id.to_string(),
            name: parsed.name,
        }))
    }

    async fn post_state(
        &self,
        conversation_id: &str,
        state: RecruitState,
        context: &RecruitContext,
    ) -> Result<Option<Event>, CollaboratorError> {
        let response = self
            .client
            .post(self.conversation_url(conversation_id, Some("state"))?)
            .json(&StateEnteredRequest { state, context })
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CollaboratorError::Request(format!("Failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(CollaboratorError::Status { status, body });
        }
        if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
            return Ok(None);
        }

        let parsed: StateEnteredResponse = serde_json::from_str(&body)
            .map_err(|e| CollaboratorError::Parse(format!("{e} - body: {body}")))?;
        Ok(parsed.event)
    }
}

fn request_error(e: reqwest::Error) -> CollaboratorError {
    if e.is_timeout() {
        CollaboratorError::Request(format!("Request timeout: {e}"))
    } else if e.is_connect() {
        CollaboratorError::Request(format!("Connection failed: {e}"))
    } else {
        CollaboratorError::Request(e.to_string())
    }
}

#[async_trait]
impl ConversationTransport for HttpCollaborator {
    async fn resolve_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationHandle>, String> {
        self.fetch_conversation(conversation_id).await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ActionDispatcher for HttpCollaborator {
    async fn on_state_entered(
        &self,
        conversation_id: &str,
        state: RecruitState,
        context: &RecruitContext,
    ) -> Result<Option<Event>, String> {
        self.post_state(conversation_id, state, context)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Stand-in used when no collaborator URL is configured
#[derive(Debug, Default)]
pub struct LoggingCollaborator;

#[async_trait]
impl ConversationTransport for LoggingCollaborator {
    async fn resolve_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationHandle>, String> {
        Ok(Some(ConversationHandle {
            id: conversation_id.to_string(),
            name: None,
        }))
    }
}

#[async_trait]
impl ActionDispatcher for LoggingCollaborator {
    async fn on_state_entered(
        &self,
        conversation_id: &str,
        state: RecruitState,
        context: &RecruitContext,
    ) -> Result<Option<Event>, String> {
        tracing::info!(
            conv_id = %conversation_id,
            state = %state,
            context = ?context,
            "Would render state"
        );
        Ok(None)
    }
}

/// The collaborator chosen at startup
pub enum Collaborator {
    Http(HttpCollaborator),
    Logging(LoggingCollaborator),
}

impl Collaborator {
    /// HTTP collaborator when a URL is configured, logging-only otherwise
    ///
    /// # Errors
    ///
    /// Fails if the URL is invalid or the HTTP client cannot be built.
    pub fn from_url(url: Option<&str>, timeout: Duration) -> Result<Self, CollaboratorError> {
        match url {
            Some(url) => Ok(Collaborator::Http(HttpCollaborator::new(url, timeout)?)),
            None => Ok(Collaborator::Logging(LoggingCollaborator)),
        }
    }
}

#[async_trait]
impl ConversationTransport for Collaborator {
    async fn resolve_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationHandle>, String> {
        match self {
            Collaborator::Http(c) => c.resolve_conversation(conversation_id).await,
            Collaborator::Logging(c) => c.resolve_conversation(conversation_id).await,
        }
    }
}

#[async_trait]
impl ActionDispatcher for Collaborator {
    async fn on_state_entered(
        &self,
        conversation_id: &str,
        state: RecruitState,
        context: &RecruitContext,
    ) -> Result<Option<Event>, String> {
        match self {
            Collaborator::Http(c) => c.on_state_entered(conversation_id, state, context).await,
            Collaborator::Logging(c) => c.on_state_entered(conversation_id, state, context).await,
        }
    }
}
