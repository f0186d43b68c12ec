//! HTTP client for the chat backend.
//!
//! One method per consumed endpoint with typed request/response structs.
//! Transport failures and non-2xx statuses become `BackendError`;
//! application-level `error` fields stay in the typed responses so callers
//! can apply their own policy (a chat error is terminal for the turn, a
//! file-save error is logged only).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::personas::Persona;
use crate::provider::{Provider, ProviderStatus};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend api error: {0}")]
    Api(String),
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub session_id: Option<i64>,
    pub message: String,
    /// Persona role key; the backend routes it to a model.
    pub model: String,
    pub provider: Provider,
    pub file_ids: Vec<i64>,
}

/// Reply of `POST /chat`. A present `error` is terminal for the turn even
/// when the HTTP status was 2xx.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub session_id: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Reply of `POST /api/upload_file`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub file_id: Option<i64>,
    /// Server-side (sanitized) filename.
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub extracted_text: Option<String>,
    #[serde(default)]
    pub is_image: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// One row of `GET /api/get_chat_history`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub title: String,
    pub username: String,
}

/// One message of a stored session transcript. `sender` is the wire value
/// ("user" or "ai").
#[derive(Debug, Clone, Deserialize)]
pub struct SessionTurn {
    pub sender: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
}

/// Reply of `GET /api/get_session/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionTranscript {
    pub owner_username: String,
    #[serde(default)]
    pub messages: Vec<SessionTurn>,
}

/// Success/error acknowledgement used by rename, delete, and file save.
#[derive(Debug, Clone, Deserialize)]
pub struct AckReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PersonaVisibilityReply {
    #[serde(default)]
    personas: Vec<Persona>,
}

/// The backend endpoints the controller consumes. Implemented by
/// `HttpBackend`; tests substitute their own.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, BackendError>;

    async fn upload_file(
        &self,
        filename: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadReply, BackendError>;

    async fn save_ai_file(
        &self,
        session_id: i64,
        filename: &str,
        content: &str,
    ) -> Result<AckReply, BackendError>;

    async fn chat_history(&self, role_key: &str) -> Result<Vec<HistoryEntry>, BackendError>;

    async fn session(&self, session_id: i64) -> Result<SessionTranscript, BackendError>;

    async fn rename_session(
        &self,
        session_id: i64,
        new_title: &str,
    ) -> Result<AckReply, BackendError>;

    async fn delete_session(&self, session_id: i64) -> Result<AckReply, BackendError>;

    async fn provider_status(
        &self,
    ) -> Result<HashMap<Provider, ProviderStatus>, BackendError>;

    async fn persona_visibility(&self) -> Result<Vec<Persona>, BackendError>;
}

/// Reqwest-backed client for the chat backend.
#[derive(Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Turn a non-2xx response into an `Api` error, preferring the body's
    /// `error` field as the message when it parses.
    async fn api_error(res: reqwest::Response) -> BackendError {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .and_then(|e| e.as_str())
                    .map(|s| s.to_string())
            })
            .unwrap_or_else(|| format!("server error ({}) {}", status.as_u16(), body));
        BackendError::Api(message)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    /// POST /chat — one full turn round trip.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, BackendError> {
        let url = format!("{}/chat", self.base_url);
        let res = self.client.post(&url).json(request).send().await?;
        if !res.status().is_success() {
            return Err(Self::api_error(res).await);
        }
        let data: ChatReply = res.json().await?;
        Ok(data)
    }

    /// POST /api/upload_file — multipart upload of one staged file.
    async fn upload_file(
        &self,
        filename: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadReply, BackendError> {
        let url = format!("{}/api/upload_file", self.base_url);
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let res = self.client.post(&url).multipart(form).send().await?;
        if !res.status().is_success() {
            return Err(Self::api_error(res).await);
        }
        let data: UploadReply = res.json().await?;
        Ok(data)
    }

    /// POST /api/save_ai_file — persist a generated code block. Failures are
    /// non-fatal for the caller.
    async fn save_ai_file(
        &self,
        session_id: i64,
        filename: &str,
        content: &str,
    ) -> Result<AckReply, BackendError> {
        let url = format!("{}/api/save_ai_file", self.base_url);
        let body = serde_json::json!({
            "session_id": session_id,
            "filename": filename,
            "content": content,
        });
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            return Err(Self::api_error(res).await);
        }
        let data: AckReply = res.json().await?;
        Ok(data)
    }

    /// GET /api/get_chat_history?role={key} — a persona's session list.
    async fn chat_history(&self, role_key: &str) -> Result<Vec<HistoryEntry>, BackendError> {
        let url = format!("{}/api/get_chat_history", self.base_url);
        let res = self
            .client
            .get(&url)
            .query(&[("role", role_key)])
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(Self::api_error(res).await);
        }
        let data: Vec<HistoryEntry> = res.json().await?;
        Ok(data)
    }

    /// GET /api/get_session/{id} — full transcript plus owner.
    async fn session(&self, session_id: i64) -> Result<SessionTranscript, BackendError> {
        let url = format!("{}/api/get_session/{}", self.base_url, session_id);
        let res = self.client.get(&url).send().await?;
        if !res.status().is_success() {
            return Err(Self::api_error(res).await);
        }
        let data: SessionTranscript = res.json().await?;
        Ok(data)
    }

    /// POST /api/rename_session/{id}.
    async fn rename_session(
        &self,
        session_id: i64,
        new_title: &str,
    ) -> Result<AckReply, BackendError> {
        let url = format!("{}/api/rename_session/{}", self.base_url, session_id);
        let body = serde_json::json!({ "new_title": new_title });
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            return Err(Self::api_error(res).await);
        }
        let data: AckReply = res.json().await?;
        Ok(data)
    }

    /// POST /api/delete_session/{id}.
    async fn delete_session(&self, session_id: i64) -> Result<AckReply, BackendError> {
        let url = format!("{}/api/delete_session/{}", self.base_url, session_id);
        let res = self.client.post(&url).send().await?;
        if !res.status().is_success() {
            return Err(Self::api_error(res).await);
        }
        let data: AckReply = res.json().await?;
        Ok(data)
    }

    /// GET /api/get_provider_status — provider key to "active"/"restricted".
    /// Unknown provider keys are ignored.
    async fn provider_status(
        &self,
    ) -> Result<HashMap<Provider, ProviderStatus>, BackendError> {
        let url = format!("{}/api/get_provider_status", self.base_url);
        let res = self.client.get(&url).send().await?;
        if !res.status().is_success() {
            return Err(Self::api_error(res).await);
        }
        let data: HashMap<String, ProviderStatus> = res.json().await?;
        Ok(data
            .into_iter()
            .filter_map(|(key, status)| Provider::from_key(&key).map(|p| (p, status)))
            .collect())
    }

    /// GET /api/get_persona_visibility — personas the current user may select.
    async fn persona_visibility(&self) -> Result<Vec<Persona>, BackendError> {
        let url = format!("{}/api/get_persona_visibility", self.base_url);
        let res = self.client.get(&url).send().await?;
        if !res.status().is_success() {
            return Err(Self::api_error(res).await);
        }
        let data: PersonaVisibilityReply = res.json().await?;
        Ok(data.personas)
    }
}
