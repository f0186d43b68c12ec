//! Conversation turns rendered in the transcript.
//!
//! A turn is immutable once rendered; ordering is the append-only sequence
//! of the session transcript. An attachment reference is either a still-local
//! staged file (pre-upload), a server-issued file id (post-upload), or a
//! server image path on a historical turn — never more than one.

use serde::{Deserialize, Serialize};

/// Display name for assistant turns with no provider-specific label.
pub const DEFAULT_ASSISTANT_LABEL: &str = "AI Helper";

/// Who a turn belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
    System,
}

/// Reference to a turn's attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentRef {
    /// Local staged file used as the visual preview of an outgoing turn.
    Staged { name: String, mime: String },
    /// Server-issued file id once the turn has been sent.
    Uploaded {
        file_id: i64,
        extracted_text: Option<String>,
    },
    /// Image path of a historical turn loaded from a stored session.
    ServerImage { path: String },
}

/// One rendered unit of conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub sender: Sender,
    pub text: String,
    pub username: String,
    pub attachment: Option<AttachmentRef>,
}

impl Turn {
    pub fn user(text: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            username: username.into(),
            attachment: None,
        }
    }

    /// Assistant turn under a display label (e.g. a provider label).
    pub fn assistant(text: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
            username: label.into(),
            attachment: None,
        }
    }

    /// System-labeled turn (errors, notices).
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::System,
            text: text.into(),
            username: "System".to_string(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: AttachmentRef) -> Self {
        self.attachment = Some(attachment);
        self
    }
}
