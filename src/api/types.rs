//! Wire types exchanged with the conversation backend.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content of the AI stub appended while waiting for the first streamed byte.
pub const AI_PLACEHOLDER: &str = "...";

/// Backend-assigned conversation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl ConversationId {
    /// Extract the underlying integer.
    #[inline]
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConversationId {
    type Err = core::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

fn default_status() -> String {
    "active".to_string()
}

/// A persisted chat thread, as listed in the sidebar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Backend identifier.
    pub id: ConversationId,
    /// Title (the backend derives it from the first 50 characters of the first message).
    pub title: String,
    /// When the conversation was started.
    #[serde(deserialize_with = "timestamp_serde::deserialize")]
    pub start_timestamp: DateTime<Utc>,
    /// Optional emoji decoration.
    #[serde(default)]
    pub emoji: Option<String>,
    /// Backend status, `active` or `ended`.
    #[serde(default = "default_status")]
    pub status: String,
    /// Optional external URL.
    #[serde(default)]
    pub url: Option<String>,
}

/// A conversation with its full message history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationDetail {
    /// Conversation metadata.
    #[serde(flatten)]
    pub conversation: Conversation,
    /// When the conversation was ended by an analysis, if it was.
    #[serde(default, deserialize_with = "timestamp_serde::deserialize_option")]
    pub end_timestamp: Option<DateTime<Utc>>,
    /// Stored analysis summary.
    #[serde(default)]
    pub summary: Option<String>,
    /// Stored key points; the backend keeps them as free text or JSON.
    #[serde(default)]
    pub key_points: Option<serde_json::Value>,
    /// Ordered messages, oldest first. Absent on the wire means empty.
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The human at the keyboard.
    User,
    /// The AI model.
    Ai,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Ai => write!(f, "ai"),
        }
    }
}

/// One turn in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who wrote it.
    pub sender: Sender,
    /// Message text.
    pub content: String,
    /// Creation time.
    #[serde(deserialize_with = "timestamp_serde::deserialize")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Optimistic user message stamped now.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Optimistic AI stub that the streamed reply is written into.
    #[must_use]
    pub fn ai_placeholder() -> Self {
        Self {
            sender: Sender::Ai,
            content: AI_PLACEHOLDER.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Result of an on-demand conversation analysis.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    /// One-sentence summary.
    pub summary: String,
    /// Ordered key points.
    #[serde(default)]
    pub key_points: Vec<String>,
}

/// Body of `POST /chat/`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    /// The user's message.
    pub message: String,
    /// Target conversation; `null` asks the backend to create one.
    pub conversation_id: Option<ConversationId>,
}

/// Body of `POST /search/`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    /// Free-text query.
    pub query: String,
}

/// Backend timestamps: RFC 3339, or naive ISO-8601 (no offset) read as UTC.
mod timestamp_serde {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw:?}")))
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw:?}"))),
        }
    }
}
