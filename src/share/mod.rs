//! Read-only public sharing of a conversation.
//!
//! A shared conversation lives at `{origin}/share/{id}` and shows the title, the
//! creation date and the messages, with no way to continue the chat.

pub mod server;

use core::fmt;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::api::types::{ConversationDetail, ConversationId, Message};

/// Length the backend truncates generated titles to.
pub const TITLE_LIMIT: usize = 50;

/// Public link for a conversation.
#[must_use]
pub fn share_url(origin: &str, id: ConversationId) -> String {
    format!("{}/share/{id}", origin.trim_end_matches('/'))
}

/// Title as displayed: a title cut at the backend limit gets an ellipsis.
#[must_use]
pub fn display_title(title: &str) -> String {
    if title.chars().count() == TITLE_LIMIT {
        format!("{title}...")
    } else {
        title.to_string()
    }
}

/// Human date label, e.g. `5 March 2025 at 09:07`.
#[must_use]
pub fn format_created<Tz: TimeZone>(timestamp: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    timestamp.format("%-d %B %Y at %H:%M").to_string()
}

/// Read-only snapshot of a conversation for its public page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedConversation {
    /// Conversation id.
    pub id: ConversationId,
    /// Raw title.
    pub title: String,
    /// Title ready for display.
    pub display_title: String,
    /// `Created with` date label.
    pub created_label: String,
    /// Public link to this page.
    pub share_url: String,
    /// Messages, oldest first.
    pub messages: Vec<Message>,
}

impl SharedConversation {
    /// Build the public view of `detail` served under `origin`.
    ///
    /// The server has no viewer zone, so `created_label` is rendered in UTC.
    #[must_use]
    pub fn from_detail(detail: ConversationDetail, origin: &str) -> Self {
        let convo = detail.conversation;
        Self {
            id: convo.id,
            display_title: display_title(&convo.title),
            created_label: format_created(&convo.start_timestamp),
            share_url: share_url(origin, convo.id),
            title: convo.title,
            messages: detail.messages,
        }
    }
}
