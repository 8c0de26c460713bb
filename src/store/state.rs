//! Store state snapshot and its reducers.
//!
//! Every transition the store performs is a method here, so the ordering and
//! last-message invariants can be checked without a backend.

use crate::api::types::{Conversation, ConversationDetail, ConversationId, Message};

/// Text shown in place of the AI reply when sending fails.
pub const AI_ERROR_MESSAGE: &str = "Error: Could not get AI response.";

/// Everything a front end renders from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoreState {
    /// Sidebar list in server order (newest first).
    pub conversations: Vec<Conversation>,
    /// Active conversation, `None` for a new unsaved chat.
    pub current_conversation_id: Option<ConversationId>,
    /// Detail of the active conversation once loaded.
    pub current_conversation: Option<ConversationDetail>,
    /// Active conversation's messages, in chronological order.
    pub messages: Vec<Message>,
    /// Search page list.
    pub search_results: Vec<Conversation>,
    /// Waiting on a conversation load, the first reply byte, or an analysis.
    pub is_loading: bool,
    /// Waiting on the conversation list.
    pub is_sidebar_loading: bool,
    /// Messages appended by sends so far; locates each reply stub from the end.
    sent_messages: usize,
}

/// Position of the AI stub a send streams its reply into.
///
/// Stays valid when later sends append after it or a finished load puts history
/// in front of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplySlot(usize);

impl StoreState {
    /// Back to an empty, unsaved chat.
    pub fn reset_chat(&mut self) {
        self.current_conversation_id = None;
        self.messages.clear();
        self.current_conversation = None;
        self.is_loading = false;
    }

    /// Switch to `id` before its history has arrived.
    pub fn begin_switch(&mut self, id: Option<ConversationId>) {
        self.current_conversation_id = id;
        self.messages.clear();
        self.is_loading = true;
    }

    /// Install a loaded conversation and its history.
    ///
    /// Turns sent while the load was in flight stay after the history.
    pub fn finish_switch(&mut self, detail: ConversationDetail) {
        let sent_during_load = std::mem::take(&mut self.messages);
        self.messages.clone_from(&detail.messages);
        self.messages.extend(sent_during_load);
        self.current_conversation = Some(detail);
        self.is_loading = false;
    }

    /// Optimistically append the user's message and the AI stub.
    pub fn begin_send(&mut self, content: &str) -> ReplySlot {
        self.messages.push(Message::user(content));
        self.messages.push(Message::ai_placeholder());
        self.sent_messages += 2;
        self.is_loading = true;
        ReplySlot(self.sent_messages)
    }

    fn reply_mut(&mut self, slot: ReplySlot) -> Option<&mut Message> {
        let after = self.sent_messages.checked_sub(slot.0)?;
        let index = self.messages.len().checked_sub(after + 1)?;
        self.messages.get_mut(index)
    }

    /// Replace the reply stub's content with the text accumulated so far.
    ///
    /// With a single send in flight the stub is the last message.
    pub fn apply_stream_text(&mut self, slot: ReplySlot, text: &str) {
        if let Some(reply) = self.reply_mut(slot) {
            reply.content.clear();
            reply.content.push_str(text);
        }
    }

    /// Overwrite the reply stub with the fixed error text.
    pub fn fail_send(&mut self, slot: ReplySlot) {
        if let Some(reply) = self.reply_mut(slot) {
            reply.content = AI_ERROR_MESSAGE.to_string();
        }
        self.is_loading = false;
    }

    /// Install a fresh conversation list in both the sidebar and the search view.
    pub fn replace_conversations(&mut self, conversations: Vec<Conversation>) {
        self.search_results.clone_from(&conversations);
        self.conversations = conversations;
        self.is_sidebar_loading = false;
    }

    /// Most recent message, usually the AI reply being streamed.
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}
