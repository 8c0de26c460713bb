//! Conversation store: all client state plus every backend interaction.
//!
//! The store is an explicit container built once by the composition root and
//! shared (`Arc`) with whatever renders it. State lives in a `watch` channel, so
//! each mutation is a whole-snapshot update that wakes every subscriber, one per
//! streamed chunk while a reply is arriving.
//!
//! Failures never cross this API: they are logged, the relevant loading flag is
//! cleared and, for a send, the AI message shows [`AI_ERROR_MESSAGE`].
//!
//! Overlapping calls are allowed. A view token is issued by every conversation
//! switch and new chat; a load or reply stream whose view has been left drops its
//! result instead of overwriting the newer view. Sends issue a send token: each
//! reply still streams into its own stub, but only the newest send adopts the
//! conversation a new chat created. Search results carry their own token the
//! same way.

pub mod notify;
pub mod state;

pub use notify::{Notifier, TracingNotifier};
pub use state::{AI_ERROR_MESSAGE, ReplySlot, StoreState};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::api::types::{Analysis, ChatRequest, ConversationId};
use crate::api::{ApiResult, Backend, Utf8ChunkDecoder};

/// Alert raised when analysis is requested with no active conversation.
pub const NO_CONVERSATION_ALERT: &str = "Please select a conversation to analyze.";

/// How a reply stream ended without error.
enum StreamOutcome {
    /// Body fully read.
    Completed,
    /// The view was left; nothing more was written.
    Superseded,
}

/// Client-side state container for the chat front end.
pub struct ConversationStore<B: Backend> {
    backend: Arc<B>,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<StoreState>,
    view_token: AtomicU64,
    send_token: AtomicU64,
    list_token: AtomicU64,
}

impl<B: Backend> ConversationStore<B> {
    /// Create a store over `backend` that logs alerts.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self::with_notifier(Arc::new(backend), Arc::new(TracingNotifier))
    }

    /// Create a store over a shared backend with a custom alert sink.
    #[must_use]
    pub fn with_notifier(backend: Arc<B>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            backend,
            notifier,
            state: watch::Sender::new(StoreState::default()),
            view_token: AtomicU64::new(0),
            send_token: AtomicU64::new(0),
            list_token: AtomicU64::new(0),
        }
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> StoreState {
        self.state.borrow().clone()
    }

    /// Receiver woken on every state update.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.state.subscribe()
    }

    fn update(&self, mutate: impl FnOnce(&mut StoreState)) {
        self.state.send_modify(mutate);
    }

    /// Apply `mutate` only while `token` still names the current view.
    ///
    /// The check runs under the channel lock; view changes bump the token before
    /// taking it, so a write that passes the check is never applied after a
    /// newer view was installed.
    fn update_if_current(&self, token: u64, mutate: impl FnOnce(&mut StoreState)) -> bool {
        self.state.send_if_modified(|s| {
            if !self.is_current_view(token) {
                return false;
            }
            mutate(s);
            true
        })
    }

    fn next_view_token(&self) -> u64 {
        self.view_token.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn current_view_token(&self) -> u64 {
        self.view_token.load(Ordering::SeqCst)
    }

    fn is_current_view(&self, token: u64) -> bool {
        self.current_view_token() == token
    }

    fn next_send_token(&self) -> u64 {
        self.send_token.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_latest_send(&self, token: u64) -> bool {
        self.send_token.load(Ordering::SeqCst) == token
    }

    fn next_list_token(&self) -> u64 {
        self.list_token.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current_list(&self, token: u64) -> bool {
        self.list_token.load(Ordering::SeqCst) == token
    }

    /// Reload the conversation list into the sidebar and the search view.
    ///
    /// On failure the previous list is kept.
    pub async fn fetch_conversations(&self) {
        let token = self.next_list_token();
        self.update(|s| s.is_sidebar_loading = true);

        match self.backend.list_conversations().await {
            Ok(conversations) => {
                debug!(count = conversations.len(), "conversations loaded");
                if self.is_current_list(token) {
                    self.update(|s| s.replace_conversations(conversations));
                } else {
                    // A newer search owns `search_results`.
                    self.update(|s| {
                        s.conversations = conversations;
                        s.is_sidebar_loading = false;
                    });
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to fetch conversations");
                self.update(|s| s.is_sidebar_loading = false);
            }
        }
    }

    /// Make `id` the active conversation and load its history.
    ///
    /// Does nothing when `id` is already active. `None` switches to an empty view
    /// in one update, without a backend call.
    pub async fn set_current_conversation(&self, id: Option<ConversationId>) {
        let mut token = None;
        self.state.send_if_modified(|s| {
            if s.current_conversation_id == id {
                return false;
            }
            token = Some(self.next_view_token());
            match id {
                Some(id) => s.begin_switch(Some(id)),
                None => s.reset_chat(),
            }
            true
        });
        let (Some(token), Some(conversation_id)) = (token, id) else {
            return;
        };

        match self.backend.get_conversation(conversation_id).await {
            Ok(detail) => {
                if !self.update_if_current(token, |s| s.finish_switch(detail)) {
                    debug!(%conversation_id, "discarding superseded conversation load");
                }
            }
            Err(e) => {
                error!(%conversation_id, error = %e, "Error fetching conversation details");
                self.update_if_current(token, |s| s.is_loading = false);
            }
        }
    }

    /// Reset to an empty, unsaved chat.
    pub fn start_new_chat(&self) {
        self.next_view_token();
        self.update(StoreState::reset_chat);
    }

    /// Send `content` and stream the AI reply into its stub.
    ///
    /// `clear_input` is called with an empty string right after the optimistic
    /// update, before the request goes out. When the send created a new
    /// conversation, its id is returned so the caller can navigate to it; `None`
    /// otherwise, on failure, when the view was left, or when a newer send was
    /// issued before this one resolved.
    ///
    /// A send never discards another send's reply: overlapping replies each fill
    /// their own stub.
    pub async fn send_message(
        &self,
        content: &str,
        clear_input: impl FnOnce(String),
    ) -> Option<ConversationId> {
        let send = self.next_send_token();
        let mut view = 0;
        let mut conversation_id = None;
        let mut slot = None;
        self.update(|s| {
            view = self.current_view_token();
            conversation_id = s.current_conversation_id;
            slot = Some(s.begin_send(content));
        });
        let slot = slot?;
        let is_new_chat = conversation_id.is_none();

        clear_input(String::new());

        let request = ChatRequest {
            message: content.to_string(),
            conversation_id,
        };

        match self.stream_reply(&request, view, slot).await {
            Ok(StreamOutcome::Completed) => {}
            Ok(StreamOutcome::Superseded) => {
                debug!("reply stream abandoned, view was left");
                return None;
            }
            Err(e) => {
                error!(conversation_id = ?conversation_id, error = %e, "Error streaming response");
                self.update_if_current(view, |s| s.fail_send(slot));
                return None;
            }
        }

        if !is_new_chat {
            return None;
        }

        // The backend lists newest first, so the chat just created is on top.
        self.fetch_conversations().await;
        if !self.is_latest_send(send) {
            debug!("newer send issued, not adopting created conversation");
            return None;
        }
        let mut new_id = None;
        self.update_if_current(view, |s| {
            new_id = s.conversations.first().map(|c| c.id);
            if new_id.is_some() {
                s.current_conversation_id = new_id;
            }
        });
        let new_id = new_id?;
        info!(conversation_id = %new_id, "new conversation created");
        Some(new_id)
    }

    async fn stream_reply(
        &self,
        request: &ChatRequest,
        view: u64,
        slot: ReplySlot,
    ) -> ApiResult<StreamOutcome> {
        let mut stream = self.backend.open_chat(request).await?;

        // Headers are in: waiting is over, typing begins.
        if !self.update_if_current(view, |s| s.is_loading = false) {
            return Ok(StreamOutcome::Superseded);
        }

        let mut decoder = Utf8ChunkDecoder::new();
        let mut reply = String::new();

        while let Some(chunk) = stream.next_chunk().await? {
            reply.push_str(&decoder.decode(&chunk));
            if !self.update_if_current(view, |s| s.apply_stream_text(slot, &reply)) {
                return Ok(StreamOutcome::Superseded);
            }
        }

        let tail = decoder.finish();
        if !tail.is_empty() {
            reply.push_str(&tail);
            self.update_if_current(view, |s| s.apply_stream_text(slot, &reply));
        }

        Ok(StreamOutcome::Completed)
    }

    /// Ask the backend for a summary and key points of the active conversation.
    ///
    /// With no active conversation the user is alerted and the request still goes
    /// out (with a `null` id), leaving the backend to reject it.
    pub async fn analyze_current_conversation(&self) -> Option<Analysis> {
        let conversation_id = self.state.borrow().current_conversation_id;
        if conversation_id.is_none() {
            self.notifier.alert(NO_CONVERSATION_ALERT);
        }

        self.update(|s| s.is_loading = true);

        match self.backend.analyze(conversation_id).await {
            Ok(analysis) => {
                self.update(|s| s.is_loading = false);
                Some(analysis)
            }
            Err(e) => {
                error!(conversation_id = ?conversation_id, error = %e, "Error analyzing conversation");
                self.update(|s| s.is_loading = false);
                None
            }
        }
    }

    /// Replace the search results with the backend's matches for `query`.
    ///
    /// A blank query restores the full list instead. On failure the previous
    /// results stay.
    pub async fn search_conversations(&self, query: &str) {
        if query.trim().is_empty() {
            self.fetch_conversations().await;
            return;
        }

        let token = self.next_list_token();
        match self.backend.search(query).await {
            Ok(results) => {
                if self.is_current_list(token) {
                    debug!(count = results.len(), "search results loaded");
                    self.update(|s| s.search_results = results);
                } else {
                    debug!(query, "discarding superseded search results");
                }
            }
            Err(e) => {
                error!(query, error = %e, "Error searching conversations");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use tokio::sync::Notify;

    use crate::api::types::{Conversation, ConversationDetail, Message, Sender};
    use crate::api::{ApiError, ChatStream};

    enum Step {
        Chunk(Vec<u8>),
        Wait(Arc<Notify>),
        Fail,
    }

    fn chunk(text: &str) -> Step {
        Step::Chunk(text.as_bytes().to_vec())
    }

    struct ScriptedStream {
        steps: VecDeque<Step>,
    }

    #[async_trait]
    impl ChatStream for ScriptedStream {
        async fn next_chunk(&mut self) -> Result<Option<Bytes>, ApiError> {
            loop {
                match self.steps.pop_front() {
                    None => return Ok(None),
                    Some(Step::Chunk(bytes)) => return Ok(Some(Bytes::from(bytes))),
                    Some(Step::Wait(gate)) => gate.notified().await,
                    Some(Step::Fail) => {
                        return Err(ApiError::HttpClient("connection reset".to_string()));
                    }
                }
            }
        }
    }

    #[derive(Default)]
    struct FakeBackend {
        conversations: Mutex<Vec<Conversation>>,
        details: Mutex<HashMap<i64, ConversationDetail>>,
        detail_gates: Mutex<HashMap<i64, Arc<Notify>>>,
        chat_scripts: Mutex<VecDeque<Vec<Step>>>,
        fail_open_chat: Mutex<bool>,
        fail_list: Mutex<bool>,
        search_results: Mutex<Option<Vec<Conversation>>>,
        search_gate: Mutex<Option<Arc<Notify>>>,
        list_calls: AtomicUsize,
        detail_calls: AtomicUsize,
        chat_calls: AtomicUsize,
        search_calls: AtomicUsize,
        chat_requests: Mutex<Vec<ChatRequest>>,
        analyze_ids: Mutex<Vec<Option<ConversationId>>>,
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn list_conversations(&self) -> ApiResult<Vec<Conversation>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if *self.fail_list.lock().unwrap() {
                return Err(ApiError::Status {
                    status: 500,
                    url: "conversations/".to_string(),
                });
            }
            Ok(self.conversations.lock().unwrap().clone())
        }

        async fn get_conversation(&self, id: ConversationId) -> ApiResult<ConversationDetail> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.detail_gates.lock().unwrap().get(&id.get()).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            self.details
                .lock()
                .unwrap()
                .get(&id.get())
                .cloned()
                .ok_or(ApiError::Status {
                    status: 404,
                    url: format!("conversations/{id}/"),
                })
        }

        async fn open_chat(&self, request: &ChatRequest) -> ApiResult<Box<dyn ChatStream>> {
            self.chat_calls.fetch_add(1, Ordering::SeqCst);
            self.chat_requests.lock().unwrap().push(request.clone());
            if *self.fail_open_chat.lock().unwrap() {
                return Err(ApiError::HttpClient("network down".to_string()));
            }
            let steps = self
                .chat_scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default();
            Ok(Box::new(ScriptedStream {
                steps: steps.into(),
            }))
        }

        async fn analyze(&self, id: Option<ConversationId>) -> ApiResult<Analysis> {
            self.analyze_ids.lock().unwrap().push(id);
            match id {
                Some(id) => Ok(Analysis {
                    summary: format!("summary of {id}"),
                    key_points: vec!["first".to_string(), "second".to_string()],
                }),
                None => Err(ApiError::Status {
                    status: 404,
                    url: "conversations/null/analyze/".to_string(),
                }),
            }
        }

        async fn search(&self, _query: &str) -> ApiResult<Vec<Conversation>> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.search_gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            self.search_results
                .lock()
                .unwrap()
                .clone()
                .ok_or(ApiError::EmptyBody)
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        alerts: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn alert(&self, message: &str) {
            self.alerts.lock().unwrap().push(message.to_string());
        }
    }

    fn convo(id: i64, title: &str) -> Conversation {
        Conversation {
            id: ConversationId(id),
            title: title.to_string(),
            start_timestamp: Utc.with_ymd_and_hms(2025, 3, 5, 9, 7, 0).unwrap(),
            emoji: None,
            status: "active".to_string(),
            url: None,
        }
    }

    fn detail(id: i64, texts: &[&str]) -> ConversationDetail {
        ConversationDetail {
            conversation: convo(id, &format!("c{id}")),
            end_timestamp: None,
            summary: None,
            key_points: None,
            messages: texts
                .iter()
                .enumerate()
                .map(|(i, t)| Message {
                    sender: if i % 2 == 0 { Sender::User } else { Sender::Ai },
                    content: (*t).to_string(),
                    timestamp: Utc.with_ymd_and_hms(2025, 3, 5, 9, 8, 0).unwrap(),
                })
                .collect(),
        }
    }

    fn store(backend: FakeBackend) -> (ConversationStore<FakeBackend>, Arc<FakeBackend>) {
        let backend = Arc::new(backend);
        let store = ConversationStore::with_notifier(
            Arc::clone(&backend),
            Arc::new(TracingNotifier),
        );
        (store, backend)
    }

    fn contents(state: &StoreState) -> Vec<String> {
        state.messages.iter().map(|m| m.content.clone()).collect()
    }

    #[tokio::test]
    async fn test_fetch_conversations_sets_both_lists() {
        let backend = FakeBackend::default();
        *backend.conversations.lock().unwrap() = vec![convo(1, "a"), convo(2, "b")];
        let (store, _) = store(backend);

        store.fetch_conversations().await;

        let state = store.snapshot();
        assert_eq!(state.conversations, vec![convo(1, "a"), convo(2, "b")]);
        assert_eq!(state.search_results, state.conversations);
        assert!(!state.is_sidebar_loading);
    }

    #[tokio::test]
    async fn test_fetch_conversations_failure_keeps_list() {
        let backend = FakeBackend::default();
        *backend.conversations.lock().unwrap() = vec![convo(1, "a")];
        let (store, backend) = store(backend);
        store.fetch_conversations().await;

        *backend.fail_list.lock().unwrap() = true;
        store.fetch_conversations().await;

        let state = store.snapshot();
        assert_eq!(state.conversations, vec![convo(1, "a")]);
        assert!(!state.is_sidebar_loading);
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_set_current_conversation_loads_history() {
        let backend = FakeBackend::default();
        backend
            .details
            .lock()
            .unwrap()
            .insert(4, detail(4, &["q", "a"]));
        let (store, _) = store(backend);

        store.set_current_conversation(Some(ConversationId(4))).await;

        let state = store.snapshot();
        assert_eq!(state.current_conversation_id, Some(ConversationId(4)));
        assert_eq!(contents(&state), vec!["q", "a"]);
        assert_eq!(
            state.current_conversation.map(|d| d.conversation.id),
            Some(ConversationId(4))
        );
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_set_current_conversation_same_id_fetches_once() {
        let backend = FakeBackend::default();
        backend.details.lock().unwrap().insert(4, detail(4, &["q"]));
        let (store, backend) = store(backend);

        store.set_current_conversation(Some(ConversationId(4))).await;
        store.set_current_conversation(Some(ConversationId(4))).await;

        assert_eq!(backend.detail_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_set_current_conversation_failure_leaves_empty() {
        let (store, _) = store(FakeBackend::default());

        store.set_current_conversation(Some(ConversationId(77))).await;

        let state = store.snapshot();
        assert_eq!(state.current_conversation_id, Some(ConversationId(77)));
        assert!(state.messages.is_empty());
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_set_current_conversation_none_skips_backend() {
        let backend = FakeBackend::default();
        backend.details.lock().unwrap().insert(4, detail(4, &["q"]));
        let (store, backend) = store(backend);
        store.set_current_conversation(Some(ConversationId(4))).await;

        let mut rx = store.subscribe();
        rx.mark_unchanged();

        store.set_current_conversation(None).await;

        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().is_loading);
        let state = store.snapshot();
        assert!(state.current_conversation_id.is_none());
        assert!(state.current_conversation.is_none());
        assert!(state.messages.is_empty());
        assert!(!state.is_loading);
        assert_eq!(backend.detail_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_conversation_load_is_discarded() {
        let gate = Arc::new(Notify::new());
        let backend = FakeBackend::default();
        backend
            .details
            .lock()
            .unwrap()
            .insert(1, detail(1, &["from one"]));
        backend
            .details
            .lock()
            .unwrap()
            .insert(2, detail(2, &["from two"]));
        backend
            .detail_gates
            .lock()
            .unwrap()
            .insert(1, Arc::clone(&gate));
        let (store, _) = store(backend);

        let slow = store.set_current_conversation(Some(ConversationId(1)));
        let fast = async {
            store.set_current_conversation(Some(ConversationId(2))).await;
            gate.notify_one();
        };
        tokio::join!(slow, fast);

        let state = store.snapshot();
        assert_eq!(state.current_conversation_id, Some(ConversationId(2)));
        assert_eq!(contents(&state), vec!["from two"]);
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_start_new_chat_resets_any_state() {
        let backend = FakeBackend::default();
        backend
            .details
            .lock()
            .unwrap()
            .insert(4, detail(4, &["q", "a"]));
        let (store, _) = store(backend);
        store.set_current_conversation(Some(ConversationId(4))).await;

        store.start_new_chat();

        let state = store.snapshot();
        assert!(state.messages.is_empty());
        assert!(state.current_conversation_id.is_none());
        assert!(state.current_conversation.is_none());
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_send_message_new_chat_streams_and_returns_id() {
        let backend = FakeBackend::default();
        backend
            .chat_scripts
            .lock()
            .unwrap()
            .push_back(vec![chunk("Hel"), chunk("lo!")]);
        *backend.conversations.lock().unwrap() = vec![convo(10, "hi"), convo(3, "older")];
        let (store, backend) = store(backend);

        let cleared = Mutex::new(None);
        let new_id = store
            .send_message("hi", |value| {
                let chats = backend.chat_calls.load(Ordering::SeqCst);
                *cleared.lock().unwrap() = Some((value, chats));
            })
            .await;

        assert_eq!(new_id, Some(ConversationId(10)));
        assert_eq!(*cleared.lock().unwrap(), Some((String::new(), 0)));

        let state = store.snapshot();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].sender, Sender::User);
        assert_eq!(state.messages[0].content, "hi");
        assert_eq!(state.messages[1].sender, Sender::Ai);
        assert_eq!(state.messages[1].content, "Hello!");
        assert_eq!(state.current_conversation_id, Some(ConversationId(10)));
        assert!(!state.is_loading);

        let requests = backend.chat_requests.lock().unwrap();
        assert_eq!(requests[0].conversation_id, None);
        assert_eq!(requests[0].message, "hi");
    }

    #[tokio::test]
    async fn test_send_message_existing_chat_returns_none() {
        let backend = FakeBackend::default();
        backend.details.lock().unwrap().insert(5, detail(5, &["q", "a"]));
        backend
            .chat_scripts
            .lock()
            .unwrap()
            .push_back(vec![chunk("more")]);
        let (store, backend) = store(backend);
        store.set_current_conversation(Some(ConversationId(5))).await;

        let result = store.send_message("again", |_| {}).await;

        assert_eq!(result, None);
        assert_eq!(contents(&store.snapshot()), vec!["q", "a", "again", "more"]);
        assert_eq!(
            backend.chat_requests.lock().unwrap()[0].conversation_id,
            Some(ConversationId(5))
        );
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reply_is_concatenation_of_chunks() {
        let scripts: Vec<Vec<&str>> = vec![
            vec![],
            vec!["one"],
            vec!["a", "", "b", "c"],
            vec!["The ", "quick ", "brown ", "fox"],
            vec!["line\n", "\n", "end"],
        ];

        for parts in scripts {
            let backend = FakeBackend::default();
            backend
                .details
                .lock()
                .unwrap()
                .insert(1, detail(1, &[]));
            backend
                .chat_scripts
                .lock()
                .unwrap()
                .push_back(parts.iter().map(|p| chunk(p)).collect());
            let (store, _) = store(backend);
            store.set_current_conversation(Some(ConversationId(1))).await;

            store.send_message("go", |_| {}).await;

            let expected = if parts.is_empty() {
                "...".to_string()
            } else {
                parts.concat()
            };
            assert_eq!(store.snapshot().last_message().unwrap().content, expected);
        }
    }

    #[tokio::test]
    async fn test_multibyte_character_split_across_chunks() {
        let bytes = "héllo 🦀".as_bytes().to_vec();
        let backend = FakeBackend::default();
        backend.chat_scripts.lock().unwrap().push_back(vec![
            Step::Chunk(bytes[..2].to_vec()),
            Step::Chunk(bytes[2..8].to_vec()),
            Step::Chunk(bytes[8..].to_vec()),
        ]);
        let (store, _) = store(backend);

        store.send_message("crab", |_| {}).await;

        assert_eq!(store.snapshot().last_message().unwrap().content, "héllo 🦀");
    }

    #[tokio::test]
    async fn test_every_chunk_publishes_a_snapshot() {
        let backend = FakeBackend::default();
        backend.details.lock().unwrap().insert(1, detail(1, &[]));
        backend
            .chat_scripts
            .lock()
            .unwrap()
            .push_back(vec![chunk("a"), chunk("b"), chunk("c")]);
        let (store, _) = store(backend);
        store.set_current_conversation(Some(ConversationId(1))).await;

        let mut rx = store.subscribe();
        rx.mark_unchanged();
        let seen = Mutex::new(Vec::new());

        let watcher = async {
            while rx.changed().await.is_ok() {
                let text = rx.borrow_and_update().last_message().map(|m| m.content.clone());
                if let Some(text) = text {
                    seen.lock().unwrap().push(text.clone());
                    if text == "abc" {
                        break;
                    }
                }
            }
        };
        tokio::join!(store.send_message("go", |_| {}), watcher);

        let seen = seen.into_inner().unwrap();
        assert!(!seen.is_empty());
        assert_eq!(seen.last().map(String::as_str), Some("abc"));
    }

    #[tokio::test]
    async fn test_open_chat_failure_shows_error() {
        let backend = FakeBackend::default();
        *backend.fail_open_chat.lock().unwrap() = true;
        let (store, backend) = store(backend);

        let result = store.send_message("hi", |_| {}).await;

        assert_eq!(result, None);
        let state = store.snapshot();
        assert_eq!(state.messages[0].content, "hi");
        assert_eq!(state.messages[1].content, AI_ERROR_MESSAGE);
        assert!(!state.is_loading);
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_overwrites_partial_reply() {
        let backend = FakeBackend::default();
        backend
            .chat_scripts
            .lock()
            .unwrap()
            .push_back(vec![chunk("partial "), Step::Fail]);
        let (store, _) = store(backend);

        store.send_message("hi", |_| {}).await;

        let state = store.snapshot();
        assert_eq!(state.last_message().unwrap().content, AI_ERROR_MESSAGE);
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_new_chat_supersedes_running_stream() {
        let gate = Arc::new(Notify::new());
        let backend = FakeBackend::default();
        backend.chat_scripts.lock().unwrap().push_back(vec![
            chunk("Hel"),
            Step::Wait(Arc::clone(&gate)),
            chunk("lo!"),
        ]);
        *backend.conversations.lock().unwrap() = vec![convo(10, "hi")];
        let (store, backend) = store(backend);

        let send = store.send_message("hi", |_| {});
        let interrupt = async {
            store.start_new_chat();
            gate.notify_one();
        };
        let (result, ()) = tokio::join!(send, interrupt);

        assert_eq!(result, None);
        let state = store.snapshot();
        assert!(state.messages.is_empty());
        assert!(state.current_conversation_id.is_none());
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_send_during_load_keeps_history() {
        let gate = Arc::new(Notify::new());
        let backend = FakeBackend::default();
        backend
            .details
            .lock()
            .unwrap()
            .insert(1, detail(1, &["old q", "old a"]));
        backend
            .detail_gates
            .lock()
            .unwrap()
            .insert(1, Arc::clone(&gate));
        backend
            .chat_scripts
            .lock()
            .unwrap()
            .push_back(vec![chunk("reply")]);
        let (store, backend) = store(backend);

        let load = store.set_current_conversation(Some(ConversationId(1)));
        let send = async {
            let result = store.send_message("new q", |_| {}).await;
            gate.notify_one();
            result
        };
        let ((), result) = tokio::join!(load, send);
        store.set_current_conversation(Some(ConversationId(1))).await;

        assert_eq!(result, None);
        let state = store.snapshot();
        assert_eq!(contents(&state), vec!["old q", "old a", "new q", "reply"]);
        assert_eq!(
            state.current_conversation.map(|d| d.conversation.id),
            Some(ConversationId(1))
        );
        assert!(!state.is_loading);
        assert_eq!(backend.detail_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            backend.chat_requests.lock().unwrap()[0].conversation_id,
            Some(ConversationId(1))
        );
    }

    #[tokio::test]
    async fn test_overlapping_sends_both_finish_their_replies() {
        let gate = Arc::new(Notify::new());
        let backend = FakeBackend::default();
        backend.details.lock().unwrap().insert(5, detail(5, &["q", "a"]));
        {
            let mut scripts = backend.chat_scripts.lock().unwrap();
            scripts.push_back(vec![
                chunk("one"),
                Step::Wait(Arc::clone(&gate)),
                chunk(" done"),
            ]);
            scripts.push_back(vec![chunk("two")]);
        }
        let (store, _) = store(backend);
        store.set_current_conversation(Some(ConversationId(5))).await;

        let first = store.send_message("first", |_| {});
        let second = async {
            let result = store.send_message("second", |_| {}).await;
            gate.notify_one();
            result
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!((first, second), (None, None));
        let state = store.snapshot();
        assert_eq!(
            contents(&state),
            vec!["q", "a", "first", "one done", "second", "two"]
        );
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_newest_new_chat_send_adopts_created_conversation() {
        let gate = Arc::new(Notify::new());
        let backend = FakeBackend::default();
        {
            let mut scripts = backend.chat_scripts.lock().unwrap();
            scripts.push_back(vec![chunk("one"), Step::Wait(Arc::clone(&gate))]);
            scripts.push_back(vec![chunk("two")]);
        }
        *backend.conversations.lock().unwrap() = vec![convo(10, "second")];
        let (store, _) = store(backend);

        let first = store.send_message("first", |_| {});
        let second = async {
            let result = store.send_message("second", |_| {}).await;
            gate.notify_one();
            result
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first, None);
        assert_eq!(second, Some(ConversationId(10)));
        let state = store.snapshot();
        assert_eq!(state.current_conversation_id, Some(ConversationId(10)));
        assert_eq!(contents(&state), vec!["first", "one", "second", "two"]);
    }

    #[tokio::test]
    async fn test_new_store_starts_empty() {
        let store = ConversationStore::new(FakeBackend::default());

        assert_eq!(store.snapshot(), StoreState::default());
        assert!(store.analyze_current_conversation().await.is_none());
        assert!(!store.snapshot().is_loading);
    }

    #[tokio::test]
    async fn test_analyze_current_conversation() {
        let backend = FakeBackend::default();
        backend.details.lock().unwrap().insert(8, detail(8, &["q"]));
        let (store, _) = store(backend);
        store.set_current_conversation(Some(ConversationId(8))).await;

        let analysis = store.analyze_current_conversation().await.unwrap();

        assert_eq!(analysis.summary, "summary of 8");
        assert_eq!(analysis.key_points, vec!["first", "second"]);
        assert!(!store.snapshot().is_loading);
    }

    #[tokio::test]
    async fn test_analyze_without_conversation_alerts_then_continues() {
        let backend = Arc::new(FakeBackend::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let store = ConversationStore::with_notifier(
            Arc::clone(&backend),
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        );

        let analysis = store.analyze_current_conversation().await;

        assert!(analysis.is_none());
        assert_eq!(*notifier.alerts.lock().unwrap(), vec![NO_CONVERSATION_ALERT]);
        assert_eq!(*backend.analyze_ids.lock().unwrap(), vec![None]);
        assert!(!store.snapshot().is_loading);
    }

    #[tokio::test]
    async fn test_blank_search_restores_full_list() {
        for query in ["", "   "] {
            let backend = FakeBackend::default();
            *backend.conversations.lock().unwrap() = vec![convo(1, "a"), convo(2, "b")];
            let (store, backend) = store(backend);

            store.search_conversations(query).await;

            let state = store.snapshot();
            assert_eq!(state.search_results, vec![convo(1, "a"), convo(2, "b")]);
            assert_eq!(state.conversations, state.search_results);
            assert_eq!(backend.list_calls.load(Ordering::SeqCst), 1);
            assert_eq!(backend.search_calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_search_replaces_results_only() {
        let backend = FakeBackend::default();
        *backend.conversations.lock().unwrap() = vec![convo(1, "a"), convo(2, "b")];
        *backend.search_results.lock().unwrap() = Some(vec![convo(2, "b")]);
        let (store, _) = store(backend);
        store.fetch_conversations().await;

        store.search_conversations("b").await;

        let state = store.snapshot();
        assert_eq!(state.search_results, vec![convo(2, "b")]);
        assert_eq!(state.conversations.len(), 2);
    }

    #[tokio::test]
    async fn test_search_failure_keeps_stale_results() {
        let backend = FakeBackend::default();
        *backend.conversations.lock().unwrap() = vec![convo(1, "a")];
        let (store, _) = store(backend);
        store.fetch_conversations().await;

        store.search_conversations("missing").await;

        assert_eq!(store.snapshot().search_results, vec![convo(1, "a")]);
    }

    #[tokio::test]
    async fn test_late_search_does_not_override_newer_refresh() {
        let gate = Arc::new(Notify::new());
        let backend = FakeBackend::default();
        *backend.conversations.lock().unwrap() = vec![convo(1, "a"), convo(2, "b")];
        *backend.search_results.lock().unwrap() = Some(vec![convo(2, "b")]);
        *backend.search_gate.lock().unwrap() = Some(Arc::clone(&gate));
        let (store, _) = store(backend);

        let search = store.search_conversations("b");
        let clear = async {
            store.search_conversations("").await;
            gate.notify_one();
        };
        tokio::join!(search, clear);

        assert_eq!(
            store.snapshot().search_results,
            vec![convo(1, "a"), convo(2, "b")]
        );
    }
}
