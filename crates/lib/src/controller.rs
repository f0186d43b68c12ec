//! Dispatch controller and session switcher.
//!
//! Owns the per-turn pipeline (optimistic user turn, upload pipeline, chat
//! round trip, reply rendering, post-processing) and the session state that
//! gates whether the input surface is writable. One logical operation runs
//! to completion before the next of the same kind is accepted; the `busy`
//! flag keeps the two writers of `active_session_id` (submit and session
//! switch) out of the same window.

use std::collections::HashMap;

use crate::backend::{Backend, ChatRequest, SessionTurn};
use crate::config::Config;
use crate::directory::{DirectoryFilter, SessionListEntry};
use crate::personas::{self, Persona};
use crate::postprocess;
use crate::provider::{Provider, ProviderState};
use crate::surface::{Placeholder, Surface};
use crate::transcript::{AttachmentRef, Turn, DEFAULT_ASSISTANT_LABEL};
use crate::uploads::{self, StagedFile, StagedFiles, UploadOutcome};

/// Client-side controller for one chat view: transcript, session directory,
/// provider picker, and staged attachments.
pub struct ChatController<B, S> {
    backend: B,
    surface: S,
    username: String,
    is_admin: bool,
    personas: Vec<Persona>,
    active_persona: String,
    providers: ProviderState,
    staged: StagedFiles,
    directory: Vec<SessionListEntry>,
    filter: DirectoryFilter,
    /// Server-minted; the client only ever learns an id.
    active_session_id: Option<i64>,
    input_editable: bool,
    busy: bool,
}

impl<B: Backend, S: Surface> ChatController<B, S> {
    pub fn new(backend: B, surface: S, config: &Config) -> Self {
        Self {
            backend,
            surface,
            username: config.user.username.clone(),
            is_admin: config.user.is_admin,
            personas: Vec::new(),
            active_persona: config.chat.default_persona.clone(),
            providers: ProviderState::new(config.chat.default_provider),
            staged: StagedFiles::default(),
            directory: Vec::new(),
            filter: DirectoryFilter::default(),
            active_session_id: None,
            input_editable: true,
            busy: false,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn active_session_id(&self) -> Option<i64> {
        self.active_session_id
    }

    pub fn active_persona(&self) -> &str {
        &self.active_persona
    }

    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }

    pub fn provider_state(&self) -> &ProviderState {
        &self.providers
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn input_editable(&self) -> bool {
        self.input_editable
    }

    pub fn filter(&self) -> &DirectoryFilter {
        &self.filter
    }

    /// Directory entries visible under the current filter, in fetch order.
    pub fn visible_directory(&self) -> Vec<SessionListEntry> {
        self.directory
            .iter()
            .filter(|e| self.filter.matches(e))
            .cloned()
            .collect()
    }

    /// Initial bootstrap: persona visibility, greeting, directory.
    pub async fn start(&mut self) {
        self.load_personas().await;
        self.new_chat().await;
        self.refresh_directory().await;
    }

    /// Stage an attachment for the next outgoing turn.
    pub fn stage_file(&mut self, file: StagedFile) {
        if !self.input_editable {
            log::debug!("attachment ignored: the input surface is read-only");
            return;
        }
        self.staged.stage(file);
    }

    pub fn staged_files(&self) -> &StagedFiles {
        &self.staged
    }

    /// Submit one user turn. A no-op when nothing is entered or staged, when
    /// another operation is in flight, or when the input surface is
    /// read-only.
    pub async fn submit(&mut self, text: &str) {
        if self.busy {
            log::debug!("submit ignored: a submission is already in flight");
            return;
        }
        if !self.input_editable {
            log::debug!("submit ignored: the input surface is read-only");
            return;
        }
        let text = text.trim().to_string();
        if text.is_empty() && self.staged.is_empty() {
            return;
        }
        let files = self.staged.take_all();
        self.busy = true;
        self.dispatch(text, files).await;
        self.busy = false;
    }

    async fn dispatch(&mut self, text: String, files: Vec<StagedFile>) {
        // The user's turn renders before any network call, previewing the
        // first image attachment when there is one.
        let mut user_turn = Turn::user(text.clone(), self.username.clone());
        if let Some(image) = files.iter().find(|f| f.is_image()) {
            user_turn = user_turn.with_attachment(AttachmentRef::Staged {
                name: image.name.clone(),
                mime: image.mime.clone(),
            });
        }
        self.surface.render_turn(&user_turn);
        self.surface.clear_staged_previews();

        let outcome = if files.is_empty() {
            UploadOutcome {
                file_ids: Vec::new(),
                message: text,
            }
        } else {
            self.surface.show_placeholder(Placeholder::Uploading {
                count: files.len(),
            });
            let outcome = uploads::upload_staged(&self.backend, &text, &files).await;
            self.surface.clear_placeholder();
            outcome
        };

        self.surface.show_placeholder(Placeholder::Thinking);
        let request = ChatRequest {
            session_id: self.active_session_id,
            message: outcome.message,
            model: self.active_persona.clone(),
            provider: self.providers.current(),
            file_ids: outcome.file_ids,
        };
        let result = self.backend.chat(&request).await;
        // Removed before any terminal turn, success or failure.
        self.surface.clear_placeholder();

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                self.render_error(&e.to_string());
                return;
            }
        };
        if let Some(error) = reply.error {
            self.surface.render_turn(&Turn::system(error));
            return;
        }

        let label = self.providers.current().label();
        self.surface
            .render_turn(&Turn::assistant(reply.response.clone(), label));

        if self.active_session_id.is_none() {
            if let Some(session_id) = reply.session_id {
                self.active_session_id = Some(session_id);
                self.refresh_directory().await;
            }
        }

        postprocess::process_reply(
            &self.backend,
            &mut self.surface,
            self.active_session_id,
            &reply.response,
        )
        .await;
    }

    fn render_error(&mut self, message: &str) {
        self.surface
            .render_turn(&Turn::system(format!("An error occurred:\n{}", message)));
    }

    /// Reset to a fresh, session-less chat.
    pub async fn new_chat(&mut self) {
        if self.busy {
            log::debug!("new chat ignored: an operation is in flight");
            return;
        }
        self.active_session_id = None;
        self.staged.clear();
        self.surface.clear_transcript();
        let greeting = format!(
            "Hello {}! Starting a new conversation. Ask me anything.",
            self.username
        );
        self.surface
            .render_turn(&Turn::assistant(greeting, DEFAULT_ASSISTANT_LABEL));
        self.set_input_editable(true, None);
        self.surface.clear_staged_previews();
        self.surface.close_code_viewer();
        self.reconcile_providers().await;
    }

    /// Load a stored session's transcript and take ownership of
    /// `active_session_id`. The input surface stays writable only for the
    /// session owner.
    pub async fn load_session(&mut self, session_id: i64) {
        if self.busy {
            log::debug!("session load ignored: an operation is in flight");
            return;
        }
        self.busy = true;
        self.switch_session(session_id).await;
        self.busy = false;
    }

    async fn switch_session(&mut self, session_id: i64) {
        self.surface.close_code_viewer();
        match self.backend.session(session_id).await {
            Ok(transcript) => {
                self.surface.clear_transcript();
                for message in &transcript.messages {
                    self.surface.render_turn(&stored_turn(message));
                }
                self.active_session_id = Some(session_id);
                if transcript.owner_username == self.username {
                    self.set_input_editable(true, None);
                } else {
                    self.set_input_editable(false, Some(&transcript.owner_username));
                }
                self.staged.clear();
                self.surface.clear_staged_previews();
            }
            Err(e) => {
                log::error!("failed to load session {}: {}", session_id, e);
                self.surface.clear_transcript();
                self.surface
                    .render_turn(&Turn::system("Failed to load the conversation."));
                self.active_session_id = None;
            }
        }
    }

    fn set_input_editable(&mut self, editable: bool, owner: Option<&str>) {
        self.input_editable = editable;
        self.surface.set_input_editable(editable, owner);
    }

    /// Rebuild the directory wholesale for the active persona.
    pub async fn refresh_directory(&mut self) {
        match self.backend.chat_history(&self.active_persona).await {
            Ok(entries) => {
                self.directory = entries
                    .into_iter()
                    .map(|e| {
                        let is_owner = e.username == self.username;
                        SessionListEntry {
                            id: e.id,
                            title: e.title,
                            username: e.username,
                            is_owner,
                        }
                    })
                    .collect();
            }
            Err(e) => {
                log::error!("failed to fetch chat history: {}", e);
                self.directory.clear();
            }
        }
        self.render_visible_directory();
    }

    fn render_visible_directory(&mut self) {
        let visible = self.visible_directory();
        self.surface.render_directory(&visible);
    }

    /// Update the search text; only shows/hides fetched entries.
    pub fn set_search(&mut self, search: &str) {
        self.filter.search = search.to_string();
        self.render_visible_directory();
    }

    /// Flip the "mine only" toggle; returns the new state.
    pub fn toggle_mine_only(&mut self) -> bool {
        self.filter.mine_only = !self.filter.mine_only;
        self.render_visible_directory();
        self.filter.mine_only
    }

    /// Rename a session. Blank or unchanged titles are a no-op before any
    /// network call; success refreshes the directory.
    pub async fn rename_session(
        &mut self,
        session_id: i64,
        current_title: &str,
        new_title: &str,
    ) {
        let new_title = new_title.trim();
        if new_title.is_empty() || new_title == current_title {
            return;
        }
        match self.backend.rename_session(session_id, new_title).await {
            Ok(ack) if ack.success => self.refresh_directory().await,
            Ok(ack) => log::warn!(
                "rename of session {} rejected: {}",
                session_id,
                ack.error.unwrap_or_else(|| "unknown error".to_string())
            ),
            Err(e) => log::error!("rename of session {} failed: {}", session_id, e),
        }
    }

    /// Delete a session; deleting the active one resets to a new chat.
    pub async fn delete_session(&mut self, session_id: i64) {
        if self.busy {
            log::debug!("delete ignored: an operation is in flight");
            return;
        }
        match self.backend.delete_session(session_id).await {
            Ok(ack) if ack.success => {
                self.refresh_directory().await;
                if self.active_session_id == Some(session_id) {
                    self.new_chat().await;
                }
            }
            Ok(ack) => log::warn!(
                "delete of session {} rejected: {}",
                session_id,
                ack.error.unwrap_or_else(|| "unknown error".to_string())
            ),
            Err(e) => log::error!("delete of session {} failed: {}", session_id, e),
        }
    }

    /// Fetch provider statuses (fail-open on error) and restore the
    /// current-provider invariant.
    pub async fn reconcile_providers(&mut self) {
        match self.backend.provider_status().await {
            Ok(statuses) => self.providers.apply_statuses(statuses),
            Err(e) => log::warn!("provider status fetch failed: {}", e),
        }
        let image_mode = personas::is_image_persona(&self.active_persona);
        let outcome = self.providers.reconcile(image_mode);
        self.surface
            .render_provider_availability(&outcome.availability, self.providers.current());
    }

    /// Explicit provider pick; restricted providers are not selectable.
    pub async fn select_provider(&mut self, provider: Provider) {
        let image_mode = personas::is_image_persona(&self.active_persona);
        if self.providers.effective_restricted(provider, image_mode) {
            log::debug!("provider {} is restricted, pick ignored", provider.key());
            return;
        }
        self.providers.set_current(provider);
        self.reconcile_providers().await;
    }

    /// Switch persona: new chat, that persona's directory, provider
    /// reconciliation.
    pub async fn select_persona(&mut self, role_key: &str) {
        if self.busy {
            log::debug!("persona change ignored: an operation is in flight");
            return;
        }
        self.active_persona = role_key.to_string();
        self.new_chat().await;
        self.refresh_directory().await;
    }

    /// Persona-specific provider overrides changed; reconcile.
    pub async fn apply_persona_restrictions(
        &mut self,
        restrictions: HashMap<Provider, bool>,
    ) {
        self.providers.apply_persona_restrictions(restrictions);
        self.reconcile_providers().await;
    }

    /// Fetch the personas this user may select and resolve the active one.
    /// Administrators keep the full list.
    pub async fn load_personas(&mut self) {
        if self.is_admin {
            return;
        }
        match self.backend.persona_visibility().await {
            Ok(personas) if !personas.is_empty() => {
                let selected = personas::resolve_selection(&personas, &self.active_persona)
                    .map(|p| p.role_key.clone());
                self.personas = personas;
                if let Some(role_key) = selected {
                    self.active_persona = role_key;
                }
            }
            Ok(_) => {}
            Err(e) => log::error!("failed to load persona visibility: {}", e),
        }
    }
}

/// Map a stored message to a rendered turn, keeping a server image path.
fn stored_turn(message: &SessionTurn) -> Turn {
    let mut turn = if message.sender == "user" {
        Turn::user(
            message.text.clone(),
            message
                .username
                .clone()
                .unwrap_or_else(|| "User".to_string()),
        )
    } else {
        Turn::assistant(
            message.text.clone(),
            message
                .username
                .clone()
                .unwrap_or_else(|| DEFAULT_ASSISTANT_LABEL.to_string()),
        )
    };
    if let Some(path) = &message.image_path {
        turn = turn.with_attachment(AttachmentRef::ServerImage { path: path.clone() });
    }
    turn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        AckReply, BackendError, ChatReply, HistoryEntry, SessionTranscript, UploadReply,
    };
    use crate::provider::ProviderStatus;
    use crate::transcript::Sender;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubBackend {
        reply_text: String,
        reply_session_id: Option<i64>,
        reply_error: Option<String>,
        fail_chat: bool,
        failing_uploads: Vec<String>,
        session_owner: String,
        history: Vec<(i64, String, String)>,
        restricted: Vec<Provider>,
        chat_requests: Mutex<Vec<ChatRequest>>,
        history_calls: AtomicUsize,
        saved_files: Mutex<Vec<(i64, String, String)>>,
        next_file_id: AtomicI64,
    }

    impl StubBackend {
        fn new(reply_text: &str, reply_session_id: Option<i64>) -> Self {
            Self {
                reply_text: reply_text.to_string(),
                reply_session_id,
                session_owner: "alice".to_string(),
                next_file_id: AtomicI64::new(1),
                ..Self::default()
            }
        }

        fn chat_requests(&self) -> Vec<ChatRequest> {
            self.chat_requests.lock().unwrap().clone()
        }

        fn saved_files(&self) -> Vec<(i64, String, String)> {
            self.saved_files.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Backend for StubBackend {
        async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, BackendError> {
            self.chat_requests.lock().unwrap().push(request.clone());
            if self.fail_chat {
                return Err(BackendError::Api("backend down".to_string()));
            }
            Ok(ChatReply {
                response: self.reply_text.clone(),
                session_id: self.reply_session_id,
                error: self.reply_error.clone(),
            })
        }

        async fn upload_file(
            &self,
            filename: &str,
            mime: &str,
            _bytes: Vec<u8>,
        ) -> Result<UploadReply, BackendError> {
            if self.failing_uploads.iter().any(|f| f == filename) {
                return Err(BackendError::Api("disk full".to_string()));
            }
            let file_id = self.next_file_id.fetch_add(1, Ordering::SeqCst);
            let extracted = if mime.starts_with("image/") {
                None
            } else {
                Some(format!("contents of {}", filename))
            };
            Ok(UploadReply {
                success: true,
                file_id: Some(file_id),
                filename: Some(filename.to_string()),
                extracted_text: extracted,
                is_image: mime.starts_with("image/"),
                error: None,
            })
        }

        async fn save_ai_file(
            &self,
            session_id: i64,
            filename: &str,
            content: &str,
        ) -> Result<AckReply, BackendError> {
            self.saved_files.lock().unwrap().push((
                session_id,
                filename.to_string(),
                content.to_string(),
            ));
            Ok(AckReply {
                success: true,
                error: None,
            })
        }

        async fn chat_history(
            &self,
            _role_key: &str,
        ) -> Result<Vec<HistoryEntry>, BackendError> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .history
                .iter()
                .map(|(id, title, username)| HistoryEntry {
                    id: *id,
                    title: title.clone(),
                    username: username.clone(),
                })
                .collect())
        }

        async fn session(&self, _session_id: i64) -> Result<SessionTranscript, BackendError> {
            Ok(SessionTranscript {
                owner_username: self.session_owner.clone(),
                messages: vec![
                    SessionTurn {
                        sender: "user".to_string(),
                        text: "older question".to_string(),
                        username: Some(self.session_owner.clone()),
                        image_path: None,
                    },
                    SessionTurn {
                        sender: "ai".to_string(),
                        text: "older answer".to_string(),
                        username: Some("AI".to_string()),
                        image_path: None,
                    },
                ],
            })
        }

        async fn rename_session(
            &self,
            _session_id: i64,
            _new_title: &str,
        ) -> Result<AckReply, BackendError> {
            Ok(AckReply {
                success: true,
                error: None,
            })
        }

        async fn delete_session(&self, _session_id: i64) -> Result<AckReply, BackendError> {
            Ok(AckReply {
                success: true,
                error: None,
            })
        }

        async fn provider_status(
            &self,
        ) -> Result<HashMap<Provider, ProviderStatus>, BackendError> {
            Ok(Provider::ALL
                .iter()
                .map(|p| {
                    let s = if self.restricted.contains(p) {
                        ProviderStatus::Restricted
                    } else {
                        ProviderStatus::Active
                    };
                    (*p, s)
                })
                .collect())
        }

        async fn persona_visibility(&self) -> Result<Vec<Persona>, BackendError> {
            Ok(Vec::new())
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Turn(Turn),
        Placeholder(Placeholder),
        ClearPlaceholder,
        ClearTranscript,
        Input {
            editable: bool,
            owner: Option<String>,
        },
        Directory(Vec<i64>),
        OpenViewer {
            lang: String,
            content: String,
        },
        CloseViewer,
        ClearPreviews,
        Providers(Provider),
    }

    #[derive(Default)]
    struct RecordingSurface {
        events: Vec<Event>,
    }

    impl RecordingSurface {
        fn turns(&self) -> Vec<&Turn> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Turn(t) => Some(t),
                    _ => None,
                })
                .collect()
        }

        fn position(&self, wanted: &Event) -> Option<usize> {
            self.events.iter().position(|e| e == wanted)
        }
    }

    impl Surface for RecordingSurface {
        fn render_turn(&mut self, turn: &Turn) {
            self.events.push(Event::Turn(turn.clone()));
        }
        fn show_placeholder(&mut self, placeholder: Placeholder) {
            self.events.push(Event::Placeholder(placeholder));
        }
        fn clear_placeholder(&mut self) {
            self.events.push(Event::ClearPlaceholder);
        }
        fn clear_transcript(&mut self) {
            self.events.push(Event::ClearTranscript);
        }
        fn set_input_editable(&mut self, editable: bool, owner: Option<&str>) {
            self.events.push(Event::Input {
                editable,
                owner: owner.map(|s| s.to_string()),
            });
        }
        fn render_directory(&mut self, entries: &[SessionListEntry]) {
            self.events
                .push(Event::Directory(entries.iter().map(|e| e.id).collect()));
        }
        fn open_code_viewer(&mut self, content: &str, lang: &str) {
            self.events.push(Event::OpenViewer {
                lang: lang.to_string(),
                content: content.to_string(),
            });
        }
        fn close_code_viewer(&mut self) {
            self.events.push(Event::CloseViewer);
        }
        fn clear_staged_previews(&mut self) {
            self.events.push(Event::ClearPreviews);
        }
        fn render_provider_availability(
            &mut self,
            _availability: &[(Provider, bool)],
            current: Provider,
        ) {
            self.events.push(Event::Providers(current));
        }
    }

    fn config_for(username: &str) -> Config {
        let mut config = Config::default();
        config.user.username = username.to_string();
        config
    }

    fn controller(
        backend: StubBackend,
    ) -> ChatController<StubBackend, RecordingSurface> {
        ChatController::new(backend, RecordingSurface::default(), &config_for("alice"))
    }

    #[tokio::test]
    async fn first_turn_adopts_session_and_refreshes_directory_once() {
        let mut c = controller(StubBackend::new("sure thing", Some(7)));
        c.submit("hello").await;

        assert_eq!(c.active_session_id(), Some(7));
        let backend = &c.backend;
        assert_eq!(backend.history_calls.load(Ordering::SeqCst), 1);
        let requests = backend.chat_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].session_id, None);
        assert_eq!(requests[0].message, "hello");

        let turns = c.surface().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].sender, Sender::User);
        assert_eq!(turns[0].username, "alice");
        assert_eq!(turns[1].sender, Sender::Assistant);
        // Default provider is anthropic.
        assert_eq!(turns[1].username, "Claude");
    }

    #[tokio::test]
    async fn empty_submission_is_a_noop() {
        let mut c = controller(StubBackend::new("unused", None));
        c.submit("   ").await;
        assert!(c.backend.chat_requests().is_empty());
        assert!(c.surface().events.is_empty());
    }

    #[tokio::test]
    async fn placeholder_is_gone_before_the_terminal_turn() {
        let mut c = controller(StubBackend::new("done", Some(3)));
        c.submit("hi").await;

        let surface = c.surface();
        let thinking = surface
            .position(&Event::Placeholder(Placeholder::Thinking))
            .unwrap();
        let cleared = surface.position(&Event::ClearPlaceholder).unwrap();
        let reply = surface
            .events
            .iter()
            .position(|e| matches!(e, Event::Turn(t) if t.sender == Sender::Assistant))
            .unwrap();
        assert!(thinking < cleared);
        assert!(cleared < reply);
    }

    #[tokio::test]
    async fn chat_failure_renders_system_turn_and_keeps_no_session() {
        let mut backend = StubBackend::new("unused", Some(9));
        backend.fail_chat = true;
        let mut c = controller(backend);
        c.submit("hello").await;

        assert_eq!(c.active_session_id(), None);
        let turns = c.surface().turns();
        assert_eq!(turns.last().unwrap().sender, Sender::System);
        assert!(turns.last().unwrap().text.contains("backend down"));
        // The placeholder still went away.
        assert!(c.surface().position(&Event::ClearPlaceholder).is_some());
        // And the controller accepts the next submission.
        assert!(!c.is_busy());
    }

    #[tokio::test]
    async fn error_field_in_reply_is_terminal_for_the_turn() {
        let mut backend = StubBackend::new("ignored", Some(9));
        backend.reply_error = Some("quota exceeded".to_string());
        let mut c = controller(backend);
        c.submit("hello").await;

        assert_eq!(c.active_session_id(), None);
        let turns = c.surface().turns();
        assert_eq!(turns.last().unwrap().sender, Sender::System);
        assert!(turns.last().unwrap().text.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn failed_upload_is_dropped_and_the_turn_still_goes_out() {
        let mut backend = StubBackend::new("got it", Some(4));
        backend.failing_uploads = vec!["b.txt".to_string()];
        let mut c = controller(backend);
        c.stage_file(StagedFile::new("a.txt", "text/plain", vec![1]));
        c.stage_file(StagedFile::new("b.txt", "text/plain", vec![2]));
        c.stage_file(StagedFile::new("c.txt", "text/plain", vec![3]));
        c.submit("look at these").await;

        let requests = c.backend.chat_requests();
        assert_eq!(requests.len(), 1);
        // b.txt failed: its id is missing and ids keep staging order.
        assert_eq!(requests[0].file_ids, vec![1, 2]);
        let a = requests[0].message.find("[attached file: a.txt]").unwrap();
        let c_pos = requests[0].message.find("[attached file: c.txt]").unwrap();
        assert!(a < c_pos);
        assert!(!requests[0].message.contains("b.txt"));
    }

    #[tokio::test]
    async fn first_image_attachment_previews_the_user_turn() {
        let mut c = controller(StubBackend::new("nice photo", Some(4)));
        c.stage_file(StagedFile::new("notes.txt", "text/plain", vec![1]));
        c.stage_file(StagedFile::new("shot.png", "image/png", vec![2]));
        c.submit("see attached").await;

        let turns = c.surface().turns();
        match &turns[0].attachment {
            Some(AttachmentRef::Staged { name, .. }) => assert_eq!(name, "shot.png"),
            other => panic!("expected staged preview, got {:?}", other),
        }
        // Images never contribute extracted text.
        let requests = c.backend.chat_requests();
        assert!(!requests[0].message.contains("shot.png"));
    }

    #[tokio::test]
    async fn code_blocks_are_persisted_and_the_viewer_opens_on_the_first() {
        let reply = "Sure:\n```python\nprint(1)\n```\nand\n```js\nconsole.log(1)\n```";
        let mut c = controller(StubBackend::new(reply, Some(7)));
        c.submit("write code").await;

        let saved = c.backend.saved_files();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].1, "ai_code_7_1.py");
        assert_eq!(saved[1].1, "ai_code_7_2.js");
        assert_eq!(saved[0].2, "print(1)");

        let openings: Vec<_> = c
            .surface()
            .events
            .iter()
            .filter(|e| matches!(e, Event::OpenViewer { .. }))
            .collect();
        assert_eq!(openings.len(), 1);
        match openings[0] {
            Event::OpenViewer { lang, content } => {
                assert_eq!(lang, "python");
                assert_eq!(content, "print(1)");
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn without_a_session_persistence_is_skipped_but_the_viewer_opens() {
        let reply = "```python\nprint(1)\n```";
        let mut c = controller(StubBackend::new(reply, None));
        c.submit("write code").await;

        assert_eq!(c.active_session_id(), None);
        assert!(c.backend.saved_files().is_empty());
        assert!(c
            .surface()
            .events
            .iter()
            .any(|e| matches!(e, Event::OpenViewer { .. })));
    }

    #[tokio::test]
    async fn foreign_session_renders_read_only_and_blocks_submit() {
        let mut backend = StubBackend::new("unused", None);
        backend.session_owner = "bob".to_string();
        let mut c = controller(backend);
        c.load_session(12).await;

        assert_eq!(c.active_session_id(), Some(12));
        assert!(!c.input_editable());
        assert_eq!(c.surface().turns().len(), 2);
        assert_eq!(
            c.surface().position(&Event::Input {
                editable: false,
                owner: Some("bob".to_string()),
            }),
            Some(c.surface().events.len() - 2)
        );

        c.submit("let me in").await;
        assert!(c.backend.chat_requests().is_empty());
    }

    #[tokio::test]
    async fn own_session_loads_writable() {
        let mut c = controller(StubBackend::new("unused", None));
        c.load_session(5).await;
        assert!(c.input_editable());
        assert_eq!(c.active_session_id(), Some(5));
    }

    #[tokio::test]
    async fn deleting_the_active_session_resets_to_a_new_chat() {
        let mut c = controller(StubBackend::new("ok", Some(7)));
        c.submit("hello").await;
        assert_eq!(c.active_session_id(), Some(7));

        c.delete_session(7).await;
        assert_eq!(c.active_session_id(), None);
        assert!(c.input_editable());
        // The transcript was reset to the greeting.
        let turns = c.surface().turns();
        assert!(turns.last().unwrap().text.contains("new conversation"));
    }

    #[tokio::test]
    async fn deleting_another_session_keeps_the_active_one() {
        let mut c = controller(StubBackend::new("ok", Some(7)));
        c.submit("hello").await;
        c.delete_session(99).await;
        assert_eq!(c.active_session_id(), Some(7));
    }

    #[tokio::test]
    async fn directory_filter_hides_without_refetching() {
        let mut backend = StubBackend::new("unused", None);
        backend.history = vec![
            (1, "bug in parser".to_string(), "alice".to_string()),
            (2, "bug in lexer".to_string(), "bob".to_string()),
            (3, "shopping list".to_string(), "alice".to_string()),
        ];
        let mut c = controller(backend);
        c.refresh_directory().await;
        let fetches = c.backend.history_calls.load(Ordering::SeqCst);

        c.set_search("bug");
        c.toggle_mine_only();
        let visible = c.visible_directory();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, 1);
        assert_eq!(c.backend.history_calls.load(Ordering::SeqCst), fetches);
    }

    #[tokio::test]
    async fn image_persona_forces_google() {
        let mut c = controller(StubBackend::new("unused", None));
        assert_eq!(c.provider_state().current(), Provider::Anthropic);
        c.select_persona("ai_illustrator").await;
        assert_eq!(c.provider_state().current(), Provider::Google);
    }

    #[tokio::test]
    async fn restricted_provider_pick_is_ignored() {
        let mut backend = StubBackend::new("unused", None);
        backend.restricted = vec![Provider::Openai];
        let mut c = controller(backend);
        c.reconcile_providers().await;
        c.select_provider(Provider::Openai).await;
        assert_eq!(c.provider_state().current(), Provider::Anthropic);
    }

    #[tokio::test]
    async fn rename_with_unchanged_title_is_a_noop() {
        let mut c = controller(StubBackend::new("unused", None));
        c.rename_session(4, "same", "  same").await;
        c.rename_session(4, "same", "   ").await;
        assert_eq!(c.backend.history_calls.load(Ordering::SeqCst), 0);
    }
}
