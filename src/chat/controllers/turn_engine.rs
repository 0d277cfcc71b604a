use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::chat::error::EngineError;
use crate::chat::models::source::validate_sources;
use crate::chat::models::{ChatMessage, ChatSession, MessageRole};
use crate::chat::repositories::{PendingSave, SaveDebouncer, SessionRepository};
use crate::chat::services::backend_client::{
    effective_query, BackendClient, ChatRequestBody, SearchRequestBody, TurnParams, WireMessage,
    WireSourceBody,
};
use crate::chat::services::stream_decoder::StreamEvent;
use crate::settings::models::{SettingsModel, SystemPrompts};

/// Where the engine is within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    /// Request sent, no assistant content yet.
    Sending,
    /// First token arrived, assistant message created.
    StreamingFirstToken,
    /// Subsequent tokens appending.
    StreamingAppending,
    Completed,
    Failed,
}

/// Engine notifications for a front end. Fire-and-forget; a missing or
/// closed sink never affects the turn itself.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    TokenAppended { content: String },
    StatusChanged { message: String },
    TurnCompleted,
    TurnFailed { error: EngineError },
}

/// The outcome of a search-seeded conversation start.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub response: String,
    pub prompt: String,
    pub system_prompt: String,
}

/// Orchestrates one conversational turn at a time.
///
/// Owns the live transcript as a working copy; the session repository owns
/// the authoritative collection. The engine is not reentrant: a new turn is
/// rejected while one is in flight, and a finished turn must be
/// acknowledged before the next can start.
pub struct TurnEngine {
    backend: BackendClient,
    repository: Arc<SessionRepository>,
    saver: SaveDebouncer,
    transcript: Vec<ChatMessage>,
    state: TurnState,
    status_text: Option<String>,
    last_error: Option<EngineError>,
    deep_research: bool,
    events: Option<UnboundedSender<EngineEvent>>,
}

impl TurnEngine {
    pub fn new(backend: BackendClient, repository: Arc<SessionRepository>) -> Self {
        let saver = SaveDebouncer::new(repository.clone());
        Self {
            backend,
            repository,
            saver,
            transcript: Vec::new(),
            state: TurnState::Idle,
            status_text: None,
            last_error: None,
            deep_research: false,
            events: None,
        }
    }

    /// Attach a sink for engine events.
    pub fn with_event_sink(mut self, events: UnboundedSender<EngineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn status_text(&self) -> Option<&str> {
        self.status_text.as_deref()
    }

    pub fn last_error(&self) -> Option<&EngineError> {
        self.last_error.as_ref()
    }

    pub fn session_id(&self) -> Option<String> {
        self.saver.session_id()
    }

    pub fn set_deep_research(&mut self, enabled: bool) {
        self.deep_research = enabled;
    }

    pub fn repository(&self) -> &Arc<SessionRepository> {
        &self.repository
    }

    /// Move a finished turn back to idle so the next one can start.
    pub fn acknowledge(&mut self) {
        if matches!(self.state, TurnState::Completed | TurnState::Failed) {
            self.state = TurnState::Idle;
        }
    }

    /// Replace the transcript with a persisted session's messages and
    /// retarget future saves at that session.
    pub fn load_session(&mut self, session: &ChatSession) {
        self.transcript = session.messages.clone();
        self.saver.set_session_id(Some(session.id.clone()));
        self.state = TurnState::Idle;
        self.status_text = None;
        self.last_error = None;
    }

    /// Replace the transcript without targeting a persisted session; the
    /// next save creates a fresh one.
    pub fn load_messages(&mut self, messages: Vec<ChatMessage>) {
        self.transcript = messages;
        self.saver.set_session_id(None);
        self.state = TurnState::Idle;
        self.status_text = None;
        self.last_error = None;
    }

    /// Drop the transcript and start over.
    pub fn clear_chat(&mut self) {
        self.saver.cancel();
        self.transcript.clear();
        self.saver.set_session_id(None);
        self.state = TurnState::Idle;
        self.status_text = None;
        self.last_error = None;
    }

    /// Run one conversational turn: send the user's message with the
    /// current transcript and stream the assistant's reply into it.
    pub async fn send_turn(
        &mut self,
        user_text: &str,
        settings: &SettingsModel,
        prompts: &SystemPrompts,
    ) -> Result<(), EngineError> {
        if self.state != TurnState::Idle {
            return Err(EngineError::TurnInFlight);
        }
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return Err(EngineError::EmptyMessage);
        }
        validate_sources(&settings.sources, settings.scope_learning)?;

        self.last_error = None;
        self.status_text = None;
        self.transcript.push(ChatMessage::user(user_text));
        self.state = TurnState::Sending;

        let result = self.run_turn(user_text, settings, prompts).await;
        match result {
            Ok(()) => {
                self.state = TurnState::Completed;
                self.emit(EngineEvent::TurnCompleted);
                Ok(())
            }
            Err(error) => {
                self.state = TurnState::Failed;
                self.last_error = Some(error.clone());
                self.emit(EngineEvent::TurnFailed {
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    async fn run_turn(
        &mut self,
        user_text: &str,
        settings: &SettingsModel,
        prompts: &SystemPrompts,
    ) -> Result<(), EngineError> {
        let body = self.build_request_body(user_text, settings, prompts);
        let params = TurnParams::from_settings(settings, self.deep_research);
        let mut stream = self.backend.chat_turn(&body, &params).await?;

        let mut assistant_added = false;
        let mut completed = false;

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => event,
                Err(error) => {
                    self.rollback(assistant_added);
                    return Err(error);
                }
            };

            match event {
                StreamEvent::Message { content, done } => {
                    if !assistant_added {
                        self.transcript.push(ChatMessage::assistant_streaming());
                        assistant_added = true;
                        self.state = TurnState::StreamingFirstToken;
                    } else {
                        self.state = TurnState::StreamingAppending;
                    }
                    if !content.is_empty() {
                        self.append_to_assistant(&content);
                        self.emit(EngineEvent::TokenAppended { content });
                    }
                    if done {
                        self.complete_assistant();
                        self.status_text = None;
                        completed = true;
                        break;
                    }
                    self.schedule_save(settings);
                }
                StreamEvent::Processing { message } => {
                    self.status_text = Some(message.clone());
                    self.emit(EngineEvent::StatusChanged { message });
                }
                StreamEvent::Error { content } => {
                    self.rollback(assistant_added);
                    return Err(EngineError::Stream(content));
                }
                StreamEvent::Prompt { .. } | StreamEvent::SystemPrompt { .. } => {
                    debug!("ignoring search-only event in chat turn");
                }
            }
        }

        if !completed {
            self.rollback(assistant_added);
            return Err(EngineError::Stream(
                "stream ended before completion".to_string(),
            ));
        }

        // Persistence failures do not fail a successfully streamed turn.
        if let Err(err) = self
            .saver
            .flush(PendingSave {
                messages: self.transcript.clone(),
                assistant_role: Some(settings.assistant_role),
                sources: Some(settings.sources.clone()),
            })
            .await
        {
            warn!(error = %err, "failed to persist completed turn");
        }

        Ok(())
    }

    /// Run a search that seeds a fresh conversation. The streamed response,
    /// generated prompt, and generated system prompt are accumulated and
    /// the transcript is replaced with the seeded exchange.
    pub async fn run_search(
        &mut self,
        query: &str,
        settings: &SettingsModel,
    ) -> Result<SearchOutcome, EngineError> {
        if self.state != TurnState::Idle {
            return Err(EngineError::TurnInFlight);
        }
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::EmptyMessage);
        }
        validate_sources(&settings.sources, settings.scope_learning)?;

        let body = if settings.scope_learning {
            SearchRequestBody::ScopeLearning {
                empty: query.to_string(),
            }
        } else {
            SearchRequestBody::Sources {
                sources: settings
                    .sources
                    .iter()
                    .map(|source| WireSourceBody {
                        repositories: source.repositories.clone(),
                        query: effective_query(source, &settings.search_query, query),
                    })
                    .collect(),
            }
        };
        let params = TurnParams::from_settings(settings, self.deep_research);

        self.state = TurnState::Sending;
        let result = self
            .collect_search(&body, &params, settings.scope_learning)
            .await;
        match result {
            Ok(outcome) => {
                let user_text = if outcome.prompt.is_empty() {
                    query.to_string()
                } else {
                    outcome.prompt.clone()
                };
                self.transcript = vec![
                    ChatMessage::user(user_text),
                    ChatMessage::assistant(outcome.response.clone()),
                ];
                self.saver.set_session_id(None);
                self.state = TurnState::Completed;
                self.status_text = None;
                self.emit(EngineEvent::TurnCompleted);
                Ok(outcome)
            }
            Err(error) => {
                self.state = TurnState::Failed;
                self.last_error = Some(error.clone());
                self.emit(EngineEvent::TurnFailed {
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    async fn collect_search(
        &mut self,
        body: &SearchRequestBody,
        params: &TurnParams,
        scope_learning: bool,
    ) -> Result<SearchOutcome, EngineError> {
        let mut stream = self.backend.search(body, params, scope_learning).await?;

        let mut outcome = SearchOutcome::default();
        let mut completed = false;

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Message { content, done } => {
                    outcome.response.push_str(&content);
                    if !content.is_empty() {
                        self.emit(EngineEvent::TokenAppended { content });
                    }
                    if done {
                        completed = true;
                        break;
                    }
                }
                StreamEvent::Processing { message } => {
                    self.status_text = Some(message.clone());
                    self.emit(EngineEvent::StatusChanged { message });
                }
                StreamEvent::Prompt { content, .. } => {
                    outcome.prompt = content;
                }
                StreamEvent::SystemPrompt { content, .. } => {
                    outcome.system_prompt = content;
                }
                StreamEvent::Error { content } => {
                    return Err(EngineError::Stream(content));
                }
            }
        }

        if !completed {
            return Err(EngineError::Stream(
                "stream ended before completion".to_string(),
            ));
        }
        Ok(outcome)
    }

    fn build_request_body(
        &self,
        user_text: &str,
        settings: &SettingsModel,
        prompts: &SystemPrompts,
    ) -> ChatRequestBody {
        let mut messages = Vec::with_capacity(self.transcript.len() + 1);
        let system_prompt = prompts.prompt_for(settings.assistant_role);
        if !system_prompt.is_empty() {
            messages.push(WireMessage {
                role: "system".to_string(),
                content: system_prompt.to_string(),
            });
        }
        messages.extend(self.transcript.iter().map(WireMessage::from));

        let sources = settings
            .sources
            .iter()
            .map(|source| WireSourceBody {
                repositories: source.repositories.clone(),
                query: effective_query(source, &settings.search_query, user_text),
            })
            .collect();

        ChatRequestBody { messages, sources }
    }

    fn append_to_assistant(&mut self, content: &str) {
        if let Some(message) = self.transcript.last_mut() {
            if message.role == MessageRole::Assistant {
                message.content.push_str(content);
            }
        }
    }

    fn complete_assistant(&mut self) {
        if let Some(message) = self.transcript.last_mut() {
            if message.role == MessageRole::Assistant {
                message.is_complete = true;
            }
        }
    }

    /// Remove the partial assistant message of a failed turn. The user's
    /// message stays so they can retry without retyping.
    fn rollback(&mut self, assistant_added: bool) {
        self.saver.cancel();
        if assistant_added {
            let is_partial = self
                .transcript
                .last()
                .map(|m| m.role == MessageRole::Assistant && !m.is_complete)
                .unwrap_or(false);
            if is_partial {
                self.transcript.pop();
            }
        }
    }

    fn schedule_save(&self, settings: &SettingsModel) {
        self.saver.schedule(PendingSave {
            messages: self.transcript.clone(),
            assistant_role: Some(settings.assistant_role),
            sources: Some(settings.sources.clone()),
        });
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(sink) = &self.events {
            let _ = sink.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::auth::StaticTokenProvider;
    use crate::chat::models::SourceConfig;
    use crate::storage::InMemoryStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine_for(server: &MockServer) -> TurnEngine {
        let backend =
            BackendClient::new(server.uri(), Arc::new(StaticTokenProvider::anonymous())).unwrap();
        let repository = Arc::new(SessionRepository::new(Arc::new(InMemoryStore::default())));
        TurnEngine::new(backend, repository)
    }

    fn settings() -> SettingsModel {
        SettingsModel {
            sources: vec![SourceConfig::new(vec!["core".to_string()], "auth")],
            selected_repositories: vec!["core".to_string()],
            ..Default::default()
        }
    }

    fn ndjson(lines: &[&str]) -> String {
        let mut body = lines.join("\n");
        body.push('\n');
        body
    }

    async fn mount_chat(server: &MockServer, body: String) {
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_successful_turn_appends_in_order() {
        let server = MockServer::start().await;
        mount_chat(
            &server,
            ndjson(&[
                r#"{"event":"processing","data":{"message":"thinking"}}"#,
                r#"{"event":"message","data":{"content":"Hel","done":false}}"#,
                r#"{"event":"message","data":{"content":"lo ","done":false}}"#,
                r#"{"event":"message","data":{"content":"world","done":true}}"#,
            ]),
        )
        .await;

        let mut engine = engine_for(&server);
        engine
            .send_turn("hi there", &settings(), &SystemPrompts::default())
            .await
            .unwrap();

        assert_eq!(engine.state(), TurnState::Completed);
        let transcript = engine.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].content, "hi there");
        assert_eq!(transcript[1].content, "Hello world");
        assert!(transcript[1].is_complete);
        assert!(engine.status_text().is_none());

        // The completed turn was flushed to the repository.
        let sessions = engine.repository().get_all_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].messages, transcript);
    }

    #[tokio::test]
    async fn test_error_event_rolls_back_partial_assistant() {
        let server = MockServer::start().await;
        mount_chat(
            &server,
            ndjson(&[
                r#"{"event":"message","data":{"content":"par","done":false}}"#,
                r#"{"event":"error","data":{"content":"model overloaded"}}"#,
            ]),
        )
        .await;

        let mut engine = engine_for(&server);
        let result = engine
            .send_turn("question", &settings(), &SystemPrompts::default())
            .await;

        assert!(matches!(result, Err(EngineError::Stream(ref msg)) if msg == "model overloaded"));
        assert_eq!(engine.state(), TurnState::Failed);

        // Partial assistant content is gone, the user message is retained.
        let transcript = engine.transcript();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].role, MessageRole::User);
        assert!(engine.repository().get_all_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_http_failure_keeps_user_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut engine = engine_for(&server);
        let result = engine
            .send_turn("question", &settings(), &SystemPrompts::default())
            .await;

        assert!(matches!(result, Err(EngineError::Request(_))));
        assert_eq!(engine.transcript().len(), 1);
        assert!(engine.last_error().is_some());
    }

    #[tokio::test]
    async fn test_stream_ending_without_done_is_an_error() {
        let server = MockServer::start().await;
        mount_chat(
            &server,
            ndjson(&[r#"{"event":"message","data":{"content":"trunc","done":false}}"#]),
        )
        .await;

        let mut engine = engine_for(&server);
        let result = engine
            .send_turn("question", &settings(), &SystemPrompts::default())
            .await;

        assert!(matches!(result, Err(EngineError::Stream(_))));
        assert_eq!(engine.transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_finished_turn_must_be_acknowledged() {
        let server = MockServer::start().await;
        mount_chat(
            &server,
            ndjson(&[r#"{"event":"message","data":{"content":"ok","done":true}}"#]),
        )
        .await;

        let mut engine = engine_for(&server);
        engine
            .send_turn("first", &settings(), &SystemPrompts::default())
            .await
            .unwrap();

        let result = engine
            .send_turn("second", &settings(), &SystemPrompts::default())
            .await;
        assert!(matches!(result, Err(EngineError::TurnInFlight)));

        engine.acknowledge();
        assert_eq!(engine.state(), TurnState::Idle);
        engine
            .send_turn("second", &settings(), &SystemPrompts::default())
            .await
            .unwrap();
        assert_eq!(engine.transcript().len(), 4);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let server = MockServer::start().await;
        let mut engine = engine_for(&server);
        let result = engine
            .send_turn("   ", &settings(), &SystemPrompts::default())
            .await;
        assert!(matches!(result, Err(EngineError::EmptyMessage)));
        assert!(engine.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_sources_rejected_before_sending() {
        let server = MockServer::start().await;
        let mut engine = engine_for(&server);
        let bad = SettingsModel {
            sources: vec![SourceConfig::new(vec![], "query")],
            ..Default::default()
        };
        let result = engine
            .send_turn("question", &bad, &SystemPrompts::default())
            .await;
        assert!(matches!(result, Err(EngineError::InvalidSource(_))));
        assert!(engine.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_event_sink_receives_tokens_in_order() {
        let server = MockServer::start().await;
        mount_chat(
            &server,
            ndjson(&[
                r#"{"event":"message","data":{"content":"a","done":false}}"#,
                r#"{"event":"message","data":{"content":"b","done":false}}"#,
                r#"{"event":"message","data":{"content":"c","done":true}}"#,
            ]),
        )
        .await;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut engine = engine_for(&server).with_event_sink(tx);
        engine
            .send_turn("go", &settings(), &SystemPrompts::default())
            .await
            .unwrap();

        let mut tokens = String::new();
        while let Ok(event) = rx.try_recv() {
            if let EngineEvent::TokenAppended { content } = event {
                tokens.push_str(&content);
            }
        }
        assert_eq!(tokens, "abc");
    }

    #[tokio::test]
    async fn test_search_seeds_transcript() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/search"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                ndjson(&[
                    r#"{"event":"systemprompt","data":{"content":"system ctx","message":""}}"#,
                    r#"{"event":"prompt","data":{"content":"expanded question","message":""}}"#,
                    r#"{"event":"message","data":{"content":"seeded ","done":false}}"#,
                    r#"{"event":"message","data":{"content":"answer","done":true}}"#,
                ]),
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let mut engine = engine_for(&server);
        let outcome = engine.run_search("topic", &settings()).await.unwrap();

        assert_eq!(outcome.response, "seeded answer");
        assert_eq!(outcome.prompt, "expanded question");
        assert_eq!(outcome.system_prompt, "system ctx");

        let transcript = engine.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].content, "expanded question");
        assert_eq!(transcript[1].content, "seeded answer");
        assert!(transcript[1].is_complete);
    }

    #[tokio::test]
    async fn test_scope_learning_search_uses_scope_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/scope-search"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                ndjson(&[r#"{"event":"message","data":{"content":"learned","done":true}}"#]),
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let mut engine = engine_for(&server);
        let scope_settings = SettingsModel {
            scope_learning: true,
            ..Default::default()
        };
        let outcome = engine.run_search("syntax", &scope_settings).await.unwrap();
        assert_eq!(outcome.response, "learned");
        // No generated prompt: the raw query seeds the user message.
        assert_eq!(engine.transcript()[0].content, "syntax");
    }

    #[tokio::test]
    async fn test_clear_chat_resets_session_target() {
        let server = MockServer::start().await;
        mount_chat(
            &server,
            ndjson(&[r#"{"event":"message","data":{"content":"ok","done":true}}"#]),
        )
        .await;

        let mut engine = engine_for(&server);
        engine
            .send_turn("first", &settings(), &SystemPrompts::default())
            .await
            .unwrap();
        let first_id = engine.session_id().unwrap();

        engine.clear_chat();
        assert!(engine.transcript().is_empty());
        assert!(engine.session_id().is_none());

        engine
            .send_turn("second", &settings(), &SystemPrompts::default())
            .await
            .unwrap();
        let second_id = engine.session_id().unwrap();
        assert_ne!(first_id, second_id);
        assert_eq!(
            engine.repository().get_all_sessions().await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_load_session_retargets_saves() {
        let server = MockServer::start().await;
        mount_chat(
            &server,
            ndjson(&[r#"{"event":"message","data":{"content":"more","done":true}}"#]),
        )
        .await;

        let mut engine = engine_for(&server);
        let id = engine
            .repository()
            .save_session(crate::chat::repositories::SessionUpdate {
                messages: vec![ChatMessage::user("old"), ChatMessage::assistant("reply")],
                session_id: None,
                assistant_role: None,
                bump_timestamp: true,
                sources: None,
            })
            .await
            .unwrap();
        let session = engine.repository().get_session(&id).await.unwrap().unwrap();

        engine.load_session(&session);
        assert_eq!(engine.transcript().len(), 2);

        engine
            .send_turn("continue", &settings(), &SystemPrompts::default())
            .await
            .unwrap();

        // The turn extended the loaded session rather than creating one.
        let sessions = engine.repository().get_all_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, id);
        assert_eq!(sessions[0].messages.len(), 4);
    }
}
