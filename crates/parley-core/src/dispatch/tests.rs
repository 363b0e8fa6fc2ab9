use super::*;
use crate::record::{MessageId, Record, RecordDiff, State, StateChange};
use crate::session::SessionConfig;
use crate::store::{MemoryRecordStore, RecordStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Mutex;

const GENERAL_ERROR_EN: &str = "Something went wrong. Please try again.";

/// Transport that records every call and hands out increasing message ids.
struct RecordingTransport {
    next_id: AtomicI32,
    blocked: AtomicBool,
    sent: Mutex<Vec<(CorrespondentId, MessageId, String)>>,
    edited: Mutex<Vec<(MessageId, String)>>,
    deleted: Mutex<Vec<MessageId>>,
    answered: Mutex<Vec<(String, Option<String>)>>,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI32::new(100),
            blocked: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            edited: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            answered: Mutex::new(Vec::new()),
        })
    }

    fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, _, t)| t.clone()).collect()
    }

    fn check_blocked(&self) -> Result<(), TransportError> {
        if self.blocked.load(Ordering::SeqCst) {
            Err(TransportError::Blocked)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        chat: CorrespondentId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, TransportError> {
        self.check_blocked()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push((chat, id, message.text.clone()));
        Ok(id)
    }

    async fn edit(
        &self,
        _chat: CorrespondentId,
        message_id: MessageId,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError> {
        self.check_blocked()?;
        let mut edited = self.edited.lock().unwrap();
        let current = edited.last().map(|(id, text)| (*id, text.as_str()));
        if current == Some((message_id, message.text.as_str())) {
            return Err(TransportError::NotModified);
        }
        edited.push((message_id, message.text.clone()));
        Ok(())
    }

    async fn delete_messages(
        &self,
        _chat: CorrespondentId,
        message_ids: &[MessageId],
    ) -> Result<(), TransportError> {
        self.check_blocked()?;
        self.deleted.lock().unwrap().extend_from_slice(message_ids);
        Ok(())
    }

    async fn answer_callback(
        &self,
        query_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError> {
        self.answered
            .lock()
            .unwrap()
            .push((query_id.to_string(), text.map(str::to_string)));
        Ok(())
    }
}

/// Store whose lookups never finish in time
struct StalledStore;

#[async_trait]
impl RecordStore for StalledStore {
    async fn insert(&self, _record: &Record) -> crate::Result<()> {
        Ok(())
    }

    async fn find(&self, _id: CorrespondentId) -> crate::Result<Option<Record>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(None)
    }

    async fn apply_diff(&self, _id: CorrespondentId, _diff: &RecordDiff) -> crate::Result<()> {
        Ok(())
    }
}

struct Menu;

#[async_trait]
impl Handler for Menu {
    async fn handle(&self, ctx: &mut Context) -> anyhow::Result<()> {
        ctx.send_main(&OutgoingMessage::text("menu"), State::new("menu").into())
            .await?;
        Ok(())
    }
}

struct AskName;

#[async_trait]
impl Handler for AskName {
    async fn handle(&self, ctx: &mut Context) -> anyhow::Result<()> {
        ctx.edit_main(
            &OutgoingMessage::text("What is your name?"),
            State::awaiting_text("ask_name").into(),
        )
        .await?;
        ctx.answer(Some("ok")).await?;
        Ok(())
    }
}

struct Greet;

#[async_trait]
impl Handler for Greet {
    async fn handle(&self, ctx: &mut Context) -> anyhow::Result<()> {
        let text = match &ctx.event().kind {
            EventKind::Text { text, .. } => format!("Hello, {text}"),
            _ => anyhow::bail!("greet expects text"),
        };
        let main_id = ctx.session().messages().main_id();
        ctx.session_mut().set_state(main_id, StateChange::Clear).await;
        ctx.send_main(&OutgoingMessage::text(text), State::new("menu").into())
            .await?;
        Ok(())
    }
}

struct Echo;

#[async_trait]
impl Handler for Echo {
    async fn handle(&self, ctx: &mut Context) -> anyhow::Result<()> {
        let reply = format!("echo {}", ctx.args());
        ctx.send(&OutgoingMessage::text(reply)).await?;
        Ok(())
    }
}

struct Failing;

#[async_trait]
impl Handler for Failing {
    async fn handle(&self, _ctx: &mut Context) -> anyhow::Result<()> {
        anyhow::bail!("backend unavailable")
    }
}

struct Panicking;

#[async_trait]
impl Handler for Panicking {
    async fn handle(&self, _ctx: &mut Context) -> anyhow::Result<()> {
        panic!("kaboom")
    }
}

/// Holds the session for a while before replying
struct Slow;

#[async_trait]
impl Handler for Slow {
    async fn handle(&self, ctx: &mut Context) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_millis(150)).await;
        ctx.send(&OutgoingMessage::text("done")).await?;
        Ok(())
    }
}

struct DenyAll;

#[async_trait]
impl Middleware for DenyAll {
    fn name(&self) -> &'static str {
        "deny"
    }

    async fn process(&self, _ctx: &mut Context) -> bool {
        false
    }
}

fn router() -> Router {
    Router::new()
        .command("start", Menu)
        .command("echo", Echo)
        .command("fail", Failing)
        .command("panic", Panicking)
        .command("slow", Slow)
        .callback("name", AskName)
        .text("ask_name", Greet)
}

fn pipeline_with(
    transport: Arc<RecordingTransport>,
    config: DispatchConfig,
) -> (Pipeline, Arc<SessionManager>, Arc<MemoryRecordStore>) {
    let store = Arc::new(MemoryRecordStore::new());
    let manager = SessionManager::new(store.clone(), SessionConfig::default());
    let pipeline = Pipeline::builder(manager.clone(), transport)
        .router(router())
        .config(config)
        .build();
    (pipeline, manager, store)
}

fn pipeline(transport: Arc<RecordingTransport>) -> (Pipeline, Arc<SessionManager>) {
    let (pipeline, manager, _) = pipeline_with(transport, DispatchConfig::default());
    (pipeline, manager)
}

fn ada() -> Identity {
    Identity::new(7, "Ada").with_language("en-GB")
}

fn message(id: MessageId, text: &str) -> Event {
    Event::message(7, Some(ada()), id, Some(text))
}

fn press(data: &str, message_id: MessageId) -> Event {
    Event::callback(7, Some(ada()), "q1", message_id, data)
}

#[tokio::test]
async fn test_update_without_sender_is_dropped() {
    let transport = RecordingTransport::new();
    let (pipeline, manager) = pipeline(transport.clone());

    let outcome = pipeline
        .dispatch(Event::message(7, None, 1, Some("/start")))
        .await;

    assert_eq!(outcome, Outcome::Dropped);
    assert!(transport.sent_texts().is_empty());
    assert!(manager.is_empty());
}

#[tokio::test]
async fn test_command_sends_main_message() {
    let transport = RecordingTransport::new();
    let (pipeline, manager) = pipeline(transport.clone());

    assert_eq!(pipeline.dispatch(message(1, "/start")).await, Outcome::Handled);

    let record = manager.lookup(7).unwrap().snapshot().await;
    assert_eq!(record.messages.main_id(), 100);
    assert_eq!(record.state.main().name, State::INITIAL);
    assert_eq!(record.state.state_of(100).0.name, "menu");
    assert_eq!(transport.sent_texts(), vec!["menu"]);
}

#[tokio::test]
async fn test_command_args_reach_handler() {
    let transport = RecordingTransport::new();
    let (pipeline, _manager) = pipeline(transport.clone());

    pipeline.dispatch(message(1, "/echo@parley_bot hello there")).await;

    assert_eq!(transport.sent_texts(), vec!["echo hello there"]);
}

#[tokio::test]
async fn test_text_routes_by_awaiting_state() {
    let transport = RecordingTransport::new();
    let (pipeline, manager) = pipeline(transport.clone());

    pipeline.dispatch(message(1, "/start")).await;
    assert_eq!(pipeline.dispatch(press("name", 100)).await, Outcome::Handled);

    {
        let record = manager.lookup(7).unwrap().snapshot().await;
        assert_eq!(record.state.last_awaiting_text(), Some(100));
    }
    assert_eq!(
        transport.edited.lock().unwrap().as_slice(),
        &[(100, "What is your name?".to_string())]
    );

    assert_eq!(pipeline.dispatch(message(2, "Ada")).await, Outcome::Handled);

    let record = manager.lookup(7).unwrap().snapshot().await;
    assert_eq!(record.state.last_awaiting_text(), None);
    assert_eq!(record.messages.main_id(), 101);
    assert_eq!(record.messages.history(), &[100]);
    assert_eq!(transport.sent_texts().last().unwrap(), "Hello, Ada");
}

#[tokio::test]
async fn test_unrouted_text_is_not_an_error() {
    let transport = RecordingTransport::new();
    let (pipeline, manager) = pipeline(transport.clone());

    assert_eq!(pipeline.dispatch(message(1, "hi")).await, Outcome::Unrouted);
    assert!(transport.sent_texts().is_empty());
    let record = manager.lookup(7).unwrap().snapshot().await;
    assert_eq!(record.messages.error_id(), 0);
}

#[tokio::test]
async fn test_default_text_handler_catches_unclaimed_text() {
    let transport = RecordingTransport::new();
    let store = Arc::new(MemoryRecordStore::new());
    let manager = SessionManager::new(store, SessionConfig::default());
    let pipeline = Pipeline::builder(manager, transport.clone())
        .router(Router::new().default_text(Echo))
        .build();

    assert_eq!(pipeline.dispatch(message(1, "hi")).await, Outcome::Handled);
    assert_eq!(transport.sent_texts(), vec!["echo "]);
}

#[tokio::test]
async fn test_callback_acknowledged_once() {
    let transport = RecordingTransport::new();
    let (pipeline, _manager) = pipeline(transport.clone());

    pipeline.dispatch(message(1, "/start")).await;
    pipeline.dispatch(press("name", 100)).await;
    assert_eq!(
        transport.answered.lock().unwrap().as_slice(),
        &[("q1".to_string(), Some("ok".to_string()))]
    );

    transport.answered.lock().unwrap().clear();
    assert_eq!(
        pipeline.dispatch(press("unknown:1", 100)).await,
        Outcome::Unrouted
    );
    assert_eq!(
        transport.answered.lock().unwrap().as_slice(),
        &[("q1".to_string(), None)]
    );
}

#[tokio::test]
async fn test_malformed_callback_is_unrouted() {
    let transport = RecordingTransport::new();
    let (pipeline, _manager) = pipeline(transport.clone());

    assert_eq!(pipeline.dispatch(press("na me", 0)).await, Outcome::Unrouted);
    assert_eq!(pipeline.dispatch(press(":x", 0)).await, Outcome::Unrouted);
    assert_eq!(transport.answered.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_handler_error_sends_and_records_error_message() {
    let transport = RecordingTransport::new();
    let (pipeline, manager) = pipeline(transport.clone());

    assert_eq!(pipeline.dispatch(message(1, "/fail")).await, Outcome::Failed);
    assert_eq!(transport.sent_texts(), vec![GENERAL_ERROR_EN]);
    let record = manager.lookup(7).unwrap().snapshot().await;
    assert_eq!(record.messages.error_id(), 100);

    // A second failure replaces the first error message.
    assert_eq!(pipeline.dispatch(message(2, "/fail")).await, Outcome::Failed);
    assert_eq!(transport.deleted.lock().unwrap().as_slice(), &[100]);
    let record = manager.lookup(7).unwrap().snapshot().await;
    assert_eq!(record.messages.error_id(), 101);

    // The next update cleans up the outstanding error message.
    assert_eq!(pipeline.dispatch(message(3, "/start")).await, Outcome::Handled);
    assert_eq!(transport.deleted.lock().unwrap().as_slice(), &[100, 101]);
    let record = manager.lookup(7).unwrap().snapshot().await;
    assert_eq!(record.messages.error_id(), 0);
}

#[tokio::test]
async fn test_panicking_handler_is_contained() {
    let transport = RecordingTransport::new();
    let (pipeline, manager) = pipeline(transport.clone());

    assert_eq!(pipeline.dispatch(message(1, "/panic")).await, Outcome::Failed);
    assert_eq!(transport.sent_texts(), vec![GENERAL_ERROR_EN]);

    // The record lock was released with the context.
    assert_eq!(pipeline.dispatch(message(2, "/start")).await, Outcome::Handled);
    let record = manager.lookup(7).unwrap().snapshot().await;
    assert_eq!(record.messages.main_id(), 101);
}

#[tokio::test]
async fn test_blocked_correspondent_is_disabled() {
    let transport = RecordingTransport::new();
    let (pipeline, manager, store) = pipeline_with(transport.clone(), DispatchConfig::default());

    pipeline.dispatch(message(1, "/start")).await;
    transport.blocked.store(true, Ordering::SeqCst);

    assert_eq!(pipeline.dispatch(message(2, "/start")).await, Outcome::Failed);
    assert!(manager.lookup(7).is_none());

    manager.writer().flush(7).await;
    assert!(store.find(7).await.unwrap().unwrap().disabled);
}

#[tokio::test]
async fn test_obtain_timeout_reports_to_chat() {
    let transport = RecordingTransport::new();
    let manager = SessionManager::new(Arc::new(StalledStore), SessionConfig::default());
    let pipeline = Pipeline::builder(manager, transport.clone())
        .router(router())
        .config(DispatchConfig {
            obtain_timeout: Duration::from_millis(20),
            ..DispatchConfig::default()
        })
        .build();

    let outcome = pipeline.dispatch(message(1, "/start")).await;

    assert_eq!(outcome, Outcome::SessionUnavailable);
    assert_eq!(
        transport.sent.lock().unwrap().as_slice(),
        &[(7, 100, GENERAL_ERROR_EN.to_string())]
    );
}

#[tokio::test]
async fn test_waiting_for_busy_session_is_not_a_timeout() {
    let transport = RecordingTransport::new();
    let config = DispatchConfig {
        obtain_timeout: Duration::from_millis(20),
        ..DispatchConfig::default()
    };
    let (pipeline, _manager, _store) = pipeline_with(transport.clone(), config);

    let (first, second) = tokio::join!(
        pipeline.dispatch(message(1, "/slow")),
        pipeline.dispatch(message(2, "/slow")),
    );

    assert_eq!(first, Outcome::Handled);
    assert_eq!(second, Outcome::Handled);
    assert_eq!(transport.sent_texts(), vec!["done", "done"]);
}

#[tokio::test]
async fn test_middleware_can_short_circuit() {
    let transport = RecordingTransport::new();
    let store = Arc::new(MemoryRecordStore::new());
    let manager = SessionManager::new(store, SessionConfig::default());
    let pipeline = Pipeline::builder(manager, transport.clone())
        .router(router())
        .middleware(DenyAll)
        .build();

    assert_eq!(
        pipeline.dispatch(message(1, "/start")).await,
        Outcome::ShortCircuited
    );
    assert!(transport.sent_texts().is_empty());
}

#[tokio::test]
async fn test_cleanup_deletes_inbound_when_enabled() {
    let transport = RecordingTransport::new();
    let config = DispatchConfig {
        delete_inbound: true,
        log_updates: false,
        ..DispatchConfig::default()
    };
    let (pipeline, _manager, _store) = pipeline_with(transport.clone(), config);

    pipeline.dispatch(message(42, "/start")).await;
    pipeline.dispatch(press("name", 100)).await;

    assert_eq!(transport.deleted.lock().unwrap().as_slice(), &[42]);
}

#[tokio::test]
async fn test_edit_main_not_modified_is_success() {
    let transport = RecordingTransport::new();
    let (pipeline, manager) = pipeline(transport.clone());

    pipeline.dispatch(message(1, "/start")).await;
    assert_eq!(pipeline.dispatch(press("name", 100)).await, Outcome::Handled);
    assert_eq!(pipeline.dispatch(press("name", 100)).await, Outcome::Handled);

    assert_eq!(transport.edited.lock().unwrap().len(), 1);
    let record = manager.lookup(7).unwrap().snapshot().await;
    assert_eq!(record.messages.error_id(), 0);
}

#[test]
fn test_callback_data_parse() {
    let data = CallbackData::parse("page:2:next").unwrap();
    assert_eq!(data.action, "page");
    assert_eq!(data.args, "2:next");

    let data = CallbackData::parse("menu").unwrap();
    assert_eq!(data.action, "menu");
    assert_eq!(data.args, "");

    assert!(CallbackData::parse("").is_err());
    assert!(CallbackData::parse(":x").is_err());
    assert!(CallbackData::parse("bad action:1").is_err());
    assert!(CallbackData::parse("ünï:1").is_err());
}

#[test]
fn test_callback_data_encode() {
    assert_eq!(CallbackData::encode("page", "2").unwrap(), "page:2");
    assert_eq!(CallbackData::encode("menu", "").unwrap(), "menu");
    assert!(CallbackData::encode("a b", "").is_err());
    assert!(CallbackData::encode("x", &"y".repeat(MAX_CALLBACK_LEN)).is_err());
}

#[test]
fn test_event_classification() {
    let event = Event::message(1, None, 5, Some("/Start@bot  now "));
    assert_eq!(
        event.kind,
        EventKind::Command {
            message_id: 5,
            name: "start".to_string(),
            args: "now".to_string(),
        }
    );

    let event = Event::message(1, None, 6, Some("/ hello"));
    assert_eq!(event.kind_name(), "text");

    let event = Event::message(1, None, 7, None);
    assert_eq!(event.kind, EventKind::Other { message_id: 7 });
    assert!(event.is_inbound_message());

    let event = Event::callback(1, None, "q", 8, "menu");
    assert!(event.is_callback());
    assert!(!event.is_inbound_message());
    assert_eq!(event.text(), Some("menu"));
}

#[test]
fn test_log_text_keeps_command_args() {
    let event = Event::message(1, None, 5, Some("/echo@bot hello there"));
    assert_eq!(event.text(), Some("echo"));
    assert_eq!(event.log_text(), "/echo hello there");

    let event = Event::message(1, None, 6, Some("/start"));
    assert_eq!(event.log_text(), "/start");

    let long = format!("/echo {}", "x".repeat(100));
    let event = Event::message(1, None, 7, Some(long.as_str()));
    let logged = truncate_for_log(&event.log_text());
    assert!(logged.starts_with("/echo xxx"));
    assert_eq!(logged.chars().count(), MAX_LOG_TEXT_CHARS + 3);

    assert_eq!(Event::message(1, None, 8, None).log_text(), "");
    assert_eq!(Event::callback(1, None, "q", 9, "page:2").log_text(), "page:2");
}

#[test]
fn test_locale_fallbacks() {
    let locale = Locale::new("de").with_general_error("pt", "Algo deu errado.");
    assert_eq!(locale.general_error(Some("en-US")), GENERAL_ERROR_EN);
    assert_eq!(locale.general_error(Some("pt_BR")), "Algo deu errado.");
    assert_eq!(
        locale.general_error(Some("ja")),
        "Etwas ist schiefgelaufen. Bitte versuche es erneut."
    );
    assert_eq!(
        locale.general_error(None),
        "Etwas ist schiefgelaufen. Bitte versuche es erneut."
    );
    assert_eq!(Locale::new("xx").general_error(None), GENERAL_ERROR_EN);
}

#[test]
fn test_truncate_for_log() {
    assert_eq!(truncate_for_log("short"), "short");
    let long = "é".repeat(MAX_LOG_TEXT_CHARS + 10);
    let cut = truncate_for_log(&long);
    assert_eq!(cut.chars().count(), MAX_LOG_TEXT_CHARS + 3);
    assert!(cut.ends_with("..."));
}
