//! In-memory collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use colorcode_bot::events::{
    Actor, ButtonPress, ChatKind, InboundEvent, InlineQueryEvent, MessageRef, PhotoMessage, TextMessage,
};
use colorcode_bot::keyboards::Keyboard;
use colorcode_bot::platform::{
    Artifact, ChatAction, ChatPlatform, CleanupScheduler, InlineAnswer, OutgoingText, PrivilegeCheck, RenderFormat,
    Renderer, SentMessage, TextFormat,
};
use colorcode_bot::{
    ActionRecord, BotContext, BotError, Catalog, Classifier, MemoryPreferenceStore, Result, RetryPolicy, SyntaxDetector,
};

pub const GROUP: i64 = -1001;
pub const ADMIN: i64 = 1;
pub const MEMBER: i64 = 2;

/// One outbound platform call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Text(OutgoingText),
    Document { chat_id: i64, artifact: Artifact, reply_to: Option<i32>, keyboard: Option<Keyboard> },
    Photo { chat_id: i64, artifact: Artifact, reply_to: Option<i32> },
    MediaGroup { chat_id: i64, file_ids: Vec<String> },
    EditKeyboard { message: MessageRef, keyboard: Keyboard },
    EditText { message: MessageRef, text: String, format: TextFormat, keyboard: Option<Keyboard> },
    AnswerButton { query_id: String, text: Option<String> },
    AnswerInline { query_id: String, answer: InlineAnswer },
    Delete(MessageRef),
    ChatAction { chat_id: i64, action: ChatAction },
}

/// Records every call; failures can be queued per operation
#[derive(Default)]
pub struct FakePlatform {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicI32,
    failures: Mutex<HashMap<&'static str, VecDeque<BotError>>>,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI32::new(1000),
            ..Default::default()
        })
    }

    /// Make the next call to `op` fail with `err`
    pub fn fail_next(&self, op: &'static str, err: BotError) {
        self.failures.lock().entry(op).or_default().push_back(err);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Calls other than chat actions
    pub fn visible_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::ChatAction { .. }))
            .collect()
    }

    fn record(&self, op: &'static str, call: Call) -> Result<()> {
        if let Some(err) = self.failures.lock().get_mut(op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        self.calls.lock().push(call);
        Ok(())
    }

    fn new_message(&self, chat_id: i64, photo: bool) -> SentMessage {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        SentMessage {
            message: MessageRef { chat_id, message_id },
            photo_file_id: photo.then(|| format!("photo-{}", message_id)),
        }
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn send_text(&self, msg: OutgoingText) -> Result<SentMessage> {
        let chat_id = msg.chat_id;
        self.record("send_text", Call::Text(msg))?;
        Ok(self.new_message(chat_id, false))
    }

    async fn send_document(
        &self,
        chat_id: i64,
        artifact: Artifact,
        reply_to: Option<i32>,
        keyboard: Option<Keyboard>,
    ) -> Result<SentMessage> {
        self.record("send_document", Call::Document { chat_id, artifact, reply_to, keyboard })?;
        Ok(self.new_message(chat_id, false))
    }

    async fn send_photo(&self, chat_id: i64, artifact: Artifact, reply_to: Option<i32>) -> Result<SentMessage> {
        self.record("send_photo", Call::Photo { chat_id, artifact, reply_to })?;
        Ok(self.new_message(chat_id, true))
    }

    async fn send_media_group(
        &self,
        chat_id: i64,
        file_ids: Vec<String>,
        _reply_to: Option<i32>,
    ) -> Result<Vec<SentMessage>> {
        let count = file_ids.len();
        self.record("send_media_group", Call::MediaGroup { chat_id, file_ids })?;
        Ok((0..count).map(|_| self.new_message(chat_id, true)).collect())
    }

    async fn edit_keyboard(&self, message: MessageRef, keyboard: Keyboard) -> Result<()> {
        self.record("edit_keyboard", Call::EditKeyboard { message, keyboard })
    }

    async fn edit_text(
        &self,
        message: MessageRef,
        text: String,
        format: TextFormat,
        keyboard: Option<Keyboard>,
    ) -> Result<()> {
        self.record("edit_text", Call::EditText { message, text, format, keyboard })
    }

    async fn answer_button(&self, query_id: &str, text: Option<String>) -> Result<()> {
        self.record(
            "answer_button",
            Call::AnswerButton { query_id: query_id.to_string(), text },
        )
    }

    async fn answer_inline(&self, query_id: &str, answer: InlineAnswer) -> Result<()> {
        self.record(
            "answer_inline",
            Call::AnswerInline { query_id: query_id.to_string(), answer },
        )
    }

    async fn delete_message(&self, message: MessageRef) -> Result<()> {
        self.record("delete_message", Call::Delete(message))
    }

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Result<()> {
        self.record("send_chat_action", Call::ChatAction { chat_id, action })
    }
}

/// Returns fixed bytes; PNG size is configurable
pub struct FakeRenderer {
    pub png_size: usize,
    pub renders: Mutex<Vec<(String, String, RenderFormat)>>,
}

impl FakeRenderer {
    pub fn new(png_size: usize) -> Arc<Self> {
        Arc::new(Self {
            png_size,
            renders: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, _code: &str, ext: &str, theme: &str, format: RenderFormat) -> Result<Vec<u8>> {
        self.renders.lock().push((ext.to_string(), theme.to_string(), format));
        Ok(match format {
            RenderFormat::Html => b"<html></html>".to_vec(),
            RenderFormat::Png => vec![0u8; self.png_size],
        })
    }
}

/// Privileged users by id
pub struct FakePrivilege {
    admins: HashSet<i64>,
}

#[async_trait]
impl PrivilegeCheck for FakePrivilege {
    async fn is_privileged(&self, actor_id: i64, _chat_id: i64) -> Result<bool> {
        Ok(self.admins.contains(&actor_id))
    }
}

/// Remembers scheduled deletions without running them
#[derive(Default)]
pub struct FakeCleanup {
    pub scheduled: Mutex<Vec<(MessageRef, Duration)>>,
}

impl CleanupScheduler for FakeCleanup {
    fn schedule_delete(&self, message: MessageRef, after: Duration) {
        self.scheduled.lock().push((message, after));
    }
}

/// Classifier that always answers with one label
pub struct FixedClassifier(pub Option<(&'static str, f64)>);

impl Classifier for FixedClassifier {
    fn probabilities(&self, _sample: &str) -> Vec<(String, f64)> {
        self.0.iter().map(|(l, p)| (l.to_string(), *p)).collect()
    }
}

pub struct Harness {
    pub ctx: BotContext,
    pub platform: Arc<FakePlatform>,
    pub renderer: Arc<FakeRenderer>,
    pub store: Arc<MemoryPreferenceStore>,
    pub cleanup: Arc<FakeCleanup>,
}

impl Harness {
    pub fn new(classifier: FixedClassifier) -> Self {
        Self::with_png_size(classifier, 1024)
    }

    pub fn with_png_size(classifier: FixedClassifier, png_size: usize) -> Self {
        Self::build(classifier, png_size, Catalog::builtin().unwrap())
    }

    pub fn build(classifier: FixedClassifier, png_size: usize, catalog: Catalog) -> Self {
        let platform = FakePlatform::new();
        let renderer = FakeRenderer::new(png_size);
        let store = Arc::new(MemoryPreferenceStore::new());
        let cleanup = Arc::new(FakeCleanup::default());
        let privilege = Arc::new(FakePrivilege { admins: HashSet::from([ADMIN]) });
        let detector = SyntaxDetector::new(Arc::new(classifier), catalog.labels.clone());

        let ctx = BotContext::new(
            platform.clone(),
            renderer.clone(),
            store.clone(),
            privilege,
            cleanup.clone(),
            detector,
            catalog,
        )
        .unwrap()
        .with_retry_policy(RetryPolicy::transient(3, Duration::from_millis(1)));

        Self { ctx, platform, renderer, store, cleanup }
    }
}

pub fn actor(user_id: i64) -> Actor {
    Actor {
        user_id,
        first_name: format!("user{}", user_id),
    }
}

pub fn text(chat_kind: ChatKind, chat_id: i64, message_id: i32, from: i64, body: &str, spans: &[&str]) -> TextMessage {
    TextMessage {
        message: MessageRef { chat_id, message_id },
        chat_kind,
        from: actor(from),
        text: body.to_string(),
        code_spans: spans.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn private_text(user_id: i64, message_id: i32, body: &str) -> InboundEvent {
    InboundEvent::Text(text(ChatKind::Private, user_id, message_id, user_id, body, &[]))
}

pub fn group_text(user_id: i64, message_id: i32, body: &str, spans: &[&str]) -> InboundEvent {
    InboundEvent::Text(text(ChatKind::Group, GROUP, message_id, user_id, body, spans))
}

pub fn press(
    chat_kind: ChatKind,
    chat_id: i64,
    from: i64,
    keyboard_message: i32,
    reply_to: Option<TextMessage>,
    record: &ActionRecord,
) -> InboundEvent {
    press_raw(chat_kind, chat_id, from, keyboard_message, reply_to, record.encode().unwrap())
}

pub fn press_raw(
    chat_kind: ChatKind,
    chat_id: i64,
    from: i64,
    keyboard_message: i32,
    reply_to: Option<TextMessage>,
    data: String,
) -> InboundEvent {
    InboundEvent::ButtonPress(ButtonPress {
        query_id: format!("q{}", keyboard_message),
        from: actor(from),
        message: Some(MessageRef { chat_id, message_id: keyboard_message }),
        chat_kind,
        reply_to: reply_to.map(Box::new),
        data,
    })
}

pub fn photo(user_id: i64, message_id: i32) -> InboundEvent {
    InboundEvent::Photo(PhotoMessage {
        message: MessageRef { chat_id: user_id, message_id },
        from: actor(user_id),
        file_id: "AgAD".to_string(),
    })
}

pub fn inline(user_id: i64, query: &str) -> InboundEvent {
    InboundEvent::InlineQuery(InlineQueryEvent {
        query_id: "iq".to_string(),
        from: actor(user_id),
        query: query.to_string(),
    })
}
