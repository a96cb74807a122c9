//! Collaborator interfaces
//!
//! The interaction core talks to the outside world only through these
//! traits. `telegram.rs`, `render.rs` and `store.rs` provide the production
//! implementations; tests use in-memory fakes.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::events::MessageRef;
use crate::keyboards::Keyboard;

/// A message the platform accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message: MessageRef,
    /// Largest photo size's file id, when the message is a compressed photo
    pub photo_file_id: Option<String>,
}

/// A file to upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// How text bodies are parsed by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    MarkdownV2,
}

/// Outgoing text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingText {
    pub chat_id: i64,
    pub text: String,
    pub format: TextFormat,
    pub reply_to: Option<i32>,
    pub keyboard: Option<Keyboard>,
    /// Ask the client to open the reply field, with this placeholder
    pub force_reply: Option<String>,
}

impl OutgoingText {
    pub fn new(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            format: TextFormat::Plain,
            reply_to: None,
            keyboard: None,
            force_reply: None,
        }
    }

    pub fn markdown(mut self) -> Self {
        self.format = TextFormat::MarkdownV2;
        self
    }

    pub fn reply_to(mut self, message_id: i32) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    pub fn keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    pub fn force_reply(mut self, placeholder: impl Into<String>) -> Self {
        self.force_reply = Some(placeholder.into());
        self
    }
}

/// Answer to an inline query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineAnswer {
    /// Offer a previously uploaded photo
    CachedPhoto { result_id: String, file_id: String, title: String },
    /// No results, with a button that opens a private chat with the bot
    SwitchToPrivate { text: String, parameter: String },
}

/// Status shown while the bot works
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    UploadDocument,
    UploadPhoto,
}

/// Outbound calls to the chat platform. Every method may fail transiently.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn send_text(&self, msg: OutgoingText) -> Result<SentMessage>;

    async fn send_document(
        &self,
        chat_id: i64,
        artifact: Artifact,
        reply_to: Option<i32>,
        keyboard: Option<Keyboard>,
    ) -> Result<SentMessage>;

    /// Compressed photo upload; may be rejected for size or format
    async fn send_photo(&self, chat_id: i64, artifact: Artifact, reply_to: Option<i32>) -> Result<SentMessage>;

    /// Album of already uploaded photos
    async fn send_media_group(
        &self,
        chat_id: i64,
        file_ids: Vec<String>,
        reply_to: Option<i32>,
    ) -> Result<Vec<SentMessage>>;

    async fn edit_keyboard(&self, message: MessageRef, keyboard: Keyboard) -> Result<()>;

    async fn edit_text(
        &self,
        message: MessageRef,
        text: String,
        format: TextFormat,
        keyboard: Option<Keyboard>,
    ) -> Result<()>;

    async fn answer_button(&self, query_id: &str, text: Option<String>) -> Result<()>;

    async fn answer_inline(&self, query_id: &str, answer: InlineAnswer) -> Result<()>;

    async fn delete_message(&self, message: MessageRef) -> Result<()>;

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Result<()>;
}

/// Output format of the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFormat {
    Html,
    Png,
}

/// External syntax highlighter. Failures are never transient.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, code: &str, ext: &str, theme: &str, format: RenderFormat) -> Result<Vec<u8>>;
}

/// Whether an actor may change group-level settings
#[async_trait]
pub trait PrivilegeCheck: Send + Sync {
    async fn is_privileged(&self, actor_id: i64, chat_id: i64) -> Result<bool>;
}

/// Hook for delayed cleanup of transient UI
pub trait CleanupScheduler: Send + Sync {
    fn schedule_delete(&self, message: MessageRef, after: Duration);
}
