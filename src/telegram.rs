//! Telegram integration for ColorCodeBot
//!
//! Adapts teloxide to the platform-neutral core:
//! - `TelegramPlatform` sends, edits and deletes through the Bot API and
//!   answers privilege checks with `getChatMember`
//! - `TelegramCleanup` deletes transient messages after a delay
//! - message, callback query and inline query updates become `InboundEvent`s
//!
//! Uses explicit Dispatcher pattern for reliable message polling.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use teloxide::{
    dispatching::{Dispatcher, UpdateFilterExt},
    dptree,
    error_handlers::LoggingErrorHandler,
    prelude::*,
    types::{
        ChatAction as TgChatAction, ForceReply, InlineKeyboardButton, InlineKeyboardMarkup,
        InlineQueryResult, InlineQueryResultCachedPhoto, InlineQueryResultsButton, InlineQueryResultsButtonKind,
        InputFile, InputMedia, InputMediaPhoto, MaybeInaccessibleMessage, MessageEntityKind, MessageId, ParseMode,
        ReplyParameters, Update, User, UserId,
    },
    ApiError, RequestError,
};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::detect::{KeywordClassifier, SyntaxDetector};
use crate::error::{BotError, Result as BotResult};
use crate::events::{Actor, ButtonPress, ChatKind, InboundEvent, InlineQueryEvent, MessageRef, PhotoMessage, TextMessage};
use crate::handlers::BotContext;
use crate::keyboards::{ButtonKind, Keyboard};
use crate::platform::{
    Artifact, ChatAction, ChatPlatform, CleanupScheduler, InlineAnswer, OutgoingText, PrivilegeCheck, SentMessage,
    TextFormat,
};
use crate::render::CommandRenderer;
use crate::retry::{with_retry, RetryPolicy};
use crate::router::Router;
use crate::store::SqlitePreferenceStore;

// ============ Platform ============

/// Bot API client behind the core's platform traits
#[derive(Clone)]
pub struct TelegramPlatform {
    bot: Bot,
}

impl TelegramPlatform {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

pub fn inline_markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|button| match &button.kind {
                ButtonKind::Callback(token) => InlineKeyboardButton::callback(button.label.clone(), token.clone()),
                ButtonKind::SwitchInline(query) => {
                    InlineKeyboardButton::switch_inline_query(button.label.clone(), query.clone())
                }
            })
            .collect::<Vec<_>>()
    }))
}

fn sent(msg: &Message) -> SentMessage {
    SentMessage {
        message: MessageRef {
            chat_id: msg.chat.id.0,
            message_id: msg.id.0,
        },
        photo_file_id: msg
            .photo()
            .and_then(|sizes| sizes.last())
            .map(|size| size.file.id.to_string()),
    }
}

/// Edits that change nothing are accepted; a retried handler repeats them
pub fn edited<T>(result: Result<T, RequestError>) -> BotResult<()> {
    match result {
        Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn upload(artifact: Artifact) -> InputFile {
    InputFile::memory(artifact.bytes).file_name(artifact.file_name)
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn send_text(&self, msg: OutgoingText) -> BotResult<SentMessage> {
        let mut req = self.bot.send_message(ChatId(msg.chat_id), msg.text);
        if msg.format == TextFormat::MarkdownV2 {
            req = req.parse_mode(ParseMode::MarkdownV2);
        }
        if let Some(id) = msg.reply_to {
            req = req.reply_parameters(ReplyParameters::new(MessageId(id)));
        }
        if let Some(keyboard) = &msg.keyboard {
            req = req.reply_markup(inline_markup(keyboard));
        } else if let Some(placeholder) = msg.force_reply {
            let mut force_reply = ForceReply::new();
            force_reply.input_field_placeholder = Some(placeholder);
            req = req.reply_markup(force_reply);
        }
        Ok(sent(&req.await?))
    }

    async fn send_document(
        &self,
        chat_id: i64,
        artifact: Artifact,
        reply_to: Option<i32>,
        keyboard: Option<Keyboard>,
    ) -> BotResult<SentMessage> {
        let mut req = self.bot.send_document(ChatId(chat_id), upload(artifact));
        if let Some(id) = reply_to {
            req = req.reply_parameters(ReplyParameters::new(MessageId(id)));
        }
        if let Some(keyboard) = &keyboard {
            req = req.reply_markup(inline_markup(keyboard));
        }
        Ok(sent(&req.await?))
    }

    async fn send_photo(&self, chat_id: i64, artifact: Artifact, reply_to: Option<i32>) -> BotResult<SentMessage> {
        let mut req = self.bot.send_photo(ChatId(chat_id), upload(artifact));
        if let Some(id) = reply_to {
            req = req.reply_parameters(ReplyParameters::new(MessageId(id)));
        }
        Ok(sent(&req.await?))
    }

    async fn send_media_group(
        &self,
        chat_id: i64,
        file_ids: Vec<String>,
        reply_to: Option<i32>,
    ) -> BotResult<Vec<SentMessage>> {
        let media = file_ids
            .into_iter()
            .map(|id| InputMedia::Photo(InputMediaPhoto::new(InputFile::file_id(id))));
        let mut req = self.bot.send_media_group(ChatId(chat_id), media);
        if let Some(id) = reply_to {
            req = req.reply_parameters(ReplyParameters::new(MessageId(id)));
        }
        Ok(req.await?.iter().map(sent).collect())
    }

    async fn edit_keyboard(&self, message: MessageRef, keyboard: Keyboard) -> BotResult<()> {
        edited(
            self.bot
                .edit_message_reply_markup(ChatId(message.chat_id), MessageId(message.message_id))
                .reply_markup(inline_markup(&keyboard))
                .await,
        )
    }

    async fn edit_text(
        &self,
        message: MessageRef,
        text: String,
        format: TextFormat,
        keyboard: Option<Keyboard>,
    ) -> BotResult<()> {
        let mut req = self
            .bot
            .edit_message_text(ChatId(message.chat_id), MessageId(message.message_id), text);
        if format == TextFormat::MarkdownV2 {
            req = req.parse_mode(ParseMode::MarkdownV2);
        }
        if let Some(keyboard) = &keyboard {
            req = req.reply_markup(inline_markup(keyboard));
        }
        edited(req.await)
    }

    async fn answer_button(&self, query_id: &str, text: Option<String>) -> BotResult<()> {
        let mut req = self.bot.answer_callback_query(query_id);
        if let Some(text) = text {
            req = req.text(text);
        }
        req.await?;
        Ok(())
    }

    async fn answer_inline(&self, query_id: &str, answer: InlineAnswer) -> BotResult<()> {
        match answer {
            InlineAnswer::CachedPhoto { result_id, file_id, title } => {
                let photo = InlineQueryResultCachedPhoto::new(result_id, file_id).title(title);
                self.bot
                    .answer_inline_query(query_id, vec![InlineQueryResult::CachedPhoto(photo)])
                    .is_personal(true)
                    .await?;
            }
            InlineAnswer::SwitchToPrivate { text, parameter } => {
                self.bot
                    .answer_inline_query(query_id, Vec::<InlineQueryResult>::new())
                    .button(InlineQueryResultsButton {
                        text,
                        kind: InlineQueryResultsButtonKind::StartParameter(parameter),
                    })
                    .await?;
            }
        }
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> BotResult<()> {
        self.bot
            .delete_message(ChatId(message.chat_id), MessageId(message.message_id))
            .await?;
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> BotResult<()> {
        let action = match action {
            ChatAction::UploadDocument => TgChatAction::UploadDocument,
            ChatAction::UploadPhoto => TgChatAction::UploadPhoto,
        };
        self.bot.send_chat_action(ChatId(chat_id), action).await?;
        Ok(())
    }
}

#[async_trait]
impl PrivilegeCheck for TelegramPlatform {
    async fn is_privileged(&self, actor_id: i64, chat_id: i64) -> BotResult<bool> {
        let member = self
            .bot
            .get_chat_member(ChatId(chat_id), UserId(actor_id as u64))
            .await?;
        Ok(member.kind.is_privileged())
    }
}

// ============ Cleanup ============

/// Deletes messages after a delay on a background task
#[derive(Clone)]
pub struct TelegramCleanup {
    platform: TelegramPlatform,
    retry: RetryPolicy<BotError>,
}

impl TelegramCleanup {
    pub fn new(platform: TelegramPlatform, retry: RetryPolicy<BotError>) -> Self {
        Self { platform, retry }
    }
}

impl CleanupScheduler for TelegramCleanup {
    fn schedule_delete(&self, message: MessageRef, after: Duration) {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let result = with_retry("delete_after_delay", &this.retry, || {
                this.platform.delete_message(message)
            })
            .await;
            if let Err(e) = result {
                tracing::warn!(
                    chat_id = message.chat_id,
                    message_id = message.message_id,
                    error = %e,
                    "failed to delete message (it's probably gone already)"
                );
            }
        });
    }
}

// ============ Update conversion ============

fn actor(user: &User) -> Actor {
    Actor {
        user_id: user.id.0 as i64,
        first_name: user.first_name.clone(),
    }
}

fn message_ref(msg: &Message) -> MessageRef {
    MessageRef {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
    }
}

fn chat_kind(msg: &Message) -> ChatKind {
    if msg.chat.is_private() {
        ChatKind::Private
    } else {
        ChatKind::Group
    }
}

/// Text message with its `code`/`pre` entity texts
pub fn text_message(msg: &Message) -> Option<TextMessage> {
    let text = msg.text()?;
    let from = msg.from.as_ref()?;
    let code_spans = msg
        .parse_entities()
        .unwrap_or_default()
        .into_iter()
        .filter(|e| matches!(e.kind(), MessageEntityKind::Code | MessageEntityKind::Pre { .. }))
        .map(|e| e.text().to_string())
        .collect();
    Some(TextMessage {
        message: message_ref(msg),
        chat_kind: chat_kind(msg),
        from: actor(from),
        text: text.to_string(),
        code_spans,
    })
}

pub fn message_event(msg: &Message) -> Option<InboundEvent> {
    if let Some(text) = text_message(msg) {
        return Some(InboundEvent::Text(text));
    }
    let sizes = msg.photo()?;
    let smallest = sizes.first()?;
    Some(InboundEvent::Photo(PhotoMessage {
        message: message_ref(msg),
        from: actor(msg.from.as_ref()?),
        file_id: smallest.file.id.to_string(),
    }))
}

pub fn callback_event(query: &CallbackQuery) -> Option<InboundEvent> {
    let data = query.data.clone()?;
    let message = query.message.as_ref();
    let regular = message.and_then(MaybeInaccessibleMessage::regular_message);
    let chat_kind = match message {
        Some(m) if m.chat().is_private() => ChatKind::Private,
        _ => ChatKind::Group,
    };
    Some(InboundEvent::ButtonPress(ButtonPress {
        query_id: query.id.to_string(),
        from: actor(&query.from),
        message: message.map(|m| MessageRef {
            chat_id: m.chat().id.0,
            message_id: m.id().0,
        }),
        chat_kind,
        reply_to: regular
            .and_then(|m| m.reply_to_message())
            .and_then(text_message)
            .map(Box::new),
        data,
    }))
}

pub fn inline_event(query: &InlineQuery) -> InboundEvent {
    InboundEvent::InlineQuery(InlineQueryEvent {
        query_id: query.id.to_string(),
        from: actor(&query.from),
        query: query.query.clone(),
    })
}

// ============ Dispatcher ============

/// Build the bot from `config` and poll until Ctrl-C
pub async fn run_bot(config: Config) -> Result<()> {
    let bot = Bot::new(&config.api_key);

    let catalog = Catalog::load(config.assets_dir.as_deref()).context("Failed to load assets")?;
    let store = SqlitePreferenceStore::open(&config.db_path)
        .with_context(|| format!("Failed to open {}", config.db_path.display()))?;
    tracing::info!(db_path = %config.db_path.display(), "preference store ready");

    let retry = RetryPolicy::transient(config.retry_attempts, config.retry_delay);
    let platform = TelegramPlatform::new(bot.clone());
    let cleanup = TelegramCleanup::new(platform.clone(), retry);
    let platform = Arc::new(platform);
    let renderer = CommandRenderer::new().with_background_image(config.background_image.clone());
    let detector = SyntaxDetector::new(Arc::new(KeywordClassifier::new()), catalog.labels.clone())
        .with_min_confidence(config.min_confidence);

    let ctx = BotContext::new(
        platform.clone(),
        Arc::new(renderer),
        Arc::new(store),
        platform,
        Arc::new(cleanup),
        detector,
        catalog,
    )?
    .with_retry_policy(retry)
    .with_cleanup_delay(config.cleanup_delay);
    let ctx = Arc::new(ctx);
    let router = Arc::new(Router::standard()?);

    // Startup notification (crash/restart feedback)
    if let Some(admin) = config.admin_chat_id {
        let text = format!("ColorCodeBot v{} started", env!("CARGO_PKG_VERSION"));
        if let Err(e) = bot.send_message(ChatId(admin), text).await {
            tracing::warn!(admin_chat_id = admin, error = %e, "Failed to send startup notification");
        }
    }

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(message_handler))
        .branch(Update::filter_callback_query().endpoint(callback_handler))
        .branch(Update::filter_inline_query().endpoint(inline_handler));

    tracing::info!("Starting dispatcher with long polling...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx, router])
        .default_handler(|upd| async move {
            tracing::debug!("Unhandled update: {:?}", upd);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("Error in update handler"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::warn!("Dispatcher stopped");
    Ok(())
}

async fn message_handler(msg: Message, ctx: Arc<BotContext>, router: Arc<Router>) -> ResponseResult<()> {
    if let Some(event) = message_event(&msg) {
        router.dispatch(&ctx, event).await;
    }
    Ok(())
}

async fn callback_handler(query: CallbackQuery, ctx: Arc<BotContext>, router: Arc<Router>) -> ResponseResult<()> {
    if let Some(event) = callback_event(&query) {
        router.dispatch(&ctx, event).await;
    }
    Ok(())
}

async fn inline_handler(query: InlineQuery, ctx: Arc<BotContext>, router: Arc<Router>) -> ResponseResult<()> {
    router.dispatch(&ctx, inline_event(&query)).await;
    Ok(())
}
