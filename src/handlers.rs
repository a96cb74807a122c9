//! Bot handlers
//!
//! One async function per [`Handler`] tag, all taking the shared
//! [`BotContext`]. Handlers return `Err` only for failures the router should
//! retry or log; denied privileges and ignored users are silent `Ok(())`.

use std::sync::Arc;
use std::time::Duration;

use teloxide::utils::markdown;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::action::ActionRecord;
use crate::catalog::Catalog;
use crate::detect::SyntaxDetector;
use crate::error::{BotError, Result};
use crate::events::{Actor, ButtonPress, ChatKind, InboundEvent, InlineQueryEvent, MessageRef, PhotoMessage, TextMessage};
use crate::keyboards::{begone_keyboard, image_keyboard, minikb, KeyboardName, KeyboardRegistry, DEFAULT_MINI_TEXT};
use crate::platform::{
    Artifact, ChatAction, ChatPlatform, CleanupScheduler, InlineAnswer, OutgoingText, PrivilegeCheck, RenderFormat,
    Renderer, SentMessage, TextFormat,
};
use crate::retry::{with_retry, RetryPolicy};
use crate::router::{Handler, Request};
use crate::store::{PreferenceStore, Preferences, WatchRequest};
use crate::thread::{ThreadEvent, ThreadTracker};

/// Photos at or above this size are sent as documents
pub const PHOTO_SIZE_LIMIT: usize = 300_000;

/// Photos per media group
pub const ALBUM_SIZE: usize = 10;

/// Default delay before transient UI is deleted
pub const DEFAULT_CLEANUP_DELAY: Duration = Duration::from_secs(30);

pub const DARK_IMAGE_THEME: &str = "Coldark-Dark";
pub const LIGHT_IMAGE_THEME: &str = "Coldark-Cold";

const HTML_FILE_NAME: &str = "code.html";
const PNG_FILE_NAME: &str = "code.png";

/// Everything a handler needs, built once at startup
pub struct BotContext {
    pub platform: Arc<dyn ChatPlatform>,
    pub renderer: Arc<dyn Renderer>,
    pub store: Arc<dyn PreferenceStore>,
    pub privilege: Arc<dyn PrivilegeCheck>,
    pub cleanup: Arc<dyn CleanupScheduler>,
    pub detector: SyntaxDetector,
    pub keyboards: KeyboardRegistry,
    pub catalog: Catalog,
    pub retry: RetryPolicy<BotError>,
    pub cleanup_delay: Duration,
    pub threads: ThreadTracker,
}

impl BotContext {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        renderer: Arc<dyn Renderer>,
        store: Arc<dyn PreferenceStore>,
        privilege: Arc<dyn PrivilegeCheck>,
        cleanup: Arc<dyn CleanupScheduler>,
        detector: SyntaxDetector,
        catalog: Catalog,
    ) -> Result<Self> {
        let keyboards = KeyboardRegistry::from_catalog(&catalog)?;
        Ok(Self {
            platform,
            renderer,
            store,
            privilege,
            cleanup,
            detector,
            keyboards,
            catalog,
            retry: RetryPolicy::default(),
            cleanup_delay: DEFAULT_CLEANUP_DELAY,
            threads: ThreadTracker::new(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy<BotError>) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cleanup_delay(mut self, delay: Duration) -> Self {
        self.cleanup_delay = delay;
        self
    }

    pub fn prefs(&self) -> Preferences<'_> {
        Preferences::new(self.store.as_ref())
    }

    /// Private chats are always privileged; groups ask the platform
    pub async fn is_privileged(&self, chat_kind: ChatKind, actor_id: i64, chat_id: i64) -> Result<bool> {
        if chat_kind.is_private() {
            return Ok(true);
        }
        self.privilege.is_privileged(actor_id, chat_id).await
    }

    /// Group settings text (MarkdownV2)
    pub fn group_config_text(&self, chat_id: i64) -> Result<String> {
        let prefs = self.prefs();
        let default_syntax = prefs.group_syntax(chat_id)?.unwrap_or_else(|| "None".to_string());
        let ignore_mode = if prefs.ignore_mode(chat_id)? { "ignore" } else { "watch" };
        let default_syntax = markdown::escape_code(&default_syntax);
        let ignore_mode = markdown::escape(ignore_mode);
        Ok(self.catalog.format(
            "current config",
            &[
                ("default_syntax", default_syntax.as_str()),
                ("ignore_mode", ignore_mode.as_str()),
            ],
        ))
    }
}

/// Run `handler` for `req`
pub async fn run(handler: Handler, ctx: &BotContext, req: &Request) -> Result<()> {
    match handler {
        Handler::Welcome => welcome(ctx, text_message(req)?).await,
        Handler::BrowseThemes => browse_themes(ctx, text_message(req)?).await,
        Handler::ManageGroupOptions => manage_group_options(ctx, text_message(req)?).await,
        Handler::IgnoreGroupUser => record_watch_request(ctx, text_message(req)?, WatchRequest::Ignore),
        Handler::WatchGroupUser => record_watch_request(ctx, text_message(req)?, WatchRequest::Watch),
        Handler::IntakeSnippet => intake_snippet(ctx, text_message(req)?).await,
        Handler::RecvPhoto => {
            recv_photo(photo_message(req)?);
            Ok(())
        }
        Handler::RestoreKeyboard => match &req.action {
            Some(ActionRecord::Restore { kb_name }) => restore_kb(ctx, button_press(req)?, *kb_name).await,
            _ => Err(BotError::MissingContext("restore payload")),
        },
        Handler::SetSnippetFiletype => match &req.action {
            Some(ActionRecord::SetExt { ext }) => set_snippet_filetype(ctx, button_press(req)?, ext).await,
            _ => Err(BotError::MissingContext("set ext payload")),
        },
        Handler::SetGroupSyntax => match &req.action {
            Some(ActionRecord::SetDefaultExt { ext }) => set_group_syntax(ctx, button_press(req)?, ext).await,
            _ => Err(BotError::MissingContext("set default ext payload")),
        },
        Handler::BrowseGroupSyntax => browse_group_syntax(ctx, button_press(req)?).await,
        Handler::ToggleGroupWatch => toggle_group_watch(ctx, button_press(req)?).await,
        Handler::SetTheme => match &req.action {
            Some(ActionRecord::SetTheme { theme }) => set_theme(ctx, button_press(req)?, theme).await,
            _ => Err(BotError::MissingContext("set theme payload")),
        },
        Handler::Begone => begone(ctx, button_press(req)?).await,
        Handler::SendPhotoElsewhere => send_photo_elsewhere(ctx, inline_query(req)?).await,
        Handler::SwitchFromInline => switch_from_inline(ctx, inline_query(req)?).await,
    }
}

// ============ Event accessors ============

fn text_message(req: &Request) -> Result<&TextMessage> {
    match &req.event {
        InboundEvent::Text(msg) => Ok(msg),
        _ => Err(BotError::MissingContext("text message")),
    }
}

fn photo_message(req: &Request) -> Result<&PhotoMessage> {
    match &req.event {
        InboundEvent::Photo(msg) => Ok(msg),
        _ => Err(BotError::MissingContext("photo message")),
    }
}

fn button_press(req: &Request) -> Result<&ButtonPress> {
    match &req.event {
        InboundEvent::ButtonPress(press) => Ok(press),
        _ => Err(BotError::MissingContext("button press")),
    }
}

fn inline_query(req: &Request) -> Result<&InlineQueryEvent> {
    match &req.event {
        InboundEvent::InlineQuery(query) => Ok(query),
        _ => Err(BotError::MissingContext("inline query")),
    }
}

fn keyboard_message(press: &ButtonPress) -> Result<MessageRef> {
    press.message.ok_or(BotError::MissingContext("keyboard message"))
}

// ============ Commands ============

async fn welcome(ctx: &BotContext, msg: &TextMessage) -> Result<()> {
    info!(
        user_id = msg.from.user_id,
        user_first_name = %msg.from.first_name,
        chat_id = msg.message.chat_id,
        "introducing myself"
    );
    ctx.platform
        .send_text(
            OutgoingText::new(msg.message.chat_id, ctx.catalog.text("welcome"))
                .markdown()
                .reply_to(msg.message.message_id)
                .force_reply(ctx.catalog.text("input field placeholder")),
        )
        .await?;
    Ok(())
}

async fn browse_themes(ctx: &BotContext, msg: &TextMessage) -> Result<()> {
    info!(
        user_id = msg.from.user_id,
        user_first_name = %msg.from.first_name,
        chat_id = msg.message.chat_id,
        "browsing themes"
    );
    let previews = ctx.catalog.theme_previews();
    for album in previews.chunks(ALBUM_SIZE) {
        let sent = ctx
            .platform
            .send_media_group(msg.message.chat_id, album.to_vec(), Some(msg.message.message_id))
            .await?;
        for preview in sent {
            ctx.cleanup.schedule_delete(preview.message, ctx.cleanup_delay);
        }
    }
    ctx.platform
        .send_text(
            OutgoingText::new(msg.message.chat_id, ctx.catalog.text("select theme"))
                .reply_to(msg.message.message_id)
                .keyboard(ctx.keyboards.get(KeyboardName::Theme)?.clone()),
        )
        .await?;
    Ok(())
}

async fn manage_group_options(ctx: &BotContext, msg: &TextMessage) -> Result<()> {
    let chat_id = msg.message.chat_id;
    let privileged = ctx.is_privileged(msg.chat_kind, msg.from.user_id, chat_id).await?;
    info!(
        user_id = msg.from.user_id,
        user_first_name = %msg.from.first_name,
        chat_id,
        user_is_admin = privileged,
        "user requesting group options"
    );
    if !privileged {
        return Ok(());
    }
    ctx.platform
        .send_text(
            OutgoingText::new(chat_id, ctx.group_config_text(chat_id)?)
                .markdown()
                .keyboard(ctx.keyboards.get(KeyboardName::GroupOptions)?.clone()),
        )
        .await?;
    Ok(())
}

fn record_watch_request(ctx: &BotContext, msg: &TextMessage, request: WatchRequest) -> Result<()> {
    info!(
        user_id = msg.from.user_id,
        user_first_name = %msg.from.first_name,
        chat_id = msg.message.chat_id,
        request = request.as_str(),
        "recording watch request"
    );
    ctx.prefs()
        .set_watch_request(msg.message.chat_id, msg.from.user_id, request)
}

// ============ Snippets ============

async fn intake_snippet(ctx: &BotContext, msg: &TextMessage) -> Result<()> {
    let chat_id = msg.message.chat_id;
    let user_id = msg.from.user_id;
    let prefs = ctx.prefs();

    if !prefs.should_watch(chat_id, user_id)? {
        debug!(user_id, chat_id, "ignoring user");
        return Ok(());
    }
    let Some(code) = msg.snippet() else {
        return Ok(());
    };
    info!(user_id, user_first_name = %msg.from.first_name, chat_id, "receiving code");

    let detection = ctx.detector.detect(&code);
    info!(
        language = detection.language.as_deref().unwrap_or("-"),
        confidence = detection.confidence,
        method = detection.method.as_str(),
        "guessed syntax"
    );
    let ext = match detection.language {
        Some(ext) => Some(ext),
        None => prefs.group_syntax(chat_id)?,
    };

    ctx.threads.begin(msg.message).await;
    let query = OutgoingText::new(chat_id, ctx.catalog.text("query ext"))
        .markdown()
        .reply_to(msg.message.message_id);

    match ext {
        Some(ext) => {
            let escaped = markdown::escape_code(&ext);
            let text = format!(
                "{}\n\n{}",
                ctx.catalog.text("query ext"),
                ctx.catalog.format("guessed syntax", &[("ext", escaped.as_str())])
            );
            let picker = ctx
                .platform
                .send_text(OutgoingText {
                    text,
                    ..query.keyboard(minikb(KeyboardName::Syntax, ctx.catalog.text("syntax picker"))?)
                })
                .await?;
            ctx.cleanup.schedule_delete(picker.message, ctx.cleanup_delay);
            render_snippet(ctx, msg, &ext).await
        }
        None => {
            let picker = ctx
                .platform
                .send_text(query.keyboard(ctx.keyboards.get(KeyboardName::Syntax)?.clone()))
                .await?;
            ctx.cleanup.schedule_delete(picker.message, ctx.cleanup_delay);
            expire_when_unanswered(ctx, msg.message);
            Ok(())
        }
    }
}

/// Once the picker is gone, a snippet nobody chose a language for is abandoned
fn expire_when_unanswered(ctx: &BotContext, snippet: MessageRef) {
    let threads = ctx.threads.clone();
    let after = ctx.cleanup_delay;
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        if threads.expire(snippet).await.is_some() {
            info!(chat_id = snippet.chat_id, message_id = snippet.message_id, "snippet abandoned");
        }
    });
}

/// Render `snippet` as `ext` and send the artifacts for its chat kind.
///
/// Private chats get HTML plus dark and light images with a "send to chat"
/// button; groups get the dark image only. Artifacts go out concurrently,
/// each under its own retry.
pub async fn render_snippet(ctx: &BotContext, snippet: &TextMessage, ext: &str) -> Result<()> {
    let code = snippet.snippet().ok_or(BotError::MissingContext("snippet code"))?;
    ctx.threads
        .advance(snippet.message, ThreadEvent::LanguageChosen(ext.to_string()))
        .await?;

    let private = snippet.chat_kind.is_private();
    let theme = ctx.prefs().theme(snippet.from.user_id)?;
    info!(
        user_id = snippet.from.user_id,
        user_first_name = %snippet.from.first_name,
        syntax = ext,
        theme = %theme,
        chat_id = snippet.message.chat_id,
        "colorizing code"
    );

    let html = async {
        if private {
            send_html(ctx, snippet.message, &code, ext, &theme).await.map(Some)
        } else {
            Ok(None)
        }
    };
    let dark = send_image(ctx, snippet.message, &code, ext, DARK_IMAGE_THEME, private);
    let light = async {
        if private {
            send_image(ctx, snippet.message, &code, ext, LIGHT_IMAGE_THEME, true)
                .await
                .map(Some)
        } else {
            Ok(None)
        }
    };
    let (html, dark, light) = tokio::join!(html, dark, light);
    html?;
    dark?;
    light?;

    ctx.threads
        .advance(snippet.message, ThreadEvent::RenderDispatched)
        .await?;
    Ok(())
}

async fn send_html(ctx: &BotContext, snippet: MessageRef, code: &str, ext: &str, theme: &str) -> Result<SentMessage> {
    let bytes = ctx.renderer.render(code, ext, theme, RenderFormat::Html).await?;
    let keyboard = begone_keyboard()?;
    with_retry("send_html", &ctx.retry, || async {
        ctx.platform
            .send_chat_action(snippet.chat_id, ChatAction::UploadDocument)
            .await?;
        let artifact = Artifact {
            file_name: HTML_FILE_NAME.to_string(),
            bytes: bytes.clone(),
        };
        ctx.platform
            .send_document(snippet.chat_id, artifact, Some(snippet.message_id), Some(keyboard.clone()))
            .await
    })
    .await
}

async fn send_image(
    ctx: &BotContext,
    snippet: MessageRef,
    code: &str,
    ext: &str,
    image_theme: &str,
    attach_send_kb: bool,
) -> Result<()> {
    let bytes = ctx.renderer.render(code, ext, image_theme, RenderFormat::Png).await?;
    let sent = with_retry("send_image", &ctx.retry, || {
        send_photo_or_document(ctx, snippet, &bytes)
    })
    .await?;

    let send_to_chat = sent
        .photo_file_id
        .as_deref()
        .filter(|_| attach_send_kb)
        .map(|file_id| (ctx.catalog.text("send to chat"), file_id));
    let keyboard = image_keyboard(send_to_chat)?;
    with_retry("edit_image_keyboard", &ctx.retry, || {
        ctx.platform.edit_keyboard(sent.message, keyboard.clone())
    })
    .await
}

/// Compressed photo when small enough, falling back to a document when the
/// platform rejects it
async fn send_photo_or_document(ctx: &BotContext, snippet: MessageRef, bytes: &[u8]) -> Result<SentMessage> {
    ctx.platform
        .send_chat_action(snippet.chat_id, ChatAction::UploadPhoto)
        .await?;
    let artifact = Artifact {
        file_name: PNG_FILE_NAME.to_string(),
        bytes: bytes.to_vec(),
    };

    if bytes.len() < PHOTO_SIZE_LIMIT {
        match ctx
            .platform
            .send_photo(snippet.chat_id, artifact.clone(), Some(snippet.message_id))
            .await
        {
            Ok(sent) => return Ok(sent),
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => warn!(chat_id = snippet.chat_id, error = %e, "failed to send compressed image"),
        }
    }

    ctx.platform
        .send_document(snippet.chat_id, artifact, Some(snippet.message_id), None)
        .await
}

fn recv_photo(msg: &PhotoMessage) {
    info!(
        file_id = %msg.file_id,
        user_id = msg.from.user_id,
        user_first_name = %msg.from.first_name,
        chat_id = msg.message.chat_id,
        "received photo"
    );
}

// ============ Buttons ============

async fn restore_kb(ctx: &BotContext, press: &ButtonPress, kb_name: KeyboardName) -> Result<()> {
    let message = keyboard_message(press)?;
    ctx.platform
        .edit_keyboard(message, ctx.keyboards.get(kb_name)?.clone())
        .await?;
    ctx.platform.answer_button(&press.query_id, None).await
}

async fn set_snippet_filetype(ctx: &BotContext, press: &ButtonPress, ext: &str) -> Result<()> {
    let message = keyboard_message(press)?;
    let snippet = press
        .reply_to
        .as_deref()
        .ok_or(BotError::MissingContext("snippet"))?;

    ctx.platform
        .edit_keyboard(message, minikb(KeyboardName::Syntax, ctx.catalog.text("syntax picker"))?)
        .await?;
    render_snippet(ctx, snippet, ext).await?;
    ctx.platform.answer_button(&press.query_id, None).await
}

async fn set_group_syntax(ctx: &BotContext, press: &ButtonPress, ext: &str) -> Result<()> {
    let message = keyboard_message(press)?;
    let privileged = ctx
        .is_privileged(press.chat_kind, press.from.user_id, message.chat_id)
        .await?;
    info!(
        ext,
        user_id = press.from.user_id,
        chat_id = message.chat_id,
        user_is_admin = privileged,
        "user trying to set group default syntax"
    );
    if !privileged {
        return Ok(());
    }
    ctx.prefs().set_group_syntax(message.chat_id, ext)?;
    show_group_config(ctx, message).await
}

async fn browse_group_syntax(ctx: &BotContext, press: &ButtonPress) -> Result<()> {
    let message = keyboard_message(press)?;
    ctx.platform
        .edit_keyboard(message, ctx.keyboards.get(KeyboardName::GroupSyntax)?.clone())
        .await
}

async fn toggle_group_watch(ctx: &BotContext, press: &ButtonPress) -> Result<()> {
    let message = keyboard_message(press)?;
    let privileged = ctx
        .is_privileged(press.chat_kind, press.from.user_id, message.chat_id)
        .await?;
    info!(
        user_id = press.from.user_id,
        chat_id = message.chat_id,
        user_is_admin = privileged,
        "user trying to toggle group watch mode"
    );
    if !privileged {
        return Ok(());
    }
    let prefs = ctx.prefs();
    let ignore = !prefs.ignore_mode(message.chat_id)?;
    prefs.set_ignore_mode(message.chat_id, ignore)?;
    info!(chat_id = message.chat_id, ignore_mode = ignore, "group watch mode toggled");
    with_retry("show_group_config", &ctx.retry, || show_group_config(ctx, message)).await
}

async fn show_group_config(ctx: &BotContext, message: MessageRef) -> Result<()> {
    ctx.platform
        .edit_text(
            message,
            ctx.group_config_text(message.chat_id)?,
            TextFormat::MarkdownV2,
            Some(ctx.keyboards.get(KeyboardName::GroupOptions)?.clone()),
        )
        .await
}

async fn set_theme(ctx: &BotContext, press: &ButtonPress, theme: &str) -> Result<()> {
    let message = keyboard_message(press)?;
    // The theme belongs to whoever sent /theme
    let user: &Actor = press.reply_to.as_ref().map_or(&press.from, |m| &m.from);
    info!(
        user_id = user.user_id,
        user_first_name = %user.first_name,
        theme,
        chat_id = message.chat_id,
        "setting theme"
    );
    if !ctx.catalog.themes.iter().any(|t| t.name == theme) {
        warn!(theme, "unknown theme requested");
        return Ok(());
    }

    ctx.platform
        .edit_keyboard(message, minikb(KeyboardName::Theme, DEFAULT_MINI_TEXT)?)
        .await?;
    ctx.prefs().set_theme(user.user_id, theme)?;
    ctx.platform
        .answer_button(
            &press.query_id,
            Some(ctx.catalog.format("acknowledge theme", &[("theme", theme)])),
        )
        .await
}

async fn begone(ctx: &BotContext, press: &ButtonPress) -> Result<()> {
    let message = keyboard_message(press)?;
    // Authors may delete output for their own snippet; anyone privileged may
    // delete anything, including output whose snippet has another author
    let has_permission = match press.reply_to.as_deref() {
        Some(snippet) if snippet.from.user_id == press.from.user_id => true,
        _ => {
            ctx.is_privileged(press.chat_kind, press.from.user_id, message.chat_id)
                .await?
        }
    };
    info!(
        user_id = press.from.user_id,
        chat_id = message.chat_id,
        reply_to_msg_user_id = press.reply_to.as_ref().map(|m| m.from.user_id),
        has_permission,
        "got deletion request"
    );
    if has_permission {
        ctx.platform.delete_message(message).await?;
    }
    Ok(())
}

// ============ Inline queries ============

async fn send_photo_elsewhere(ctx: &BotContext, query: &InlineQueryEvent) -> Result<()> {
    let file_id = query
        .image_file_id()
        .ok_or(BotError::MissingContext("image file id"))?;
    info!(user_id = query.from.user_id, file_id, "creating inline query result");
    ctx.platform
        .answer_inline(
            &query.query_id,
            InlineAnswer::CachedPhoto {
                result_id: Uuid::new_v4().to_string(),
                file_id: file_id.to_string(),
                title: "Send Image".to_string(),
            },
        )
        .await
}

async fn switch_from_inline(ctx: &BotContext, query: &InlineQueryEvent) -> Result<()> {
    info!(
        user_id = query.from.user_id,
        user_first_name = %query.from.first_name,
        query = %query.query,
        "receiving inline query"
    );
    ctx.platform
        .answer_inline(
            &query.query_id,
            InlineAnswer::SwitchToPrivate {
                text: ctx.catalog.text("switch to direct").to_string(),
                parameter: "x".to_string(),
            },
        )
        .await
}
