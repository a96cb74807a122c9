//! Inbound events
//!
//! Platform-neutral view of what the chat platform delivers, plus the shape
//! classification the router keys on. Shapes are disjoint: every event has
//! exactly one.

/// Where a message lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
}

impl ChatKind {
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub first_name: String,
}

/// A text message, possibly a snippet or a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub message: MessageRef,
    pub chat_kind: ChatKind,
    pub from: Actor,
    pub text: String,
    /// Text of `code`/`pre` entities, in message order
    pub code_spans: Vec<String>,
}

impl TextMessage {
    /// The code this message carries.
    ///
    /// Private chats: the whole text. Groups: the code entities joined by a
    /// blank line, and only if that amounts to more than one word.
    pub fn snippet(&self) -> Option<String> {
        match self.chat_kind {
            ChatKind::Private => Some(self.text.clone()).filter(|t| !t.trim().is_empty()),
            ChatKind::Group => {
                let code = self.code_spans.join("\n\n");
                (code.split_whitespace().count() > 1).then_some(code)
            }
        }
    }

    pub fn command(&self) -> Option<Command> {
        Command::parse(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoMessage {
    pub message: MessageRef,
    pub from: Actor,
    pub file_id: String,
}

/// An inline-button press
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonPress {
    pub query_id: String,
    pub from: Actor,
    /// Message that carries the keyboard, if still accessible
    pub message: Option<MessageRef>,
    pub chat_kind: ChatKind,
    /// The message the keyboard message replies to (the snippet)
    pub reply_to: Option<Box<TextMessage>>,
    /// Raw callback data token
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineQueryEvent {
    pub query_id: String,
    pub from: Actor,
    pub query: String,
}

impl InlineQueryEvent {
    /// File id from an `img <file_id>` query
    pub fn image_file_id(&self) -> Option<&str> {
        self.query
            .strip_prefix("img ")
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Text(TextMessage),
    Photo(PhotoMessage),
    ButtonPress(ButtonPress),
    InlineQuery(InlineQueryEvent),
}

/// Bot commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Start,
    Help,
    Theme,
    Settings,
    IgnoreMe,
    WatchMe,
}

impl Command {
    /// Parse `/name` or `/name@botname` at the start of `text`
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?.strip_prefix('/')?;
        let name = first.split('@').next().unwrap_or(first);
        match name.to_lowercase().as_str() {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            "theme" | "themes" => Some(Self::Theme),
            "settings" => Some(Self::Settings),
            "ignoreme" => Some(Self::IgnoreMe),
            "watchme" => Some(Self::WatchMe),
            _ => None,
        }
    }
}

/// Route key derived from an event's shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventShape {
    /// Text that is not a recognised command
    Text,
    Command(Command),
    Photo,
    ButtonPress,
    /// Inline query of the form `img <file_id>`
    InlineImage,
    /// Any other inline query
    InlineQuery,
}

impl EventShape {
    pub fn of(event: &InboundEvent) -> Self {
        match event {
            InboundEvent::Text(msg) => msg.command().map_or(Self::Text, Self::Command),
            InboundEvent::Photo(_) => Self::Photo,
            InboundEvent::ButtonPress(_) => Self::ButtonPress,
            InboundEvent::InlineQuery(q) if q.image_file_id().is_some() => Self::InlineImage,
            InboundEvent::InlineQuery(_) => Self::InlineQuery,
        }
    }

    /// Whether routes for this shape discriminate on an action record
    pub fn carries_payload(&self) -> bool {
        matches!(self, Self::ButtonPress)
    }
}

impl InboundEvent {
    pub fn shape(&self) -> EventShape {
        EventShape::of(self)
    }

    pub fn actor(&self) -> &Actor {
        match self {
            Self::Text(m) => &m.from,
            Self::Photo(m) => &m.from,
            Self::ButtonPress(q) => &q.from,
            Self::InlineQuery(q) => &q.from,
        }
    }

    /// Chat the event happened in, when there is one
    pub fn chat_id(&self) -> Option<i64> {
        match self {
            Self::Text(m) => Some(m.message.chat_id),
            Self::Photo(m) => Some(m.message.chat_id),
            Self::ButtonPress(q) => q.message.map(|m| m.chat_id),
            Self::InlineQuery(_) => None,
        }
    }
}
