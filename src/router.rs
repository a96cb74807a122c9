//! Interaction Router
//!
//! Ordered route table keyed on event shape and, for button presses, the
//! decoded action discriminant. Dispatch picks the first matching route and
//! runs its handler under the retry wrapper.
//!
//! Features:
//! - Registration rejects routes that an earlier route would always shadow
//! - Malformed button payloads are logged and dropped, never retried
//! - Handler failures are logged with user, chat and action, then swallowed

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::action::{ActionKind, ActionRecord};
use crate::events::{Command, EventShape, InboundEvent};
use crate::handlers::{self, BotContext};
use crate::retry::with_retry;

/// Handler tags, one per bot behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handler {
    Welcome,
    BrowseThemes,
    ManageGroupOptions,
    IgnoreGroupUser,
    WatchGroupUser,
    IntakeSnippet,
    RecvPhoto,
    RestoreKeyboard,
    SetSnippetFiletype,
    SetGroupSyntax,
    BrowseGroupSyntax,
    ToggleGroupWatch,
    SetTheme,
    Begone,
    SendPhotoElsewhere,
    SwitchFromInline,
}

impl Handler {
    /// Whether the handler can be re-run from the top after a failure.
    /// The watch toggle is not: a second run would flip the flag back.
    pub fn is_rerunnable(&self) -> bool {
        !matches!(self, Self::ToggleGroupWatch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::BrowseThemes => "browse_themes",
            Self::ManageGroupOptions => "manage_group_options",
            Self::IgnoreGroupUser => "ignore_group_user",
            Self::WatchGroupUser => "watch_group_user",
            Self::IntakeSnippet => "intake_snippet",
            Self::RecvPhoto => "recv_photo",
            Self::RestoreKeyboard => "restore_kb",
            Self::SetSnippetFiletype => "set_snippet_filetype",
            Self::SetGroupSyntax => "set_group_syntax",
            Self::BrowseGroupSyntax => "browse_group_syntax",
            Self::ToggleGroupWatch => "toggle_group_watch",
            Self::SetTheme => "set_theme",
            Self::Begone => "begone",
            Self::SendPhotoElsewhere => "send_photo_elsewhere",
            Self::SwitchFromInline => "switch_from_inline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("route {handler} on {shape:?} is shadowed by {earlier}")]
    OverlappingRoute {
        shape: EventShape,
        handler: &'static str,
        earlier: &'static str,
    },

    #[error("route {handler}: {shape:?} events carry no action payload")]
    UnexpectedActionFilter { shape: EventShape, handler: &'static str },
}

/// One registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub shape: EventShape,
    /// Required action discriminant; `None` accepts any
    pub action: Option<ActionKind>,
    pub handler: Handler,
}

impl Route {
    fn matches(&self, shape: EventShape, action: Option<ActionKind>) -> bool {
        self.shape == shape && (self.action.is_none() || self.action == action)
    }

    /// Whether every event `other` would accept reaches `self` first
    fn shadows(&self, other: &Route) -> bool {
        self.shape == other.shape && (self.action.is_none() || self.action == other.action)
    }
}

/// An event together with its decoded button payload
#[derive(Debug, Clone)]
pub struct Request {
    pub event: InboundEvent,
    pub action: Option<ActionRecord>,
}

/// What happened to a dispatched event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled(Handler),
    /// No route matched; dropped silently
    Unmatched,
    /// Button payload did not decode; dropped
    Malformed,
    /// Handler failed after retries; logged and swallowed
    Failed(Handler),
}

#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bot's full route table
    pub fn standard() -> Result<Self, RouterError> {
        use EventShape as S;

        let mut router = Self::new();
        router.register(S::Command(Command::Start), None, Handler::Welcome)?;
        router.register(S::Command(Command::Help), None, Handler::Welcome)?;
        router.register(S::Command(Command::Theme), None, Handler::BrowseThemes)?;
        router.register(S::Command(Command::Settings), None, Handler::ManageGroupOptions)?;
        router.register(S::Command(Command::IgnoreMe), None, Handler::IgnoreGroupUser)?;
        router.register(S::Command(Command::WatchMe), None, Handler::WatchGroupUser)?;
        router.register(S::Text, None, Handler::IntakeSnippet)?;
        router.register(S::Photo, None, Handler::RecvPhoto)?;

        for (kind, handler) in [
            (ActionKind::Restore, Handler::RestoreKeyboard),
            (ActionKind::SetExt, Handler::SetSnippetFiletype),
            (ActionKind::SetDefaultExt, Handler::SetGroupSyntax),
            (ActionKind::BrowseGroupSyntax, Handler::BrowseGroupSyntax),
            (ActionKind::ToggleWatchMode, Handler::ToggleGroupWatch),
            (ActionKind::SetTheme, Handler::SetTheme),
            (ActionKind::Begone, Handler::Begone),
        ] {
            router.register(S::ButtonPress, Some(kind), handler)?;
        }

        router.register(S::InlineImage, None, Handler::SendPhotoElsewhere)?;
        router.register(S::InlineQuery, None, Handler::SwitchFromInline)?;
        Ok(router)
    }

    /// Append a route. Fails if an earlier route already catches everything
    /// this one would.
    pub fn register(
        &mut self,
        shape: EventShape,
        action: Option<ActionKind>,
        handler: Handler,
    ) -> Result<(), RouterError> {
        if action.is_some() && !shape.carries_payload() {
            return Err(RouterError::UnexpectedActionFilter {
                shape,
                handler: handler.as_str(),
            });
        }
        let route = Route { shape, action, handler };
        if let Some(earlier) = self.routes.iter().find(|r| r.shadows(&route)) {
            return Err(RouterError::OverlappingRoute {
                shape,
                handler: handler.as_str(),
                earlier: earlier.handler.as_str(),
            });
        }
        self.routes.push(route);
        Ok(())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// First route matching `shape` and `action`
    pub fn resolve(&self, shape: EventShape, action: Option<ActionKind>) -> Option<&Route> {
        self.routes.iter().find(|r| r.matches(shape, action))
    }

    /// Route `event` to its handler. Never fails; the outcome is informational.
    pub async fn dispatch(&self, ctx: &BotContext, event: InboundEvent) -> DispatchOutcome {
        let shape = event.shape();
        let user_id = event.actor().user_id;
        let chat_id = event.chat_id();

        let action = match &event {
            InboundEvent::ButtonPress(press) => match ActionRecord::decode(&press.data) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(user_id, ?chat_id, data = %press.data, error = %e, "dropping malformed button payload");
                    return DispatchOutcome::Malformed;
                }
            },
            _ => None,
        };
        let kind = action.as_ref().map(ActionRecord::kind);
        let action_name = kind.map(|k| k.as_str()).unwrap_or("-");

        let Some(route) = self.resolve(shape, kind) else {
            debug!(user_id, ?chat_id, ?shape, action = action_name, "no route");
            return DispatchOutcome::Unmatched;
        };
        let handler = route.handler;

        let request = Request { event, action };
        let request = &request;
        let policy = if handler.is_rerunnable() { ctx.retry } else { ctx.retry.once() };
        let result = with_retry(handler.as_str(), &policy, move || {
            handlers::run(handler, ctx, request)
        })
        .await;

        match result {
            Ok(()) => DispatchOutcome::Handled(handler),
            Err(e) => {
                error!(
                    user_id,
                    ?chat_id,
                    action = action_name,
                    handler = handler.as_str(),
                    error = %e,
                    code = e.code(),
                    "handler failed"
                );
                DispatchOutcome::Failed(handler)
            }
        }
    }
}
