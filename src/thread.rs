//! Snippet thread lifecycle
//!
//! Each posted snippet moves through:
//!
//! ```text
//! AwaitingLanguageSelection ──choose──► Rendering ──sent──► Dispatched
//!          │                             ▲   ▲ │               │
//!          └──expire──► Abandoned        │   └─┘choose          │
//!                                        └───────choose─────────┘
//! ```
//!
//! Transitions happen only in response to inbound events. A dispatched
//! thread may be re-rendered when the user restores the picker and chooses
//! another syntax. Choosing again while rendering (a retried handler or a
//! second press) restarts the render with the new choice.

use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

use crate::error::{BotError, Result};
use crate::events::MessageRef;

/// How long an idle thread is remembered
const THREAD_TTL: Duration = Duration::from_secs(60 * 60);

const MAX_THREADS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadState {
    /// Snippet posted, no confident language yet
    AwaitingLanguageSelection,
    /// Language chosen, renderers running
    Rendering { ext: String },
    /// Artifacts handed to the platform
    Dispatched { ext: String },
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadEvent {
    /// Detection, chat default or a button picked a language
    LanguageChosen(String),
    RenderDispatched,
    /// The picker was cleaned up without a choice
    Expired,
}

impl ThreadState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AwaitingLanguageSelection => "awaiting-language-selection",
            Self::Rendering { .. } => "rendering",
            Self::Dispatched { .. } => "dispatched",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Dispatched { .. } | Self::Abandoned)
    }

    pub fn apply(self, event: ThreadEvent) -> Result<Self> {
        match (self, event) {
            (Self::AwaitingLanguageSelection, ThreadEvent::LanguageChosen(ext))
            | (Self::Rendering { .. }, ThreadEvent::LanguageChosen(ext))
            | (Self::Dispatched { .. }, ThreadEvent::LanguageChosen(ext)) => Ok(Self::Rendering { ext }),
            (Self::Rendering { ext }, ThreadEvent::RenderDispatched) => Ok(Self::Dispatched { ext }),
            (Self::AwaitingLanguageSelection, ThreadEvent::Expired) => Ok(Self::Abandoned),
            (state, event) => Err(BotError::InvalidTransition(format!(
                "{} on {:?}",
                state.name(),
                event
            ))),
        }
    }
}

/// Current state per snippet message
#[derive(Clone)]
pub struct ThreadTracker {
    states: Cache<MessageRef, ThreadState>,
}

impl Default for ThreadTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadTracker {
    pub fn new() -> Self {
        Self {
            states: Cache::builder()
                .max_capacity(MAX_THREADS)
                .time_to_idle(THREAD_TTL)
                .build(),
        }
    }

    /// Register a freshly posted snippet
    pub async fn begin(&self, snippet: MessageRef) {
        self.states
            .insert(snippet, ThreadState::AwaitingLanguageSelection)
            .await;
        debug!(chat_id = snippet.chat_id, message_id = snippet.message_id, "thread started");
    }

    /// Apply `event`; unknown threads (e.g. from before a restart) start awaiting
    pub async fn advance(&self, snippet: MessageRef, event: ThreadEvent) -> Result<ThreadState> {
        let current = self
            .states
            .get(&snippet)
            .await
            .unwrap_or(ThreadState::AwaitingLanguageSelection);
        let from = current.name();
        let next = current.apply(event)?;
        debug!(
            chat_id = snippet.chat_id,
            message_id = snippet.message_id,
            from,
            to = next.name(),
            "thread transition"
        );
        self.states.insert(snippet, next.clone()).await;
        Ok(next)
    }

    /// Abandon a thread still waiting for its language; others are left alone
    pub async fn expire(&self, snippet: MessageRef) -> Option<ThreadState> {
        match self.states.get(&snippet).await? {
            ThreadState::AwaitingLanguageSelection => self.advance(snippet, ThreadEvent::Expired).await.ok(),
            _ => None,
        }
    }

    pub async fn state(&self, snippet: MessageRef) -> Option<ThreadState> {
        self.states.get(&snippet).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNIPPET: MessageRef = MessageRef { chat_id: 1, message_id: 2 };

    #[test]
    fn test_happy_path() {
        let s = ThreadState::AwaitingLanguageSelection
            .apply(ThreadEvent::LanguageChosen("py".into()))
            .unwrap();
        assert_eq!(s, ThreadState::Rendering { ext: "py".into() });
        let s = s.apply(ThreadEvent::RenderDispatched).unwrap();
        assert!(s.is_terminal());
    }

    #[test]
    fn test_rerender_after_dispatch() {
        let s = ThreadState::Dispatched { ext: "py".into() }
            .apply(ThreadEvent::LanguageChosen("rb".into()))
            .unwrap();
        assert_eq!(s, ThreadState::Rendering { ext: "rb".into() });

        let s = s.apply(ThreadEvent::LanguageChosen("js".into())).unwrap();
        assert_eq!(s, ThreadState::Rendering { ext: "js".into() });
    }

    #[test]
    fn test_abandon_and_invalid_transitions() {
        let s = ThreadState::AwaitingLanguageSelection
            .apply(ThreadEvent::Expired)
            .unwrap();
        assert_eq!(s, ThreadState::Abandoned);
        tokio_test::assert_err!(s.clone().apply(ThreadEvent::LanguageChosen("py".into())));
        assert!(ThreadState::AwaitingLanguageSelection
            .apply(ThreadEvent::RenderDispatched)
            .is_err());
    }

    #[tokio::test]
    async fn test_tracker_follows_events() {
        let tracker = ThreadTracker::new();
        tracker.begin(SNIPPET).await;
        assert_eq!(tracker.state(SNIPPET).await, Some(ThreadState::AwaitingLanguageSelection));

        tokio_test::assert_ok!(
            tracker
                .advance(SNIPPET, ThreadEvent::LanguageChosen("go".into()))
                .await
        );
        let s = tracker.advance(SNIPPET, ThreadEvent::RenderDispatched).await.unwrap();
        assert_eq!(s, ThreadState::Dispatched { ext: "go".into() });
    }

    #[tokio::test]
    async fn test_tracker_unknown_thread_starts_awaiting() {
        let tracker = ThreadTracker::new();
        let s = tracker
            .advance(SNIPPET, ThreadEvent::LanguageChosen("c".into()))
            .await
            .unwrap();
        assert_eq!(s, ThreadState::Rendering { ext: "c".into() });
    }

    #[tokio::test]
    async fn test_expire_only_abandons_waiting_threads() {
        let tracker = ThreadTracker::new();
        assert_eq!(tracker.expire(SNIPPET).await, None);

        tracker.begin(SNIPPET).await;
        assert_eq!(tracker.expire(SNIPPET).await, Some(ThreadState::Abandoned));

        let answered = MessageRef { chat_id: 1, message_id: 3 };
        tracker.begin(answered).await;
        tokio_test::assert_ok!(
            tracker
                .advance(answered, ThreadEvent::LanguageChosen("py".into()))
                .await
        );
        assert_eq!(tracker.expire(answered).await, None);
        assert_eq!(tracker.state(answered).await, Some(ThreadState::Rendering { ext: "py".into() }));
    }
}
