//! ColorCodeBot
//!
//! Telegram bot that colorizes code snippets into HTML documents and images.
//!
//! # Features
//!
//! - **Syntax detection**: keyword classifier with an ordered prefix fallback
//! - **Action codec**: readable JSON callback data, validated on decode
//! - **Interaction router**: ordered route table with per-handler retry
//! - **Restorable keyboards**: selections collapse to a one-button placeholder
//! - **Group controls**: default syntax, watch/ignore mode, per-user opt out
//! - **Preferences**: SQLite key-value tables
//!
//! # Architecture
//!
//! ```text
//! Telegram ──► telegram.rs ──► Router ──► handlers ──► ChatPlatform
//!  (teloxide)   (events)         │            │
//!                                │            ├── SyntaxDetector
//!                                │            ├── Renderer (highlight/silicon)
//!                                │            ├── PreferenceStore (SQLite)
//!                                │            └── ThreadTracker (moka)
//!                                └── with_retry
//! ```

pub mod action;
pub mod catalog;
pub mod config;
pub mod detect;
pub mod error;
pub mod events;
pub mod handlers;
pub mod keyboards;
pub mod platform;
pub mod render;
pub mod retry;
pub mod router;
pub mod store;
pub mod telegram;
pub mod thread;


pub use action::{ActionKind, ActionRecord};
pub use catalog::Catalog;
pub use config::Config;
pub use detect::{Classifier, Detection, DetectionMethod, KeywordClassifier, SyntaxDetector};
pub use error::{BotError, Result};
pub use events::{EventShape, InboundEvent};
pub use handlers::BotContext;
pub use keyboards::{Keyboard, KeyboardName, KeyboardRegistry};
pub use retry::{with_retry, with_retry_report, RetryPolicy, RetryReport};
pub use router::{DispatchOutcome, Handler, Router, RouterError};
pub use store::{MemoryPreferenceStore, PreferenceStore, Preferences, SqlitePreferenceStore};
pub use thread::{ThreadEvent, ThreadState, ThreadTracker};
