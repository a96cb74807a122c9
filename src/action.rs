//! Action Codec
//!
//! Button intent records and their callback-data token form. Tokens are
//! compact JSON with the `action` discriminant first, e.g.
//! `{"action":"set ext","ext":"py"}`, so they stay readable when echoed back
//! by the platform.

use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};
use crate::keyboards::KeyboardName;

/// Telegram's limit on `callback_data`
pub const MAX_TOKEN_BYTES: usize = 64;

/// Intent carried by an inline button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ActionRecord {
    /// Render the replied-to snippet as `ext`
    #[serde(rename = "set ext")]
    SetExt { ext: String },

    #[serde(rename = "set theme")]
    SetTheme { theme: String },

    /// Reinstall a named keyboard
    #[serde(rename = "restore")]
    Restore { kb_name: KeyboardName },

    /// Group default syntax; an empty `ext` clears it
    #[serde(rename = "set default ext")]
    SetDefaultExt { ext: String },

    #[serde(rename = "browse group syntax")]
    BrowseGroupSyntax,

    #[serde(rename = "toggle watch mode")]
    ToggleWatchMode,

    /// Delete the message carrying the button
    #[serde(rename = "begone")]
    Begone,
}

/// The `action` discriminant alone, used by route matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    SetExt,
    SetTheme,
    Restore,
    SetDefaultExt,
    BrowseGroupSyntax,
    ToggleWatchMode,
    Begone,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        Self::SetExt,
        Self::SetTheme,
        Self::Restore,
        Self::SetDefaultExt,
        Self::BrowseGroupSyntax,
        Self::ToggleWatchMode,
        Self::Begone,
    ];

    /// Wire name of the discriminant
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetExt => "set ext",
            Self::SetTheme => "set theme",
            Self::Restore => "restore",
            Self::SetDefaultExt => "set default ext",
            Self::BrowseGroupSyntax => "browse group syntax",
            Self::ToggleWatchMode => "toggle watch mode",
            Self::Begone => "begone",
        }
    }
}

impl ActionRecord {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::SetExt { .. } => ActionKind::SetExt,
            Self::SetTheme { .. } => ActionKind::SetTheme,
            Self::Restore { .. } => ActionKind::Restore,
            Self::SetDefaultExt { .. } => ActionKind::SetDefaultExt,
            Self::BrowseGroupSyntax => ActionKind::BrowseGroupSyntax,
            Self::ToggleWatchMode => ActionKind::ToggleWatchMode,
            Self::Begone => ActionKind::Begone,
        }
    }

    /// Encode as callback data
    pub fn encode(&self) -> Result<String> {
        let token = serde_json::to_string(self)?;
        if token.len() > MAX_TOKEN_BYTES {
            return Err(BotError::PayloadTooLarge {
                size: token.len(),
                limit: MAX_TOKEN_BYTES,
            });
        }
        Ok(token)
    }

    /// Decode callback data produced by [`ActionRecord::encode`]
    pub fn decode(token: &str) -> Result<Self> {
        serde_json::from_str(token)
            .map_err(|e| BotError::MalformedPayload(format!("{:?}: {}", token, e)))
    }
}
