//! Inline keyboards
//!
//! Platform-neutral keyboard values, the named template registry used by the
//! "restore" action, and the small fixed keyboards (delete button, restore
//! placeholder, photo controls).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::action::ActionRecord;
use crate::catalog::Catalog;
use crate::error::{BotError, Result};

/// Buttons per row, matching Telegram clients' default layout
pub const ROW_WIDTH: usize = 3;

/// Label of the placeholder button when the caller has none
pub const DEFAULT_MINI_TEXT: &str = ". . .";

const BEGONE_LABEL: &str = "🗑️";

/// Names of the reconstructible keyboards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyboardName {
    #[serde(rename = "theme")]
    Theme,
    #[serde(rename = "syntax")]
    Syntax,
    #[serde(rename = "group options")]
    GroupOptions,
    #[serde(rename = "group syntax")]
    GroupSyntax,
}

impl KeyboardName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Theme => "theme",
            Self::Syntax => "syntax",
            Self::GroupOptions => "group options",
            Self::GroupSyntax => "group syntax",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonKind {
    /// Callback data token
    Callback(String),
    /// Prefill an inline query in a chat the user picks
    SwitchInline(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub kind: ButtonKind,
}

impl Button {
    pub fn action(label: impl Into<String>, record: &ActionRecord) -> Result<Self> {
        Ok(Self {
            label: label.into(),
            kind: ButtonKind::Callback(record.encode()?),
        })
    }

    pub fn switch_inline(label: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: ButtonKind::SwitchInline(query.into()),
        }
    }

    /// Callback token, if this is a callback button
    pub fn token(&self) -> Option<&str> {
        match &self.kind {
            ButtonKind::Callback(token) => Some(token),
            ButtonKind::SwitchInline(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    /// Lay buttons out in rows of [`ROW_WIDTH`]
    pub fn from_buttons(buttons: Vec<Button>) -> Self {
        Self {
            rows: buttons.chunks(ROW_WIDTH).map(<[Button]>::to_vec).collect(),
        }
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }

    /// Decoded action records of all callback buttons
    pub fn actions(&self) -> Vec<ActionRecord> {
        self.buttons()
            .filter_map(Button::token)
            .filter_map(|t| ActionRecord::decode(t).ok())
            .collect()
    }
}

pub fn begone_button() -> Result<Button> {
    Button::action(BEGONE_LABEL, &ActionRecord::Begone)
}

pub fn begone_keyboard() -> Result<Keyboard> {
    Ok(Keyboard::from_buttons(vec![begone_button()?]))
}

/// Restore placeholder: one button that reinstalls `name`, plus delete
pub fn minikb(name: KeyboardName, mini_text: &str) -> Result<Keyboard> {
    Ok(Keyboard::from_buttons(vec![
        Button::action(mini_text, &ActionRecord::Restore { kb_name: name })?,
        begone_button()?,
    ]))
}

/// Controls attached under a rendered image
pub fn image_keyboard(send_to_chat: Option<(&str, &str)>) -> Result<Keyboard> {
    let mut buttons = Vec::new();
    if let Some((label, file_id)) = send_to_chat {
        buttons.push(Button::switch_inline(label, format!("img {}", file_id)));
    }
    buttons.push(begone_button()?);
    Ok(Keyboard::from_buttons(buttons))
}

/// Named keyboard templates
#[derive(Debug, Clone)]
pub struct KeyboardRegistry {
    keyboards: HashMap<KeyboardName, Keyboard>,
}

impl KeyboardRegistry {
    pub fn from_catalog(catalog: &Catalog) -> Result<Self> {
        let mut keyboards = HashMap::new();

        let mut theme = catalog
            .themes
            .iter()
            .map(|t| Button::action(&t.name, &ActionRecord::SetTheme { theme: t.name.clone() }))
            .collect::<Result<Vec<_>>>()?;
        theme.push(begone_button()?);
        keyboards.insert(KeyboardName::Theme, Keyboard::from_buttons(theme));

        let mut syntax = catalog
            .syntaxes
            .iter()
            .map(|s| Button::action(&s.name, &ActionRecord::SetExt { ext: s.ext.clone() }))
            .collect::<Result<Vec<_>>>()?;
        syntax.push(begone_button()?);
        keyboards.insert(KeyboardName::Syntax, Keyboard::from_buttons(syntax));

        let mut group_syntax = catalog
            .syntaxes
            .iter()
            .map(|s| Button::action(&s.name, &ActionRecord::SetDefaultExt { ext: s.ext.clone() }))
            .collect::<Result<Vec<_>>>()?;
        group_syntax.push(Button::action("None", &ActionRecord::SetDefaultExt { ext: String::new() })?);
        group_syntax.push(begone_button()?);
        keyboards.insert(KeyboardName::GroupSyntax, Keyboard::from_buttons(group_syntax));

        let group_options = vec![
            Button::action(catalog.text("select default syntax"), &ActionRecord::BrowseGroupSyntax)?,
            Button::action(catalog.text("toggle watch mode"), &ActionRecord::ToggleWatchMode)?,
            begone_button()?,
        ];
        keyboards.insert(KeyboardName::GroupOptions, Keyboard::from_buttons(group_options));

        Ok(Self { keyboards })
    }

    pub fn get(&self, name: KeyboardName) -> Result<&Keyboard> {
        self.keyboards
            .get(&name)
            .ok_or_else(|| BotError::UnknownKeyboard(name.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;

    fn registry() -> KeyboardRegistry {
        KeyboardRegistry::from_catalog(&Catalog::builtin().unwrap()).unwrap()
    }

    #[test]
    fn test_all_templates_present() {
        let registry = registry();
        for name in [
            KeyboardName::Theme,
            KeyboardName::Syntax,
            KeyboardName::GroupOptions,
            KeyboardName::GroupSyntax,
        ] {
            let kb = registry.get(name).unwrap();
            assert!(kb.buttons().count() > 1, "{} is empty", name.as_str());
        }
    }

    #[test]
    fn test_every_template_ends_with_begone() {
        let registry = registry();
        let kb = registry.get(KeyboardName::Syntax).unwrap();
        assert_eq!(kb.actions().last(), Some(&ActionRecord::Begone));
    }

    #[test]
    fn test_group_syntax_offers_clear() {
        let registry = registry();
        let actions = registry.get(KeyboardName::GroupSyntax).unwrap().actions();
        assert!(actions.contains(&ActionRecord::SetDefaultExt { ext: String::new() }));
    }

    #[test]
    fn test_rows_are_bounded() {
        let registry = registry();
        let kb = registry.get(KeyboardName::Syntax).unwrap();
        assert!(kb.rows.iter().all(|row| !row.is_empty() && row.len() <= ROW_WIDTH));
    }

    #[test]
    fn test_minikb_restores_by_name() {
        let kb = minikb(KeyboardName::Syntax, DEFAULT_MINI_TEXT).unwrap();
        let actions = kb.actions();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0], ActionRecord::Restore { kb_name: KeyboardName::Syntax });
        assert_eq!(actions[1].kind(), ActionKind::Begone);
        assert_eq!(kb.rows[0][0].label, DEFAULT_MINI_TEXT);
    }

    #[test]
    fn test_image_keyboard_switch_inline() {
        let kb = image_keyboard(Some(("Send to chat", "AgACAgI"))).unwrap();
        assert_eq!(kb.rows[0][0].kind, ButtonKind::SwitchInline("img AgACAgI".into()));

        let kb = image_keyboard(None).unwrap();
        assert_eq!(kb.buttons().count(), 1);
    }
}
