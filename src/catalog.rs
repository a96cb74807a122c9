//! Language strings, syntax list, theme list and classifier label table.
//!
//! Built-in copies live under `assets/` and are embedded at compile time.
//! A directory passed to [`Catalog::load`] may override any of the files.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{BotError, Result};

const STRINGS_FILE: &str = "english.toml";
const SYNTAXES_FILE: &str = "syntaxes.toml";
const THEMES_FILE: &str = "themes.toml";
const LABELS_FILE: &str = "classifier.toml";

const BUILTIN_STRINGS: &str = include_str!("../assets/english.toml");
const BUILTIN_SYNTAXES: &str = include_str!("../assets/syntaxes.toml");
const BUILTIN_THEMES: &str = include_str!("../assets/themes.toml");
const BUILTIN_LABELS: &str = include_str!("../assets/classifier.toml");

/// A syntax offered in the picker keyboards
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Syntax {
    pub name: String,
    pub ext: String,
}

/// An HTML theme and its preview image
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Theme {
    pub name: String,
    #[serde(default)]
    pub preview: String,
}

#[derive(Deserialize)]
struct SyntaxFile {
    #[serde(default)]
    syntax: Vec<Syntax>,
}

#[derive(Deserialize)]
struct ThemeFile {
    #[serde(default)]
    theme: Vec<Theme>,
}

#[derive(Deserialize)]
struct LabelFile {
    #[serde(default)]
    labels: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    strings: HashMap<String, String>,
    pub syntaxes: Vec<Syntax>,
    pub themes: Vec<Theme>,
    /// Classifier label -> syntax ext
    pub labels: HashMap<String, String>,
}

impl Catalog {
    /// Catalog from the embedded assets only
    pub fn builtin() -> Result<Self> {
        Self::from_sources(BUILTIN_STRINGS, BUILTIN_SYNTAXES, BUILTIN_THEMES, BUILTIN_LABELS)
    }

    /// Catalog with per-file overrides from `dir`
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let Some(dir) = dir else {
            return Self::builtin();
        };

        let read = |name: &str, builtin: &'static str| -> Result<String> {
            let path = dir.join(name);
            if path.exists() {
                info!(path = %path.display(), "loading catalog override");
                std::fs::read_to_string(&path)
                    .map_err(|e| BotError::Config(format!("{}: {}", path.display(), e)))
            } else {
                Ok(builtin.to_string())
            }
        };

        Self::from_sources(
            &read(STRINGS_FILE, BUILTIN_STRINGS)?,
            &read(SYNTAXES_FILE, BUILTIN_SYNTAXES)?,
            &read(THEMES_FILE, BUILTIN_THEMES)?,
            &read(LABELS_FILE, BUILTIN_LABELS)?,
        )
    }

    fn from_sources(strings: &str, syntaxes: &str, themes: &str, labels: &str) -> Result<Self> {
        let parse_err = |file: &str, e: toml::de::Error| BotError::Config(format!("{}: {}", file, e));

        let strings: HashMap<String, String> =
            toml::from_str(strings).map_err(|e| parse_err(STRINGS_FILE, e))?;
        let syntaxes: SyntaxFile =
            toml::from_str(syntaxes).map_err(|e| parse_err(SYNTAXES_FILE, e))?;
        let themes: ThemeFile = toml::from_str(themes).map_err(|e| parse_err(THEMES_FILE, e))?;
        let labels: LabelFile = toml::from_str(labels).map_err(|e| parse_err(LABELS_FILE, e))?;

        Ok(Self {
            strings,
            syntaxes: syntaxes.syntax,
            themes: themes.theme,
            labels: labels.labels,
        })
    }

    /// Look up a string, falling back to the key itself
    pub fn text<'a>(&'a self, key: &'a str) -> &'a str {
        match self.strings.get(key) {
            Some(s) => s,
            None => {
                warn!(key, "missing catalog string");
                key
            }
        }
    }

    /// Look up a string and substitute `{name}` placeholders
    pub fn format(&self, key: &str, args: &[(&str, &str)]) -> String {
        args.iter().fold(self.text(key).to_string(), |acc, (name, value)| {
            acc.replace(&format!("{{{}}}", name), value)
        })
    }

    /// Preview file ids of every theme that has one
    pub fn theme_previews(&self) -> Vec<String> {
        self.themes
            .iter()
            .filter(|t| !t.preview.is_empty())
            .map(|t| t.preview.clone())
            .collect()
    }
}
