//! Configuration management

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::detect::DEFAULT_MIN_CONFIDENCE;
use crate::handlers::DEFAULT_CLEANUP_DELAY;
use crate::retry::{DEFAULT_DELAY, DEFAULT_MAX_ATTEMPTS};

/// Bot configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token
    pub api_key: String,

    /// Chat notified on startup (optional)
    pub admin_chat_id: Option<i64>,

    /// SQLite database path for preferences
    pub db_path: PathBuf,

    /// Directory whose asset files override the built-in ones
    pub assets_dir: Option<PathBuf>,

    /// Classifier probability needed to trust its guess
    pub min_confidence: f64,

    pub retry_attempts: u32,
    pub retry_delay: Duration,

    /// Delay before pickers and previews are deleted
    pub cleanup_delay: Duration,

    /// Background for rendered images (optional)
    pub background_image: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any variable source
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = match var("TG_API_KEY") {
            Some(key) if !key.trim().is_empty() => key,
            _ => bail!("TG_API_KEY must be set"),
        };

        let admin_chat_id = parse_opt(&var, "ADMIN_CHAT_ID")?;

        let db_path = var("CCB_DB_PATH").map(PathBuf::from).unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("colorcodebot")
                .join("ccb.sqlite")
        });

        let assets_dir = var("CCB_ASSETS_DIR").map(PathBuf::from);

        let min_confidence = parse_opt(&var, "CCB_MIN_CONFIDENCE")?.unwrap_or(DEFAULT_MIN_CONFIDENCE);
        if !(0.0..=1.0).contains(&min_confidence) {
            bail!("CCB_MIN_CONFIDENCE must be between 0 and 1, got {}", min_confidence);
        }

        let retry_attempts = parse_opt(&var, "CCB_RETRY_ATTEMPTS")?.unwrap_or(DEFAULT_MAX_ATTEMPTS);

        let retry_delay = parse_opt(&var, "CCB_RETRY_DELAY_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_DELAY);

        let cleanup_delay = parse_opt(&var, "CCB_CLEANUP_DELAY_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CLEANUP_DELAY);

        let background_image = var("CCB_BACKGROUND_IMAGE").map(PathBuf::from);

        Ok(Self {
            api_key,
            admin_chat_id,
            db_path,
            assets_dir,
            min_confidence,
            retry_attempts,
            retry_delay,
            cleanup_delay,
            background_image,
        })
    }
}

fn parse_opt<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(name)
        .map(|v| v.trim().parse::<T>().with_context(|| format!("invalid {}: {:?}", name, v)))
        .transpose()
}
