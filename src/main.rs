//! ColorCodeBot - Entry Point
//!
//! Options:
//! - --pretty / -p: human-readable colored logs instead of JSON
//! - --help / -h: usage

use colorcode_bot::Config;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let pretty = args.iter().any(|a| a == "--pretty" || a == "-p");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");

    if help_mode {
        println!("ColorCodeBot v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: colorcodebot [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --pretty, -p   Colored human-readable logs (default: JSON)");
        println!("  --help, -h     Show this help");
        println!();
        println!("Environment variables:");
        println!("  TG_API_KEY               Telegram bot token (required)");
        println!("  ADMIN_CHAT_ID            Chat notified on startup");
        println!("  CCB_DB_PATH              SQLite preferences path");
        println!("  CCB_ASSETS_DIR           Directory overriding built-in assets");
        println!("  CCB_MIN_CONFIDENCE       Classifier threshold (default: 0.12)");
        println!("  CCB_RETRY_ATTEMPTS       Attempts per operation (default: 6)");
        println!("  CCB_RETRY_DELAY_SECS     Delay between attempts (default: 3)");
        println!("  CCB_CLEANUP_DELAY_SECS   Delay before pickers are deleted (default: 30)");
        println!("  CCB_BACKGROUND_IMAGE     Background image for rendered PNGs");
        println!("  RUST_LOG                 Log filter (default: info)");
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if pretty {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("ColorCodeBot v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    colorcode_bot::telegram::run_bot(config).await?;

    Ok(())
}
