// File logging. The terminal belongs to the interactive prompts, so all
// diagnostics go to `logs/kualitee.log` instead.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_DIR: &str = "logs";
pub const LOG_FILE: &str = "kualitee.log";
const DEFAULT_FILTER: &str = "kualitee_cli=debug";

/// Maximum number of characters of a response body written to the log.
pub const MAX_LOGGED_BODY: usize = 2000;

/// Install the global subscriber writing to `logs/kualitee.log`.
/// `RUST_LOG` overrides the default filter.
pub fn init() -> Result<()> {
    let dir = Path::new(LOG_DIR);
    std::fs::create_dir_all(dir).context("Failed to create log directory")?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))
        .context("Failed to open log file")?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .with_target(false),
        )
        .try_init()
        .context("Failed to install log subscriber")?;
    Ok(())
}

/// Mask a token for logging: keep the first and last four characters.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "****".into();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Cut long strings down before logging them.
pub fn truncate_for_log(data: &str, max_chars: usize) -> String {
    let total = data.chars().count();
    if total <= max_chars {
        return data.to_string();
    }
    let kept: String = data.chars().take(max_chars).collect();
    format!("{}... (truncated, {} total chars)", kept, total)
}
