//! StockX Quoter
//!
//! Quotes resale prices for marketplace listings by driving a real
//! browser through the product page and checkout flow, applies the
//! personal-shopping markup formulas, and optionally builds payment
//! messages through the Glin platform.

pub mod browser;
pub mod challenge;
pub mod payment;
pub mod pricing;
pub mod quoter;
pub mod store;

use std::path::PathBuf;
use tracing::info;

/// App data directory (session artifacts, debug dumps)
pub fn app_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("stockx-quoter"))
}

/// Log directory path (shared across modules)
pub fn log_dir() -> Option<PathBuf> {
    app_dir().map(|p| p.join("logs"))
}

/// Truncate a string to at most `max` characters on a char boundary
/// (for logging secrets and large response bodies)
pub fn safe_truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Initialize logging: console plus a daily rolling file under the
/// config directory. The returned guard must be held for the file
/// writer to flush.
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "stockx-quoter.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Log files saved to: {}", log_dir.display());
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_truncate_respects_char_boundaries() {
        assert_eq!(safe_truncate("abcdef", 3), "abc");
        assert_eq!(safe_truncate("ab", 10), "ab");
        // Multi-byte chars must not be split
        assert_eq!(safe_truncate("ação", 3), "açã");
    }
}
