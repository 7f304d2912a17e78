//! The notification sink trait.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::log::LogNotifier;
use crate::telegram::{TelegramConfig, TelegramNotifier};

/// Delivers a text message to a downstream endpoint.
///
/// Implementations report failure but never retry; the caller decides what a
/// failed delivery means.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `message`.
    async fn send(&self, message: &str) -> Result<()>;

    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether messages actually leave the process.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Pick a notifier for the given credentials.
///
/// Returns a [`TelegramNotifier`] when both the token and chat id are set,
/// and a [`LogNotifier`] otherwise.
pub fn notifier_for(bot_token: &str, chat_id: &str) -> Result<Arc<dyn Notifier>> {
    if bot_token.trim().is_empty() || chat_id.trim().is_empty() {
        info!("Telegram credentials not set, alerts will only be logged");
        return Ok(Arc::new(LogNotifier::new()));
    }

    let notifier = TelegramNotifier::new(TelegramConfig::new(bot_token, chat_id))?;
    Ok(Arc::new(notifier))
}
