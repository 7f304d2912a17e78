//! Fallback sink that only writes to the log.

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;
use crate::notifier::Notifier;

/// Logs every message instead of delivering it.
///
/// Used when no transport credentials are configured so the monitor still
/// leaves a trace of each alert.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        warn!(message, "Notifier not configured, alert logged only");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }

    fn is_configured(&self) -> bool {
        false
    }
}
