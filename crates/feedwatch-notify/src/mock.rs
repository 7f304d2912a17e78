//! In-memory notifier for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{NotifyError, Result};
use crate::notifier::Notifier;

/// Records every message it is asked to send.
///
/// Clones share the same record, so a test can keep one handle and give the
/// other to the code under test.
#[derive(Debug, Clone, Default)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<String>>>,
    attempts: Arc<Mutex<Vec<String>>>,
    failing: Arc<AtomicBool>,
    delay: Option<Duration>,
}

impl MockNotifier {
    /// Create a mock that accepts every message immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that rejects every message.
    pub fn failing() -> Self {
        let mock = Self::new();
        mock.set_failing(true);
        mock
    }

    /// Delay each delivery by `delay` (tokio time).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Switch failure mode on or off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Messages delivered successfully, in order.
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Every message the caller tried to send, including failed ones.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Number of messages delivered successfully.
    pub fn count(&self) -> usize {
        self.sent.lock().map(|m| m.len()).unwrap_or_default()
    }

    /// Forget all recorded messages.
    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.clear();
        }
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(message.to_string());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::from_http_status(503, "mock failure"));
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.to_string());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
