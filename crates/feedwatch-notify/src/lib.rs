//! # feedwatch-notify
//!
//! Notification sinks for feedwatch outage alerts.
//!
//! - [`Notifier`] - the sink trait the monitor sends through
//! - [`TelegramNotifier`] - Telegram Bot API transport (reqwest)
//! - [`LogNotifier`] - fallback when no credentials are configured
//! - [`MockNotifier`] - records messages for tests
//!
//! ## Example
//!
//! ```no_run
//! use feedwatch_notify::{Notifier, TelegramConfig, TelegramNotifier};
//!
//! # async fn example() -> feedwatch_notify::Result<()> {
//! let notifier = TelegramNotifier::new(TelegramConfig::new("123:abc", "-1001"))?;
//! notifier.send("⚠️ No connection after 30 seconds").await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod log;
pub mod mock;
pub mod notifier;
pub mod telegram;

pub use error::{NotifyError, Result};
pub use log::LogNotifier;
pub use mock::MockNotifier;
pub use notifier::{Notifier, notifier_for};
pub use telegram::{TelegramConfig, TelegramNotifier};
