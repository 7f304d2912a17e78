//! Telegram Bot API transport.
//!
//! Messages are delivered with a single `GET {base_url}/bot{token}/sendMessage`
//! request carrying `chat_id` and `text` as query parameters. Any non-2xx
//! answer is an error; nothing is retried.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{NotifyError, Result};
use crate::notifier::Notifier;

/// Public Bot API endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";

/// Connect and request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Telegram transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    /// Bot token as issued by BotFather
    pub bot_token: String,
    /// Target chat id (user, group or channel)
    pub chat_id: String,
    /// API base URL, overridable for tests and proxies
    pub api_base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into().trim().to_string(),
            chat_id: chat_id.into().trim().to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Point the transport at another API endpoint.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Sends notifications through the Telegram Bot API.
pub struct TelegramNotifier {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramNotifier {
    /// Create a notifier. Fails with [`NotifyError::NotConfigured`] when the
    /// token or chat id is empty.
    pub fn new(config: TelegramConfig) -> Result<Self> {
        if config.bot_token.is_empty() {
            return Err(NotifyError::NotConfigured("bot token is empty".to_string()));
        }
        if config.chat_id.is_empty() {
            return Err(NotifyError::NotConfigured("chat id is empty".to_string()));
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// The chat messages are delivered to.
    pub fn chat_id(&self) -> &str {
        &self.config.chat_id
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base_url, self.config.bot_token
        )
    }
}

/// Error payload returned by the Bot API.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    description: Option<String>,
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        if message.trim().is_empty() {
            return Err(NotifyError::InvalidMessage("message is empty".to_string()));
        }

        debug!(chat_id = %self.config.chat_id, "Sending Telegram message");

        let response = self
            .client
            .get(self.endpoint())
            .query(&[("chat_id", self.config.chat_id.as_str()), ("text", message)])
            .send()
            .await
            .map_err(|e| NotifyError::from_reqwest(e, self.config.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.description)
                .unwrap_or(body);
            return Err(NotifyError::from_http_status(status.as_u16(), &detail));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

    fn notifier_for(server: &MockServer) -> TelegramNotifier {
        let config = TelegramConfig::new("123:secret", "-1001").with_base_url(server.uri());
        TelegramNotifier::new(config).unwrap()
    }

    #[test]
    fn test_requires_credentials() {
        let err = TelegramNotifier::new(TelegramConfig::new("", "42")).err().unwrap();
        assert!(matches!(err, NotifyError::NotConfigured(_)));

        let err = TelegramNotifier::new(TelegramConfig::new("123:abc", " ")).err().unwrap();
        assert!(matches!(err, NotifyError::NotConfigured(_)));
    }

    #[test]
    fn test_config_defaults() {
        let config = TelegramConfig::new(" 123:abc ", "42");
        assert_eq!(config.bot_token, "123:abc");
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.timeout_secs, 5);

        let config = config.with_base_url("http://localhost:9000/");
        assert_eq!(config.api_base_url, "http://localhost:9000");
    }

    #[tokio::test]
    async fn test_send_message() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("GET"))
            .and(matchers::path("/bot123:secret/sendMessage"))
            .and(matchers::query_param("chat_id", "-1001"))
            .and(matchers::query_param("text", "⚠️ No connection after 30 seconds"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": { "message_id": 7 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = notifier_for(&server);
        notifier
            .send("⚠️ No connection after 30 seconds")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_reports_api_error() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let err = notifier_for(&server).send("hello").await.unwrap_err();
        match err {
            NotifyError::Status { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "Bad Request: chat not found");
            }
            other => panic!("Unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_reports_server_error_body() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let err = notifier_for(&server).send("hello").await.unwrap_err();
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("Bad Gateway"));
    }

    #[tokio::test]
    async fn test_send_times_out() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let mut config = TelegramConfig::new("123:secret", "-1001").with_base_url(server.uri());
        config.timeout_secs = 1;
        let notifier = TelegramNotifier::new(config).unwrap();

        let err = notifier.send("hello").await.unwrap_err();
        assert!(matches!(err, NotifyError::Timeout(1)), "got {err:?}");
        assert!(err.is_network_error());
    }

    #[tokio::test]
    async fn test_empty_message_not_sent() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = notifier_for(&server).send("   ").await.unwrap_err();
        assert!(matches!(err, NotifyError::InvalidMessage(_)));
    }
}
