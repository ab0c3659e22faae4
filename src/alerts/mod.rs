//! AlertSink port: human-facing notifications for conditions the normal
//! event stream doesn't cover (dropped orders, backpressure, memory
//! pressure). A single concrete sink (`TelegramAlertSink`) is provided as a
//! demonstration of the port, not as a supported notification product —
//! the engine itself only depends on the `AlertSink` trait.

use async_trait::async_trait;

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn alert(&self, message: &str);
}

/// Drops every alert at debug level. Default when no sink is configured.
pub struct NullAlertSink;

#[async_trait]
impl AlertSink for NullAlertSink {
    async fn alert(&self, message: &str) {
        tracing::debug!(%message, "alert with no sink attached");
    }
}

/// Posts to a Telegram chat via the bot HTTP API. Grounded in
/// `original_source/web_server/app/services/telegram.py`'s `TelegramService.send_message`;
/// failures here are logged, never propagated, since an alert about an
/// alert-delivery failure would have nowhere to go.
pub struct TelegramAlertSink {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramAlertSink {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        TelegramAlertSink {
            client: reqwest::Client::new(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }
}

#[async_trait]
impl AlertSink for TelegramAlertSink {
    async fn alert(&self, message: &str) {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let result = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": message,
            }))
            .send()
            .await;

        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to deliver telegram alert");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_sink_never_panics() {
        NullAlertSink.alert("queue depth exceeded").await;
    }
}
