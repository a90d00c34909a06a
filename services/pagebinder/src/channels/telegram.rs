use super::traits::{Channel, ChannelMessage};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use uuid::Uuid;

/// Telegram channel — long-polls the Bot API for updates
pub struct TelegramChannel {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    /// Parse a `message` JSON object into a `ChannelMessage`.
    ///
    /// Returns `None` for anything that is not a plain text message
    /// (photos, stickers, joins, ...).
    fn parse_message(message: &serde_json::Value) -> Option<ChannelMessage> {
        let text = message.get("text")?.as_str()?.to_string();
        let chat_id = message
            .get("chat")?
            .get("id")?
            .as_i64()?
            .to_string();
        let user_id = message
            .get("from")?
            .get("id")?
            .as_i64()?
            .to_string();

        Some(ChannelMessage {
            id: Uuid::new_v4().to_string(),
            user_id,
            chat_id,
            content: text,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        })
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: &str, chat_id: &str) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": message,
        });

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = resp.text().await?;
            anyhow::bail!("Telegram sendMessage failed: {err}");
        }

        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<()> {
        let part = Part::bytes(bytes).file_name(file_name.to_string());

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);

        let resp = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = resp.text().await?;
            anyhow::bail!("Telegram sendDocument failed: {err}");
        }

        tracing::info!("Telegram document sent to {chat_id}: {file_name}");
        Ok(())
    }

    async fn listen(&self, tx: tokio::sync::mpsc::Sender<ChannelMessage>) -> anyhow::Result<()> {
        let mut offset: i64 = 0;

        tracing::info!("Telegram channel listening for messages...");

        loop {
            let url = self.api_url("getUpdates");
            let body = serde_json::json!({
                "offset": offset,
                "timeout": 30,
                "allowed_updates": ["message"]
            });

            let resp = match self.client.post(&url).json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {e}");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                }
            };

            let data: serde_json::Value = match resp.json().await {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("Telegram parse error: {e}");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                }
            };

            if let Some(results) = data.get("result").and_then(serde_json::Value::as_array) {
                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(message) = update.get("message") else {
                        continue;
                    };

                    let Some(msg) = Self::parse_message(message) else {
                        continue;
                    };

                    if tx.send(msg).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telegram_channel_name() {
        let ch = TelegramChannel::new("fake-token".into());
        assert_eq!(ch.name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        let ch = TelegramChannel::new("123:ABC".into());
        assert_eq!(
            ch.api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    #[test]
    fn telegram_api_url_send_document() {
        let ch = TelegramChannel::new("123:ABC".into());
        assert_eq!(
            ch.api_url("sendDocument"),
            "https://api.telegram.org/bot123:ABC/sendDocument"
        );
    }

    #[test]
    fn parse_message_valid() {
        let message = serde_json::json!({
            "message_id": 7,
            "from": { "id": 12345, "username": "testuser" },
            "chat": { "id": 67890 },
            "text": "https://example.com"
        });

        let msg = TelegramChannel::parse_message(&message).unwrap();
        assert_eq!(msg.user_id, "12345");
        assert_eq!(msg.chat_id, "67890");
        assert_eq!(msg.content, "https://example.com");
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn parse_message_skips_non_text() {
        let message = serde_json::json!({
            "message_id": 8,
            "from": { "id": 12345 },
            "chat": { "id": 67890 },
            "photo": [{ "file_id": "abc" }]
        });

        assert!(TelegramChannel::parse_message(&message).is_none());
    }

    #[test]
    fn parse_message_requires_sender() {
        let message = serde_json::json!({
            "message_id": 9,
            "chat": { "id": 67890 },
            "text": "hello"
        });

        assert!(TelegramChannel::parse_message(&message).is_none());
    }

    #[tokio::test]
    async fn telegram_send_document_fails_without_server() {
        let ch = TelegramChannel::new("fake-token".into());
        let result = ch
            .send_document("123456", "test.pdf", b"%PDF-1.5".to_vec())
            .await;

        // Fails at the network or API level, never panics
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn telegram_send_fails_without_server() {
        let ch = TelegramChannel::new("fake-token".into());
        assert!(ch.send("hello", "123456").await.is_err());
    }
}
