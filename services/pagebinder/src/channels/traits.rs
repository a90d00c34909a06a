use async_trait::async_trait;

/// A message received from a channel
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub id: String,
    /// Stable identifier of the sending user (authorization key)
    pub user_id: String,
    /// Chat to address replies to
    pub chat_id: String,
    pub content: String,
    pub timestamp: u64,
}

/// Core channel trait — implement for any messaging platform
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name
    fn name(&self) -> &str;

    /// Send a text message through this channel
    async fn send(&self, message: &str, recipient: &str) -> anyhow::Result<()>;

    /// Send a document attachment through this channel
    async fn send_document(
        &self,
        recipient: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<()>;

    /// Start listening for incoming messages (long-running)
    async fn listen(&self, tx: tokio::sync::mpsc::Sender<ChannelMessage>) -> anyhow::Result<()>;

    /// Check if channel is healthy
    async fn health_check(&self) -> bool {
        true
    }
}
