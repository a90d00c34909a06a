pub mod telegram;
pub mod traits;

pub use telegram::TelegramChannel;
pub use traits::{Channel, ChannelMessage};

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::directory::{AdminDirectory, RemoveOutcome};
use crate::error::CommandError;
use crate::session::Conversations;

pub const NOTICE_DENIED: &str =
    "Sorry, you do not have access to this bot. Please contact the admin to get access.";
pub const NOTICE_INTERNAL: &str = "Something went wrong. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdminAction {
    Add,
    Remove,
}

/// Routes inbound channel messages: authorization, admin commands, dialog.
pub struct Dispatcher {
    channel: Arc<dyn Channel>,
    directory: Arc<AdminDirectory>,
    conversations: Arc<Conversations>,
}

impl Dispatcher {
    pub fn new(
        channel: Arc<dyn Channel>,
        directory: Arc<AdminDirectory>,
        conversations: Arc<Conversations>,
    ) -> Self {
        Self {
            channel,
            directory,
            conversations,
        }
    }

    /// Consume inbound messages until the channel closes. Each message is
    /// handled on its own task so one user's pipeline run never blocks
    /// another user's dialog.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<ChannelMessage>) {
        while let Some(message) = rx.recv().await {
            let dispatcher = Arc::clone(&self);
            tokio::spawn(async move {
                dispatcher.handle(message).await;
            });
        }
    }

    async fn handle(&self, message: ChannelMessage) {
        // Allow-list gate comes first; unauthorized users get a denial and
        // no session is ever created for them.
        match self.directory.find(&message.user_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::info!(user_id = %message.user_id, "unauthorized user denied");
                self.reply(&message.chat_id, NOTICE_DENIED).await;
                return;
            }
            Err(error) => {
                tracing::error!(user_id = %message.user_id, %error, "directory lookup failed");
                self.reply(&message.chat_id, NOTICE_INTERNAL).await;
                return;
            }
        }

        let text = message.content.trim();
        let mut parts = text.split_whitespace();
        match parts.next() {
            Some("/addadmin") => {
                self.admin_command(AdminAction::Add, parts.next(), &message)
                    .await;
            }
            Some("/removeadmin") => {
                self.admin_command(AdminAction::Remove, parts.next(), &message)
                    .await;
            }
            _ => {
                self.conversations
                    .on_message(&message.user_id, &message.chat_id, text)
                    .await;
            }
        }
    }

    async fn admin_command(
        &self,
        action: AdminAction,
        argument: Option<&str>,
        message: &ChannelMessage,
    ) {
        let reply = match self
            .apply_admin_command(action, argument, &message.user_id)
            .await
        {
            Ok(reply) => reply,
            Err(CommandError::NotOriginalAdmin) => match action {
                AdminAction::Add => "Only the original admin can add new admins.".to_string(),
                AdminAction::Remove => "Only the original admin can remove admins.".to_string(),
            },
            Err(CommandError::MissingArgument | CommandError::NotNumeric(_)) => match action {
                AdminAction::Add => {
                    "Please provide a valid user ID of the new admin.".to_string()
                }
                AdminAction::Remove => {
                    "Please provide a valid user ID of the admin to remove.".to_string()
                }
            },
            Err(CommandError::Directory(error)) => {
                tracing::error!(%error, "admin command failed");
                NOTICE_INTERNAL.to_string()
            }
        };

        self.reply(&message.chat_id, &reply).await;
    }

    async fn apply_admin_command(
        &self,
        action: AdminAction,
        argument: Option<&str>,
        caller_id: &str,
    ) -> Result<String, CommandError> {
        let original = self
            .directory
            .find_original()
            .await?
            .ok_or_else(|| CommandError::Directory(anyhow::anyhow!("no original admin record")))?;

        if caller_id != original.user_id {
            return Err(CommandError::NotOriginalAdmin);
        }

        let target = argument.ok_or(CommandError::MissingArgument)?;
        if target.is_empty() || !target.chars().all(|c| c.is_ascii_digit()) {
            return Err(CommandError::NotNumeric(target.to_string()));
        }

        match action {
            AdminAction::Add => {
                self.directory.insert(target).await?;
                tracing::info!(user = target, "admin added");
                Ok(format!("User {target} has been added as an admin."))
            }
            AdminAction::Remove => match self.directory.remove(target).await? {
                RemoveOutcome::Removed | RemoveOutcome::NotFound => {
                    tracing::info!(user = target, "admin removed");
                    Ok(format!("User {target} has been removed as an admin."))
                }
                RemoveOutcome::Original => Ok("The original admin cannot be removed.".to_string()),
            },
        }
    }

    async fn reply(&self, chat_id: &str, message: &str) {
        if let Err(error) = self.channel.send(message, chat_id).await {
            tracing::warn!(chat_id, %error, "failed to send reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{DocumentGenerator, GenerateRequest, PROMPT_RENAME};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Default)]
    struct RecordingChannel {
        sent: AsyncMutex<Vec<(String, String)>>,
    }

    impl RecordingChannel {
        async fn messages(&self) -> Vec<(String, String)> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, message: &str, recipient: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .await
                .push((recipient.to_string(), message.to_string()));
            Ok(())
        }

        async fn send_document(
            &self,
            _recipient: &str,
            _file_name: &str,
            _bytes: Vec<u8>,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn listen(&self, _tx: mpsc::Sender<ChannelMessage>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingGenerator {
        requests: AsyncMutex<Vec<GenerateRequest>>,
    }

    #[async_trait]
    impl DocumentGenerator for RecordingGenerator {
        async fn generate(&self, request: GenerateRequest) {
            self.requests.lock().await.push(request);
        }
    }

    struct Fixture {
        _db_dir: tempfile::TempDir,
        channel: Arc<RecordingChannel>,
        generator: Arc<RecordingGenerator>,
        directory: Arc<AdminDirectory>,
        dispatcher: Dispatcher,
    }

    async fn fixture() -> Fixture {
        let db_dir = tempfile::TempDir::new().unwrap();
        let directory =
            Arc::new(AdminDirectory::open(&db_dir.path().join("admins.db")).unwrap());
        directory.bootstrap_original("42").await.unwrap();

        let channel = Arc::new(RecordingChannel::default());
        let generator = Arc::new(RecordingGenerator::default());
        let conversations = Arc::new(Conversations::new(
            channel.clone(),
            generator.clone(),
            Duration::from_secs(60),
            "images".to_string(),
        ));
        let dispatcher = Dispatcher::new(channel.clone(), directory.clone(), conversations);

        Fixture {
            _db_dir: db_dir,
            channel,
            generator,
            directory,
            dispatcher,
        }
    }

    fn message(user_id: &str, text: &str) -> ChannelMessage {
        ChannelMessage {
            id: "m1".to_string(),
            user_id: user_id.to_string(),
            chat_id: format!("chat-{user_id}"),
            content: text.to_string(),
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn unauthorized_user_is_denied_without_a_session() {
        let fx = fixture().await;

        fx.dispatcher.handle(message("999", "https://a.example")).await;

        let sent = fx.channel.messages().await;
        assert_eq!(sent, vec![("chat-999".to_string(), NOTICE_DENIED.to_string())]);
        assert!(fx.generator.requests.lock().await.is_empty());

        // A denial never opens a dialog: the next message is treated as a
        // fresh (still denied) contact, not a rename answer.
        fx.dispatcher.handle(message("999", "no")).await;
        let sent = fx.channel.messages().await;
        assert_eq!(sent[1].1, NOTICE_DENIED);
    }

    #[tokio::test]
    async fn authorized_url_message_opens_a_dialog() {
        let fx = fixture().await;

        fx.dispatcher
            .handle(message("42", "https://example.com"))
            .await;

        let sent = fx.channel.messages().await;
        assert_eq!(sent[0].1, PROMPT_RENAME);
    }

    #[tokio::test]
    async fn full_dialog_reaches_the_generator() {
        let fx = fixture().await;

        fx.dispatcher
            .handle(message("42", "https://example.com"))
            .await;
        fx.dispatcher.handle(message("42", "no")).await;

        let requests = fx.generator.requests.lock().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://example.com");
        assert_eq!(requests[0].output_name, "images");
    }

    #[tokio::test]
    async fn original_admin_adds_an_admin() {
        let fx = fixture().await;

        fx.dispatcher.handle(message("42", "/addadmin 555")).await;

        assert!(fx.directory.find("555").await.unwrap().is_some());
        let sent = fx.channel.messages().await;
        assert_eq!(sent[0].1, "User 555 has been added as an admin.");

        // The new admin is authorized from now on
        fx.dispatcher.handle(message("555", "https://a.example")).await;
        let sent = fx.channel.messages().await;
        assert_eq!(sent[1].1, PROMPT_RENAME);
    }

    #[tokio::test]
    async fn non_original_admin_cannot_manage_admins() {
        let fx = fixture().await;
        fx.directory.insert("555").await.unwrap();

        fx.dispatcher.handle(message("555", "/addadmin 777")).await;

        assert!(fx.directory.find("777").await.unwrap().is_none());
        let sent = fx.channel.messages().await;
        assert_eq!(sent[0].1, "Only the original admin can add new admins.");

        fx.dispatcher
            .handle(message("555", "/removeadmin 42"))
            .await;
        let sent = fx.channel.messages().await;
        assert_eq!(sent[1].1, "Only the original admin can remove admins.");
    }

    #[tokio::test]
    async fn admin_commands_validate_their_argument() {
        let fx = fixture().await;

        fx.dispatcher.handle(message("42", "/addadmin")).await;
        fx.dispatcher.handle(message("42", "/addadmin bob")).await;
        fx.dispatcher.handle(message("42", "/removeadmin 12.5")).await;

        let sent = fx.channel.messages().await;
        assert_eq!(sent[0].1, "Please provide a valid user ID of the new admin.");
        assert_eq!(sent[1].1, "Please provide a valid user ID of the new admin.");
        assert_eq!(
            sent[2].1,
            "Please provide a valid user ID of the admin to remove."
        );
    }

    #[tokio::test]
    async fn remove_admin_round_trip() {
        let fx = fixture().await;
        fx.directory.insert("555").await.unwrap();

        fx.dispatcher
            .handle(message("42", "/removeadmin 555"))
            .await;

        assert!(fx.directory.find("555").await.unwrap().is_none());
        let sent = fx.channel.messages().await;
        assert_eq!(sent[0].1, "User 555 has been removed as an admin.");
    }

    #[tokio::test]
    async fn the_original_admin_cannot_be_removed() {
        let fx = fixture().await;

        fx.dispatcher.handle(message("42", "/removeadmin 42")).await;

        assert!(fx.directory.find("42").await.unwrap().is_some());
        let sent = fx.channel.messages().await;
        assert_eq!(sent[0].1, "The original admin cannot be removed.");
    }
}
